use std::sync::Arc;

use fob_playground::test_utils::MockCdn;
use fob_playground::{MemoryArtifactStore, Project, ProjectState};

const STATE: &str = r#"{
  "files": {
    "index.html": "<script type=\"module\" src=\"./src/main.ts\"></script>",
    "src/main.ts": "import { greet } from '@/greet';\ngreet();",
    "src/greet.ts": "export const greet = () => 'hi';"
  },
  "types": {
    "alias": { "left-pad": ["node_modules/esm.sh/v135/left-pad@1.3.0/index.d.ts"] },
    "sources": {
      "node_modules/esm.sh/v135/left-pad@1.3.0/index.d.ts": "export default function leftPad(s: string): string;"
    }
  },
  "aliases": { "@": "src" }
}"#;

fn project_with_types(cdn: Arc<MockCdn>) -> Project {
    Project::builder()
        .cdn_client(cdn)
        .artifact_store(Arc::new(MemoryArtifactStore::new()))
        .build()
}

#[tokio::test]
async fn test_state_round_trip() {
    let state = ProjectState::from_json(STATE).unwrap();
    let project = project_with_types(Arc::new(MockCdn::new()));
    project.initialize(&state).unwrap();

    assert_eq!(project.to_json(), state);
    assert!(project.is_dir("src"));
    assert_eq!(project.aliases().get("@"), Some("src"));
    assert!(project.executable("src/main.ts").await.unwrap().is_some());
    assert!(project.last_error("src/main.ts").is_none());

    let json = project.to_json().to_json_pretty().unwrap();
    let restored = project_with_types(Arc::new(MockCdn::new()));
    restored.initialize(&ProjectState::from_json(&json).unwrap()).unwrap();
    assert_eq!(restored.to_json(), state);
}

#[tokio::test]
async fn test_initialized_types_are_served_from_cache() {
    let cdn = Arc::new(MockCdn::new().with_file(
        "https://esm.sh/v135/left-pad@1.4.0/index.d.ts",
        "export {};",
    ));
    let project = project_with_types(cdn.clone());
    project
        .initialize(&ProjectState::from_json(STATE).unwrap())
        .unwrap();

    let types = project.types().unwrap();
    assert_eq!(
        types.from_package_name("left-pad").await.as_deref(),
        Some("node_modules/esm.sh/v135/left-pad@1.3.0/index.d.ts")
    );
    assert_eq!(types.version("left-pad").as_deref(), Some("1.3.0"));

    // A newer pin elsewhere is reconciled onto the cached version.
    let path = types
        .from_url("https://esm.sh/v135/left-pad@1.4.0/index.d.ts")
        .await;
    assert_eq!(
        path.as_deref(),
        Some("node_modules/esm.sh/v135/left-pad@1.3.0/index.d.ts")
    );
    assert!(cdn.requests().is_empty());
}

#[tokio::test]
async fn test_initialize_releases_previous_artifacts() {
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let project = Project::builder().artifact_store(artifacts.clone()).build();
    project.write("old.ts", "export {};").unwrap();
    let old = project.executable("old.ts").await.unwrap().unwrap();

    project
        .initialize(&ProjectState::from_json(STATE).unwrap())
        .unwrap();

    assert!(!artifacts.is_live(&old));
    assert!(!project.has("old.ts"));
    assert_eq!(project.paths(), vec!["index.html", "src/greet.ts", "src/main.ts"]);

    // Without a CDN client the types half is empty.
    assert!(project.to_json().types.sources.is_empty());
}
