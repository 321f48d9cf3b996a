//! Integration tests for the `build` and `types` commands.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use fob_playground::ProjectState;
use fob_playground::test_utils::MockCdn;
use fob_playground_cli::cli::BuildArgs;
use fob_playground_cli::commands::{build, types};
use fob_playground_cli::config::CliConfig;
use fob_playground_cli::error::CliError;
use tempfile::TempDir;

fn config(dir: &TempDir) -> CliConfig {
    CliConfig {
        cdn_base: "https://cdn.example".into(),
        out_dir: dir.path().join("dist"),
        types_file: dir.path().join("types.json"),
        ..CliConfig::default()
    }
}

fn state(files: &[(&str, &str)]) -> ProjectState {
    let mut state = ProjectState::default();
    for (path, source) in files {
        state.files.insert(path.to_string(), source.to_string());
    }
    state
}

#[tokio::test]
async fn test_build_links_modules_on_disk() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let state = state(&[
        (
            "src/main.js",
            "import { answer } from './util';\nimport React from 'react';\nimport './style.css';\nconsole.log(answer, React);",
        ),
        ("src/util.js", "export const answer = 42;"),
        ("src/style.css", "body { margin: 0; }"),
    ]);

    let manifest = build::build(&state, &config, &config.out_dir).await.unwrap();
    assert!(manifest.errors.is_empty());
    assert_eq!(
        manifest.files.keys().collect::<Vec<_>>(),
        vec!["src/main.js", "src/style.css", "src/util.js"]
    );

    let main = fs::read_to_string(config.out_dir.join(&manifest.files["src/main.js"])).unwrap();
    assert!(main.contains(&format!("./{}", manifest.files["src/util.js"])));
    assert!(main.contains(&format!("./{}", manifest.files["src/style.css"])));
    assert!(main.contains("https://cdn.example/react"));
    assert!(!main.contains("'./util'"));

    let style = fs::read_to_string(config.out_dir.join(&manifest.files["src/style.css"])).unwrap();
    assert!(style.contains("document.createElement(\"style\")"));

    let written: build::BuildManifest = serde_json::from_str(
        &fs::read_to_string(config.out_dir.join(build::MANIFEST_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(written, manifest);
}

#[tokio::test]
async fn test_identical_builds_produce_identical_names() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let state = state(&[
        ("a.js", "import './b.js';"),
        ("b.js", "export default 1;"),
    ]);

    let first = build::build(&state, &config, &dir.path().join("one")).await.unwrap();
    let second = build::build(&state, &config, &dir.path().join("two")).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_strict_build_reports_link_failures() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let state_path: PathBuf = dir.path().join("state.json");
    let project = state(&[
        ("src/ok.js", "export default 1;"),
        ("src/broken.js", "import './missing';"),
    ]);
    fs::write(&state_path, project.to_json().unwrap()).unwrap();

    let lenient = BuildArgs {
        state: state_path.clone(),
        out_dir: None,
        strict: false,
    };
    build::execute(lenient, &config).await.unwrap();

    let manifest: build::BuildManifest = serde_json::from_str(
        &fs::read_to_string(config.out_dir.join(build::MANIFEST_FILE)).unwrap(),
    )
    .unwrap();
    assert!(manifest.files.contains_key("src/ok.js"));
    assert!(manifest.errors["src/broken.js"].contains("./missing"));

    let strict = BuildArgs {
        state: state_path,
        out_dir: None,
        strict: true,
    };
    let err = build::execute(strict, &config).await.unwrap_err();
    assert!(matches!(err, CliError::LinkFailed { count: 1, .. }));
}

#[tokio::test]
async fn test_missing_state_file() {
    let dir = TempDir::new().unwrap();
    let args = BuildArgs {
        state: dir.path().join("nope.json"),
        out_dir: None,
        strict: false,
    };
    let err = build::execute(args, &config(&dir)).await.unwrap_err();
    assert!(matches!(err, CliError::FileNotFound(_)));
}

#[tokio::test]
async fn test_types_cache_is_extended_across_runs() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let entry = "https://cdn.example/v135/left-pad@1.3.0/index.d.ts";

    let cdn = Arc::new(
        MockCdn::new()
            .with_package("https://cdn.example/left-pad", entry)
            .with_file(entry, "export default function leftPad(s: string): string;"),
    );
    let state = types::fetch(cdn, &config, &["left-pad".into()], &config.types_file)
        .await
        .unwrap();
    assert_eq!(
        state.alias["left-pad"],
        vec!["node_modules/cdn.example/v135/left-pad@1.3.0/index.d.ts".to_string()]
    );

    // A second run reads the cache instead of the network.
    let offline = Arc::new(MockCdn::new());
    let again = types::fetch(
        offline.clone(),
        &config,
        &["left-pad".into(), "untyped".into()],
        &config.types_file,
    )
    .await
    .unwrap();
    assert_eq!(again, state);
    assert_eq!(offline.request_count("https://cdn.example/left-pad"), 0);
    assert_eq!(offline.request_count("https://cdn.example/untyped"), 1);
}
