//! Declaration downloads against an in-memory CDN.

use std::sync::Arc;

use fob_playground::test_utils::MockCdn;
use fob_playground::{Project, TypeRegistry};

const CDN: &str = "https://esm.sh";
const REACT_TYPES: &str = "https://esm.sh/v135/@types/react@18.2.0/index.d.ts";
const REACT_JSX: &str = "https://esm.sh/v135/@types/react@18.2.0/jsx-runtime.d.ts";
const CSSTYPE: &str = "https://esm.sh/v135/csstype@3.1.3/index.d.ts";

fn react_cdn() -> MockCdn {
    MockCdn::new()
        .with_package("https://esm.sh/react", REACT_TYPES)
        .with_package("https://esm.sh/csstype", CSSTYPE)
        .with_file(
            REACT_TYPES,
            "import * as CSS from 'csstype';\nexport * from './jsx-runtime';\nexport declare const version: string;",
        )
        .with_file(REACT_JSX, "export * from './index';\nexport declare function jsx(): void;")
        .with_file(CSSTYPE, "export type Color = string;")
}

#[tokio::test]
async fn test_package_graph_is_downloaded_once() {
    let cdn = Arc::new(react_cdn());
    let types = TypeRegistry::new(cdn.clone(), CDN);

    let entry = types.from_package_name("react").await;
    assert_eq!(
        entry.as_deref(),
        Some("node_modules/esm.sh/v135/@types/react@18.2.0/index.d.ts")
    );
    assert_eq!(
        types.paths(),
        vec![
            "node_modules/esm.sh/v135/@types/react@18.2.0/index.d.ts",
            "node_modules/esm.sh/v135/@types/react@18.2.0/jsx-runtime.d.ts",
            "node_modules/esm.sh/v135/csstype@3.1.3/index.d.ts",
        ]
    );
    assert_eq!(
        types.alias("csstype"),
        Some(vec!["node_modules/esm.sh/v135/csstype@3.1.3/index.d.ts".to_string()])
    );

    // The jsx-runtime <-> index cycle stops at the cached entry.
    assert_eq!(cdn.request_count(REACT_TYPES), 1);
    assert_eq!(cdn.request_count(REACT_JSX), 1);

    // Asking again is served from the cache.
    let again = types.from_package_name("react").await;
    assert_eq!(again, entry);
    assert_eq!(cdn.request_count("https://esm.sh/react"), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_download() {
    let cdn = Arc::new(MockCdn::new().with_file(CSSTYPE, "export type Color = string;"));
    let types = TypeRegistry::new(cdn.clone(), CDN);

    let (first, second) = futures::join!(types.from_url(CSSTYPE), types.from_url(CSSTYPE));
    assert_eq!(first, second);
    assert_eq!(cdn.request_count(CSSTYPE), 1);
    assert!(!types.is_pending(first.as_deref().unwrap()));
}

#[tokio::test]
async fn test_versions_are_reconciled_to_first_seen() {
    let cdn = Arc::new(
        MockCdn::new()
            .with_file(
                "https://esm.sh/v135/a@1.0.0/index.d.ts",
                "import 'https://esm.sh/v135/shared@1.0.0/index.d.ts';",
            )
            .with_file(
                "https://esm.sh/v135/b@1.0.0/index.d.ts",
                "import 'https://esm.sh/v135/shared@2.0.0/index.d.ts';",
            )
            .with_file(
                "https://esm.sh/v135/shared@1.0.0/index.d.ts",
                "export type Shared = 1;",
            )
            .with_file(
                "https://esm.sh/v135/shared@2.0.0/index.d.ts",
                "export type Shared = 2;",
            ),
    );
    let types = TypeRegistry::new(cdn.clone(), CDN);

    types.from_url("https://esm.sh/v135/a@1.0.0/index.d.ts").await;
    let b = types
        .from_url("https://esm.sh/v135/b@1.0.0/index.d.ts")
        .await
        .unwrap();

    assert_eq!(types.version("shared").as_deref(), Some("1.0.0"));
    assert_eq!(
        cdn.request_count("https://esm.sh/v135/shared@2.0.0/index.d.ts"),
        0
    );
    assert_eq!(
        types.source(&b).as_deref(),
        Some("import '../shared@1.0.0/index';")
    );
    assert!(
        !types
            .paths()
            .iter()
            .any(|path| path.contains("shared@2.0.0"))
    );
}

#[tokio::test]
async fn test_failed_first_version_does_not_pin_package() {
    let cdn = Arc::new(
        MockCdn::new()
            .with_file(
                "https://esm.sh/v135/a@1.0.0/index.d.ts",
                "import 'https://esm.sh/v135/shared@1.0.0/index.d.ts';",
            )
            .with_file(
                "https://esm.sh/v135/b@1.0.0/index.d.ts",
                "import 'https://esm.sh/v135/shared@2.0.0/index.d.ts';",
            )
            .with_file(
                "https://esm.sh/v135/shared@2.0.0/index.d.ts",
                "export type Shared = 2;",
            ),
    );
    cdn.fail("https://esm.sh/v135/shared@1.0.0/index.d.ts");
    let types = TypeRegistry::new(cdn.clone(), CDN);

    types.from_url("https://esm.sh/v135/a@1.0.0/index.d.ts").await;
    assert_eq!(types.version("shared"), None);

    let b = types
        .from_url("https://esm.sh/v135/b@1.0.0/index.d.ts")
        .await
        .unwrap();
    assert_eq!(types.version("shared").as_deref(), Some("2.0.0"));
    assert_eq!(
        cdn.request_count("https://esm.sh/v135/shared@2.0.0/index.d.ts"),
        1
    );
    assert_eq!(
        types.source(&b).as_deref(),
        Some("import '../shared@2.0.0/index';")
    );
}

#[tokio::test]
async fn test_type_level_imports_are_followed() {
    let cdn = Arc::new(
        MockCdn::new()
            .with_file(
                "https://esm.sh/v135/x@1.0.0/index.d.ts",
                "export declare const b: typeof import('./other').B;",
            )
            .with_file(
                "https://esm.sh/v135/x@1.0.0/other.d.ts",
                "export declare const B: number;",
            ),
    );
    let types = TypeRegistry::new(cdn.clone(), CDN);

    let entry = types
        .from_url("https://esm.sh/v135/x@1.0.0/index.d.ts")
        .await
        .unwrap();
    assert_eq!(entry, "node_modules/esm.sh/v135/x@1.0.0/index.d.ts");
    assert_eq!(
        types.paths(),
        vec![
            "node_modules/esm.sh/v135/x@1.0.0/index.d.ts",
            "node_modules/esm.sh/v135/x@1.0.0/other.d.ts",
        ]
    );
    assert_eq!(cdn.request_count("https://esm.sh/v135/x@1.0.0/other.d.ts"), 1);
}

#[tokio::test]
async fn test_network_failure_degrades_and_recovers() {
    let cdn = Arc::new(react_cdn());
    cdn.fail(CSSTYPE);
    let types = TypeRegistry::new(cdn.clone(), CDN);

    let entry = types.from_package_name("react").await.unwrap();
    assert!(types.source(&entry).unwrap().contains("from 'csstype'"));
    assert_eq!(types.alias("csstype"), None);
    assert!(!types.is_pending("node_modules/esm.sh/v135/csstype@3.1.3/index.d.ts"));

    cdn.recover(CSSTYPE);
    assert!(types.from_package_name("csstype").await.is_some());
    assert_eq!(cdn.request_count(CSSTYPE), 2);
}

#[tokio::test]
async fn test_untyped_package_is_not_requested_twice() {
    let cdn = Arc::new(MockCdn::new());
    let types = TypeRegistry::new(cdn.clone(), CDN);

    assert_eq!(types.from_package_name("left-pad").await, None);
    assert_eq!(types.from_package_name("left-pad").await, None);
    assert_eq!(cdn.request_count("https://esm.sh/left-pad"), 1);
}

#[tokio::test]
async fn test_imports_request_declarations_in_background() {
    let cdn = Arc::new(react_cdn());
    let project = Project::builder()
        .cdn_client(cdn.clone())
        .import_types(true)
        .build();
    project
        .write("main.tsx", "import { jsx } from 'react/jsx-runtime';\nimport './local.ts';")
        .unwrap();
    project.write("local.ts", "export {};").unwrap();

    assert!(project.executable("main.tsx").await.unwrap().is_some());
    project.settle().await;

    let types = project.types().unwrap();
    assert_eq!(
        types.alias("react"),
        Some(vec![
            "node_modules/esm.sh/v135/@types/react@18.2.0/index.d.ts".to_string()
        ])
    );
    assert_eq!(cdn.request_count("https://esm.sh/react"), 1);
}

#[test]
fn test_request_without_runtime_is_skipped() {
    let cdn = Arc::new(react_cdn());
    let types = TypeRegistry::new(cdn.clone(), CDN);

    types.request_package("react");
    assert!(cdn.requests().is_empty());
}
