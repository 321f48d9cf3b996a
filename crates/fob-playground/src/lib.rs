#![cfg_attr(docsrs, feature(doc_cfg))]

//! # fob-playground
//!
//! Reactive module resolution for in-browser playgrounds.
//!
//! A host registers source files in a virtual tree; for every file the
//! project produces an always-current artifact URL (an ES module, or a
//! module that injects a stylesheet) whose imports point at the artifacts of
//! sibling files or at CDN-hosted packages. Declarations of imported
//! packages can be downloaded into the tree for an editor's type checker.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fob_playground::Project;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let project = Project::new();
//! project.mkdir("src")?;
//! project.write("src/util.ts", "export const answer = 42;")?;
//! project.write("src/main.ts", "import { answer } from './util';\nconsole.log(answer);")?;
//!
//! let url = project.executable("src/main.ts").await?;
//! println!("run {url:?}");
//! # Ok(()) }
//! ```
//!
//! ## Pipeline
//!
//! Each file is **transformed** by host [`Transform`]s, **linked** (its
//! specifiers rewritten to artifact URLs) and **packaged** through an
//! [`ArtifactStore`]. All three stages are memoized; editing one file only
//! recompiles the files whose inputs actually changed.

pub mod artifact;
pub mod compile;
pub mod config;
pub mod path;
pub mod project;
pub mod registry;
pub mod rewrite;
pub mod scan;
pub mod state;
pub mod store;
pub mod transform;
pub mod types;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

// Test utilities (available in test builds and with the "test-utils" feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use artifact::{ArtifactStore, ArtifactUrl, MODULE_MIME, MemoryArtifactStore};
pub use compile::{
    ArtifactCompiler, CompileError, DependencyEdge, DependencyGraph, DependencyTarget, EdgeListener,
    LinkError,
};
pub use config::PlaygroundConfig;
pub use project::{Project, ProjectBuilder};
pub use registry::ExecutableRegistry;
pub use rewrite::{Edit, SpecifierRewriter};
pub use scan::{ScanError, SpecifierRange, scan};
pub use state::ProjectState;
pub use store::{AliasTable, DirEntry, FileKind, FileStore, PathError, VirtualFile};
pub use transform::{FnTransform, Transform, TransformChain, TransformError};
pub use types::{CdnClient, NetworkError, TypeRegistry, TypesState};

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use types::HttpCdnClient;

/// Error types for fob-playground operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid virtual path operation.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Source text could not be scanned.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A host transform failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// A file could not be linked.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A CDN request failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Project state is not valid JSON.
    #[error("invalid project state: {0}")]
    State(#[from] serde_json::Error),
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Transform(err) => Error::Transform(err),
            CompileError::Link(err) => Error::Link(err),
        }
    }
}

/// Result type alias for fob-playground operations.
pub type Result<T> = std::result::Result<T, Error>;
