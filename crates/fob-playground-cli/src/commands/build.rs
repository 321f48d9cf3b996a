//! `build`: link a serialized project into a directory of ES modules.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fob_playground::{Project, ProjectState};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cli::BuildArgs;
use crate::config::CliConfig;
use crate::error::{CliError, Result, ResultExt};
use crate::store::HashedArtifactStore;

/// Written next to the modules as `manifest.json`.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Source path to module file name.
    pub files: BTreeMap<String, String>,
    /// Source path to the error that kept it from linking.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

pub const MANIFEST_FILE: &str = "manifest.json";

/// Execute the build command.
pub async fn execute(args: BuildArgs, config: &CliConfig) -> Result<()> {
    let state = read_state(&args.state)?;
    let manifest = build(&state, config, &config.out_dir).await?;

    for (path, message) in &manifest.errors {
        warn!(path = %path, "{message}");
    }
    info!(
        linked = manifest.files.len(),
        failed = manifest.errors.len(),
        out_dir = %config.out_dir.display(),
        "build finished"
    );

    if args.strict {
        if let Some((path, message)) = manifest.errors.iter().next() {
            return Err(CliError::LinkFailed {
                count: manifest.errors.len(),
                first: format!("{path}: {message}"),
            });
        }
    }
    Ok(())
}

pub fn read_state(path: &Path) -> Result<ProjectState> {
    let json = std::fs::read_to_string(path).with_path(path)?;
    ProjectState::from_json(&json).with_path(path)
}

/// Link every file of `state` and write modules plus manifest into `out_dir`.
pub async fn build(state: &ProjectState, config: &CliConfig, out_dir: &Path) -> Result<BuildManifest> {
    let artifacts = Arc::new(HashedArtifactStore::new());
    let project = Project::builder()
        .config(config.playground())
        .artifact_store(artifacts.clone())
        .build();
    project.initialize(state)?;

    let mut manifest = BuildManifest::default();
    for path in project.paths() {
        let url = project.executable(&path).await?;
        if let Some(err) = project.last_error(&path) {
            manifest.errors.insert(path.clone(), err.to_string());
        }
        if let Some(url) = url {
            manifest
                .files
                .insert(path, HashedArtifactStore::file_name(&url).to_string());
        }
    }

    artifacts.flush(out_dir)?;
    let manifest_path: PathBuf = out_dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest).with_path(&manifest_path)?;
    std::fs::write(&manifest_path, json).with_path(&manifest_path)?;
    Ok(manifest)
}
