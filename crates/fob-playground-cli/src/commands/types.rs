//! `types`: download package declarations into a cache file.
//!
//! The cache has the shape of a project's `types` section, so it can be
//! pasted into a project state or handed to a playground on startup.

use std::path::Path;
use std::sync::Arc;

use fob_playground::{CdnClient, HttpCdnClient, TypeRegistry, TypesState};
use futures::future::join_all;
use tracing::{info, warn};

use crate::cli::TypesArgs;
use crate::config::CliConfig;
use crate::error::{Result, ResultExt};

/// Execute the types command.
pub async fn execute(args: TypesArgs, config: &CliConfig) -> Result<()> {
    let client: Arc<dyn CdnClient> = Arc::new(HttpCdnClient::new());
    let state = fetch(client, config, &args.packages, &config.types_file).await?;
    info!(
        files = state.sources.len(),
        out = %config.types_file.display(),
        "declaration cache written"
    );
    Ok(())
}

/// Extend the cache at `out` (if any) with `packages` and rewrite it.
pub async fn fetch(
    client: Arc<dyn CdnClient>,
    config: &CliConfig,
    packages: &[String],
    out: &Path,
) -> Result<TypesState> {
    let registry = TypeRegistry::new(client, config.cdn_base.clone());
    if let Some(cached) = read_cache(out)? {
        registry.initialize(&cached);
    }

    let entries = join_all(packages.iter().map(|name| registry.from_package_name(name))).await;
    for (name, entry) in packages.iter().zip(entries) {
        match entry {
            Some(path) => info!(package = %name, entry = %path, "declarations ready"),
            None => warn!(package = %name, "no declarations available"),
        }
    }

    let state = registry.to_state();
    let json = serde_json::to_string_pretty(&state).with_path(out)?;
    if let Some(parent) = out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_path(parent)?;
    }
    std::fs::write(out, json).with_path(out)?;
    Ok(state)
}

fn read_cache(path: &Path) -> Result<Option<TypesState>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path).with_path(path)?;
    serde_json::from_str(&json).map(Some).with_path(path)
}
