//! Layered CLI configuration.
//!
//! Priority, lowest first: built-in defaults, `fob-playground.json` (or
//! `--config`), `FOB_PLAYGROUND_*` environment variables, command-line flags.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
    value::Uncased,
};
use fob_playground::PlaygroundConfig;
use fob_playground::config::{DEFAULT_CDN_BASE, DEFAULT_STYLE_ID_PREFIX};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Command};
use crate::error::Result;

/// Config file picked up from the working directory.
pub const CONFIG_FILE: &str = "fob-playground.json";

/// Environment variable prefix, e.g. `FOB_PLAYGROUND_CDN_BASE`.
pub const ENV_PREFIX: &str = "FOB_PLAYGROUND_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    pub cdn_base: String,
    pub style_id_prefix: String,
    /// Where `build` writes modules and the manifest.
    pub out_dir: PathBuf,
    /// Declaration cache written by `types`.
    pub types_file: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            cdn_base: DEFAULT_CDN_BASE.to_string(),
            style_id_prefix: DEFAULT_STYLE_ID_PREFIX.to_string(),
            out_dir: PathBuf::from("dist"),
            types_file: PathBuf::from("types.json"),
        }
    }
}

/// Flags that override file and environment settings. Absent flags are
/// skipped so they do not mask lower layers.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlagOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    cdn_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    types_file: Option<PathBuf>,
}

impl CliConfig {
    /// Load configuration for `args` from every layer.
    pub fn load(args: &Cli) -> Result<Self> {
        let config_file = args.config.clone().or_else(|| {
            let default_path = Path::new(CONFIG_FILE);
            default_path.exists().then(|| default_path.to_path_buf())
        });
        Self::figment(config_file.as_deref(), FlagOverrides::from_cli(args))
            .extract()
            .map_err(Into::into)
    }

    fn figment(config_file: Option<&Path>, flags: FlagOverrides) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Json::file(path));
        }

        figment
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| Uncased::from(env_key(key.as_str())))
                    .lowercase(false),
            )
            .merge(Serialized::defaults(flags))
    }

    /// Compiler settings for projects built by the CLI.
    pub fn playground(&self) -> PlaygroundConfig {
        PlaygroundConfig {
            cdn_base: self.cdn_base.clone(),
            style_id_prefix: self.style_id_prefix.clone(),
            ..PlaygroundConfig::default()
        }
    }
}

impl FlagOverrides {
    fn from_cli(args: &Cli) -> Self {
        let mut flags = FlagOverrides {
            cdn_base: args.cdn_base.clone(),
            ..Self::default()
        };
        match &args.command {
            Command::Build(build) => flags.out_dir = build.out_dir.clone(),
            Command::Types(types) => flags.types_file = types.out.clone(),
        }
        flags
    }
}

/// `CDN_BASE` -> `cdnBase`, matching the camelCase field names.
fn env_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, word) in key.split('_').filter(|word| !word.is_empty()).enumerate() {
        let word = word.to_ascii_lowercase();
        if i == 0 {
            out.push_str(&word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("CDN_BASE"), "cdnBase");
        assert_eq!(env_key("out_dir"), "outDir");
        assert_eq!(env_key("STYLE_ID_PREFIX"), "styleIdPrefix");
    }

    #[test]
    fn test_defaults() {
        let config: CliConfig = CliConfig::figment(None, FlagOverrides::default())
            .extract()
            .unwrap();
        assert_eq!(config.cdn_base, DEFAULT_CDN_BASE);
        assert_eq!(config.out_dir, PathBuf::from("dist"));
    }

    #[test]
    fn test_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{ "cdnBase": "https://cdn.example", "outDir": "public" }"#,
        )
        .unwrap();

        let from_file: CliConfig = CliConfig::figment(Some(&path), FlagOverrides::default())
            .extract()
            .unwrap();
        assert_eq!(from_file.cdn_base, "https://cdn.example");
        assert_eq!(from_file.out_dir, PathBuf::from("public"));
        assert_eq!(from_file.types_file, PathBuf::from("types.json"));

        let flags = FlagOverrides {
            out_dir: Some(PathBuf::from("build")),
            ..FlagOverrides::default()
        };
        let overridden: CliConfig = CliConfig::figment(Some(&path), flags).extract().unwrap();
        assert_eq!(overridden.cdn_base, "https://cdn.example");
        assert_eq!(overridden.out_dir, PathBuf::from("build"));
    }

    #[test]
    fn test_playground_config() {
        let config = CliConfig {
            cdn_base: "https://cdn.example/".into(),
            ..CliConfig::default()
        };
        let playground = config.playground();
        assert_eq!(playground.cdn_url("react"), "https://cdn.example/react");
        assert!(!playground.import_types);
    }
}
