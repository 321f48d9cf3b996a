//! Project configuration.

use serde::{Deserialize, Serialize};

/// Default CDN used for bare package specifiers and declaration lookups.
pub const DEFAULT_CDN_BASE: &str = "https://esm.sh";

/// Default prefix of the `id` given to injected `<style>` elements.
pub const DEFAULT_STYLE_ID_PREFIX: &str = "fob-style:";

/// Settings shared by the compiler and the declaration resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaygroundConfig {
    /// Base URL bare specifiers are rewritten onto (`{cdn_base}/{specifier}`).
    pub cdn_base: String,

    /// Fetch type declarations for every external package a script imports.
    pub import_types: bool,

    /// Prefix for the element id of each injected stylesheet. The file path
    /// is appended, so re-running a style module replaces its own element.
    pub style_id_prefix: String,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            cdn_base: DEFAULT_CDN_BASE.to_string(),
            import_types: false,
            style_id_prefix: DEFAULT_STYLE_ID_PREFIX.to_string(),
        }
    }
}

impl PlaygroundConfig {
    pub fn with_cdn_base(mut self, cdn_base: impl Into<String>) -> Self {
        self.cdn_base = cdn_base.into();
        self
    }

    pub fn with_import_types(mut self, enabled: bool) -> Self {
        self.import_types = enabled;
        self
    }

    /// CDN base without trailing slashes.
    pub fn cdn(&self) -> &str {
        self.cdn_base.trim_end_matches('/')
    }

    /// URL of `specifier` on the CDN.
    pub fn cdn_url(&self, specifier: &str) -> String {
        format!("{}/{}", self.cdn(), specifier.trim_start_matches('/'))
    }
}
