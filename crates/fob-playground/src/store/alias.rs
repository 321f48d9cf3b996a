use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::{join, normalize};

/// Redirects package names or virtual paths to canonical virtual paths.
///
/// An alias matches a specifier exactly (`@lib` -> `src/lib/index.ts`) or as
/// a directory prefix (`@/components/Button` with `@` -> `src`). When several
/// prefixes match, the longest one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an alias, returning the previous target.
    pub fn insert(&mut self, name: impl Into<String>, target: impl AsRef<str>) -> Option<String> {
        self.entries.insert(name.into(), normalize(target.as_ref()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Map `specifier` through the table, or `None` if no alias applies.
    pub fn resolve(&self, specifier: &str) -> Option<String> {
        if let Some(target) = self.entries.get(specifier) {
            return Some(target.clone());
        }

        self.entries
            .iter()
            .filter_map(|(name, target)| {
                let rest = specifier.strip_prefix(name.as_str())?.strip_prefix('/')?;
                Some((name.len(), join(target, rest)))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, path)| path)
    }
}
