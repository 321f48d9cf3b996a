use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::AliasTable;
use crate::types::TypesState;

/// JSON round-trip format of a whole project.
///
/// ```json
/// {
///   "files": { "src/main.ts": "import './app.css';" },
///   "types": { "alias": { "react": ["node_modules/esm.sh/..."] }, "sources": {} },
///   "aliases": { "@": "src" }
/// }
/// ```
///
/// `aliases` is omitted when empty; `types` may be omitted on input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub types: TypesState,
    #[serde(default, skip_serializing_if = "AliasTable::is_empty")]
    pub aliases: AliasTable,
}

impl ProjectState {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_omitted_when_empty() {
        let mut state = ProjectState::default();
        state.files.insert("a.ts".into(), "export {}".into());

        let json = state.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"files":{"a.ts":"export {}"},"types":{"alias":{},"sources":{}}}"#
        );
        assert_eq!(ProjectState::from_json(&json).unwrap(), state);
    }

    #[test]
    fn test_minimal_input() {
        let state = ProjectState::from_json(r#"{"files":{},"aliases":{"@":"src"}}"#).unwrap();
        assert!(state.types.sources.is_empty());
        assert_eq!(state.aliases.get("@"), Some("src"));
    }
}
