use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::path::extension;

/// What kind of artifact a virtual file compiles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// JavaScript/TypeScript, linked into an ES module.
    Script,
    /// CSS, packaged as a module that injects a `<style>` element.
    Style,
    /// Base64-encoded binary asset, exported as a data URL.
    Binary,
    /// Anything else, exported as text (or as parsed JSON for `.json`).
    Other,
}

impl FileKind {
    /// Infer the kind from a path's extension.
    pub fn from_path(path: &str) -> Self {
        match extension(path).map(str::to_ascii_lowercase).as_deref() {
            Some("ts" | "tsx" | "mts" | "cts" | "js" | "jsx" | "mjs" | "cjs") => Self::Script,
            Some("css") => Self::Style,
            Some(ext) if binary_mime(ext).is_some() => Self::Binary,
            _ => Self::Other,
        }
    }
}

/// MIME type for binary asset extensions.
pub fn binary_mime(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime)
}

/// A file registered in the [`super::FileStore`].
///
/// The source is shared (`Arc<str>`) so compilation can hold onto a
/// snapshot without cloning the text. `revision` comes from the store's
/// clock and grows every time the source changes.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    path: String,
    source: Arc<str>,
    kind: FileKind,
    revision: u64,
}

impl VirtualFile {
    pub(crate) fn new(path: String, source: Arc<str>, revision: u64) -> Self {
        let kind = FileKind::from_path(&path);
        Self {
            path,
            source,
            kind,
            revision,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &Arc<str> {
        &self.source
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn replace(&mut self, source: Arc<str>, revision: u64) {
        self.source = source;
        self.revision = revision;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(FileKind::from_path("src/app.tsx"), FileKind::Script);
        assert_eq!(FileKind::from_path("src/app.d.ts"), FileKind::Script);
        assert_eq!(FileKind::from_path("styles/main.CSS"), FileKind::Style);
        assert_eq!(FileKind::from_path("assets/logo.png"), FileKind::Binary);
        assert_eq!(FileKind::from_path("data/config.json"), FileKind::Other);
        assert_eq!(FileKind::from_path("README"), FileKind::Other);
    }
}
