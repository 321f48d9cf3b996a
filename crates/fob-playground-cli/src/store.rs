//! Content-addressed artifact store for on-disk builds.
//!
//! Artifacts are named `chunk-<hash>.<ext>` after the SHA-256 of their
//! content and referenced as `./chunk-<hash>.<ext>`, so linked modules
//! import each other relative to the output directory. Identical content
//! shares one entry; entries are reference-counted and only written by
//! [`HashedArtifactStore::flush`]. Names are checked against the stored
//! content, and a short name taken by different content falls back to the
//! full digest.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fob_playground::{ArtifactStore, ArtifactUrl};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, ResultExt};

/// Hex digits of the content hash kept in short file names.
const HASH_LEN: usize = 16;

#[derive(Debug)]
struct Entry {
    content: Arc<str>,
    refs: usize,
}

#[derive(Debug, Default)]
pub struct HashedArtifactStore {
    entries: Mutex<FxHashMap<String, Entry>>,
}

impl HashedArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// File name behind `url`.
    pub fn file_name(url: &ArtifactUrl) -> &str {
        url.as_str().trim_start_matches("./")
    }

    pub fn read(&self, url: &ArtifactUrl) -> Option<Arc<str>> {
        self.entries
            .lock()
            .get(Self::file_name(url))
            .map(|entry| Arc::clone(&entry.content))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Write every live artifact into `dir`. Returns the written paths in
    /// name order.
    pub fn flush(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).with_path(dir)?;

        let mut files: Vec<(String, Arc<str>)> = self
            .entries
            .lock()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.content)))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut written = Vec::with_capacity(files.len());
        for (name, content) in files {
            let path = dir.join(&name);
            fs::write(&path, content.as_bytes()).with_path(&path)?;
            written.push(path);
        }
        debug!(dir = %dir.display(), count = written.len(), "artifacts written");
        Ok(written)
    }
}

impl ArtifactStore for HashedArtifactStore {
    fn create(&self, content: &str, mime: &str) -> ArtifactUrl {
        let hash = content_hash(content);
        let ext = extension_for(mime);
        let mut entries = self.entries.lock();

        let short = format!("chunk-{}.{ext}", &hash[..HASH_LEN]);
        let name = match entries.get(&short) {
            Some(entry) if *entry.content != *content => {
                debug!(name = %short, "short artifact name taken, using full digest");
                format!("chunk-{hash}.{ext}")
            }
            _ => short,
        };

        entries
            .entry(name.clone())
            .or_insert_with(|| Entry {
                content: Arc::from(content),
                refs: 0,
            })
            .refs += 1;
        ArtifactUrl::new(format!("./{name}"))
    }

    fn release(&self, url: &ArtifactUrl) {
        let mut entries = self.entries.lock();
        let name = Self::file_name(url);
        if let Some(entry) = entries.get_mut(name) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(name);
            }
        }
    }
}

/// Lowercase hex SHA-256 of `content`.
fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "text/css" => "css",
        "application/json" => "json",
        "text/javascript" | "application/javascript" => "js",
        _ => "bin",
    }
}
