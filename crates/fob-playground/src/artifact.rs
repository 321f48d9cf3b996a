//! Artifact handles.
//!
//! In the browser an artifact is an object URL created from a `Blob` and
//! revoked with `URL.revokeObjectURL`. The compiler only needs two
//! operations from that mechanism, so it talks to an [`ArtifactStore`]:
//! `create` hands out a URL for a piece of module text and `release` frees
//! it. Hosts without object URLs substitute their own store (the CLI writes
//! content-hashed files; tests use [`MemoryArtifactStore`]).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// MIME type used for every packaged artifact.
pub const MODULE_MIME: &str = "text/javascript";

/// URL of a packaged artifact.
///
/// Cheap to clone; equality is by URL text, which is unique per created
/// artifact for the lifetime of its store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactUrl(Arc<str>);

impl ArtifactUrl {
    pub fn new(url: impl Into<Arc<str>>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Creates and releases artifact URLs.
///
/// Every `create` is balanced by exactly one `release` of the returned URL.
/// Stores may hand out the same URL for identical content, provided the
/// resource outlives its last outstanding `create`. `release` of unknown
/// URLs is a no-op.
pub trait ArtifactStore: Send + Sync + fmt::Debug {
    /// Package `content` under a new URL.
    fn create(&self, content: &str, mime: &str) -> ArtifactUrl;

    /// Free the resource behind `url`.
    fn release(&self, url: &ArtifactUrl);
}

#[derive(Debug, Clone)]
struct StoredArtifact {
    content: Arc<str>,
    mime: String,
}

/// Process-local artifact store backed by a hash map.
///
/// URLs look like `blob:fob-playground/<uuid>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<FxHashMap<ArtifactUrl, StoredArtifact>>,
    created: AtomicU64,
    released: AtomicU64,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of a live artifact.
    pub fn read(&self, url: &ArtifactUrl) -> Option<Arc<str>> {
        self.entries
            .lock()
            .get(url)
            .map(|entry| Arc::clone(&entry.content))
    }

    /// MIME type of a live artifact.
    pub fn mime(&self, url: &ArtifactUrl) -> Option<String> {
        self.entries.lock().get(url).map(|entry| entry.mime.clone())
    }

    pub fn is_live(&self, url: &ArtifactUrl) -> bool {
        self.entries.lock().contains_key(url)
    }

    /// Number of artifacts created and not yet released.
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Total number of `create` calls.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Total number of `release` calls that freed a live artifact.
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn create(&self, content: &str, mime: &str) -> ArtifactUrl {
        let url = ArtifactUrl::new(format!("blob:fob-playground/{}", uuid::Uuid::new_v4()));
        self.entries.lock().insert(
            url.clone(),
            StoredArtifact {
                content: Arc::from(content),
                mime: mime.to_string(),
            },
        );
        self.created.fetch_add(1, Ordering::Relaxed);
        url
    }

    fn release(&self, url: &ArtifactUrl) {
        if self.entries.lock().remove(url).is_some() {
            self.released.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_release() {
        let store = MemoryArtifactStore::new();
        let a = store.create("export default 1;", MODULE_MIME);
        let b = store.create("export default 1;", MODULE_MIME);

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("blob:fob-playground/"));
        assert_eq!(store.live_count(), 2);
        assert_eq!(store.read(&a).as_deref(), Some("export default 1;"));
        assert_eq!(store.mime(&a).as_deref(), Some(MODULE_MIME));

        store.release(&a);
        store.release(&a);
        assert!(!store.is_live(&a));
        assert_eq!(store.live_count(), 1);
        assert_eq!(store.created_count(), 2);
        assert_eq!(store.released_count(), 1);
    }
}
