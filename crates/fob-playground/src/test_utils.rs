//! Test doubles shared by unit and integration tests.
//!
//! - [`MockCdn`]: an in-memory CDN with request counting and failure injection.
//! - [`RecordingListener`]: an [`EdgeListener`] that remembers every event.

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::compile::{DependencyEdge, EdgeListener};
use crate::types::{CdnClient, NetworkError};

/// In-memory [`CdnClient`].
///
/// ```rust
/// use fob_playground::test_utils::MockCdn;
///
/// let cdn = MockCdn::new()
///     .with_package("https://esm.sh/left-pad", "https://esm.sh/v135/left-pad@1.0.0/index.d.ts")
///     .with_file("https://esm.sh/v135/left-pad@1.0.0/index.d.ts", "export {};");
/// assert_eq!(cdn.request_count("https://esm.sh/left-pad"), 0);
/// ```
#[derive(Debug, Default)]
pub struct MockCdn {
    files: Mutex<FxHashMap<String, String>>,
    entries: Mutex<FxHashMap<String, String>>,
    failing: Mutex<FxHashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl MockCdn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` at `url`.
    pub fn with_file(self, url: &str, text: &str) -> Self {
        self.files.lock().insert(url.to_string(), text.to_string());
        self
    }

    /// Advertise `types_url` in the types header of `package_url`.
    pub fn with_package(self, package_url: &str, types_url: &str) -> Self {
        self.entries
            .lock()
            .insert(package_url.to_string(), types_url.to_string());
        self
    }

    /// Make every request to `url` fail with a connection error.
    pub fn fail(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    /// Stop failing requests to `url`.
    pub fn recover(&self, url: &str) {
        self.failing.lock().remove(url);
    }

    /// Every requested URL, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|req| *req == url).count()
    }

    fn record(&self, url: &str) -> Result<(), NetworkError> {
        self.requests.lock().push(url.to_string());
        if self.failing.lock().contains(url) {
            return Err(NetworkError::Request {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CdnClient for MockCdn {
    async fn fetch_text(&self, url: &str) -> Result<String, NetworkError> {
        self.record(url)?;
        self.files
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| NetworkError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    async fn types_entry(&self, url: &str) -> Result<Option<String>, NetworkError> {
        self.record(url)?;
        Ok(self.entries.lock().get(url).cloned())
    }
}

/// Edge lifecycle event seen by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeEvent {
    Added(DependencyEdge),
    Dropped(DependencyEdge),
}

#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<EdgeEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EdgeEvent> {
        self.events.lock().clone()
    }

    pub fn added(&self) -> Vec<DependencyEdge> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                EdgeEvent::Added(edge) => Some(edge.clone()),
                EdgeEvent::Dropped(_) => None,
            })
            .collect()
    }

    pub fn dropped(&self) -> Vec<DependencyEdge> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                EdgeEvent::Dropped(edge) => Some(edge.clone()),
                EdgeEvent::Added(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EdgeListener for RecordingListener {
    fn edge_added(&self, edge: &DependencyEdge) {
        self.events.lock().push(EdgeEvent::Added(edge.clone()));
    }

    fn edge_dropped(&self, edge: &DependencyEdge) {
        self.events.lock().push(EdgeEvent::Dropped(edge.clone()));
    }
}
