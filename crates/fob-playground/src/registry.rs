//! Executable registry.
//!
//! One node per compiled path holds the memoized output of every
//! pipeline stage and the single live artifact URL. Stage results are
//! committed with the epoch and file revision they were computed from:
//!
//! - a commit whose epoch no longer matches the node (the path was
//!   invalidated while the stage was suspended) is discarded;
//! - a commit computed from an older revision than the one already stored
//!   is discarded.
//!
//! Publishing a new linked output creates a fresh artifact and releases the
//! previous one in the same step, so there is never more than one live URL
//! per path.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::artifact::{ArtifactStore, ArtifactUrl, MODULE_MIME};
use crate::compile::{CompileError, LinkError};
use crate::transform::TransformError;

#[derive(Debug, Clone)]
pub(crate) struct TransformMemo {
    pub revision: u64,
    pub output: Arc<str>,
}

/// A successful link, with everything needed to verify it later.
#[derive(Debug, Clone)]
pub(crate) struct LinkMemo {
    pub revision: u64,
    /// Store layout the specifiers were resolved against.
    pub layout: u64,
    pub input: Arc<str>,
    /// Local dependencies and the artifact URL each had when linked.
    pub deps: Vec<(String, ArtifactUrl)>,
    pub output: Arc<str>,
}

#[derive(Debug)]
struct Packaged {
    revision: u64,
    from: Arc<str>,
    url: ArtifactUrl,
}

#[derive(Debug, Default)]
struct ArtifactNode {
    epoch: u64,
    transform: Option<TransformMemo>,
    failed_revision: Option<u64>,
    link: Option<LinkMemo>,
    packaged: Option<Packaged>,
    transform_error: Option<TransformError>,
    link_error: Option<LinkError>,
}

impl ArtifactNode {
    fn clear_memos(&mut self) {
        self.epoch += 1;
        self.transform = None;
        self.failed_revision = None;
        self.link = None;
    }
}

/// Path -> memoized compile state and live artifact.
#[derive(Debug)]
pub struct ExecutableRegistry {
    artifacts: Arc<dyn ArtifactStore>,
    nodes: Mutex<FxHashMap<String, ArtifactNode>>,
}

impl ExecutableRegistry {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            artifacts,
            nodes: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// The live artifact URL for `path`, if one has been published.
    pub fn current(&self, path: &str) -> Option<ArtifactUrl> {
        self.nodes
            .lock()
            .get(path)
            .and_then(|node| node.packaged.as_ref())
            .map(|packaged| packaged.url.clone())
    }

    /// The most recent unresolved compile failure for `path`.
    ///
    /// Transform failures take precedence: while the transform is failing the
    /// link stage only ever sees the last good intermediary.
    pub fn last_error(&self, path: &str) -> Option<CompileError> {
        let nodes = self.nodes.lock();
        let node = nodes.get(path)?;
        node.transform_error
            .clone()
            .map(CompileError::Transform)
            .or_else(|| node.link_error.clone().map(CompileError::Link))
    }

    /// Forget every memo for `path` so the next pull recomputes all stages.
    ///
    /// The live URL stays valid until a new artifact supersedes it. Stage
    /// results still in flight for the old epoch are discarded on commit.
    pub fn invalidate(&self, path: &str) {
        if let Some(node) = self.nodes.lock().get_mut(path) {
            node.clear_memos();
            debug!(path = %path, epoch = node.epoch, "invalidated");
        }
    }

    /// Drop `path` entirely and release its artifact.
    pub fn evict(&self, path: &str) -> Option<ArtifactUrl> {
        let node = self.nodes.lock().remove(path)?;
        let url = node.packaged.map(|packaged| packaged.url)?;
        self.artifacts.release(&url);
        debug!(path = %path, url = %url, "evicted");
        Some(url)
    }

    /// Release every artifact and forget every node.
    pub fn clear(&self) {
        let nodes = std::mem::take(&mut *self.nodes.lock());
        for packaged in nodes.into_values().filter_map(|node| node.packaged) {
            self.artifacts.release(&packaged.url);
        }
    }

    /// Paths with registry state, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.nodes.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Start a pull of `path`: returns the epoch stage commits must carry.
    pub(crate) fn begin(&self, path: &str) -> u64 {
        self.nodes.lock().entry(path.to_string()).or_default().epoch
    }

    pub(crate) fn transform_memo(&self, path: &str) -> (Option<TransformMemo>, Option<u64>) {
        self.nodes
            .lock()
            .get(path)
            .map(|node| (node.transform.clone(), node.failed_revision))
            .unwrap_or_default()
    }

    /// Store a transform result. Output equal to the previous intermediary
    /// keeps the previous `Arc` so the link memo stays valid.
    ///
    /// Returns `None` when the commit is stale.
    pub(crate) fn commit_transform(
        &self,
        path: &str,
        epoch: u64,
        revision: u64,
        output: String,
    ) -> Option<Arc<str>> {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(path)?;
        if node.epoch != epoch {
            trace!(path = %path, "discarding transform from superseded epoch");
            return None;
        }

        let previous = node.transform.take();
        if let Some(memo) = &previous {
            if memo.revision > revision {
                trace!(path = %path, revision, "discarding transform of older revision");
                node.transform = previous;
                return None;
            }
        }

        let output: Arc<str> = match previous {
            Some(memo) if *memo.output == *output => memo.output,
            _ => Arc::from(output),
        };
        node.transform = Some(TransformMemo {
            revision,
            output: Arc::clone(&output),
        });
        node.failed_revision = None;
        node.transform_error = None;
        Some(output)
    }

    /// Record a failed transform of `revision`. Returns the last good
    /// intermediary, if any.
    pub(crate) fn fail_transform(
        &self,
        path: &str,
        epoch: u64,
        revision: u64,
        error: TransformError,
    ) -> Option<Arc<str>> {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(path)?;
        if node.epoch == epoch {
            node.failed_revision = Some(revision);
            node.transform_error = Some(error);
        }
        node.transform.as_ref().map(|memo| Arc::clone(&memo.output))
    }

    pub(crate) fn link_memo(&self, path: &str) -> Option<LinkMemo> {
        self.nodes.lock().get(path).and_then(|node| node.link.clone())
    }

    /// Store a successful link. Returns `false` when the commit is stale.
    pub(crate) fn commit_link(&self, path: &str, epoch: u64, memo: LinkMemo) -> bool {
        let mut nodes = self.nodes.lock();
        let Some(node) = nodes.get_mut(path) else {
            return false;
        };
        if node.epoch != epoch {
            trace!(path = %path, "discarding link from superseded epoch");
            return false;
        }
        if node.link.as_ref().is_some_and(|prev| prev.revision > memo.revision) {
            trace!(path = %path, "discarding link of older revision");
            return false;
        }
        node.link = Some(memo);
        node.link_error = None;
        true
    }

    pub(crate) fn fail_link(&self, path: &str, epoch: u64, error: LinkError) {
        if let Some(node) = self.nodes.lock().get_mut(path) {
            if node.epoch == epoch {
                node.link_error = Some(error);
            }
        }
    }

    /// Package `linked` as the artifact of `path`.
    ///
    /// Reuses the live URL when `linked` is the same `Arc` that produced it.
    /// Otherwise creates a new artifact and releases the old one. Stale
    /// publishes leave the live URL untouched and return it.
    pub(crate) fn publish(
        &self,
        path: &str,
        epoch: u64,
        revision: u64,
        linked: &Arc<str>,
    ) -> Option<ArtifactUrl> {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(path)?;
        let current = node.packaged.as_ref().map(|packaged| packaged.url.clone());

        if node.epoch != epoch {
            return current;
        }
        if let Some(packaged) = &mut node.packaged {
            if Arc::ptr_eq(&packaged.from, linked) {
                packaged.revision = packaged.revision.max(revision);
                return current;
            }
            if packaged.revision > revision {
                return current;
            }
        }

        let url = self.artifacts.create(linked, MODULE_MIME);
        let previous = node.packaged.replace(Packaged {
            revision,
            from: Arc::clone(linked),
            url: url.clone(),
        });
        if let Some(previous) = previous {
            self.artifacts.release(&previous.url);
        }
        debug!(path = %path, url = %url, "published artifact");
        Some(url)
    }
}
