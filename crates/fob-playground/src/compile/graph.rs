//! Direct-dependency edges between compiled files.
//!
//! Each successful link replaces the importer's whole edge set. Edges that
//! disappear are reported to every [`EdgeListener`] before the link returns,
//! so resources keyed to an edge (an injected `<script>` tag, a preload hint)
//! can be torn down at exactly the moment the edge stops existing.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// What an edge points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyTarget {
    /// Another file in the virtual store.
    Local(String),
    /// A package served by the CDN, by its original specifier.
    External(String),
}

impl DependencyTarget {
    pub fn as_local(&self) -> Option<&str> {
        match self {
            Self::Local(path) => Some(path),
            Self::External(_) => None,
        }
    }
}

impl fmt::Display for DependencyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => f.write_str(path),
            Self::External(spec) => write!(f, "external:{spec}"),
        }
    }
}

/// One import/export edge recorded by the last successful link of `importer`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub importer: String,
    pub target: DependencyTarget,
    pub is_import: bool,
    pub is_dynamic: bool,
}

/// Observer for edge lifecycle events.
pub trait EdgeListener: Send + Sync {
    /// Called after an edge appears in an importer's edge set.
    fn edge_added(&self, _edge: &DependencyEdge) {}

    /// Called after an edge is dropped from an importer's edge set.
    fn edge_dropped(&self, edge: &DependencyEdge);
}

/// Edges added and dropped by a single replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDiff {
    pub added: Vec<DependencyEdge>,
    pub dropped: Vec<DependencyEdge>,
}

impl EdgeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.dropped.is_empty()
    }
}

/// Importer -> edges, with a reference count per target.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: FxHashMap<String, Vec<DependencyEdge>>,
    refcounts: FxHashMap<DependencyTarget, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every edge of `importer`, returning what changed.
    pub fn replace(&mut self, importer: &str, mut edges: Vec<DependencyEdge>) -> EdgeDiff {
        dedup(&mut edges);
        let previous = self.edges.remove(importer).unwrap_or_default();

        let dropped: Vec<DependencyEdge> = previous
            .iter()
            .filter(|edge| !edges.contains(edge))
            .cloned()
            .collect();
        let added: Vec<DependencyEdge> = edges
            .iter()
            .filter(|edge| !previous.contains(edge))
            .cloned()
            .collect();

        for edge in &dropped {
            self.release(&edge.target);
        }
        for edge in &added {
            *self.refcounts.entry(edge.target.clone()).or_insert(0) += 1;
        }

        if !edges.is_empty() {
            self.edges.insert(importer.to_string(), edges);
        }
        EdgeDiff { added, dropped }
    }

    /// Drop every edge of `importer` (the file was removed).
    pub fn remove_importer(&mut self, importer: &str) -> Vec<DependencyEdge> {
        let dropped = self.edges.remove(importer).unwrap_or_default();
        for edge in &dropped {
            self.release(&edge.target);
        }
        dropped
    }

    /// Edges recorded for `importer`.
    pub fn dependencies(&self, importer: &str) -> &[DependencyEdge] {
        self.edges.get(importer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Importers with at least one edge to the local file `path`, sorted.
    pub fn dependents(&self, path: &str) -> Vec<String> {
        let target = DependencyTarget::Local(path.to_string());
        let mut importers: Vec<String> = self
            .edges
            .iter()
            .filter(|(_, edges)| edges.iter().any(|edge| edge.target == target))
            .map(|(importer, _)| importer.clone())
            .collect();
        importers.sort();
        importers
    }

    /// Number of edges currently pointing at `target`.
    pub fn refcount(&self, target: &DependencyTarget) -> usize {
        self.refcounts.get(target).copied().unwrap_or(0)
    }

    /// Drop every edge, returning them.
    pub fn clear(&mut self) -> Vec<DependencyEdge> {
        self.refcounts.clear();
        let mut importers: Vec<_> = self.edges.drain().collect();
        importers.sort_by(|a, b| a.0.cmp(&b.0));
        importers.into_iter().flat_map(|(_, edges)| edges).collect()
    }

    fn release(&mut self, target: &DependencyTarget) {
        if let Some(count) = self.refcounts.get_mut(target) {
            *count -= 1;
            if *count == 0 {
                self.refcounts.remove(target);
            }
        }
    }
}

fn dedup(edges: &mut Vec<DependencyEdge>) {
    let mut seen = Vec::with_capacity(edges.len());
    edges.retain(|edge| {
        if seen.contains(edge) {
            false
        } else {
            seen.push(edge.clone());
            true
        }
    });
}
