//! Artifact compiler.
//!
//! Each file goes through three stages, memoized in the
//! [`ExecutableRegistry`]:
//!
//! 1. **transform**: the host [`TransformChain`] turns the source into an
//!    intermediary (scripts only by default);
//! 2. **link**: module specifiers are scanned and rewritten to artifact URLs
//!    of sibling files or to CDN URLs; styles, binary assets, JSON and other
//!    text are wrapped in small ES modules instead;
//! 3. **package**: the linked text becomes an artifact URL.
//!
//! Compilation is pull-based. Asking for a file's artifact verifies its memos
//! against the file revision and the current artifact URL of every local
//! dependency, pulling those dependencies first. Any stage that finds its
//! inputs unchanged returns the previous output `Arc`, and an unchanged `Arc`
//! keeps the previous artifact URL, so importers do not re-link.
//!
//! Transform and link failures are fail-soft: they are logged, recorded as
//! the file's last error, and the last good artifact stays live.

mod assets;
mod graph;

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::artifact::ArtifactUrl;
use crate::config::PlaygroundConfig;
use crate::path::{PackageSpecifier, extension, is_relative, is_url, normalize, resolve_relative};
use crate::registry::{ExecutableRegistry, LinkMemo};
use crate::rewrite::SpecifierRewriter;
use crate::scan::{scan, source_type_for};
use crate::store::{FileKind, FileStore, PathError, binary_mime};
use crate::transform::{TransformChain, TransformError};
use crate::types::TypeRegistry;

pub use assets::{binary_module, json_module, style_module, text_module};
pub use graph::{DependencyEdge, DependencyGraph, DependencyTarget, EdgeDiff, EdgeListener};

/// Why a file could not be linked. The previous artifact stays live.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The intermediary is not a valid module.
    #[error("failed to scan '{path}': {message}")]
    Scan { path: String, message: String },

    /// A local specifier matches no file.
    #[error("cannot resolve '{specifier}' imported by '{importer}'")]
    Unresolved { specifier: String, importer: String },

    /// Linking `target` would require `importer` to already be linked.
    #[error("circular import of '{target}' from '{importer}'")]
    Circular { target: String, importer: String },

    /// The dependency exists but has never compiled successfully.
    #[error("'{target}' imported by '{importer}' has no artifact")]
    DependencyUnavailable { target: String, importer: String },

    /// A `.json` file does not parse.
    #[error("invalid JSON in '{path}': {message}")]
    InvalidJson { path: String, message: String },
}

/// A recorded compile failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("link failed: {0}")]
    Link(#[from] LinkError),
}

/// Immutable view of a file taken at the start of a pull.
#[derive(Debug, Clone)]
struct Snapshot {
    path: String,
    source: Arc<str>,
    kind: FileKind,
    revision: u64,
    layout: u64,
}

/// State shared by every file visited during one top-level pull.
#[derive(Debug, Default)]
struct Pull {
    /// Files being linked, outermost first.
    stack: Vec<String>,
    /// Files already brought up to date, with the artifact they settled on.
    settled: FxHashMap<String, Option<ArtifactUrl>>,
}

/// Where a specifier points after alias and path resolution.
enum Target {
    Url,
    Local(String),
    External { url: String, package: Option<String> },
}

/// Result of linking before it is committed.
struct Linked {
    output: Arc<str>,
    deps: Vec<(String, ArtifactUrl)>,
    edges: Vec<DependencyEdge>,
    packages: Vec<String>,
}

impl Linked {
    fn standalone(output: String) -> Self {
        Self {
            output: Arc::from(output),
            deps: Vec::new(),
            edges: Vec::new(),
            packages: Vec::new(),
        }
    }
}

/// Turns virtual files into live artifacts.
pub struct ArtifactCompiler {
    store: Arc<RwLock<FileStore>>,
    registry: ExecutableRegistry,
    graph: Mutex<DependencyGraph>,
    transforms: TransformChain,
    config: PlaygroundConfig,
    types: Option<TypeRegistry>,
    listeners: Vec<Arc<dyn EdgeListener>>,
}

impl std::fmt::Debug for ArtifactCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCompiler")
            .field("registry", &self.registry)
            .field("transforms", &self.transforms)
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ArtifactCompiler {
    pub fn new(
        store: Arc<RwLock<FileStore>>,
        registry: ExecutableRegistry,
        transforms: TransformChain,
        config: PlaygroundConfig,
    ) -> Self {
        Self {
            store,
            registry,
            graph: Mutex::new(DependencyGraph::new()),
            transforms,
            config,
            types: None,
            listeners: Vec::new(),
        }
    }

    /// Hand external package names to `types` when `import_types` is enabled.
    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = Some(types);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn EdgeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn registry(&self) -> &ExecutableRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// The current artifact of `path`, recompiling whatever changed.
    ///
    /// Returns `Ok(None)` when the file exists but has never compiled
    /// successfully, and `PathError::NotFound` when it does not exist.
    pub async fn compile(&self, path: &str) -> Result<Option<ArtifactUrl>, PathError> {
        self.pull(normalize(path), &mut Pull::default()).await
    }

    /// Compile several files in one pull, so shared dependencies are
    /// verified once.
    pub async fn compile_all(
        &self,
        paths: &[String],
    ) -> Vec<(String, Result<Option<ArtifactUrl>, PathError>)> {
        let mut pull = Pull::default();
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let result = self.pull(normalize(path), &mut pull).await;
            results.push((path.clone(), result));
        }
        results
    }

    /// Edges recorded by the last successful link of `path`.
    pub fn dependencies(&self, path: &str) -> Vec<DependencyEdge> {
        self.graph.lock().dependencies(&normalize(path)).to_vec()
    }

    /// Files whose last successful link imports `path`.
    pub fn dependents(&self, path: &str) -> Vec<String> {
        self.graph.lock().dependents(&normalize(path))
    }

    pub fn refcount(&self, target: &DependencyTarget) -> usize {
        self.graph.lock().refcount(target)
    }

    /// Release the artifact of a removed file and drop its edges.
    pub(crate) fn forget(&self, path: &str) {
        self.registry.evict(path);
        let dropped = self.graph.lock().remove_importer(path);
        self.notify(&[], &dropped);
    }

    /// Release every artifact and drop every edge.
    pub(crate) fn reset(&self) {
        self.registry.clear();
        let dropped = self.graph.lock().clear();
        self.notify(&[], &dropped);
    }

    fn pull<'a>(
        &'a self,
        path: String,
        pull: &'a mut Pull,
    ) -> BoxFuture<'a, Result<Option<ArtifactUrl>, PathError>> {
        async move {
            if let Some(url) = pull.settled.get(&path) {
                return Ok(url.clone());
            }
            let file = self.snapshot(&path).ok_or(PathError::NotFound(path))?;
            if let Some(url) = pull.settled.get(&file.path) {
                return Ok(url.clone());
            }

            pull.stack.push(file.path.clone());
            let url = self.pull_file(&file, pull).await;
            pull.stack.pop();
            pull.settled.insert(file.path, url.clone());
            Ok(url)
        }
        .boxed()
    }

    fn snapshot(&self, path: &str) -> Option<Snapshot> {
        let store = self.store.read();
        let file = store.get(path)?;
        Some(Snapshot {
            path: file.path().to_string(),
            source: Arc::clone(file.source()),
            kind: file.kind(),
            revision: file.revision(),
            layout: store.layout(),
        })
    }

    async fn pull_file(&self, file: &Snapshot, pull: &mut Pull) -> Option<ArtifactUrl> {
        let epoch = self.registry.begin(&file.path);

        let Some(intermediary) = self.transform(file, epoch).await else {
            return self.registry.current(&file.path);
        };

        match self.link(file, epoch, &intermediary, pull).await {
            Ok(linked) => self
                .registry
                .publish(&file.path, epoch, file.revision, &linked),
            Err(err) => {
                warn!(path = %file.path, error = %err, "link failed, keeping previous artifact");
                self.registry.fail_link(&file.path, epoch, err);
                self.registry.current(&file.path)
            }
        }
    }

    async fn transform(&self, file: &Snapshot, epoch: u64) -> Option<Arc<str>> {
        if !self.transforms.applies_to(file.kind) {
            return Some(Arc::clone(&file.source));
        }

        let (memo, failed_revision) = self.registry.transform_memo(&file.path);
        if let Some(memo) = &memo {
            if memo.revision == file.revision {
                trace!(path = %file.path, "transform memo hit");
                return Some(Arc::clone(&memo.output));
            }
        }
        if failed_revision == Some(file.revision) {
            return memo.map(|memo| memo.output);
        }

        debug!(path = %file.path, revision = file.revision, "running transforms");
        match self
            .transforms
            .run(&file.source, &file.path, file.kind)
            .await
        {
            Ok(output) => self
                .registry
                .commit_transform(&file.path, epoch, file.revision, output)
                .or_else(|| {
                    self.registry
                        .transform_memo(&file.path)
                        .0
                        .map(|memo| memo.output)
                }),
            Err(err) => {
                error!(path = %file.path, error = %err, "transform failed");
                self.registry
                    .fail_transform(&file.path, epoch, file.revision, err)
            }
        }
    }

    async fn link(
        &self,
        file: &Snapshot,
        epoch: u64,
        input: &Arc<str>,
        pull: &mut Pull,
    ) -> Result<Arc<str>, LinkError> {
        let previous = self.registry.link_memo(&file.path);
        if let Some(memo) = &previous {
            if Arc::ptr_eq(&memo.input, input)
                && memo.layout == file.layout
                && self.deps_unchanged(&memo.deps, pull).await
            {
                trace!(path = %file.path, "link memo hit");
                return Ok(Arc::clone(&memo.output));
            }
        }

        debug!(path = %file.path, kind = ?file.kind, "linking");
        let mut linked = match file.kind {
            FileKind::Script => self.link_script(file, input, pull).await?,
            FileKind::Style => {
                let id = format!("{}{}", self.config.style_id_prefix, file.path);
                Linked::standalone(style_module(&id, input))
            }
            FileKind::Binary => {
                let mime = extension(&file.path)
                    .map(str::to_ascii_lowercase)
                    .and_then(|ext| binary_mime(&ext))
                    .unwrap_or("application/octet-stream");
                Linked::standalone(binary_module(mime, input))
            }
            FileKind::Other if is_json(&file.path) => {
                Linked::standalone(json_module(&file.path, input)?)
            }
            FileKind::Other => Linked::standalone(text_module(input)),
        };

        if let Some(memo) = &previous {
            if *memo.output == *linked.output {
                linked.output = Arc::clone(&memo.output);
            }
        }

        let memo = LinkMemo {
            revision: file.revision,
            layout: file.layout,
            input: Arc::clone(input),
            deps: linked.deps,
            output: Arc::clone(&linked.output),
        };
        if self.registry.commit_link(&file.path, epoch, memo) {
            self.commit_edges(&file.path, linked.edges);
            for package in linked.packages {
                self.request_types(&package);
            }
        }
        Ok(linked.output)
    }

    /// Re-pull every recorded dependency and compare its artifact URL.
    ///
    /// Dependencies settled earlier in the same pull are not visited again.
    /// A dependency already on the pull stack means a cycle now runs through
    /// this file, so the memo is rejected and the relink reports it.
    async fn deps_unchanged(&self, deps: &[(String, ArtifactUrl)], pull: &mut Pull) -> bool {
        for (dep, recorded) in deps {
            if pull.stack.contains(dep) {
                return false;
            }
            match self.pull(dep.clone(), pull).await {
                Ok(Some(url)) if url == *recorded => {}
                _ => return false,
            }
        }
        true
    }

    async fn link_script(
        &self,
        file: &Snapshot,
        input: &Arc<str>,
        pull: &mut Pull,
    ) -> Result<Linked, LinkError> {
        let ranges =
            scan(input, source_type_for(&file.path)).map_err(|err| LinkError::Scan {
                path: file.path.clone(),
                message: err.to_string(),
            })?;

        let mut replacements: FxHashMap<String, (String, Option<DependencyTarget>)> =
            FxHashMap::default();
        let mut deps: Vec<(String, ArtifactUrl)> = Vec::new();
        let mut packages: Vec<String> = Vec::new();
        let mut edges = Vec::with_capacity(ranges.len());

        for range in &ranges {
            if !replacements.contains_key(&range.path) {
                let resolved = match self.classify(&file.path, &range.path)? {
                    Target::Url => (range.path.clone(), None),
                    Target::Local(target) => {
                        if target == file.path || pull.stack.contains(&target) {
                            return Err(LinkError::Circular {
                                target,
                                importer: file.path.clone(),
                            });
                        }
                        let url = self
                            .pull(target.clone(), pull)
                            .await
                            .map_err(|_| LinkError::Unresolved {
                                specifier: range.path.clone(),
                                importer: file.path.clone(),
                            })?
                            .ok_or_else(|| LinkError::DependencyUnavailable {
                                target: target.clone(),
                                importer: file.path.clone(),
                            })?;
                        deps.push((target.clone(), url.clone()));
                        (url.to_string(), Some(DependencyTarget::Local(target)))
                    }
                    Target::External { url, package } => {
                        if let Some(package) = package {
                            if !packages.contains(&package) {
                                packages.push(package);
                            }
                        }
                        (url, Some(DependencyTarget::External(range.path.clone())))
                    }
                };
                replacements.insert(range.path.clone(), resolved);
            }

            if let Some((_, Some(target))) = replacements.get(&range.path) {
                edges.push(DependencyEdge {
                    importer: file.path.clone(),
                    target: target.clone(),
                    is_import: range.is_import,
                    is_dynamic: range.is_dynamic,
                });
            }
        }

        let output = SpecifierRewriter::new(&ranges).apply(input, |specifier, _| {
            replacements
                .get(specifier)
                .map(|(replacement, _)| replacement.clone())
                .unwrap_or_else(|| specifier.to_string())
        });

        Ok(Linked {
            output,
            deps,
            edges,
            packages,
        })
    }

    fn classify(&self, importer: &str, specifier: &str) -> Result<Target, LinkError> {
        if is_url(specifier) {
            return Ok(Target::Url);
        }

        let store = self.store.read();
        let candidate = store.aliases().resolve(specifier).or_else(|| {
            (is_relative(specifier) || specifier.starts_with('/'))
                .then(|| resolve_relative(importer, specifier))
        });

        match candidate {
            Some(candidate) => {
                store
                    .resolve(&candidate)
                    .map(Target::Local)
                    .ok_or_else(|| LinkError::Unresolved {
                        specifier: specifier.to_string(),
                        importer: importer.to_string(),
                    })
            }
            None => Ok(Target::External {
                url: self.config.cdn_url(specifier),
                package: PackageSpecifier::parse(specifier).map(|spec| spec.name),
            }),
        }
    }

    fn commit_edges(&self, importer: &str, edges: Vec<DependencyEdge>) {
        let diff = self.graph.lock().replace(importer, edges);
        if !diff.is_empty() {
            debug!(
                path = %importer,
                added = diff.added.len(),
                dropped = diff.dropped.len(),
                "dependency edges updated"
            );
        }
        self.notify(&diff.added, &diff.dropped);
    }

    fn notify(&self, added: &[DependencyEdge], dropped: &[DependencyEdge]) {
        for listener in &self.listeners {
            for edge in dropped {
                listener.edge_dropped(edge);
            }
            for edge in added {
                listener.edge_added(edge);
            }
        }
    }

    fn request_types(&self, package: &str) {
        if !self.config.import_types {
            return;
        }
        if let Some(types) = &self.types {
            types.request_package(package);
        }
    }
}

fn is_json(path: &str) -> bool {
    extension(path).is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
