//! The project facade.
//!
//! [`Project`] owns the file store and wires it to the compiler, the
//! executable registry, the dependency graph and (optionally) the
//! declaration resolver. Hosts edit files through it and pull artifacts
//! from it.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::artifact::{ArtifactStore, ArtifactUrl, MemoryArtifactStore};
use crate::compile::{ArtifactCompiler, CompileError, DependencyEdge, EdgeListener};
use crate::config::PlaygroundConfig;
use crate::path::normalize;
use crate::registry::ExecutableRegistry;
use crate::state::ProjectState;
use crate::store::{AliasTable, DirEntry, FileStore, PathError, VirtualFile};
use crate::transform::{Transform, TransformChain};
use crate::types::{CdnClient, TypeRegistry};

/// Configures a [`Project`].
#[derive(Default)]
pub struct ProjectBuilder {
    config: PlaygroundConfig,
    transforms: TransformChain,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    cdn: Option<Arc<dyn CdnClient>>,
    listeners: Vec<Arc<dyn EdgeListener>>,
}

impl ProjectBuilder {
    pub fn config(mut self, config: PlaygroundConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cdn_base(mut self, cdn_base: impl Into<String>) -> Self {
        self.config.cdn_base = cdn_base.into();
        self
    }

    pub fn import_types(mut self, enabled: bool) -> Self {
        self.config.import_types = enabled;
        self
    }

    /// Append a transform to the chain.
    pub fn transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn transforms(mut self, transforms: TransformChain) -> Self {
        self.transforms = transforms;
        self
    }

    /// Where artifacts are packaged. Defaults to a [`MemoryArtifactStore`].
    pub fn artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Enables the declaration resolver.
    pub fn cdn_client(mut self, client: Arc<dyn CdnClient>) -> Self {
        self.cdn = Some(client);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn EdgeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Project {
        let store = Arc::new(RwLock::new(FileStore::new()));
        let artifacts = self
            .artifacts
            .unwrap_or_else(|| Arc::new(MemoryArtifactStore::new()));
        let types = self
            .cdn
            .map(|client| TypeRegistry::new(client, self.config.cdn_base.clone()));

        let mut compiler = ArtifactCompiler::new(
            Arc::clone(&store),
            ExecutableRegistry::new(artifacts),
            self.transforms,
            self.config,
        );
        if let Some(types) = &types {
            compiler = compiler.with_types(types.clone());
        }
        for listener in self.listeners {
            compiler = compiler.with_listener(listener);
        }

        Project {
            store,
            compiler,
            types,
        }
    }
}

/// A virtual project: files in, live artifacts out.
#[derive(Debug)]
pub struct Project {
    store: Arc<RwLock<FileStore>>,
    compiler: ArtifactCompiler,
    types: Option<TypeRegistry>,
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

impl Project {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ProjectBuilder {
        ProjectBuilder::default()
    }

    pub fn create(&self, path: &str) -> Result<(), PathError> {
        self.store.write().create(path).map(|_| ())
    }

    /// Set the source of an existing file.
    pub fn set(&self, path: &str, source: &str) -> Result<u64, PathError> {
        self.store.write().set(path, source)
    }

    /// Create the file if needed, then set its source.
    pub fn write(&self, path: &str, source: &str) -> Result<u64, PathError> {
        self.store.write().write(path, source)
    }

    pub fn get(&self, path: &str) -> Option<VirtualFile> {
        self.store.read().get(path).cloned()
    }

    pub fn source(&self, path: &str) -> Option<Arc<str>> {
        self.store.read().get(path).map(|file| Arc::clone(file.source()))
    }

    pub fn has(&self, path: &str) -> bool {
        self.store.read().has(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.store.read().is_dir(path)
    }

    /// Remove a file or directory, releasing the artifacts of removed files.
    pub fn remove(&self, path: &str) -> Result<Vec<String>, PathError> {
        let removed = self.store.write().remove(path)?;
        for path in &removed {
            self.compiler.forget(path);
        }
        Ok(removed)
    }

    pub fn mkdir(&self, path: &str) -> Result<(), PathError> {
        self.store.write().mkdir(path)
    }

    pub fn mkdir_all(&self, path: &str) -> Result<(), PathError> {
        self.store.write().mkdir_all(path)
    }

    /// Move a file or directory. Moved files compile afresh under their new
    /// paths; artifacts of the old paths are released.
    pub fn rename(&self, from: &str, to: &str) -> Result<Vec<(String, String)>, PathError> {
        let moves = self.store.write().rename(from, to)?;
        for (old, _) in &moves {
            self.compiler.forget(old);
        }
        Ok(moves)
    }

    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, PathError> {
        self.store.read().read_dir(path)
    }

    pub fn resolve(&self, path: &str) -> Option<String> {
        self.store.read().resolve(path)
    }

    /// Map `name` (a package name or path prefix) to `target`. Returns the
    /// previous target.
    pub fn alias(&self, name: &str, target: &str) -> Option<String> {
        self.store.write().aliases_mut().insert(name, target)
    }

    pub fn aliases(&self) -> AliasTable {
        self.store.read().aliases().clone()
    }

    /// Every project file outside the package cache, in path order.
    pub fn paths(&self) -> Vec<String> {
        self.store
            .read()
            .all()
            .map(|file| file.path().to_string())
            .collect()
    }

    /// The live artifact of `path`, recompiling whatever changed.
    pub async fn executable(&self, path: &str) -> Result<Option<ArtifactUrl>, PathError> {
        self.compiler.compile(path).await
    }

    /// Force every stage of `path` to re-run on the next pull.
    pub fn invalidate(&self, path: &str) {
        self.compiler.registry().invalidate(&normalize(path));
    }

    /// Recompile every file and report the ones whose artifact changed.
    pub async fn refresh(&self) -> Vec<(String, ArtifactUrl)> {
        let registry = self.compiler.registry();
        let before: Vec<(String, Option<ArtifactUrl>)> = self
            .paths()
            .into_iter()
            .map(|path| {
                let url = registry.current(&path);
                (path, url)
            })
            .collect();

        // Failures are recorded per file and surface through `last_error`.
        let paths: Vec<String> = before.iter().map(|(path, _)| path.clone()).collect();
        self.compiler.compile_all(&paths).await;

        let changed: Vec<(String, ArtifactUrl)> = before
            .into_iter()
            .filter_map(|(path, previous)| {
                let url = registry.current(&path)?;
                (previous.as_ref() != Some(&url)).then_some((path, url))
            })
            .collect();
        debug!(changed = changed.len(), "refreshed project");
        changed
    }

    pub fn dependencies(&self, path: &str) -> Vec<DependencyEdge> {
        self.compiler.dependencies(path)
    }

    pub fn dependents(&self, path: &str) -> Vec<String> {
        self.compiler.dependents(path)
    }

    /// The failure that is keeping `path` on an older artifact, if any.
    pub fn last_error(&self, path: &str) -> Option<CompileError> {
        self.compiler.registry().last_error(&normalize(path))
    }

    pub fn compiler(&self) -> &ArtifactCompiler {
        &self.compiler
    }

    pub fn config(&self) -> &PlaygroundConfig {
        self.compiler.config()
    }

    pub fn types(&self) -> Option<&TypeRegistry> {
        self.types.as_ref()
    }

    /// Wait for background declaration downloads.
    pub async fn settle(&self) {
        if let Some(types) = &self.types {
            types.settle().await;
        }
    }

    pub fn to_json(&self) -> ProjectState {
        let store = self.store.read();
        ProjectState {
            files: store.to_json(),
            types: self
                .types
                .as_ref()
                .map(TypeRegistry::to_state)
                .unwrap_or_default(),
            aliases: store.aliases().clone(),
        }
    }

    /// Replace the whole project with `state`. Every live artifact is
    /// released first.
    pub fn initialize(&self, state: &ProjectState) -> Result<(), PathError> {
        self.compiler.reset();

        let mut store = self.store.write();
        store.initialize(&state.files)?;
        let aliases = store.aliases_mut();
        for (name, target) in state.aliases.iter() {
            aliases.insert(name, target);
        }
        drop(store);

        if let Some(types) = &self.types {
            types.initialize(&state.types);
        }
        Ok(())
    }
}
