//! Type-declaration resolver.
//!
//! Downloads the declaration graph of external packages from the CDN and
//! stores it under the reserved `node_modules/` subtree of the virtual
//! tree, where an editor's language service can find it:
//!
//! ```text
//! https://esm.sh/v135/@types/react@18.2.0/index.d.ts
//!   -> node_modules/esm.sh/v135/@types/react@18.2.0/index.d.ts
//! ```
//!
//! Each declaration file is fetched once. A `None` entry in the source map
//! marks a download in flight, so concurrent requests for the same URL and
//! import cycles between declaration files both stop at the sentinel.
//!
//! Versions are reconciled per package name: the first version seen wins,
//! and later URLs naming another version of the same package are redirected
//! to it. This keeps a single copy of, say, `@types/react` in the tree even
//! when two packages pin different patch releases.

mod cdn;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::path::{
    PACKAGE_CACHE_DIR, PackageSpecifier, dirname, is_relative, is_url, package_in_url, relative,
};
use crate::rewrite::SpecifierRewriter;
use crate::scan::{scan, source_type_for};

pub use cdn::{CdnClient, NetworkError, TYPES_HEADER};

#[cfg(feature = "http")]
pub use cdn::HttpCdnClient;

/// Serialized half of the project state owned by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypesState {
    /// Package name -> declaration entry points (tsconfig `paths` shape).
    pub alias: BTreeMap<String, Vec<String>>,
    /// Virtual path -> declaration text. Downloads in flight are omitted.
    pub sources: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PackageEntry {
    Pending,
    Resolved(String),
    /// The CDN has no declarations for the package.
    Untyped,
}

#[derive(Debug, Default)]
struct DeclarationState {
    sources: BTreeMap<String, Option<String>>,
    alias: BTreeMap<String, Vec<String>>,
    packages: FxHashMap<String, PackageEntry>,
    versions: FxHashMap<String, String>,
}

/// Outcome of claiming a declaration URL.
enum Claim {
    /// The caller owns the download. `pinned` is the package version this
    /// claim recorded first, released again if the download fails.
    Fetch {
        url: String,
        path: String,
        pinned: Option<(String, String)>,
    },
    /// Already downloaded or in flight.
    Known(String),
}

struct Inner {
    client: Arc<dyn CdnClient>,
    cdn_base: String,
    state: Mutex<DeclarationState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cloneable handle to a declaration cache. Clones share state.
#[derive(Clone)]
pub struct TypeRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TypeRegistry")
            .field("cdn_base", &self.inner.cdn_base)
            .field("sources", &state.sources.len())
            .field("packages", &state.packages.len())
            .finish()
    }
}

impl TypeRegistry {
    pub fn new(client: Arc<dyn CdnClient>, cdn_base: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                cdn_base: cdn_base.into().trim_end_matches('/').to_string(),
                state: Mutex::new(DeclarationState::default()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Download the declaration graph rooted at `url`.
    ///
    /// Returns the virtual path of the root file, or `None` when it could
    /// not be fetched. Returns immediately when the file is cached or
    /// already being downloaded.
    pub async fn from_url(&self, url: &str) -> Option<String> {
        self.url_task(url.to_string()).await
    }

    /// Download the declarations of package `name` and record its alias.
    ///
    /// Returns the virtual path of the entry point. `None` when the package
    /// has no declarations, the download failed, or it is still in flight.
    pub async fn from_package_name(&self, name: &str) -> Option<String> {
        self.package_task(name.to_string()).await
    }

    /// Start downloading `name` in the background on the ambient tokio
    /// runtime. Does nothing for packages already known or when no runtime
    /// is running.
    pub fn request_package(&self, name: &str) {
        if self.inner.state.lock().packages.contains_key(name) {
            trace!(package = %name, "declarations already requested");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(package = %name, "no async runtime, skipping declaration download");
            return;
        };
        let task = runtime.spawn(self.package_task(name.to_string()).map(|_| ()));
        self.inner.tasks.lock().push(task);
    }

    /// Wait for every background download, including ones started while
    /// waiting.
    pub async fn settle(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            for result in join_all(tasks).await {
                if let Err(err) = result {
                    warn!(error = %err, "declaration download task failed");
                }
            }
        }
    }

    /// Declaration text at `path`. `None` when unknown or still downloading.
    pub fn source(&self, path: &str) -> Option<String> {
        self.inner.state.lock().sources.get(path).cloned().flatten()
    }

    /// `true` while `path` is being downloaded.
    pub fn is_pending(&self, path: &str) -> bool {
        matches!(self.inner.state.lock().sources.get(path), Some(None))
    }

    /// Entry points recorded for package `name`.
    pub fn alias(&self, name: &str) -> Option<Vec<String>> {
        self.inner.state.lock().alias.get(name).cloned()
    }

    /// The version every URL of package `name` is reconciled to.
    pub fn version(&self, name: &str) -> Option<String> {
        self.inner.state.lock().versions.get(name).cloned()
    }

    /// Virtual paths of every downloaded declaration file, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .sources
            .iter()
            .filter(|(_, source)| source.is_some())
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn to_state(&self) -> TypesState {
        let state = self.inner.state.lock();
        TypesState {
            alias: state.alias.clone(),
            sources: state
                .sources
                .iter()
                .filter_map(|(path, source)| Some((path.clone(), source.clone()?)))
                .collect(),
        }
    }

    /// Replace the cache with a previously serialized state.
    ///
    /// Package versions are recovered from the cached paths so
    /// reconciliation continues across sessions.
    pub fn initialize(&self, types: &TypesState) {
        let mut state = self.inner.state.lock();
        *state = DeclarationState::default();

        for (path, source) in &types.sources {
            state.sources.insert(path.clone(), Some(source.clone()));
            if let Some(pkg) = url_for_path(path).as_deref().and_then(package_in_url) {
                state.versions.entry(pkg.name).or_insert(pkg.version);
            }
        }
        for (name, paths) in &types.alias {
            state.alias.insert(name.clone(), paths.clone());
            if let Some(entry) = paths.first() {
                state
                    .packages
                    .insert(name.clone(), PackageEntry::Resolved(entry.clone()));
            }
        }
    }

    fn package_task(&self, name: String) -> BoxFuture<'static, Option<String>> {
        let this = self.clone();
        async move { this.resolve_package(name).await }.boxed()
    }

    fn url_task(&self, url: String) -> BoxFuture<'static, Option<String>> {
        let this = self.clone();
        async move { this.resolve_url(url).await }.boxed()
    }

    async fn resolve_package(&self, name: String) -> Option<String> {
        {
            let mut state = self.inner.state.lock();
            match state.packages.get(&name) {
                Some(PackageEntry::Resolved(path)) => return Some(path.clone()),
                Some(PackageEntry::Pending | PackageEntry::Untyped) => return None,
                None => {
                    state.packages.insert(name.clone(), PackageEntry::Pending);
                }
            }
        }

        let package_url = format!("{}/{}", self.inner.cdn_base, name);
        let entry = match self.inner.client.types_entry(&package_url).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(package = %name, "package ships no declarations");
                self.inner
                    .state
                    .lock()
                    .packages
                    .insert(name, PackageEntry::Untyped);
                return None;
            }
            Err(err) => {
                warn!(package = %name, error = %err, "failed to look up declarations");
                self.inner.state.lock().packages.remove(&name);
                return None;
            }
        };

        let resolved = self.url_task(entry).await;
        let mut state = self.inner.state.lock();
        match &resolved {
            Some(path) => {
                debug!(package = %name, path = %path, "declarations resolved");
                state.alias.insert(name.clone(), vec![path.clone()]);
                state
                    .packages
                    .insert(name, PackageEntry::Resolved(path.clone()));
            }
            None => {
                state.packages.remove(&name);
            }
        }
        resolved
    }

    async fn resolve_url(&self, url: String) -> Option<String> {
        let (url, path, pinned) = match self.claim(url) {
            Some(Claim::Known(path)) => return Some(path),
            Some(Claim::Fetch { url, path, pinned }) => (url, path, pinned),
            None => return None,
        };

        let text = match self.inner.client.fetch_text(&url).await {
            Ok(text) => text,
            Err(err) => {
                warn!(url = %url, error = %err, "failed to download declarations");
                let mut state = self.inner.state.lock();
                state.sources.remove(&path);
                if let Some((name, version)) = pinned {
                    if state.versions.get(&name) == Some(&version) {
                        state.versions.remove(&name);
                    }
                }
                return None;
            }
        };

        let text = self.link_declarations(&url, &path, text).await;
        self.inner
            .state
            .lock()
            .sources
            .insert(path.clone(), Some(text));
        Some(path)
    }

    /// Reconcile the version of `url`, derive its virtual path and place the
    /// in-flight sentinel if nobody has.
    fn claim(&self, url: String) -> Option<Claim> {
        let mut state = self.inner.state.lock();

        let mut pinned = None;
        let url = match package_in_url(&url) {
            Some(pkg) => match state.versions.get(&pkg.name) {
                Some(first) if *first != pkg.version => {
                    let redirected = pkg.with_version(&url, first);
                    info!(
                        package = %pkg.name,
                        requested = %pkg.version,
                        using = %first,
                        "reconciled declaration version"
                    );
                    redirected
                }
                Some(_) => url,
                None => {
                    state
                        .versions
                        .insert(pkg.name.clone(), pkg.version.clone());
                    pinned = Some((pkg.name, pkg.version));
                    url
                }
            },
            None => url,
        };

        let Some(path) = declaration_path(&url) else {
            warn!(url = %url, "cannot map declaration URL to a virtual path");
            if let Some((name, _)) = pinned {
                state.versions.remove(&name);
            }
            return None;
        };
        if state.sources.contains_key(&path) {
            trace!(path = %path, "declaration cached or in flight");
            return Some(Claim::Known(path));
        }
        state.sources.insert(path.clone(), None);
        Some(Claim::Fetch { url, path, pinned })
    }

    /// Fetch every declaration `text` references and rewrite URL specifiers
    /// to the relative virtual path of their target.
    async fn link_declarations(&self, url: &str, path: &str, text: String) -> String {
        let ranges = match scan(&text, source_type_for(url)) {
            Ok(ranges) => ranges,
            Err(err) => {
                warn!(url = %url, error = %err, "cannot scan declarations, storing as-is");
                return text;
            }
        };
        let Ok(base) = Url::parse(url) else {
            return text;
        };

        let mut specifiers: Vec<&str> = ranges.iter().map(|range| range.path.as_str()).collect();
        specifiers.sort_unstable();
        specifiers.dedup();

        // Only URL specifiers are rewritten; relative ones already mirror the
        // CDN layout and bare names resolve through the package alias.
        let mut rewrite_keys: Vec<Option<&str>> = Vec::new();
        let mut children = Vec::new();
        for specifier in specifiers {
            if is_url(specifier) {
                rewrite_keys.push(Some(specifier));
                children.push(self.url_task(specifier.to_string()));
            } else if is_relative(specifier) || specifier.starts_with('/') {
                match base.join(&declaration_specifier(specifier)) {
                    Ok(child) => {
                        rewrite_keys.push(None);
                        children.push(self.url_task(child.to_string()));
                    }
                    Err(err) => {
                        debug!(specifier = %specifier, error = %err, "skipping bad specifier");
                    }
                }
            } else if let Some(package) = PackageSpecifier::parse(specifier) {
                rewrite_keys.push(None);
                children.push(self.package_task(package.name));
            }
        }

        let resolved = join_all(children).await;
        let rewritten: FxHashMap<&str, String> = rewrite_keys
            .into_iter()
            .zip(resolved)
            .filter_map(|(specifier, target)| {
                let specifier = specifier?;
                let target = target?;
                let module = target.strip_suffix(".d.ts").unwrap_or(&target);
                Some((specifier, relative(dirname(path), module)))
            })
            .collect();

        if rewritten.is_empty() {
            return text;
        }
        let source: Arc<str> = Arc::from(text);
        let linked = SpecifierRewriter::new(&ranges).apply(&source, |specifier, _| {
            rewritten
                .get(specifier)
                .cloned()
                .unwrap_or_else(|| specifier.to_string())
        });
        linked.to_string()
    }
}

/// `https://esm.sh/v135/x@1/index.d.ts` -> `node_modules/esm.sh/v135/x@1/index.d.ts`.
fn declaration_path(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str()?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path = url.path().trim_start_matches('/');
    Some(format!("{PACKAGE_CACHE_DIR}/{host}/{path}"))
}

/// Inverse of [`declaration_path`], assuming `https`.
fn url_for_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(PACKAGE_CACHE_DIR)?.strip_prefix('/')?;
    Some(format!("https://{rest}"))
}

/// Map a relative specifier to the declaration file it refers to.
fn declaration_specifier(specifier: &str) -> String {
    const DECLARATION: [&str; 3] = [".d.ts", ".d.mts", ".d.cts"];
    if DECLARATION.iter().any(|ext| specifier.ends_with(ext)) {
        return specifier.to_string();
    }
    for (script, declaration) in [(".mjs", ".d.mts"), (".cjs", ".d.cts"), (".js", ".d.ts")] {
        if let Some(stem) = specifier.strip_suffix(script) {
            return format!("{stem}{declaration}");
        }
    }
    format!("{specifier}.d.ts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_path() {
        assert_eq!(
            declaration_path("https://esm.sh/v135/@types/react@18.2.0/index.d.ts").as_deref(),
            Some("node_modules/esm.sh/v135/@types/react@18.2.0/index.d.ts")
        );
        assert_eq!(
            declaration_path("http://localhost:8080/x@1.0.0/a.d.ts").as_deref(),
            Some("node_modules/localhost:8080/x@1.0.0/a.d.ts")
        );
        assert_eq!(declaration_path("not a url"), None);
    }

    #[test]
    fn test_url_for_path_inverts_declaration_path() {
        let url = "https://esm.sh/v135/left-pad@1.0.0/index.d.ts";
        let path = declaration_path(url).unwrap();
        assert_eq!(url_for_path(&path).as_deref(), Some(url));
    }

    #[test]
    fn test_declaration_specifier() {
        assert_eq!(declaration_specifier("./types"), "./types.d.ts");
        assert_eq!(declaration_specifier("./types.d.ts"), "./types.d.ts");
        assert_eq!(declaration_specifier("./index.js"), "./index.d.ts");
        assert_eq!(declaration_specifier("../esm.mjs"), "../esm.d.mts");
    }
}
