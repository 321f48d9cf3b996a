//! Virtual file store.
//!
//! The store is the single source of truth for project files. It keeps an
//! explicit directory tree (files need an existing parent directory), a
//! store-wide revision clock, and the alias table used during linking.
//!
//! All mutation goes through the store API. Invalid operations (missing
//! parent, name collisions, unknown paths) return a [`PathError`]: these
//! indicate a bug in the host integration and are never swallowed.

mod alias;
mod file;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use crate::path::{EXTENSION_PRIORITY, PACKAGE_CACHE_DIR, basename, dirname, normalize};

pub use alias::AliasTable;
pub use file::{FileKind, VirtualFile, binary_mime};

/// Errors for invalid virtual path operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path is empty (or normalizes to the root).
    #[error("path is empty")]
    Empty,

    /// The path contains characters that cannot appear in a virtual path.
    #[error("invalid path '{0}'")]
    Invalid(String),

    /// No file or directory exists at the path.
    #[error("no such file or directory: '{0}'")]
    NotFound(String),

    /// The parent directory of the path does not exist.
    #[error("cannot write '{path}': parent directory '{parent}' does not exist")]
    ParentMissing { path: String, parent: String },

    /// The path names an existing directory where a file was expected.
    #[error("'{0}' is a directory")]
    IsDirectory(String),

    /// A path component names an existing file where a directory was expected.
    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    /// The destination of a create or rename already exists.
    #[error("'{0}' already exists")]
    AlreadyExists(String),
}

/// An entry returned by [`FileStore::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

/// In-memory tree of virtual files and directories.
#[derive(Debug, Default)]
pub struct FileStore {
    files: BTreeMap<String, VirtualFile>,
    /// Every directory except the root, which always exists.
    dirs: BTreeSet<String>,
    aliases: AliasTable,
    clock: u64,
    /// Bumped whenever the set of resolvable paths or aliases may have changed.
    layout: u64,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty file. Returns the existing file if one is already there.
    pub fn create(&mut self, path: &str) -> Result<&VirtualFile, PathError> {
        let path = validate(path)?;
        if self.dirs.contains(&path) {
            return Err(PathError::IsDirectory(path));
        }
        self.check_parent(&path)?;

        if !self.files.contains_key(&path) {
            let revision = self.tick();
            self.files.insert(
                path.clone(),
                VirtualFile::new(path.clone(), Arc::from(""), revision),
            );
            self.layout += 1;
        }
        Ok(&self.files[&path])
    }

    /// Replace the source of an existing file and return its revision.
    ///
    /// Writing identical text keeps the current revision so nothing
    /// downstream recompiles.
    pub fn set(&mut self, path: &str, source: impl Into<Arc<str>>) -> Result<u64, PathError> {
        let path = validate(path)?;
        let source = source.into();

        if !self.files.contains_key(&path) {
            return Err(if self.dirs.contains(&path) {
                PathError::IsDirectory(path)
            } else {
                PathError::NotFound(path)
            });
        }

        let revision = self.tick();
        let Some(file) = self.files.get_mut(&path) else {
            return Err(PathError::NotFound(path));
        };
        if *file.source() == source {
            return Ok(file.revision());
        }
        file.replace(source, revision);
        Ok(revision)
    }

    /// Create the file if needed, then set its source.
    pub fn write(&mut self, path: &str, source: impl Into<Arc<str>>) -> Result<u64, PathError> {
        self.create(path)?;
        self.set(path, source)
    }

    pub fn get(&self, path: &str) -> Option<&VirtualFile> {
        self.files.get(&normalize(path))
    }

    /// `true` if a file (not a directory) exists at `path`.
    pub fn has(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.dir_exists(&normalize(path))
    }

    /// Remove a file, or a directory with everything below it.
    ///
    /// Returns the paths of every removed file.
    pub fn remove(&mut self, path: &str) -> Result<Vec<String>, PathError> {
        let path = validate(path)?;

        if self.files.remove(&path).is_some() {
            self.layout += 1;
            return Ok(vec![path]);
        }
        if !self.dirs.remove(&path) {
            return Err(PathError::NotFound(path));
        }
        self.layout += 1;

        let prefix = format!("{path}/");
        self.dirs.retain(|dir| !dir.starts_with(&prefix));
        let removed: Vec<String> = self
            .files
            .keys()
            .filter(|file| file.starts_with(&prefix))
            .cloned()
            .collect();
        for file in &removed {
            self.files.remove(file);
        }
        Ok(removed)
    }

    /// Create a directory whose parent already exists.
    pub fn mkdir(&mut self, path: &str) -> Result<(), PathError> {
        let path = validate(path)?;
        if self.dirs.contains(&path) || self.files.contains_key(&path) {
            return Err(PathError::AlreadyExists(path));
        }
        self.check_parent(&path)?;
        self.dirs.insert(path);
        Ok(())
    }

    /// Create a directory and any missing ancestors.
    pub fn mkdir_all(&mut self, path: &str) -> Result<(), PathError> {
        let path = normalize(path);
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            if self.files.contains_key(&current) {
                return Err(PathError::NotADirectory(current));
            }
            self.dirs.insert(current.clone());
        }
        Ok(())
    }

    /// Move a file or directory. Returns `(old, new)` pairs for every moved file.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<Vec<(String, String)>, PathError> {
        let from = validate(from)?;
        let to = validate(to)?;

        if self.files.contains_key(&to) || self.dirs.contains(&to) {
            return Err(PathError::AlreadyExists(to));
        }
        self.check_parent(&to)?;

        if let Some(file) = self.files.remove(&from) {
            self.layout += 1;
            let revision = self.tick();
            let source = Arc::clone(file.source());
            self.files
                .insert(to.clone(), VirtualFile::new(to.clone(), source, revision));
            return Ok(vec![(from, to)]);
        }

        if !self.dirs.contains(&from) {
            return Err(PathError::NotFound(from));
        }
        let from_prefix = format!("{from}/");
        if to.starts_with(&from_prefix) {
            return Err(PathError::Invalid(to));
        }
        self.layout += 1;

        let moved_dirs: Vec<String> = self
            .dirs
            .iter()
            .filter(|dir| **dir == from || dir.starts_with(&from_prefix))
            .cloned()
            .collect();
        for dir in moved_dirs {
            self.dirs.remove(&dir);
            self.dirs.insert(format!("{to}{}", &dir[from.len()..]));
        }

        let moved_files: Vec<String> = self
            .files
            .keys()
            .filter(|file| file.starts_with(&from_prefix))
            .cloned()
            .collect();
        let mut moves = Vec::with_capacity(moved_files.len());
        for old in moved_files {
            let Some(file) = self.files.remove(&old) else {
                continue;
            };
            let new = format!("{to}{}", &old[from.len()..]);
            let revision = self.tick();
            self.files.insert(
                new.clone(),
                VirtualFile::new(new.clone(), Arc::clone(file.source()), revision),
            );
            moves.push((old, new));
        }
        Ok(moves)
    }

    /// List the direct children of a directory, sorted by name.
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, PathError> {
        let path = normalize(path);
        if !self.dir_exists(&path) {
            return Err(if self.files.contains_key(&path) {
                PathError::NotADirectory(path)
            } else {
                PathError::NotFound(path)
            });
        }

        let dirs = self.dirs.iter().filter(|dir| dirname(dir) == path).map(|dir| DirEntry {
            name: basename(dir).to_string(),
            path: dir.clone(),
            is_dir: true,
        });
        let files = self
            .files
            .keys()
            .filter(|file| dirname(file) == path)
            .map(|file| DirEntry {
                name: basename(file).to_string(),
                path: file.clone(),
                is_dir: false,
            });

        let mut entries: Vec<DirEntry> = dirs.chain(files).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// TypeScript-style resolution of an extensionless or exact path.
    ///
    /// Tries, in order: the exact file, `path` + each extension in
    /// [`EXTENSION_PRIORITY`], then `path/index` + each extension.
    pub fn resolve(&self, path: &str) -> Option<String> {
        let path = normalize(path);

        if !path.is_empty() && self.files.contains_key(&path) {
            return Some(path);
        }

        let with_extension = EXTENSION_PRIORITY
            .iter()
            .map(|ext| format!("{path}{ext}"))
            .filter(|_| !path.is_empty());
        let index_prefix = if path.is_empty() {
            "index".to_string()
        } else {
            format!("{path}/index")
        };
        let index = EXTENSION_PRIORITY
            .iter()
            .map(|ext| format!("{index_prefix}{ext}"));

        with_extension
            .chain(index)
            .find(|candidate| self.files.contains_key(candidate))
    }

    /// Every file outside the reserved package cache, in path order.
    pub fn all(&self) -> impl Iterator<Item = &VirtualFile> {
        let cache_prefix = format!("{PACKAGE_CACHE_DIR}/");
        self.files
            .values()
            .filter(move |file| !file.path().starts_with(&cache_prefix))
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasTable {
        self.layout += 1;
        &mut self.aliases
    }

    /// Counter that changes whenever resolution results may differ: files
    /// created, removed or renamed, or the alias table borrowed mutably.
    pub fn layout(&self) -> u64 {
        self.layout
    }

    /// Serialize file sources (package cache excluded) as `path -> source`.
    pub fn to_json(&self) -> BTreeMap<String, String> {
        self.all()
            .map(|file| (file.path().to_string(), file.source().to_string()))
            .collect()
    }

    /// Replace the whole tree with `files`, creating parent directories as needed.
    ///
    /// The revision clock keeps running so revisions never repeat across
    /// re-initialization.
    pub fn initialize(&mut self, files: &BTreeMap<String, String>) -> Result<(), PathError> {
        self.files.clear();
        self.dirs.clear();
        self.aliases.clear();
        self.layout += 1;

        for (path, source) in files {
            let path = validate(path)?;
            self.mkdir_all(dirname(&path))?;
            self.write(&path, source.as_str())?;
        }
        Ok(())
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn dir_exists(&self, dir: &str) -> bool {
        dir.is_empty() || self.dirs.contains(dir)
    }

    fn check_parent(&self, path: &str) -> Result<(), PathError> {
        let parent = dirname(path);
        if self.dir_exists(parent) {
            return Ok(());
        }
        if self.files.contains_key(parent) {
            return Err(PathError::NotADirectory(parent.to_string()));
        }
        Err(PathError::ParentMissing {
            path: path.to_string(),
            parent: parent.to_string(),
        })
    }
}

fn validate(path: &str) -> Result<String, PathError> {
    if path.contains('\0') {
        return Err(PathError::Invalid(path.to_string()));
    }
    let normalized = normalize(path);
    if normalized.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(files: &[(&str, &str)]) -> FileStore {
        let mut store = FileStore::new();
        for (path, source) in files {
            store.mkdir_all(dirname(path)).unwrap();
            store.write(path, *source).unwrap();
        }
        store
    }

    #[test]
    fn test_create_requires_parent() {
        let mut store = FileStore::new();
        let err = store.create("src/app.ts").unwrap_err();
        assert_eq!(
            err,
            PathError::ParentMissing {
                path: "src/app.ts".to_string(),
                parent: "src".to_string()
            }
        );

        store.mkdir("src").unwrap();
        assert!(store.create("src/app.ts").is_ok());
        assert!(store.has("src/app.ts"));
    }

    #[test]
    fn test_create_collides_with_directory() {
        let mut store = FileStore::new();
        store.mkdir("src").unwrap();
        assert_eq!(
            store.create("src").unwrap_err(),
            PathError::IsDirectory("src".to_string())
        );
        assert_eq!(
            store.set("src", "x").unwrap_err(),
            PathError::IsDirectory("src".to_string())
        );
    }

    #[test]
    fn test_set_bumps_revision_only_on_change() {
        let mut store = FileStore::new();
        let first = store.write("a.ts", "one").unwrap();
        let same = store.set("a.ts", "one").unwrap();
        let second = store.set("a.ts", "two").unwrap();

        assert_eq!(first, same);
        assert!(second > first);
        assert_eq!(&**store.get("a.ts").unwrap().source(), "two");
    }

    #[test]
    fn test_layout_tracks_structure_only() {
        let mut store = FileStore::new();
        let start = store.layout();
        store.write("a.ts", "one").unwrap();
        let created = store.layout();
        assert!(created > start);

        store.set("a.ts", "two").unwrap();
        assert_eq!(store.layout(), created);

        store.aliases_mut().insert("@", "src");
        assert!(store.layout() > created);
    }

    #[test]
    fn test_failed_rename_keeps_layout() {
        let mut store = store_with(&[("src/a.ts", ""), ("lib/b.ts", "")]);
        let before = store.layout();

        assert!(matches!(
            store.rename("missing.ts", "other.ts"),
            Err(PathError::NotFound(_))
        ));
        assert!(matches!(
            store.rename("src", "src/nested"),
            Err(PathError::Invalid(_))
        ));
        assert!(matches!(
            store.rename("src/a.ts", "lib/b.ts"),
            Err(PathError::AlreadyExists(_))
        ));
        assert_eq!(store.layout(), before);

        store.rename("src/a.ts", "src/c.ts").unwrap();
        assert!(store.layout() > before);
    }

    #[test]
    fn test_set_unknown_file() {
        let mut store = FileStore::new();
        assert_eq!(
            store.set("missing.ts", "x").unwrap_err(),
            PathError::NotFound("missing.ts".to_string())
        );
    }

    #[test]
    fn test_resolve_prefers_direct_file() {
        let store = store_with(&[("src/app.ts", ""), ("src/app/index.ts", "")]);
        assert_eq!(store.resolve("src/app").as_deref(), Some("src/app.ts"));
    }

    #[test]
    fn test_resolve_order() {
        let store = store_with(&[
            ("lib/util.js", ""),
            ("lib/util.ts", ""),
            ("pkg/index.jsx", ""),
            ("exact.css", ""),
        ]);
        assert_eq!(store.resolve("lib/util").as_deref(), Some("lib/util.ts"));
        assert_eq!(store.resolve("lib/util.js").as_deref(), Some("lib/util.js"));
        assert_eq!(store.resolve("pkg").as_deref(), Some("pkg/index.jsx"));
        assert_eq!(store.resolve("exact.css").as_deref(), Some("exact.css"));
        assert_eq!(store.resolve("missing"), None);
    }

    #[test]
    fn test_remove_directory_recursively() {
        let mut store = store_with(&[("src/a.ts", ""), ("src/nested/b.ts", ""), ("c.ts", "")]);
        let mut removed = store.remove("src").unwrap();
        removed.sort();

        assert_eq!(removed, vec!["src/a.ts", "src/nested/b.ts"]);
        assert!(!store.is_dir("src/nested"));
        assert!(store.has("c.ts"));
        assert_eq!(
            store.remove("src").unwrap_err(),
            PathError::NotFound("src".to_string())
        );
    }

    #[test]
    fn test_rename_directory() {
        let mut store = store_with(&[("src/a.ts", "a"), ("src/nested/b.ts", "b")]);
        let moves = store.rename("src", "lib").unwrap();

        assert_eq!(moves.len(), 2);
        assert!(store.has("lib/a.ts"));
        assert!(store.has("lib/nested/b.ts"));
        assert!(store.is_dir("lib/nested"));
        assert!(!store.is_dir("src"));
        assert_eq!(&**store.get("lib/nested/b.ts").unwrap().source(), "b");
    }

    #[test]
    fn test_rename_conflicts() {
        let mut store = store_with(&[("a.ts", ""), ("b.ts", ""), ("dir/x.ts", "")]);
        assert_eq!(
            store.rename("a.ts", "b.ts").unwrap_err(),
            PathError::AlreadyExists("b.ts".to_string())
        );
        assert!(matches!(
            store.rename("a.ts", "nowhere/a.ts").unwrap_err(),
            PathError::ParentMissing { .. }
        ));
        assert!(matches!(
            store.rename("dir", "dir/inner").unwrap_err(),
            PathError::Invalid(_)
        ));
    }

    #[test]
    fn test_read_dir() {
        let store = store_with(&[("src/b.ts", ""), ("src/a/x.ts", ""), ("root.ts", "")]);
        let entries = store.read_dir("src").unwrap();
        let names: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.is_dir)).collect();
        assert_eq!(names, vec![("a", true), ("b.ts", false)]);

        let root = store.read_dir("").unwrap();
        assert_eq!(root.len(), 2);
        assert!(matches!(
            store.read_dir("root.ts").unwrap_err(),
            PathError::NotADirectory(_)
        ));
    }

    #[test]
    fn test_all_excludes_package_cache() {
        let store = store_with(&[
            ("src/a.ts", ""),
            ("node_modules/esm.sh/react/index.d.ts", ""),
        ]);
        let paths: Vec<_> = store.all().map(|f| f.path().to_string()).collect();
        assert_eq!(paths, vec!["src/a.ts"]);
    }

    #[test]
    fn test_json_round_trip() {
        let store = store_with(&[("src/a.ts", "export const a = 1;"), ("b.css", "body{}")]);
        let json = store.to_json();

        let mut restored = FileStore::new();
        restored.initialize(&json).unwrap();
        assert_eq!(restored.to_json(), json);
        assert!(restored.is_dir("src"));
    }
}
