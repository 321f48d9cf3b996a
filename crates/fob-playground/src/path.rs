//! Virtual path helpers.
//!
//! Virtual paths are slash-separated strings relative to the project root
//! (`src/app.ts`). They never start with `/` and never contain `.` or `..`
//! segments once normalized. These helpers are deliberately string based:
//! virtual paths are shared between hosts on every platform (including the
//! browser), so they must not pick up the native path separator.

use std::ops::Range;

/// Extension search order used by [`crate::store::FileStore::resolve`].
pub const EXTENSION_PRIORITY: [&str; 5] = [".ts", ".tsx", ".d.ts", ".js", ".jsx"];

/// Reserved subtree holding cached package files (declarations, CDN mirrors).
pub const PACKAGE_CACHE_DIR: &str = "node_modules";

/// Returns the last extension of `path` without the leading dot.
///
/// `a.d.ts` yields `ts`; dotfiles such as `.env` have no extension.
pub fn extension(path: &str) -> Option<&str> {
    let name = basename(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Normalize a virtual path: collapse separators, drop `.` and fold `..`.
///
/// `..` never escapes the root, so `../a` normalizes to `a`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Parent directory of `path` (`""` for top-level entries).
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Final segment of `path`.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join `rel` onto `dir` and normalize the result.
pub fn join(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        normalize(rel)
    } else {
        normalize(&format!("{dir}/{rel}"))
    }
}

/// Resolve `specifier` against the directory of `importer`.
///
/// Specifiers starting with `/` are resolved from the project root.
pub fn resolve_relative(importer: &str, specifier: &str) -> String {
    match specifier.strip_prefix('/') {
        Some(absolute) => normalize(absolute),
        None => join(dirname(importer), specifier),
    }
}

/// Compute a `./` or `../` relative specifier from `from_dir` to `to`.
pub fn relative(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let target: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();

    let common = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::with_capacity(from.len() + target.len());
    if from.len() == common {
        parts.push(".");
    } else {
        parts.extend(std::iter::repeat_n("..", from.len() - common));
    }
    parts.extend(&target[common..]);
    parts.join("/")
}

/// Returns `true` for `scheme://...`, protocol-relative, `blob:` and `data:` specifiers.
pub fn is_url(specifier: &str) -> bool {
    if specifier.starts_with("blob:") || specifier.starts_with("data:") || specifier.starts_with("//")
    {
        return true;
    }

    match specifier.find("://") {
        Some(idx) if idx > 0 => {
            let scheme = &specifier[..idx];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Returns `true` for `./`, `../`, `.` and `..` specifiers.
pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// A bare package specifier split into its parts.
///
/// `@scope/pkg@1.2.3/sub/path` parses into name `@scope/pkg`, version `1.2.3`
/// and subpath `sub/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpecifier {
    pub name: String,
    pub version: Option<String>,
    pub subpath: Option<String>,
}

impl PackageSpecifier {
    /// Parse a bare specifier. Relative paths, absolute paths and URLs return `None`.
    pub fn parse(specifier: &str) -> Option<Self> {
        if specifier.is_empty()
            || is_relative(specifier)
            || specifier.starts_with('/')
            || is_url(specifier)
        {
            return None;
        }

        let (head, rest) = if specifier.starts_with('@') {
            let mut parts = specifier.splitn(3, '/');
            let scope = parts.next()?;
            let package = parts.next()?;
            (format!("{scope}/{package}"), parts.next())
        } else {
            let mut parts = specifier.splitn(2, '/');
            (parts.next()?.to_string(), parts.next())
        };

        let (name, version) = split_version(&head);
        if name.is_empty() || name.ends_with('/') {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            version: version.filter(|v| !v.is_empty()).map(str::to_string),
            subpath: rest.filter(|s| !s.is_empty()).map(str::to_string),
        })
    }
}

fn split_version(head: &str) -> (&str, Option<&str>) {
    // Skip the first byte so the scope marker of `@scope/pkg` is not mistaken
    // for a version separator.
    match head.get(1..).and_then(|tail| tail.find('@')) {
        Some(idx) => (&head[..idx + 1], Some(&head[idx + 2..])),
        None => (head, None),
    }
}

/// A `name@version` segment located inside a CDN URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPackage {
    pub name: String,
    pub version: String,
    /// Byte range of the version text inside the URL.
    pub version_range: Range<usize>,
}

impl VersionedPackage {
    /// Return `url` with this package's version replaced by `version`.
    pub fn with_version(&self, url: &str, version: &str) -> String {
        let mut out = String::with_capacity(url.len() + version.len());
        out.push_str(&url[..self.version_range.start]);
        out.push_str(version);
        out.push_str(&url[self.version_range.end..]);
        out
    }
}

/// Find the first `name@version` (or `@scope/name@version`) path segment of a CDN URL.
///
/// Understands esm.sh style layouts such as `/v135/left-pad@1.0.0/index.d.ts`
/// and `/@types/react@18.2.0/index.d.ts`.
pub fn package_in_url(url: &str) -> Option<VersionedPackage> {
    let after_scheme = url.find("://")? + 3;
    let path_start = url[after_scheme..].find('/')? + after_scheme;
    let path_end = url[path_start..]
        .find(['?', '#'])
        .map_or(url.len(), |idx| idx + path_start);

    let mut offset = path_start;
    let mut scope: Option<&str> = None;

    for segment in url[path_start..path_end].split('/') {
        let segment_start = offset;
        offset += segment.len() + 1;

        if segment.is_empty() {
            continue;
        }

        let at = segment.get(1..).and_then(|tail| tail.find('@')).map(|idx| idx + 1);
        match at {
            None if segment.starts_with('@') => {
                scope = Some(segment);
            }
            Some(at) => {
                let base = &segment[..at];
                let version = &segment[at + 1..];
                if !version.is_empty() {
                    let name = match scope {
                        Some(scope) => format!("{scope}/{base}"),
                        None => base.to_string(),
                    };
                    return Some(VersionedPackage {
                        name,
                        version: version.to_string(),
                        version_range: segment_start + at + 1..segment_start + segment.len(),
                    });
                }
                scope = None;
            }
            None => scope = None,
        }
    }

    None
}
