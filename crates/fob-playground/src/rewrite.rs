//! Specifier rewriting.
//!
//! Given the ranges produced by [`crate::scan::scan`], the rewriter asks a
//! callback for the new value of each specifier and splices only the ones
//! that changed. Edits are applied back to front so earlier offsets stay
//! valid while later ones are replaced.
//!
//! Replacement values are decoded specifiers. They are escaped for the
//! quote character of the literal they land in, so the rewritten module
//! stays valid whatever characters a resolved URL carries.
//!
//! When no specifier changes, the original `Arc<str>` is returned as-is.
//! The compiler relies on that pointer identity to skip packaging a new
//! artifact, so callers must compare with [`Arc::ptr_eq`], not by value.

use std::sync::Arc;

use crate::scan::SpecifierRange;

/// A single planned replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

/// Applies per-specifier replacements to a scanned source.
#[derive(Debug, Clone, Copy)]
pub struct SpecifierRewriter<'r> {
    ranges: &'r [SpecifierRange],
}

impl<'r> SpecifierRewriter<'r> {
    pub fn new(ranges: &'r [SpecifierRange]) -> Self {
        Self { ranges }
    }

    /// Plan the edits for `transform(path, is_import)`, skipping unchanged specifiers.
    pub fn edits<F>(&self, mut transform: F) -> Vec<Edit>
    where
        F: FnMut(&str, bool) -> String,
    {
        self.ranges
            .iter()
            .filter_map(|range| {
                let replacement = transform(&range.path, range.is_import);
                (replacement != range.path).then(|| Edit {
                    start: range.start,
                    end: range.end,
                    replacement,
                })
            })
            .collect()
    }

    /// Rewrite `source`, returning the same `Arc` when nothing changed.
    pub fn apply<F>(&self, source: &Arc<str>, transform: F) -> Arc<str>
    where
        F: FnMut(&str, bool) -> String,
    {
        let mut edits = self.edits(transform);
        if edits.is_empty() {
            return Arc::clone(source);
        }

        edits.sort_by_key(|edit| edit.start);

        let mut out = source.to_string();
        for edit in edits.iter().rev() {
            let quote = edit
                .start
                .checked_sub(1)
                .and_then(|at| source.as_bytes().get(at))
                .map_or('"', |&byte| byte as char);
            out.replace_range(edit.start..edit.end, &escape_literal(&edit.replacement, quote));
        }
        Arc::from(out)
    }
}

/// Escape `value` for the body of a string literal delimited by `quote`.
pub fn escape_literal(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            ch if ch == quote => {
                out.push('\\');
                out.push(ch);
            }
            ch => out.push(ch),
        }
    }
    out
}
