//! Module specifier scanning.
//!
//! Parses a module with `oxc_parser` and reports every place a module
//! specifier appears as a string literal:
//!
//! - `import x from "x"` / `import "x"` / `import type { T } from "x"`
//! - `export { x } from "x"` / `export * from "x"`
//! - `import("x")` when the argument is a plain string literal
//! - `typeof import("x").T` type-level imports in TypeScript sources
//!
//! Dynamic imports with computed arguments (identifiers, template literals)
//! cannot be resolved statically and are skipped. CommonJS `require("x")` is
//! never reported: artifacts are ES modules only.
//!
//! The scanner never mutates the source. Offsets are byte offsets into the
//! scanned text and exclude the surrounding quotes, so
//! `&source[range.start..range.end]` is the raw specifier text.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ExportAllDeclaration, ExportNamedDeclaration, Expression, ImportDeclaration, ImportExpression,
    StringLiteral, TSImportType,
};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_span::SourceType;
use thiserror::Error;

/// One module specifier occurrence in a source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifierRange {
    /// Byte offset of the first character after the opening quote.
    pub start: usize,
    /// Byte offset of the closing quote.
    pub end: usize,
    /// The specifier value (`./util`, `react`, ...).
    pub path: String,
    /// `true` for imports, `false` for `export ... from` re-exports.
    pub is_import: bool,
    /// `true` for `import("...")` expressions.
    pub is_dynamic: bool,
}

/// Errors produced while scanning a module.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The source is not syntactically valid for its source type.
    #[error("failed to parse module: {message}")]
    Parse { message: String },
}

/// Pick the oxc source type for a virtual path or URL.
///
/// Query strings and fragments are ignored; unknown extensions fall back to
/// a plain ES module.
pub fn source_type_for(path: &str) -> SourceType {
    let clean = path.split(['?', '#']).next().unwrap_or(path);
    SourceType::from_path(clean).unwrap_or_else(|_| SourceType::mjs())
}

/// Scan `source` for module specifiers, in source order.
pub fn scan(source: &str, source_type: SourceType) -> Result<Vec<SpecifierRange>, ScanError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ScanError::Parse {
            message: if message.is_empty() {
                "parser aborted".to_string()
            } else {
                message
            },
        });
    }

    let mut collector = SpecifierCollector::default();
    collector.visit_program(&ret.program);

    let mut ranges = collector.ranges;
    ranges.sort_by_key(|range| range.start);
    Ok(ranges)
}

#[derive(Default)]
struct SpecifierCollector {
    ranges: Vec<SpecifierRange>,
}

impl SpecifierCollector {
    fn push(&mut self, literal: &StringLiteral<'_>, is_import: bool, is_dynamic: bool) {
        let start = literal.span.start as usize + 1;
        let end = (literal.span.end as usize).saturating_sub(1);
        if end < start {
            return;
        }
        self.ranges.push(SpecifierRange {
            start,
            end,
            path: literal.value.to_string(),
            is_import,
            is_dynamic,
        });
    }
}

impl<'a> Visit<'a> for SpecifierCollector {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        self.push(&decl.source, true, false);
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            self.push(source, false, false);
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        self.push(&decl.source, false, false);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(literal) = &expr.source {
            self.push(literal, true, true);
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_ts_import_type(&mut self, ty: &TSImportType<'a>) {
        self.push(&ty.source, true, true);
        walk::walk_ts_import_type(self, ty);
    }
}
