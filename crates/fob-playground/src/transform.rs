//! Host-supplied source transforms.
//!
//! The playground does not ship a transpiler. Hosts plug one in (a
//! TypeScript stripper, a JSX compiler, ...) by implementing [`Transform`],
//! or by wrapping a plain function in [`FnTransform`]. Transforms run in
//! order through a [`TransformChain`] before linking.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::FileKind;

/// A host transform rejected the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A pure `(source, path) -> source` step.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Transform `source` (the file at `path`).
    async fn transform(&self, source: &str, path: &str) -> Result<String, TransformError>;

    /// Which file kinds this transform runs on. Scripts only by default.
    fn applies_to(&self, kind: FileKind) -> bool {
        kind == FileKind::Script
    }
}

/// Adapts a synchronous closure into a [`Transform`].
pub struct FnTransform<F> {
    func: F,
    kinds: Vec<FileKind>,
}

impl<F> FnTransform<F>
where
    F: Fn(&str, &str) -> Result<String, TransformError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            kinds: vec![FileKind::Script],
        }
    }

    /// Run this transform on `kinds` instead of scripts only.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = FileKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }
}

#[async_trait]
impl<F> Transform for FnTransform<F>
where
    F: Fn(&str, &str) -> Result<String, TransformError> + Send + Sync,
{
    async fn transform(&self, source: &str, path: &str) -> Result<String, TransformError> {
        (self.func)(source, path)
    }

    fn applies_to(&self, kind: FileKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Ordered list of transforms, applied left to right.
#[derive(Clone, Default)]
pub struct TransformChain {
    steps: Vec<Arc<dyn Transform>>,
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform to the end of the chain.
    pub fn then(mut self, step: impl Transform + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn push(&mut self, step: Arc<dyn Transform>) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `true` if at least one step runs for `kind`.
    pub fn applies_to(&self, kind: FileKind) -> bool {
        self.steps.iter().any(|step| step.applies_to(kind))
    }

    /// Run every applicable step. The first failure aborts the chain.
    pub async fn run(
        &self,
        source: &str,
        path: &str,
        kind: FileKind,
    ) -> Result<String, TransformError> {
        let mut current = source.to_string();
        for step in self.steps.iter().filter(|step| step.applies_to(kind)) {
            current = step.transform(&current, path).await?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chain_runs_left_to_right() {
        let chain = TransformChain::new()
            .then(FnTransform::new(|source, _| Ok(format!("{source}1"))))
            .then(FnTransform::new(|source, _| Ok(format!("{source}2"))));

        let out = chain.run("x", "a.ts", FileKind::Script).await.unwrap();
        assert_eq!(out, "x12");
    }

    #[tokio::test]
    async fn test_chain_skips_other_kinds() {
        let chain = TransformChain::new()
            .then(FnTransform::new(|_, _| Err(TransformError::new("scripts only"))))
            .then(
                FnTransform::new(|source, _| Ok(source.to_uppercase()))
                    .with_kinds([FileKind::Style]),
            );

        assert!(chain.applies_to(FileKind::Style));
        assert!(!chain.applies_to(FileKind::Binary));
        let css = chain.run("body{}", "a.css", FileKind::Style).await.unwrap();
        assert_eq!(css, "BODY{}");
    }

    #[tokio::test]
    async fn test_chain_stops_on_error() {
        let chain = TransformChain::new()
            .then(FnTransform::new(|_, path| {
                Err(TransformError::new(format!("cannot compile {path}")))
            }))
            .then(FnTransform::new(|_, _| Ok("unreachable".to_string())));

        let err = chain.run("x", "a.ts", FileKind::Script).await.unwrap_err();
        assert_eq!(err.message, "cannot compile a.ts");
    }
}
