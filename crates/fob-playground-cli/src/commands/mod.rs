//! Command implementations.
//!
//! - [`build`] - link a project state into a directory
//! - [`types`] - download package declarations

pub mod build;
pub mod types;

pub use build::execute as build_execute;
pub use types::execute as types_execute;
