//! Command-line front end for `fob-playground`.
//!
//! The browser links projects lazily through object URLs; this crate runs the
//! same pipeline against the filesystem:
//!
//! - `build` - link a serialized project into content-hashed ES modules
//! - `types` - prefetch package declarations into a reusable cache file
//!
//! # Modules
//!
//! - [`cli`] - argument definitions
//! - [`config`] - layered configuration (defaults, file, environment, flags)
//! - [`error`] - error types and miette conversion
//! - [`store`] - the on-disk [`ArtifactStore`](fob_playground::ArtifactStore)

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod store;

pub use error::{CliError, Result};
