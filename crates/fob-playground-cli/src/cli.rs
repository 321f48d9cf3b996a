//! Command-line interface definition.
//!
//! - `fob-playground build` - link a project state into a directory
//! - `fob-playground types` - download package declarations

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use fob_playground::LogLevel;

/// Link in-browser playground projects from the command line
#[derive(Parser, Debug)]
#[command(
    name = "fob-playground",
    version,
    about = "Link in-browser playground projects from the command line",
    long_about = "Links a serialized playground project into standalone ES modules whose\n\
                  imports point at sibling artifacts or CDN packages, and prefetches\n\
                  TypeScript declarations for the packages a project imports."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    ///
    /// Repeat for trace-level output including cache hits.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to ./fob-playground.json when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// CDN that serves bare package imports
    #[arg(long, global = true, value_name = "URL")]
    pub cdn_base: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Log level implied by `--verbose` and `--quiet`.
    pub fn log_level(&self) -> LogLevel {
        if self.quiet {
            return LogLevel::Error;
        }
        (0..self.verbose).fold(LogLevel::Info, |level, _| level.louder())
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Link a serialized project into a directory of ES modules
    ///
    /// Every project file becomes one content-hashed module. A manifest maps
    /// source paths to module files and lists the files that failed to link.
    Build(BuildArgs),

    /// Download TypeScript declarations for packages
    ///
    /// Follows each package's declaration graph on the CDN and stores the
    /// result in the same format as a project's `types` section.
    Types(TypesArgs),
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Project state (`{"files": {...}, "aliases": {...}}`)
    #[arg(value_name = "STATE")]
    pub state: PathBuf,

    /// Output directory for modules and manifest.json
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Fail when any file cannot be linked
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the types command
#[derive(Args, Debug)]
pub struct TypesArgs {
    /// Package names, e.g. `react` or `@tanstack/query-core`
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Declaration cache to extend and rewrite
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}
