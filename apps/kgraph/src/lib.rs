//! # kgraph
//!
//! Library half of the kgraph binary: configuration, command-line parsing
//! and command execution on top of `kgraph-core`.

pub mod cli;
pub mod config;
pub mod error;

pub use config::Config;
pub use error::AppError;
