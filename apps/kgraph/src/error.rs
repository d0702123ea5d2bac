//! # Application Errors

use crate::config::ConfigError;
use kgraph_core::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    /// The command cannot run as invoked.
    #[error("{0}")]
    Usage(String),
}
