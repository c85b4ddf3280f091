// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Structural problems (bad config, cycles, unknown operators) surface as
//! [`RundagError`] to whoever started the run. Failures *inside* an operator
//! never do: they are folded into the node's `ExecutionStatus` instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RundagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Node '{0}' cannot depend on itself")]
    SelfLoop(String),

    #[error("Node not found: {0}")]
    UnknownNode(String),

    #[error("No operator registered for kind '{kind}' (node '{node}')")]
    UnknownOperator { node: String, kind: String },

    #[error("DAG contains no nodes")]
    EmptyDag,

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RundagError>;
