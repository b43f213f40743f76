//! Error types for graph construction, task execution and pipeline loading.

use serde::Serialize;
use thiserror::Error;

use crate::clients::Scalar;

/// Errors raised while building a [`TaskGraph`](crate::TaskGraph).
///
/// These are fatal and always surface before any task runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("cycle detected in task graph: {}", task_ids.join(" -> "))]
    Cycle { task_ids: Vec<String> },
    #[error("edge {from} -> {to} references unknown task '{unknown}'")]
    UnknownTask {
        from: String,
        to: String,
        unknown: String,
    },
    #[error("task '{0}' is declared more than once")]
    DuplicateTask(String),
}

/// Failure of a single task attempt.
///
/// Whether the run retries the task is decided by [`TaskError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    #[error("object store error: {0}")]
    Store(String),
    #[error("warehouse error: {0}")]
    Warehouse(String),
    #[error("statement rejected by warehouse: {0}")]
    Rejected(String),
    #[error("data quality check failed: `{query}` returned {actual} instead of {expected}")]
    QualityCheck {
        query: String,
        expected: Scalar,
        actual: Scalar,
    },
    #[error("data quality check failed: `{query}` returned no results")]
    EmptyResult { query: String },
    #[error("task cancelled")]
    Cancelled,
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Transport failures may go away on a later attempt; assertion and
    /// statement failures will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Store(_) | TaskError::Warehouse(_))
    }
}

/// Run-level failure that is not attributable to a single task.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunError {
    #[error("run cancelled before all tasks completed")]
    Cancelled,
}

/// Crate-level error for loading and preparing a pipeline.
#[derive(Error, Debug)]
pub enum StardagError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("credentials error: {0}")]
    Credentials(String),
    #[error("connection error: {0}")]
    Connection(String),
}

pub type Result<T> = std::result::Result<T, StardagError>;
