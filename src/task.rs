use serde::{Deserialize, Serialize};

use crate::clients::{Clients, Scalar};
use crate::error::TaskError;
use crate::handlers;

/// Copy every object under `source_uri` into `target_table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractLoad {
    pub source_uri: String,
    pub target_table: String,
    /// Record format clause understood by the store, e.g. `JSON 'auto'`.
    pub format: String,
}

/// Append the rows of `generating_query` to a fact table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactLoad {
    pub target_table: String,
    pub generating_query: String,
}

/// Load a dimension table, optionally replacing its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionLoad {
    pub target_table: String,
    pub generating_query: String,
    #[serde(default)]
    pub truncate_first: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Probe {
    pub query: String,
    pub expected: Scalar,
}

impl Probe {
    pub fn new(query: impl Into<String>, expected: impl Into<Scalar>) -> Self {
        Self {
            query: query.into(),
            expected: expected.into(),
        }
    }
}

/// Ordered probes; the first mismatch fails the check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub probes: Vec<Probe>,
}

/// What a task does when it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Marker that succeeds without touching any client.
    Noop,
    ExtractLoad(ExtractLoad),
    FactLoad(FactLoad),
    DimensionLoad(DimensionLoad),
    QualityCheck(QualityCheck),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Noop => "noop",
            TaskKind::ExtractLoad(_) => "extract_load",
            TaskKind::FactLoad(_) => "fact_load",
            TaskKind::DimensionLoad(_) => "dimension_load",
            TaskKind::QualityCheck(_) => "quality_check",
        }
    }

    /// Table this task writes to, if any.
    pub fn target_table(&self) -> Option<&str> {
        match self {
            TaskKind::ExtractLoad(p) => Some(&p.target_table),
            TaskKind::FactLoad(p) => Some(&p.target_table),
            TaskKind::DimensionLoad(p) => Some(&p.target_table),
            TaskKind::Noop | TaskKind::QualityCheck(_) => None,
        }
    }
}

/// What a successful task reports back to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutput {
    Noop,
    Copied { table: String },
    RowsWritten { table: String, rows: u64 },
    ChecksPassed { probes: usize },
}

/// A named unit of pipeline work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    /// Overrides the run-wide attempt budget for this task.
    pub max_attempts: Option<u32>,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            kind,
            max_attempts: None,
        }
    }

    pub fn noop(id: impl Into<String>) -> Self {
        Self::new(id, TaskKind::Noop)
    }

    pub fn extract_load(
        id: impl Into<String>,
        source_uri: impl Into<String>,
        target_table: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            TaskKind::ExtractLoad(ExtractLoad {
                source_uri: source_uri.into(),
                target_table: target_table.into(),
                format: format.into(),
            }),
        )
    }

    pub fn fact_load(
        id: impl Into<String>,
        target_table: impl Into<String>,
        generating_query: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            TaskKind::FactLoad(FactLoad {
                target_table: target_table.into(),
                generating_query: generating_query.into(),
            }),
        )
    }

    pub fn dimension_load(
        id: impl Into<String>,
        target_table: impl Into<String>,
        generating_query: impl Into<String>,
        truncate_first: bool,
    ) -> Self {
        Self::new(
            id,
            TaskKind::DimensionLoad(DimensionLoad {
                target_table: target_table.into(),
                generating_query: generating_query.into(),
                truncate_first,
            }),
        )
    }

    pub fn quality_check(id: impl Into<String>, probes: Vec<Probe>) -> Self {
        Self::new(id, TaskKind::QualityCheck(QualityCheck { probes }))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Run one attempt of this task against `clients`.
    ///
    /// Handlers only report the outcome; state and retries belong to the run.
    pub async fn execute(&self, clients: &Clients) -> Result<TaskOutput, TaskError> {
        match &self.kind {
            TaskKind::Noop => Ok(TaskOutput::Noop),
            TaskKind::ExtractLoad(p) => handlers::extract_load(p, clients).await,
            TaskKind::FactLoad(p) => handlers::fact_load(p, clients).await,
            TaskKind::DimensionLoad(p) => handlers::dimension_load(p, clients).await,
            TaskKind::QualityCheck(p) => handlers::quality_check(p, clients).await,
        }
    }
}
