use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{RunError, TaskError};
use crate::state::TaskState;
use crate::task::TaskOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Final record of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: String,
    pub kind: &'static str,
    pub state: TaskState,
    pub attempt_count: u32,
    pub last_error: Option<TaskError>,
    pub result: Option<TaskOutput>,
}

/// The task that failed first and why.
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub task: String,
    pub error: TaskError,
}

/// Structured result of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    pub error: Option<RunError>,
    /// Root cause, as opposed to the skipped tasks it caused.
    pub first_failure: Option<FailureSummary>,
    pub skipped: Vec<String>,
    /// Succeeded tasks in completion order.
    pub execution_order: Vec<String>,
    /// Every task, in graph declaration order.
    pub tasks: Vec<TaskReport>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// Process exit status for this run.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            Outcome::Succeeded => 0,
            Outcome::Failed => 1,
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.task(id).map(|t| t.state)
    }

    /// Tasks that ended in `state`, in declaration order.
    pub fn tasks_in(&self, state: TaskState) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.state == state)
            .map(|t| t.id.as_str())
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// One log line per task followed by the overall outcome.
    pub fn log_summary(&self) {
        for t in &self.tasks {
            match (&t.state, &t.last_error) {
                (TaskState::Failed, Some(err)) => error!(
                    task = %t.id,
                    kind = t.kind,
                    attempts = t.attempt_count,
                    error = %err,
                    "task failed"
                ),
                (TaskState::Skipped, _) => warn!(task = %t.id, kind = t.kind, "task skipped"),
                (state, _) => info!(
                    task = %t.id,
                    kind = t.kind,
                    state = ?state,
                    attempts = t.attempt_count,
                    "task finished"
                ),
            }
        }

        match (&self.outcome, &self.first_failure) {
            (Outcome::Succeeded, _) => info!(
                tasks = self.tasks.len(),
                elapsed_ms = self.elapsed_ms,
                "run succeeded"
            ),
            (Outcome::Failed, Some(first)) => error!(
                first_failure = %first.task,
                error = %first.error,
                skipped = ?self.skipped,
                elapsed_ms = self.elapsed_ms,
                "run failed"
            ),
            (Outcome::Failed, None) => error!(
                reason = ?self.error,
                skipped = ?self.skipped,
                elapsed_ms = self.elapsed_ms,
                "run failed"
            ),
        }
    }
}
