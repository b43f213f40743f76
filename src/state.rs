use serde::Serialize;
use tracing::warn;

use crate::error::TaskError;
use crate::task::TaskOutput;

/// Lifecycle of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for upstream tasks.
    Pending,
    /// All upstream tasks succeeded; about to be dispatched.
    Ready,
    /// Dispatched; an attempt is in progress or queued for a permit.
    Running,
    Succeeded,
    /// Failed after exhausting retries or on a non-retryable error.
    Failed,
    /// Never executed because an upstream task failed or the run was cancelled.
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }

    /// Allowed moves. States only ever advance; terminal states are final.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Ready, Running)
                | (Ready, Skipped)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Skipped)
        )
    }
}

/// Runtime record the run keeps for each task.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub state: TaskState,
    pub attempt_count: u32,
    pub last_error: Option<TaskError>,
    pub result: Option<TaskOutput>,
}

impl RunRecord {
    pub fn new() -> Self {
        Self {
            state: TaskState::Pending,
            attempt_count: 0,
            last_error: None,
            result: None,
        }
    }

    /// Move to `next` if allowed. Returns `false` and leaves the record
    /// untouched otherwise.
    pub fn advance(&mut self, task: &str, next: TaskState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                task = %task,
                from = ?self.state,
                to = ?next,
                "ignoring invalid task state transition"
            );
            return false;
        }
        self.state = next;
        true
    }
}

impl Default for RunRecord {
    fn default() -> Self {
        Self::new()
    }
}
