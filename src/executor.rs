use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::clients::Clients;
use crate::error::{RunError, TaskError};
use crate::graph::TaskGraph;
use crate::report::{FailureSummary, Outcome, RunReport, TaskReport};
use crate::retry::{RetryExecutor, RetryOutcome, RetryPolicy};
use crate::state::{RunRecord, TaskState};
use crate::task::{Task, TaskOutput};

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub retry: RetryPolicy,
    /// Upper bound on tasks executing at the same time.
    pub max_concurrency: usize,
    pub clients: Clients,
}

impl RunConfig {
    pub fn new(clients: Clients) -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrency: 4,
            clients,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// Message sent by a task future back to the scheduling loop.
struct Completion {
    task: String,
    attempts: u32,
    result: Result<TaskOutput, TaskError>,
}

/// One execution attempt over a [`TaskGraph`].
///
/// The run owns every piece of per-task state. It is consumed by
/// [`execute`](Run::execute), so its outcome is produced exactly once.
pub struct Run {
    graph: Arc<TaskGraph>,
    config: RunConfig,
    records: HashMap<String, RunRecord>,
    in_degrees: HashMap<String, usize>,
    execution_order: Vec<String>,
    first_failure: Option<FailureSummary>,
}

impl Run {
    pub fn new(graph: Arc<TaskGraph>, config: RunConfig) -> Self {
        let mut records = HashMap::new();
        let mut in_degrees = HashMap::new();

        for task in graph.tasks() {
            records.insert(task.id.clone(), RunRecord::new());
            in_degrees.insert(task.id.clone(), graph.dependencies_of(&task.id).len());
        }

        Self {
            graph,
            config,
            records,
            in_degrees,
            execution_order: Vec::new(),
            first_failure: None,
        }
    }

    /// Drive the graph to completion and return the report.
    ///
    /// Task failures never escape this call. Cancelling `ctx` lets in-flight
    /// attempts finish, skips everything not yet started and fails the run.
    pub async fn execute(mut self, ctx: CancellationToken) -> RunReport {
        let started = Instant::now();
        info!(
            tasks = self.graph.len(),
            max_concurrency = self.config.max_concurrency,
            max_attempts = self.config.retry.max_attempts,
            "starting run"
        );

        for conflict in self.graph.unordered_writers() {
            warn!(
                table = %conflict.table,
                first = %conflict.first,
                second = %conflict.second,
                "tasks write the same table without an ordering edge"
            );
        }

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut ready = VecDeque::new();
        let roots: Vec<String> = self.graph.roots().into_iter().map(String::from).collect();
        for root in &roots {
            self.mark_ready(root, &mut ready);
        }

        let mut in_flight = 0usize;
        let mut cancelled = false;

        loop {
            if !cancelled && ctx.is_cancelled() {
                cancelled = true;
            }

            if !cancelled {
                while let Some(name) = ready.pop_front() {
                    if self.dispatch(name, &ctx, &semaphore, &done_tx) {
                        in_flight += 1;
                    }
                }
            }

            if in_flight == 0 {
                break;
            }

            tokio::select! {
                Some(done) = done_rx.recv() => {
                    in_flight -= 1;
                    self.complete(done, &mut ready);
                }
                _ = ctx.cancelled(), if !cancelled => {
                    cancelled = true;
                    warn!(in_flight, "run cancelled; waiting for in-flight tasks");
                }
                else => break,
            }
        }

        if cancelled {
            self.skip_unstarted();
        }

        self.into_report(cancelled, started.elapsed())
    }

    fn mark_ready(&mut self, name: &str, ready: &mut VecDeque<String>) {
        let Some(record) = self.records.get_mut(name) else {
            return;
        };
        if record.state == TaskState::Pending && record.advance(name, TaskState::Ready) {
            debug!(task = %name, "dependencies satisfied; task ready");
            ready.push_back(name.to_string());
        }
    }

    fn dispatch(
        &mut self,
        name: String,
        ctx: &CancellationToken,
        semaphore: &Arc<Semaphore>,
        done_tx: &mpsc::UnboundedSender<Completion>,
    ) -> bool {
        let Some(task) = self.graph.task(&name).cloned() else {
            warn!(task = %name, "ready task missing from graph; ignoring");
            return false;
        };
        let Some(record) = self.records.get_mut(&name) else {
            return false;
        };
        if !record.advance(&name, TaskState::Running) {
            return false;
        }

        let policy = match task.max_attempts {
            Some(n) => self.config.retry.with_max_attempts(n),
            None => self.config.retry,
        };
        let clients = self.config.clients.clone();
        let ctx = ctx.clone();
        let semaphore = Arc::clone(semaphore);
        let done_tx = done_tx.clone();
        let span = info_span!("task", task = %name, kind = task.kind.name());

        info!(task = %name, "dispatching task");

        tokio::spawn(
            async move {
                let outcome = run_task(&task, policy, &clients, &ctx, semaphore).await;
                let completion = Completion {
                    task: name,
                    attempts: outcome.attempts,
                    result: outcome.result,
                };
                if done_tx.send(completion).is_err() {
                    error!("run loop dropped before task completion was delivered");
                }
            }
            .instrument(span),
        );

        true
    }

    fn complete(&mut self, done: Completion, ready: &mut VecDeque<String>) {
        let Completion {
            task,
            attempts,
            result,
        } = done;

        let Some(record) = self.records.get_mut(&task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return;
        };
        record.attempt_count = attempts;

        match result {
            Ok(output) => {
                info!(task = %task, attempts, "task succeeded");
                record.advance(&task, TaskState::Succeeded);
                record.result = Some(output);
                self.execution_order.push(task.clone());

                let children = self.graph.dependents_of(&task).to_vec();
                for child in children {
                    if let Some(degree) = self.in_degrees.get_mut(&child) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            self.mark_ready(&child, ready);
                        }
                    }
                }
            }
            Err(TaskError::Cancelled) if attempts == 0 => {
                info!(task = %task, "run cancelled before task started");
                record.advance(&task, TaskState::Skipped);
            }
            Err(err) => {
                error!(task = %task, attempts, error = %err, "task failed");
                record.advance(&task, TaskState::Failed);
                record.last_error = Some(err.clone());
                if self.first_failure.is_none() {
                    self.first_failure = Some(FailureSummary {
                        task: task.clone(),
                        error: err,
                    });
                }
                self.skip_downstream(&task);
            }
        }
    }

    /// Failure propagates forward: every descendant is skipped, other
    /// branches keep running.
    fn skip_downstream(&mut self, failed: &str) {
        for name in self.graph.transitive_dependents(failed) {
            if let Some(record) = self.records.get_mut(&name) {
                if matches!(record.state, TaskState::Pending | TaskState::Ready)
                    && record.advance(&name, TaskState::Skipped)
                {
                    debug!(task = %name, upstream = %failed, "skipping task after upstream failure");
                }
            }
        }
    }

    fn skip_unstarted(&mut self) {
        for task in self.graph.tasks() {
            if let Some(record) = self.records.get_mut(&task.id) {
                if matches!(record.state, TaskState::Pending | TaskState::Ready) {
                    record.advance(&task.id, TaskState::Skipped);
                }
            }
        }
    }

    fn into_report(mut self, cancelled: bool, elapsed: Duration) -> RunReport {
        let mut tasks = Vec::with_capacity(self.graph.len());
        for task in self.graph.tasks() {
            let record = self.records.remove(&task.id).unwrap_or_default();
            tasks.push(TaskReport {
                id: task.id.clone(),
                kind: task.kind.name(),
                state: record.state,
                attempt_count: record.attempt_count,
                last_error: record.last_error,
                result: record.result,
            });
        }

        let skipped: Vec<String> = tasks
            .iter()
            .filter(|t| t.state == TaskState::Skipped)
            .map(|t| t.id.clone())
            .collect();

        let all_succeeded = tasks.iter().all(|t| t.state == TaskState::Succeeded);
        let outcome = if all_succeeded && !cancelled {
            Outcome::Succeeded
        } else {
            Outcome::Failed
        };

        let report = RunReport {
            outcome,
            error: cancelled.then_some(RunError::Cancelled),
            first_failure: self.first_failure,
            skipped,
            execution_order: self.execution_order,
            tasks,
            elapsed_ms: elapsed.as_millis() as u64,
        };

        info!(outcome = ?report.outcome, elapsed_ms = report.elapsed_ms, "run finished");
        report
    }
}

/// Wait for a permit, then drive the task through the retry policy.
async fn run_task(
    task: &Task,
    policy: RetryPolicy,
    clients: &Clients,
    ctx: &CancellationToken,
    semaphore: Arc<Semaphore>,
) -> RetryOutcome<TaskOutput> {
    let not_started = || RetryOutcome {
        result: Err(TaskError::Cancelled),
        attempts: 0,
    };

    let Ok(_permit) = semaphore.acquire_owned().await else {
        return not_started();
    };
    if ctx.is_cancelled() {
        return not_started();
    }

    RetryExecutor::new(policy)
        .execute_with_retry(ctx, &task.id, move |attempt| async move {
            debug!(attempt, "executing task");
            AssertUnwindSafe(task.execute(clients))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic.as_ref()))))
        })
        .await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
