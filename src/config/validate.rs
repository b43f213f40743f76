use std::time::Duration;

use toml::Table;

use crate::clients::Clients;
use crate::config::model::{CredentialsSection, PipelineFile, WarehouseSection};
use crate::error::{Result, StardagError};
use crate::executor::RunConfig;
use crate::graph::TaskGraph;
use crate::retry::RetryPolicy;
use crate::task::{Task, TaskKind};

/// A checked pipeline: a valid graph plus the settings to run it.
#[derive(Debug)]
pub struct Pipeline {
    pub graph: TaskGraph,
    pub retry: RetryPolicy,
    pub max_concurrency: usize,
    pub credentials: CredentialsSection,
    pub warehouse: WarehouseSection,
}

impl Pipeline {
    pub fn run_config(&self, clients: Clients) -> RunConfig {
        RunConfig::new(clients)
            .with_retry(self.retry)
            .with_max_concurrency(self.max_concurrency)
    }
}

impl TryFrom<PipelineFile> for Pipeline {
    type Error = StardagError;

    fn try_from(raw: PipelineFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        validate_run_section(&raw)?;
        validate_task_overrides(&raw)?;
        let graph = build_graph(&raw)?;

        Ok(Pipeline {
            graph,
            retry: RetryPolicy::new(
                raw.run.retry.max_attempts,
                Duration::from_secs(raw.run.retry.delay_secs),
            ),
            max_concurrency: raw.run.max_concurrency,
            credentials: raw.credentials,
            warehouse: raw.warehouse,
        })
    }
}

fn ensure_has_tasks(cfg: &PipelineFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(StardagError::Config(
            "pipeline must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_run_section(cfg: &PipelineFile) -> Result<()> {
    if cfg.run.max_concurrency == 0 {
        return Err(StardagError::Config(
            "[run].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.run.retry.max_attempts == 0 {
        return Err(StardagError::Config(
            "[run.retry].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_overrides(cfg: &PipelineFile) -> Result<()> {
    for (name, task) in &cfg.task {
        if task.max_attempts == Some(0) {
            return Err(StardagError::Config(format!(
                "task '{name}' has max_attempts = 0; it must be >= 1"
            )));
        }
    }
    Ok(())
}

/// Edge direction is dependency -> task: `after = ["A"]` on `B` adds `A -> B`.
fn build_graph(cfg: &PipelineFile) -> Result<TaskGraph> {
    let mut builder = TaskGraph::builder();

    for (name, tc) in &cfg.task {
        let kind = parse_kind(name, &tc.params)?;
        let mut task = Task::new(name.clone(), kind);
        task.max_attempts = tc.max_attempts;
        builder.add_task(task)?;
    }

    for (name, tc) in &cfg.task {
        for dep in &tc.after {
            builder.add_edge(dep.clone(), name.clone());
        }
    }

    Ok(builder.build()?)
}

fn parse_kind(name: &str, params: &Table) -> Result<TaskKind> {
    let kind = toml::Value::Table(params.clone())
        .try_into::<TaskKind>()
        .map_err(|e| StardagError::Config(format!("task '{name}': {e}")))?;

    let allowed = allowed_keys(&kind);
    if let Some(key) = params.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(StardagError::Config(format!(
            "task '{name}' has unknown key '{key}' for kind {}; expected one of: after, max_attempts, {}",
            kind.name(),
            allowed.join(", ")
        )));
    }
    Ok(kind)
}

fn allowed_keys(kind: &TaskKind) -> &'static [&'static str] {
    match kind {
        TaskKind::Noop => &["kind"],
        TaskKind::ExtractLoad(_) => &["kind", "source_uri", "target_table", "format"],
        TaskKind::FactLoad(_) => &["kind", "target_table", "generating_query"],
        TaskKind::DimensionLoad(_) => &[
            "kind",
            "target_table",
            "generating_query",
            "truncate_first",
        ],
        TaskKind::QualityCheck(_) => &["kind", "probes"],
    }
}
