pub mod cli;
pub mod clients;
pub mod config;
pub mod cycle_check;
pub mod error;
pub mod executor;
pub mod graph;
pub mod handlers;
pub mod logging;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod report;
pub mod retry;
pub mod state;
pub mod task;

pub use clients::{Clients, Credentials, ObjectStore, Row, Scalar, Warehouse};
pub use cycle_check::find_cycle;
pub use error::{GraphError, RunError, StardagError, TaskError};
pub use executor::{Run, RunConfig};
pub use graph::{TaskGraph, TaskGraphBuilder, WriteConflict};
pub use report::{FailureSummary, Outcome, RunReport, TaskReport};
pub use retry::{RetryExecutor, RetryOutcome, RetryPolicy};
pub use state::{RunRecord, TaskState};
pub use task::{Probe, Task, TaskKind, TaskOutput};

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{Pipeline, load_pipeline};

/// Entry point used by `main.rs`: load, validate, run, report.
///
/// Returns the process exit code of the run. Errors are reserved for
/// problems that prevent the run from starting.
pub async fn run(args: CliArgs) -> anyhow::Result<i32> {
    let pipeline = load_pipeline(&args.config)
        .with_context(|| format!("loading pipeline from {}", args.config.display()))?;
    info!(
        config = %args.config.display(),
        tasks = pipeline.graph.len(),
        "pipeline loaded"
    );

    if args.dry_run {
        print_dry_run(&pipeline);
        return Ok(0);
    }

    let credentials = Credentials::from_env(
        &pipeline.credentials.access_key_id_env,
        &pipeline.credentials.secret_access_key_env,
    )?;
    let clients = connect_clients(&args, &pipeline, credentials).await?;
    let config = pipeline.run_config(clients);
    let graph = Arc::new(pipeline.graph);

    // Ctrl-C stops dispatching; in-flight tasks finish their attempt.
    let ctx = CancellationToken::new();
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            warn!("Ctrl+C received; cancelling run");
            ctx.cancel();
        });
    }

    let report = Run::new(graph, config).execute(ctx).await;
    report.log_summary();

    if args.json {
        println!("{}", report.to_json()?);
    }

    Ok(report.exit_code())
}

#[cfg(feature = "postgres")]
async fn connect_clients(
    args: &CliArgs,
    pipeline: &Pipeline,
    credentials: Credentials,
) -> anyhow::Result<Clients> {
    let url = args
        .database_url
        .as_deref()
        .context("no warehouse URL; pass --database-url or set STARDAG_DATABASE_URL")?;
    let warehouse = Arc::new(postgres::PostgresWarehouse::connect(url, &pipeline.warehouse).await?);
    Ok(Clients::new(warehouse.clone(), warehouse, credentials))
}

#[cfg(not(feature = "postgres"))]
async fn connect_clients(
    _args: &CliArgs,
    _pipeline: &Pipeline,
    _credentials: Credentials,
) -> anyhow::Result<Clients> {
    anyhow::bail!(
        "this build has no warehouse backend; rebuild with `--features postgres` or use --dry-run"
    )
}

fn print_dry_run(pipeline: &Pipeline) {
    println!("stardag dry-run");
    println!("  run.max_concurrency = {}", pipeline.max_concurrency);
    println!("  run.retry.max_attempts = {}", pipeline.retry.max_attempts);
    println!("  run.retry.delay = {:?}", pipeline.retry.delay);
    println!();

    println!("tasks ({}):", pipeline.graph.len());
    for task in pipeline.graph.tasks() {
        println!("  - {} [{}]", task.id, task.kind.name());
        if let Some(table) = task.kind.target_table() {
            println!("      table: {table}");
        }
        let deps = pipeline.graph.dependencies_of(&task.id);
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
        if let Some(n) = task.max_attempts {
            println!("      max_attempts: {n}");
        }
    }
    println!();

    println!("dependency tree:");
    print!("{}", pipeline.graph.render_tree());

    let conflicts = pipeline.graph.unordered_writers();
    if !conflicts.is_empty() {
        println!();
        println!("warning: unordered writers:");
        for c in conflicts {
            println!("  {} and {} both write {}", c.first, c.second, c.table);
        }
    }
}
