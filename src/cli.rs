//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "stardag",
    version,
    about = "Load a star-schema warehouse from object-store data as a DAG of tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Pipeline definition (TOML).
    #[arg(long, value_name = "PATH", default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Validate the pipeline and print its dependency tree without running it.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Logging level; overrides `STARDAG_LOG`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Warehouse connection URL.
    #[arg(
        long,
        env = "STARDAG_DATABASE_URL",
        value_name = "URL",
        hide_env_values = true
    )]
    pub database_url: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
