use std::collections::BTreeMap;

use serde::Deserialize;
use toml::Table;

/// Top-level pipeline file.
///
/// ```toml
/// [run]
/// max_concurrency = 4
///
/// [run.retry]
/// max_attempts = 4
/// delay_secs = 300
///
/// [task.Load_songplays_fact_table]
/// kind = "fact_load"
/// target_table = "songplays"
/// generating_query = "SELECT ..."
/// after = ["Stage_events", "Stage_songs"]
/// ```
///
/// Every section except `task` is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineFile {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub credentials: CredentialsSection,

    #[serde(default)]
    pub warehouse: WarehouseSection,

    /// Tasks keyed by id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub retry: RetrySection,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            retry: RetrySection::default(),
        }
    }
}

/// `[run.retry]` section. Defaults give three retries five minutes apart.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_delay_secs() -> u64 {
    300
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

/// `[credentials]` section: names of the environment variables holding the
/// object store keys. The values themselves never live in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsSection {
    #[serde(default = "default_access_key_id_env")]
    pub access_key_id_env: String,

    #[serde(default = "default_secret_access_key_env")]
    pub secret_access_key_env: String,
}

fn default_access_key_id_env() -> String {
    "AWS_ACCESS_KEY_ID".to_string()
}

fn default_secret_access_key_env() -> String {
    "AWS_SECRET_ACCESS_KEY".to_string()
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            access_key_id_env: default_access_key_id_env(),
            secret_access_key_env: default_secret_access_key_env(),
        }
    }
}

/// `[warehouse]` section: connection pool settings. The URL comes from the
/// command line or `STARDAG_DATABASE_URL`.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseSection {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Tasks that must succeed before this one starts.
    #[serde(default)]
    pub after: Vec<String>,

    /// Per-task attempt budget; falls back to `[run.retry].max_attempts`.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// `kind = "..."` plus the kind's parameters. Parsed into a
    /// [`TaskKind`](crate::TaskKind) during validation so unknown keys can be
    /// reported against the task.
    #[serde(flatten)]
    pub params: Table,
}
