#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;
use tracing_subscriber::{EnvFilter, fmt};

use stardag::{
    Clients, Credentials, ObjectStore, Probe, RetryPolicy, Row, RunConfig, Scalar, Task,
    TaskError, TaskGraph, Warehouse,
};

static INIT: Once = Once::new();

/// Initialise tracing for tests. Output is captured per test and only shown
/// for failures unless run with `--nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

struct Failure {
    error: TaskError,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Default)]
struct FakeState {
    tables: HashMap<String, Vec<Row>>,
    select_rows: HashMap<String, Vec<Row>>,
    query_rows: HashMap<String, Vec<Row>>,
    source_rows: HashMap<String, Vec<Row>>,
    failures: HashMap<String, Failure>,
    panics: Vec<String>,
    statements: Vec<String>,
    copies: Vec<CopyCall>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCall {
    pub source_uri: String,
    pub target_table: String,
    pub access_key_id: String,
    pub format: String,
}

/// In-memory warehouse and object store.
///
/// Understands exactly the statements the handlers emit:
/// `TRUNCATE TABLE t`, `INSERT INTO t\n<select>` and
/// `SELECT COUNT(*) FROM t`. Rows produced by a select are registered with
/// [`on_select`](FakeWarehouse::on_select).
#[derive(Default)]
pub struct FakeWarehouse {
    state: Mutex<FakeState>,
    copy_delay: Mutex<Duration>,
    copy_barrier: Mutex<Option<Arc<Barrier>>>,
    active_copies: AtomicUsize,
    peak_copies: AtomicUsize,
}

impl FakeWarehouse {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_select(&self, query: &str, rows: Vec<Row>) {
        self.lock().select_rows.insert(query.trim().to_string(), rows);
    }

    pub fn on_query(&self, query: &str, rows: Vec<Row>) {
        self.lock().query_rows.insert(query.trim().to_string(), rows);
    }

    pub fn on_source(&self, source_uri: &str, rows: Vec<Row>) {
        self.lock().source_rows.insert(source_uri.to_string(), rows);
    }

    pub fn set_table(&self, table: &str, rows: Vec<Row>) {
        self.lock().tables.insert(table.to_string(), rows);
    }

    /// Fail the next `times` operations on `key` (a table or a query).
    pub fn fail_times(&self, key: &str, error: TaskError, times: u32) {
        self.lock().failures.insert(
            key.to_string(),
            Failure {
                error,
                remaining: Some(times),
            },
        );
    }

    pub fn fail_always(&self, key: &str, error: TaskError) {
        self.lock().failures.insert(
            key.to_string(),
            Failure {
                error,
                remaining: None,
            },
        );
    }

    /// Panic inside any operation touching `table`.
    pub fn panic_on(&self, table: &str) {
        self.lock().panics.push(table.to_string());
    }

    pub fn with_copy_delay(&self, delay: Duration) {
        *self.copy_delay.lock().unwrap() = delay;
    }

    /// Every copy waits on `barrier` before doing any work.
    pub fn with_copy_barrier(&self, barrier: Arc<Barrier>) {
        *self.copy_barrier.lock().unwrap() = Some(barrier);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, Vec::len)
    }

    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn copies(&self) -> Vec<CopyCall> {
        self.lock().copies.clone()
    }

    pub fn peak_copies(&self) -> usize {
        self.peak_copies.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn take_failure(state: &mut FakeState, key: &str) -> Option<TaskError> {
        let failure = state.failures.get_mut(key)?;
        match &mut failure.remaining {
            None => Some(failure.error.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(failure.error.clone())
            }
        }
    }

    /// Common bookkeeping for an operation on `key`. The panic is raised
    /// after the lock is released so the fake stays usable.
    fn enter(&self, statement: String, key: &str) -> Result<(), TaskError> {
        let should_panic = {
            let mut state = self.lock();
            state.statements.push(statement);
            if let Some(err) = Self::take_failure(&mut state, key) {
                return Err(err);
            }
            state.panics.iter().any(|t| t == key)
        };
        if should_panic {
            panic!("fake warehouse exploded on {key}");
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn execute(&self, sql: &str) -> Result<u64, TaskError> {
        if let Some(table) = sql.strip_prefix("TRUNCATE TABLE ") {
            let table = table.trim();
            self.enter(sql.to_string(), table)?;
            let removed = self.lock().tables.insert(table.to_string(), Vec::new());
            return Ok(removed.map_or(0, |rows| rows.len() as u64));
        }

        if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            let (table, select) = rest.split_once('\n').unwrap_or((rest, ""));
            let table = table.trim();
            self.enter(sql.to_string(), table)?;

            let mut state = self.lock();
            let rows = state
                .select_rows
                .get(select.trim())
                .cloned()
                .unwrap_or_default();
            let written = rows.len() as u64;
            state.tables.entry(table.to_string()).or_default().extend(rows);
            return Ok(written);
        }

        Err(TaskError::Rejected(format!("fake cannot execute: {sql}")))
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, TaskError> {
        let sql = sql.trim();
        self.enter(sql.to_string(), sql)?;

        let state = self.lock();
        if let Some(rows) = state.query_rows.get(sql) {
            return Ok(rows.clone());
        }
        if let Some(table) = sql.strip_prefix("SELECT COUNT(*) FROM ") {
            let count = state.tables.get(table.trim()).map_or(0, Vec::len);
            return Ok(vec![vec![Scalar::Int(count as i64)]]);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl ObjectStore for FakeWarehouse {
    async fn copy(
        &self,
        source_uri: &str,
        target_table: &str,
        credentials: &Credentials,
        format: &str,
    ) -> Result<(), TaskError> {
        let active = self.active_copies.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_copies.fetch_max(active, Ordering::SeqCst);

        let barrier = self.copy_barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        let delay = *self.copy_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active_copies.fetch_sub(1, Ordering::SeqCst);

        self.lock().copies.push(CopyCall {
            source_uri: source_uri.to_string(),
            target_table: target_table.to_string(),
            access_key_id: credentials.access_key_id.clone(),
            format: format.to_string(),
        });
        self.enter(format!("COPY {target_table} FROM '{source_uri}'"), target_table)?;

        let mut state = self.lock();
        let rows = state.source_rows.get(source_uri).cloned().unwrap_or_default();
        state
            .tables
            .entry(target_table.to_string())
            .or_default()
            .extend(rows);
        Ok(())
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("AKIATEST", "test-secret")
}

pub fn clients(fake: &Arc<FakeWarehouse>) -> Clients {
    Clients::new(fake.clone(), fake.clone(), credentials())
}

/// Run settings with a fast retry delay.
pub fn quick_config(fake: &Arc<FakeWarehouse>, max_attempts: u32) -> RunConfig {
    RunConfig::new(clients(fake))
        .with_retry(RetryPolicy::new(max_attempts, Duration::from_millis(1)))
        .with_max_concurrency(4)
}

pub fn row(values: &[i64]) -> Row {
    values.iter().map(|v| Scalar::Int(*v)).collect()
}

pub fn rows(n: i64) -> Vec<Row> {
    (0..n).map(|i| row(&[i])).collect()
}

pub const EVENTS_URI: &str = "s3://udacity-dend/log_data";
pub const SONGS_URI: &str = "s3://udacity-dend/song_data";
pub const SONGPLAYS_SELECT: &str = "SELECT * FROM staged_songplays";
pub const USERS_SELECT: &str = "SELECT DISTINCT userid FROM staging_events";
pub const SONGS_SELECT: &str = "SELECT DISTINCT song_id FROM staging_songs";
pub const ARTISTS_SELECT: &str = "SELECT DISTINCT artist_id FROM staging_songs";
pub const TIME_SELECT: &str = "SELECT start_time FROM songplays";
pub const SONGPLAYS_COUNT: &str = "SELECT COUNT(*) FROM songplays";

pub const DIMENSIONS: [&str; 4] = [
    "Load_user_dim_table",
    "Load_song_dim_table",
    "Load_artist_dim_table",
    "Load_time_dim_table",
];

/// The ten-task Sparkify pipeline against short fake queries.
pub fn sparkify_graph() -> TaskGraph {
    let mut b = TaskGraph::builder();
    b.add_task(Task::noop("Begin_execution")).unwrap();
    b.add_task(Task::extract_load(
        "Stage_events",
        EVENTS_URI,
        "staging_events",
        "JSON 's3://udacity-dend/log_json_path.json'",
    ))
    .unwrap();
    b.add_task(Task::extract_load(
        "Stage_songs",
        SONGS_URI,
        "staging_songs",
        "JSON 'auto'",
    ))
    .unwrap();
    b.add_task(Task::fact_load(
        "Load_songplays_fact_table",
        "songplays",
        SONGPLAYS_SELECT,
    ))
    .unwrap();
    b.add_task(Task::dimension_load("Load_user_dim_table", "users", USERS_SELECT, true))
        .unwrap();
    b.add_task(Task::dimension_load("Load_song_dim_table", "songs", SONGS_SELECT, true))
        .unwrap();
    b.add_task(Task::dimension_load(
        "Load_artist_dim_table",
        "artists",
        ARTISTS_SELECT,
        true,
    ))
    .unwrap();
    b.add_task(Task::dimension_load("Load_time_dim_table", "time", TIME_SELECT, true))
        .unwrap();
    b.add_task(Task::quality_check(
        "Run_data_quality_checks",
        vec![Probe::new(SONGPLAYS_COUNT, 0)],
    ))
    .unwrap();
    b.add_task(Task::noop("Stop_execution")).unwrap();

    b.add_edge("Begin_execution", "Stage_events")
        .add_edge("Begin_execution", "Stage_songs")
        .add_edge("Stage_events", "Load_songplays_fact_table")
        .add_edge("Stage_songs", "Load_songplays_fact_table");
    for dim in DIMENSIONS {
        b.add_edge("Load_songplays_fact_table", dim)
            .add_edge(dim, "Run_data_quality_checks");
    }
    b.add_edge("Run_data_quality_checks", "Stop_execution");

    b.build().unwrap()
}
