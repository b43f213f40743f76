//! One handler per [`TaskKind`](crate::TaskKind) variant.
//!
//! Handlers issue statements through the shared [`Clients`](crate::Clients)
//! and report the outcome. They know nothing about retries or run state.

mod dimension_load;
mod extract_load;
mod fact_load;
mod quality_check;

pub use dimension_load::dimension_load;
pub use extract_load::extract_load;
pub use fact_load::fact_load;
pub use quality_check::quality_check;

/// `INSERT INTO <table>` followed by the generating query on its own line.
pub fn insert_statement(table: &str, generating_query: &str) -> String {
    format!("INSERT INTO {table}\n{}", generating_query.trim())
}

pub fn truncate_statement(table: &str) -> String {
    format!("TRUNCATE TABLE {table}")
}
