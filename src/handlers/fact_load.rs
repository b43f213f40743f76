use tracing::info;

use crate::clients::Clients;
use crate::error::TaskError;
use crate::handlers::insert_statement;
use crate::task::{FactLoad, TaskOutput};

/// Append the generating query's rows to the fact table. Never truncates.
pub async fn fact_load(params: &FactLoad, clients: &Clients) -> Result<TaskOutput, TaskError> {
    info!(table = %params.target_table, "loading fact table");

    let rows = clients
        .warehouse
        .execute(&insert_statement(&params.target_table, &params.generating_query))
        .await?;

    info!(table = %params.target_table, rows, "fact table loaded");
    Ok(TaskOutput::RowsWritten {
        table: params.target_table.clone(),
        rows,
    })
}
