use tracing::info;

use crate::clients::Clients;
use crate::error::TaskError;
use crate::handlers::{insert_statement, truncate_statement};
use crate::task::{DimensionLoad, TaskOutput};

/// Load a dimension table.
///
/// With `truncate_first` the table is emptied before the insert, which makes
/// the load a full replace. Without it the rows are appended.
pub async fn dimension_load(
    params: &DimensionLoad,
    clients: &Clients,
) -> Result<TaskOutput, TaskError> {
    if params.truncate_first {
        info!(table = %params.target_table, "truncating dimension table");
        clients
            .warehouse
            .execute(&truncate_statement(&params.target_table))
            .await?;
    }

    info!(table = %params.target_table, "loading dimension table");
    let rows = clients
        .warehouse
        .execute(&insert_statement(&params.target_table, &params.generating_query))
        .await?;

    info!(table = %params.target_table, rows, "dimension table loaded");
    Ok(TaskOutput::RowsWritten {
        table: params.target_table.clone(),
        rows,
    })
}
