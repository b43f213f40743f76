use tracing::info;

use crate::clients::Clients;
use crate::error::TaskError;
use crate::task::{ExtractLoad, TaskOutput};

/// Bulk copy a source prefix into a staging table.
///
/// No pre-truncation: what happens to rows already in the table is up to
/// the store.
pub async fn extract_load(params: &ExtractLoad, clients: &Clients) -> Result<TaskOutput, TaskError> {
    info!(
        source = %params.source_uri,
        table = %params.target_table,
        format = %params.format,
        "copying objects into staging table"
    );

    clients
        .object_store
        .copy(
            &params.source_uri,
            &params.target_table,
            &clients.credentials,
            &params.format,
        )
        .await?;

    info!(table = %params.target_table, "staging copy finished");
    Ok(TaskOutput::Copied {
        table: params.target_table.clone(),
    })
}
