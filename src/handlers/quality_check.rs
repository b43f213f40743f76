use tracing::{info, warn};

use crate::clients::Clients;
use crate::error::TaskError;
use crate::task::{QualityCheck, TaskOutput};

/// Run each probe in order and compare its first scalar to the expected value.
///
/// Stops at the first mismatch.
pub async fn quality_check(params: &QualityCheck, clients: &Clients) -> Result<TaskOutput, TaskError> {
    for probe in &params.probes {
        let rows = clients.warehouse.query(&probe.query).await?;

        let actual = match rows.first().and_then(|row| row.first()) {
            Some(value) => value.clone(),
            None => {
                warn!(query = %probe.query, "quality probe returned no results");
                return Err(TaskError::EmptyResult {
                    query: probe.query.clone(),
                });
            }
        };

        if actual != probe.expected {
            warn!(
                query = %probe.query,
                expected = %probe.expected,
                actual = %actual,
                "quality probe mismatch"
            );
            return Err(TaskError::QualityCheck {
                query: probe.query.clone(),
                expected: probe.expected.clone(),
                actual,
            });
        }

        info!(query = %probe.query, value = %actual, "quality probe passed");
    }

    Ok(TaskOutput::ChecksPassed {
        probes: params.probes.len(),
    })
}
