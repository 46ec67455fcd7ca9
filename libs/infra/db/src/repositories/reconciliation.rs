// [libs/infra/db/src/repositories/reconciliation.rs]

use crate::errors::StoreError;
use crate::repositories::parse_ledger_timestamp;
use crate::EventLedgerClient;
use hookwise_domain_models::ReconciliationRun;
use libsql::{params, Row};
use tracing::{info, instrument};

const RUN_COLUMNS: &str = "id, integration_id, provider_events_found, local_events_found, \
     gaps_detected, gaps_resolved, ran_at";

/// Auditoría inmutable de ciclos de pull contra el proveedor.
pub struct ReconciliationRepository {
    database_client: EventLedgerClient,
}

impl ReconciliationRepository {
    pub fn new(client: EventLedgerClient) -> Self {
        Self { database_client: client }
    }

    /// Sella la auditoría de un ciclo, hubiese o no huecos detectados.
    #[instrument(skip(self, run), fields(integration = %run.integration_id))]
    pub async fn insert_run(&self, run: &ReconciliationRun) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        database_connection
            .execute(
                "INSERT INTO reconciliation_runs (id, integration_id, provider_events_found, \
                 local_events_found, gaps_detected, gaps_resolved, ran_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run.id.clone(),
                    run.integration_id.clone(),
                    i64::from(run.provider_events_found),
                    i64::from(run.local_events_found),
                    i64::from(run.gaps_detected),
                    i64::from(run.gaps_resolved),
                    run.ran_at.to_rfc3339()
                ],
            )
            .await?;

        info!("🧾 [RECONCILIATION]: Run {} sealed ({} gap(s) detected, {} resolved).",
            run.id, run.gaps_detected, run.gaps_resolved);
        Ok(())
    }

    pub async fn list_for_integration(
        &self,
        integration_id: &str,
        limit: i64,
    ) -> Result<Vec<ReconciliationRun>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!(
                    "SELECT {} FROM reconciliation_runs WHERE integration_id = ?1 \
                     ORDER BY ran_at DESC LIMIT ?2",
                    RUN_COLUMNS
                ),
                params![integration_id, limit],
            )
            .await?;

        let mut audit_trail = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            audit_trail.push(map_row_to_run(&data_row)?);
        }
        Ok(audit_trail)
    }
}

fn map_row_to_run(data_row: &Row) -> Result<ReconciliationRun, StoreError> {
    let ran_at_raw: String = data_row.get(6)?;

    Ok(ReconciliationRun {
        id: data_row.get(0)?,
        integration_id: data_row.get(1)?,
        provider_events_found: data_row.get::<i64>(2)?.max(0) as u32,
        local_events_found: data_row.get::<i64>(3)?.max(0) as u32,
        gaps_detected: data_row.get::<i64>(4)?.max(0) as u32,
        gaps_resolved: data_row.get::<i64>(5)?.max(0) as u32,
        ran_at: parse_ledger_timestamp(&ran_at_raw)
            .ok_or_else(|| StoreError::MappingError("RAN_AT_UNPARSEABLE".into()))?,
    })
}
