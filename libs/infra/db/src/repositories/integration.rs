// [libs/infra/db/src/repositories/integration.rs]
/*!
 * =================================================================
 * APARATO: INTEGRATION REPOSITORY (V3.1 - REFERENTIAL GUARD)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: GESTIÓN DE PRODUCTORES Y CREDENCIALES SELLADAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. REFERENTIAL GUARD: El borrado está vetado mientras existan eventos
 *    que referencien la integración (ancla de propiedad del agregado).
 * 2. VAULT DISCIPLINE: Este repositorio solo conoce el sobre sellado;
 *    el texto claro de la credencial jamás toca el estrato L3.
 * =================================================================
 */

use crate::errors::StoreError;
use crate::repositories::parse_ledger_timestamp;
use crate::EventLedgerClient;
use chrono::Utc;
use hookwise_domain_models::{Integration, IntegrationStatus, ProviderKind};
use libsql::{params, Row};
use tracing::{info, instrument, warn};

const INTEGRATION_COLUMNS: &str = "id, operator_id, provider, signing_secret, destination_url, \
     status, created_at, updated_at, forward_unverified, reconciliation_credential";

pub struct IntegrationRepository {
    database_client: EventLedgerClient,
}

impl IntegrationRepository {
    pub fn new(client: EventLedgerClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Inscribe un nuevo productor en el Ledger.
     */
    #[instrument(skip(self, integration), fields(id = %integration.id))]
    pub async fn create(&self, integration: &Integration) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        database_connection
            .execute(
                "INSERT INTO integrations (id, operator_id, provider, signing_secret, \
                 destination_url, status, created_at, updated_at, forward_unverified, \
                 reconciliation_credential) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    integration.id.clone(),
                    integration.operator_id.clone(),
                    integration.provider.as_tag(),
                    integration.signing_secret.clone(),
                    integration.destination_url.clone(),
                    integration.status.as_tag(),
                    integration.created_at.to_rfc3339(),
                    integration.updated_at.to_rfc3339(),
                    i64::from(integration.forward_unverified),
                    integration.reconciliation_credential.clone()
                ],
            )
            .await?;

        info!("🧩 [INTEGRATION]: Producer {} enrolled for provider {}.",
            integration.id, integration.provider);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_id(&self, integration_id: &str) -> Result<Integration, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!("SELECT {} FROM integrations WHERE id = ?1", INTEGRATION_COLUMNS),
                params![integration_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => map_row_to_integration(&data_row),
            None => Err(StoreError::IntegrationNotFound),
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Integration>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!("SELECT {} FROM integrations ORDER BY created_at ASC", INTEGRATION_COLUMNS),
                (),
            )
            .await?;

        let mut integrations = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            integrations.push(map_row_to_integration(&data_row)?);
        }
        Ok(integrations)
    }

    /// Integraciones visitables por el ciclo de reconciliación: activas,
    /// con credencial sellada y cuyo proveedor soporta pull (P3 no).
    pub async fn list_reconciliation_candidates(&self) -> Result<Vec<Integration>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!(
                    "SELECT {} FROM integrations \
                     WHERE status = 'active' AND reconciliation_credential IS NOT NULL \
                       AND provider != 'github' \
                     ORDER BY created_at ASC",
                    INTEGRATION_COLUMNS
                ),
                (),
            )
            .await?;

        let mut candidates = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            candidates.push(map_row_to_integration(&data_row)?);
        }
        Ok(candidates)
    }

    /**
     * Mutación parcial desde la superficie de gestión. Solo los campos
     * provistos cambian; 'updated_at' se sella siempre.
     */
    #[instrument(skip(self, destination_url, status, forward_unverified))]
    pub async fn update_settings(
        &self,
        integration_id: &str,
        destination_url: Option<&str>,
        status: Option<IntegrationStatus>,
        forward_unverified: Option<bool>,
    ) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let rows_affected_count = database_connection
            .execute(
                "UPDATE integrations SET \
                 destination_url = COALESCE(?1, destination_url), \
                 status = COALESCE(?2, status), \
                 forward_unverified = COALESCE(?3, forward_unverified), \
                 updated_at = ?4 \
                 WHERE id = ?5",
                params![
                    destination_url.map(str::to_string),
                    status.map(|s| s.as_tag().to_string()),
                    forward_unverified.map(i64::from),
                    Utc::now().to_rfc3339(),
                    integration_id
                ],
            )
            .await?;

        if rows_affected_count == 0 {
            return Err(StoreError::IntegrationNotFound);
        }
        Ok(())
    }

    /// Sella (o retira con None) la credencial de reconciliación.
    pub async fn set_reconciliation_credential(
        &self,
        integration_id: &str,
        sealed_envelope_json: Option<&str>,
    ) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let rows_affected_count = database_connection
            .execute(
                "UPDATE integrations SET reconciliation_credential = ?1, updated_at = ?2 \
                 WHERE id = ?3",
                params![
                    sealed_envelope_json.map(str::to_string),
                    Utc::now().to_rfc3339(),
                    integration_id
                ],
            )
            .await?;

        if rows_affected_count == 0 {
            return Err(StoreError::IntegrationNotFound);
        }
        Ok(())
    }

    /**
     * Borrado con guarda referencial: rechazado mientras existan eventos.
     *
     * # Errors:
     * - `StoreError::IntegrationStillReferenced`: hay eventos vivos.
     */
    #[instrument(skip(self))]
    pub async fn delete_guarded(&self, integration_id: &str) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut reference_check = database_connection
            .query(
                "SELECT 1 FROM events WHERE integration_id = ?1 LIMIT 1",
                params![integration_id],
            )
            .await?;

        if reference_check.next().await?.is_some() {
            warn!("⛔ [INTEGRATION]: Deletion of {} vetoed (events still reference it).", integration_id);
            return Err(StoreError::IntegrationStillReferenced);
        }

        let rows_affected_count = database_connection
            .execute("DELETE FROM integrations WHERE id = ?1", params![integration_id])
            .await?;

        if rows_affected_count == 0 {
            return Err(StoreError::IntegrationNotFound);
        }

        // El endpoint 1:1 muere con su integración.
        database_connection
            .execute("DELETE FROM endpoints WHERE integration_id = ?1", params![integration_id])
            .await?;

        info!("🗑️ [INTEGRATION]: Producer {} unenrolled.", integration_id);
        Ok(())
    }
}

fn map_row_to_integration(data_row: &Row) -> Result<Integration, StoreError> {
    let provider_tag: String = data_row.get(2)?;
    let status_tag: String = data_row.get(5)?;
    let created_at_raw: String = data_row.get(6)?;
    let updated_at_raw: String = data_row.get(7)?;

    Ok(Integration {
        id: data_row.get(0)?,
        operator_id: data_row.get(1)?,
        provider: ProviderKind::from_tag(&provider_tag)
            .ok_or_else(|| StoreError::MappingError(format!("UNKNOWN_PROVIDER_TAG: {}", provider_tag)))?,
        signing_secret: data_row.get(3)?,
        destination_url: data_row.get(4)?,
        status: IntegrationStatus::from_tag(&status_tag)
            .ok_or_else(|| StoreError::MappingError(format!("UNKNOWN_STATUS_TAG: {}", status_tag)))?,
        created_at: parse_ledger_timestamp(&created_at_raw)
            .ok_or_else(|| StoreError::MappingError("CREATED_AT_UNPARSEABLE".into()))?,
        updated_at: parse_ledger_timestamp(&updated_at_raw)
            .ok_or_else(|| StoreError::MappingError("UPDATED_AT_UNPARSEABLE".into()))?,
        forward_unverified: data_row.get::<i64>(8)? != 0,
        reconciliation_credential: data_row.get::<Option<String>>(9)?,
    })
}
