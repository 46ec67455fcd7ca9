// [libs/infra/db/src/repositories/replay_queue.rs]
/*!
 * =================================================================
 * APARATO: REPLAY QUEUE REPOSITORY (V3.4 - ORDERED DRAIN)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CICLO DE VIDA DE LAS RANURAS DEL BÚFER DE REPLAY
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. POSITION ORDER: Todo lote pendiente se sirve por 'position ASC';
 *    el orden de drenaje ES el orden de llegada original.
 * 2. GUARDED TRANSITIONS: 'pending -> delivering' está condicionado al
 *    estado previo, de modo que dos drenadores concurrentes no puedan
 *    robar la misma ranura.
 * =================================================================
 */

use crate::errors::StoreError;
use crate::repositories::parse_ledger_timestamp;
use crate::EventLedgerClient;
use chrono::Utc;
use hookwise_domain_models::{ReplayItemStatus, ReplayQueueItem};
use libsql::{params, Row};
use tracing::{debug, instrument};

const REPLAY_COLUMNS: &str = "id, endpoint_id, event_id, position, correlation_key, status, \
     attempts, created_at, delivered_at";

pub struct ReplayQueueRepository {
    database_client: EventLedgerClient,
}

impl ReplayQueueRepository {
    pub fn new(client: EventLedgerClient) -> Self {
        Self { database_client: client }
    }

    /// Lote de drenaje: ranuras pendientes por posición ascendente.
    #[instrument(skip(self))]
    pub async fn fetch_pending_batch(
        &self,
        endpoint_id: &str,
        batch_limit: i64,
    ) -> Result<Vec<ReplayQueueItem>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!(
                    "SELECT {} FROM replay_queue_items \
                     WHERE endpoint_id = ?1 AND status = 'pending' \
                     ORDER BY position ASC LIMIT ?2",
                    REPLAY_COLUMNS
                ),
                params![endpoint_id, batch_limit],
            )
            .await?;

        let mut pending_batch = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            pending_batch.push(map_row_to_replay_item(&data_row)?);
        }
        Ok(pending_batch)
    }

    /**
     * Transición guardada 'pending -> delivering' con incremento del
     * contador de intentos.
     *
     * # Errors:
     * - `StoreError::ReplayItemNotFound`: la ranura cambió de estado
     *   bajo los pies del drenador (robo evitado).
     */
    pub async fn begin_delivering(&self, item_id: &str) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let rows_affected_count = database_connection
            .execute(
                "UPDATE replay_queue_items SET status = 'delivering', attempts = attempts + 1 \
                 WHERE id = ?1 AND status = 'pending'",
                params![item_id],
            )
            .await?;

        if rows_affected_count == 0 {
            return Err(StoreError::ReplayItemNotFound);
        }
        Ok(())
    }

    /// Sella la ranura como entregada (vía HTTP o por deduplicación).
    pub async fn mark_delivered(&self, item_id: &str) -> Result<(), StoreError> {
        self.seal_status(item_id, ReplayItemStatus::Delivered, Some(Utc::now().to_rfc3339())).await
    }

    /// Presupuesto de salto agotado: la ranura deja de bloquear el drenaje.
    pub async fn mark_skipped(&self, item_id: &str) -> Result<(), StoreError> {
        self.seal_status(item_id, ReplayItemStatus::Skipped, None).await
    }

    /// Fallo semántico terminal (evento desaparecido en vuelo).
    pub async fn mark_failed(&self, item_id: &str) -> Result<(), StoreError> {
        self.seal_status(item_id, ReplayItemStatus::Failed, None).await
    }

    /// Devuelve la ranura al estado pendiente tras un fallo de entrega.
    pub async fn return_to_pending(&self, item_id: &str) -> Result<(), StoreError> {
        self.seal_status(item_id, ReplayItemStatus::Pending, None).await
    }

    pub async fn count_pending(&self, endpoint_id: &str) -> Result<u32, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                "SELECT COUNT(*) FROM replay_queue_items \
                 WHERE endpoint_id = ?1 AND status = 'pending'",
                params![endpoint_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get::<i64>(0)? as u32),
            None => Ok(0),
        }
    }

    /// Ranuras entregadas de un endpoint por posición (auditoría de orden).
    pub async fn list_delivered(
        &self,
        endpoint_id: &str,
    ) -> Result<Vec<ReplayQueueItem>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!(
                    "SELECT {} FROM replay_queue_items \
                     WHERE endpoint_id = ?1 AND status = 'delivered' \
                     ORDER BY position ASC",
                    REPLAY_COLUMNS
                ),
                params![endpoint_id],
            )
            .await?;

        let mut delivered_items = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            delivered_items.push(map_row_to_replay_item(&data_row)?);
        }
        Ok(delivered_items)
    }

    /**
     * Higiene: ranuras atascadas en 'delivering' (drenaje muerto a mitad
     * de vuelo) vuelven a 'pending' para el siguiente drenaje.
     */
    pub async fn reclaim_stale_delivering(
        &self,
        stale_cutoff_rfc3339: &str,
    ) -> Result<u64, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let reclaimed_count = database_connection
            .execute(
                "UPDATE replay_queue_items SET status = 'pending' \
                 WHERE status = 'delivering' AND created_at < ?1",
                params![stale_cutoff_rfc3339],
            )
            .await?;

        Ok(reclaimed_count)
    }

    async fn seal_status(
        &self,
        item_id: &str,
        target_status: ReplayItemStatus,
        delivered_at_rfc3339: Option<String>,
    ) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let rows_affected_count = database_connection
            .execute(
                "UPDATE replay_queue_items SET status = ?1, \
                 delivered_at = COALESCE(?2, delivered_at) WHERE id = ?3",
                params![target_status.as_tag(), delivered_at_rfc3339, item_id],
            )
            .await?;

        if rows_affected_count == 0 {
            return Err(StoreError::ReplayItemNotFound);
        }

        debug!("🎞️ [REPLAY_BUFFER]: Slot {} sealed as '{}'.", item_id, target_status.as_tag());
        Ok(())
    }
}

fn map_row_to_replay_item(data_row: &Row) -> Result<ReplayQueueItem, StoreError> {
    let status_tag: String = data_row.get(5)?;
    let created_at_raw: String = data_row.get(7)?;
    let delivered_at_raw: Option<String> = data_row.get(8)?;

    Ok(ReplayQueueItem {
        id: data_row.get(0)?,
        endpoint_id: data_row.get(1)?,
        event_id: data_row.get(2)?,
        position: data_row.get(3)?,
        correlation_key: data_row.get::<Option<String>>(4)?,
        status: ReplayItemStatus::from_tag(&status_tag)
            .ok_or_else(|| StoreError::MappingError(format!("UNKNOWN_REPLAY_TAG: {}", status_tag)))?,
        attempts: data_row.get::<i64>(6)?.max(0) as u32,
        created_at: parse_ledger_timestamp(&created_at_raw)
            .ok_or_else(|| StoreError::MappingError("CREATED_AT_UNPARSEABLE".into()))?,
        delivered_at: delivered_at_raw.as_deref().and_then(parse_ledger_timestamp),
    })
}
