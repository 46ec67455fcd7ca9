// [libs/infra/db/src/repositories/delivery.rs]
/*!
 * =================================================================
 * APARATO: DELIVERY REPOSITORY (V3.5 - IDEMPOTENT ATTEMPTS)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: RASTRO DE INTENTOS Y SUSTRATO DE LA VENTANA 20+1
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. IDEMPOTENT INSERT: La restricción UNIQUE(event_id, attempt_number)
 *    convierte el reintento de una tarea ya ejecutada en un no-op,
 *    absorbiendo el at-least-once del sistema de colas.
 * 2. WINDOW SUBSTRATE: Las últimas 20 filas por endpoint SON la ventana
 *    deslizante del disyuntor; la autoridad del endpoint las relee en
 *    cada veredicto.
 * 3. DEDUP ORACLE: Responde si algún evento con el mismo identificador
 *    del proveedor ya fue entregado (supresión en replay).
 * =================================================================
 */

use crate::errors::StoreError;
use crate::repositories::parse_ledger_timestamp;
use crate::EventLedgerClient;
use hookwise_domain_models::{Delivery, DeliveryStatus, FailureKind};
use libsql::{params, Row};
use tracing::{debug, instrument, warn};

const DELIVERY_COLUMNS: &str = "id, event_id, endpoint_id, status, status_code, \
     response_time_ms, response_body_excerpt, error_type, attempt_number, attempted_at, \
     next_retry_at";

pub struct DeliveryRepository {
    database_client: EventLedgerClient,
}

impl DeliveryRepository {
    pub fn new(client: EventLedgerClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Registra un intento de entrega de forma idempotente.
     *
     * # Returns:
     * 'true' si la fila se insertó; 'false' si (event_id, attempt_number)
     * ya existía (reintento del sistema de tareas, absorbido sin ruido).
     */
    #[instrument(skip(self, delivery), fields(event = %delivery.event_id, attempt = delivery.attempt_number))]
    pub async fn insert_attempt(&self, delivery: &Delivery) -> Result<bool, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let rows_affected_count = database_connection
            .execute(
                "INSERT OR IGNORE INTO deliveries (id, event_id, endpoint_id, status, \
                 status_code, response_time_ms, response_body_excerpt, error_type, \
                 attempt_number, attempted_at, next_retry_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    delivery.id.clone(),
                    delivery.event_id.clone(),
                    delivery.endpoint_id.clone(),
                    delivery.status.as_tag(),
                    delivery.status_code.map(i64::from),
                    delivery.response_time_ms.map(|ms| ms as i64),
                    delivery.response_body_excerpt.clone(),
                    delivery.error_kind.map(|kind| kind.as_tag().to_string()),
                    i64::from(delivery.attempt_number),
                    delivery.attempted_at.to_rfc3339(),
                    delivery.next_retry_at.map(|at| at.to_rfc3339())
                ],
            )
            .await?;

        if rows_affected_count == 0 {
            warn!("♻️  [DELIVERY_LEDGER]: Attempt {} for event {} already sealed (idempotent replay).",
                delivery.attempt_number, delivery.event_id);
            return Ok(false);
        }

        debug!("📝 [DELIVERY_LEDGER]: Attempt {} for event {} sealed as '{}'.",
            delivery.attempt_number, delivery.event_id, delivery.status.as_tag());
        Ok(true)
    }

    /**
     * Oráculo de deduplicación: ¿existe alguna entrega 'delivered' para
     * OTRO evento de la misma integración con este identificador del
     * proveedor?
     */
    pub async fn exists_delivered_for_provider_event(
        &self,
        integration_id: &str,
        provider_event_id: &str,
        excluding_event_id: &str,
    ) -> Result<bool, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                "SELECT 1 FROM deliveries d \
                 JOIN events e ON e.id = d.event_id \
                 WHERE e.integration_id = ?1 AND e.provider_event_id = ?2 \
                   AND e.id != ?3 AND d.status = 'delivered' \
                 LIMIT 1",
                params![integration_id, provider_event_id, excluding_event_id],
            )
            .await?;

        Ok(query_results.next().await?.is_some())
    }

    /// Rastro completo de intentos de un evento, ordenado por intento.
    pub async fn list_for_event(&self, event_id: &str) -> Result<Vec<Delivery>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!(
                    "SELECT {} FROM deliveries WHERE event_id = ?1 ORDER BY attempt_number ASC",
                    DELIVERY_COLUMNS
                ),
                params![event_id],
            )
            .await?;

        let mut attempt_trail = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            attempt_trail.push(map_row_to_delivery(&data_row)?);
        }
        Ok(attempt_trail)
    }

    /**
     * Re-sella el estado terminal de una entrega (p.ej. 'failed' ->
     * 'dead_letter' al agotar el bucket de reintento).
     */
    pub async fn seal_terminal_status(
        &self,
        delivery_id: &str,
        terminal_status: DeliveryStatus,
    ) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let rows_affected_count = database_connection
            .execute(
                "UPDATE deliveries SET status = ?1 WHERE id = ?2",
                params![terminal_status.as_tag(), delivery_id],
            )
            .await?;

        if rows_affected_count == 0 {
            return Err(StoreError::MappingError(format!("DELIVERY_VOID: {}", delivery_id)));
        }
        Ok(())
    }
}

fn map_row_to_delivery(data_row: &Row) -> Result<Delivery, StoreError> {
    let status_tag: String = data_row.get(3)?;
    let error_tag: Option<String> = data_row.get(7)?;
    let attempted_at_raw: String = data_row.get(9)?;
    let next_retry_raw: Option<String> = data_row.get(10)?;

    Ok(Delivery {
        id: data_row.get(0)?,
        event_id: data_row.get(1)?,
        endpoint_id: data_row.get::<Option<String>>(2)?,
        status: DeliveryStatus::from_tag(&status_tag)
            .ok_or_else(|| StoreError::MappingError(format!("UNKNOWN_DELIVERY_STATUS: {}", status_tag)))?,
        status_code: data_row.get::<Option<i64>>(4)?.map(|code| code as u16),
        response_time_ms: data_row.get::<Option<i64>>(5)?.map(|ms| ms.max(0) as u64),
        response_body_excerpt: data_row.get::<Option<String>>(6)?,
        error_kind: match error_tag {
            Some(raw_tag) => Some(FailureKind::from_tag(&raw_tag).ok_or_else(|| {
                StoreError::MappingError(format!("UNKNOWN_ERROR_TAG: {}", raw_tag))
            })?),
            None => None,
        },
        attempt_number: data_row.get::<i64>(8)?.max(0) as u32,
        attempted_at: parse_ledger_timestamp(&attempted_at_raw)
            .ok_or_else(|| StoreError::MappingError("ATTEMPTED_AT_UNPARSEABLE".into()))?,
        next_retry_at: next_retry_raw.as_deref().and_then(parse_ledger_timestamp),
    })
}
