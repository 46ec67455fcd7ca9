// [libs/infra/db/src/repositories/task_outbox.rs]
/*!
 * =================================================================
 * APARATO: TASK OUTBOX REPOSITORY (V4.0 - DURABLE QUEUE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: COLA DURABLE DE TAREAS CON IDEMPOTENCIA Y TIMERS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. AT-MOST-ONCE ENQUEUE: La restricción UNIQUE sobre la clave de
 *    idempotencia convierte el encolado duplicado en un no-op.
 * 2. EXPLICIT TIMERS: El host no provee entrega diferida; los back-offs
 *    (429/503) son filas con 'next_attempt_at' futuro que el escaneo
 *    del despachador materializa, tal como prescribe el contrato.
 * 3. LEASE RECLAIM: Una tarea 'in_flight' cuyo arrendamiento expira se
 *    devuelve a 'pending' (el proceso murió a mitad de handler).
 *
 * # Mathematical Proof (At-Least-Once + Idempotent Steps):
 * La cola garantiza al-menos-una ejecución por tarea; la idempotencia
 * por paso (claves de entrega (event_id, attempt) y claves de encolado)
 * colapsa las ejecuciones duplicadas en efectos únicos.
 * =================================================================
 */

use crate::errors::StoreError;
use crate::EventLedgerClient;
use chrono::{DateTime, Duration, Utc};
use hookwise_domain_models::TaskTopic;
use libsql::params;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Arrendamiento de una tarea reclamada antes de considerarse zombi.
pub const TASK_LEASE_SECONDS: i64 = 120;
/// Reintentos de infraestructura antes de abandonar una tarea.
pub const TASK_ATTEMPT_CEILING: u32 = 8;

/// Tarea reclamada del Outbox, lista para su despacho.
#[derive(Debug, Clone)]
pub struct OutboxTask {
    pub id: String,
    pub topic: TaskTopic,
    pub payload_json: String,
    pub attempt_count: u32,
}

pub struct TaskOutboxRepository {
    database_client: EventLedgerClient,
}

impl TaskOutboxRepository {
    pub fn new(client: EventLedgerClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Encola una tarea con entrega diferida opcional.
     *
     * # Returns:
     * 'true' si la tarea entró; 'false' si la clave ya existía (no-op).
     */
    #[instrument(skip(self, payload_json), fields(topic = %topic, key = %idempotency_key))]
    pub async fn enqueue(
        &self,
        topic: TaskTopic,
        payload_json: &str,
        idempotency_key: &str,
        delay_ms: u64,
    ) -> Result<bool, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let next_attempt_at = Utc::now() + Duration::milliseconds(delay_ms as i64);

        let rows_affected_count = database_connection
            .execute(
                "INSERT OR IGNORE INTO task_outbox (id, topic, payload_json, idempotency_key, \
                 status, attempt_count, next_attempt_at, created_at) \
                 VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    topic.canonical_name(),
                    payload_json,
                    idempotency_key,
                    next_attempt_at.to_rfc3339(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        if rows_affected_count == 0 {
            debug!("♻️  [OUTBOX]: Enqueue of '{}' absorbed (key already sealed).", idempotency_key);
            return Ok(false);
        }

        debug!("📮 [OUTBOX]: Task '{}' parked (due {}).", idempotency_key, next_attempt_at.to_rfc3339());
        Ok(true)
    }

    /**
     * Redrive del sweeper: si la clave no existe, encola; si existe en
     * cualquier estado no activo, la revive a 'pending'. Cierra el hueco
     * de un handler que terminó sin materializar su efecto.
     */
    #[instrument(skip(self, payload_json), fields(key = %idempotency_key))]
    pub async fn redrive(
        &self,
        topic: TaskTopic,
        payload_json: &str,
        idempotency_key: &str,
    ) -> Result<bool, StoreError> {
        if self.enqueue(topic, payload_json, idempotency_key, 0).await? {
            return Ok(true);
        }

        let database_connection = self.database_client.get_connection()?;

        let rows_affected_count = database_connection
            .execute(
                "UPDATE task_outbox SET status = 'pending', next_attempt_at = ?1, \
                 completed_at = NULL \
                 WHERE idempotency_key = ?2 AND status IN ('completed', 'abandoned')",
                params![Utc::now().to_rfc3339(), idempotency_key],
            )
            .await?;

        if rows_affected_count > 0 {
            info!("🚑 [OUTBOX]: Task '{}' revived for orphan repair.", idempotency_key);
        }
        Ok(rows_affected_count > 0)
    }

    /**
     * Reclama un lote de tareas vencidas, sellándolas 'in_flight' con un
     * arrendamiento. La transacción garantiza que dos despachadores no
     * compartan tarea.
     */
    #[instrument(skip(self))]
    pub async fn claim_due_batch(&self, batch_limit: i64) -> Result<Vec<OutboxTask>, StoreError> {
        let database_connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let database_transaction = database_connection
            .transaction()
            .await
            .map_err(|_| StoreError::TransactionError)?;

        let mut due_query = database_transaction
            .query(
                "SELECT id, topic, payload_json, attempt_count FROM task_outbox \
                 WHERE status = 'pending' AND next_attempt_at <= ?1 \
                 ORDER BY next_attempt_at ASC, created_at ASC LIMIT ?2",
                params![now.to_rfc3339(), batch_limit],
            )
            .await?;

        let mut claimed_tasks = Vec::new();
        while let Some(data_row) = due_query.next().await? {
            let topic_name: String = data_row.get(1)?;

            let Some(topic) = TaskTopic::from_canonical_name(&topic_name) else {
                warn!("🗑️ [OUTBOX]: Unknown topic '{}' abandoned.", topic_name);
                continue;
            };

            claimed_tasks.push(OutboxTask {
                id: data_row.get(0)?,
                topic,
                payload_json: data_row.get(2)?,
                attempt_count: data_row.get::<i64>(3)?.max(0) as u32 + 1,
            });
        }

        let lease_expiry = now + Duration::seconds(TASK_LEASE_SECONDS);
        for claimed_task in &claimed_tasks {
            database_transaction
                .execute(
                    "UPDATE task_outbox SET status = 'in_flight', \
                     attempt_count = attempt_count + 1, next_attempt_at = ?1 \
                     WHERE id = ?2",
                    params![lease_expiry.to_rfc3339(), claimed_task.id.clone()],
                )
                .await?;
        }

        database_transaction.commit().await.map_err(|_| StoreError::TransactionError)?;

        if !claimed_tasks.is_empty() {
            debug!("📬 [OUTBOX]: Claimed {} due task(s).", claimed_tasks.len());
        }
        Ok(claimed_tasks)
    }

    /// Sella la tarea como completada (paso lógico materializado).
    pub async fn mark_completed(&self, task_id: &str) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let rows_affected_count = database_connection
            .execute(
                "UPDATE task_outbox SET status = 'completed', completed_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), task_id],
            )
            .await?;

        if rows_affected_count == 0 {
            return Err(StoreError::TaskNotFound);
        }
        Ok(())
    }

    /**
     * Reprograma una tarea fallida con back-off exponencial acotado, o la
     * abandona al agotar el techo de intentos de infraestructura.
     */
    pub async fn reschedule_after_failure(
        &self,
        task_id: &str,
        attempt_count: u32,
    ) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        if attempt_count >= TASK_ATTEMPT_CEILING {
            warn!("🪦 [OUTBOX]: Task {} abandoned after {} attempts.", task_id, attempt_count);
            database_connection
                .execute(
                    "UPDATE task_outbox SET status = 'abandoned' WHERE id = ?1",
                    params![task_id],
                )
                .await?;
            return Ok(());
        }

        // Back-off exponencial: 2^n segundos, techo de 5 minutos.
        let backoff_seconds = 2i64.saturating_pow(attempt_count).min(300);
        let next_attempt_at = Utc::now() + Duration::seconds(backoff_seconds);

        let rows_affected_count = database_connection
            .execute(
                "UPDATE task_outbox SET status = 'pending', next_attempt_at = ?1 WHERE id = ?2",
                params![next_attempt_at.to_rfc3339(), task_id],
            )
            .await?;

        if rows_affected_count == 0 {
            return Err(StoreError::TaskNotFound);
        }
        Ok(())
    }

    /// Tarea terminada por fallo semántico: no se reintenta jamás.
    pub async fn abandon(&self, task_id: &str) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        database_connection
            .execute("UPDATE task_outbox SET status = 'abandoned' WHERE id = ?1", params![task_id])
            .await?;
        Ok(())
    }

    /**
     * Devuelve a 'pending' las tareas 'in_flight' cuyo arrendamiento
     * expiró (el proceso murió a mitad de handler).
     */
    pub async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let reclaimed_count = database_connection
            .execute(
                "UPDATE task_outbox SET status = 'pending' \
                 WHERE status = 'in_flight' AND next_attempt_at < ?1",
                params![now.to_rfc3339()],
            )
            .await?;

        if reclaimed_count > 0 {
            warn!("♻️  [OUTBOX]: Reclaimed {} zombie task lease(s).", reclaimed_count);
        }
        Ok(reclaimed_count)
    }

    /// Conteo por estado para diagnóstico de la superficie de gestión.
    pub async fn count_with_status(&self, status_tag: &str) -> Result<u32, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                "SELECT COUNT(*) FROM task_outbox WHERE status = ?1",
                params![status_tag],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get::<i64>(0)? as u32),
            None => Ok(0),
        }
    }
}
