// [libs/infra/db/src/repositories/endpoint.rs]
/*!
 * =================================================================
 * APARATO: ENDPOINT REPOSITORY (V5.0 - BREAKER AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: AUTORIDAD ÚNICA DE MUTACIÓN DEL DISYUNTOR
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CAS SERIALIZATION: Toda mutación read-modify-write sobre la fila
 *    del endpoint (recordDelivery, recordHealthCheck, asignación de
 *    posiciones de replay) se serializa mediante compare-and-swap sobre
 *    'lock_version', el equivalente al cerrojo de fila exigido por el
 *    contrato en motores sin SELECT FOR UPDATE.
 * 2. DERIVED TRUTH: La ventana deslizante se recalcula desde las
 *    últimas 20 filas de 'deliveries' en cada escritura; el disyuntor
 *    es crash-safe porque su verdad vive en la tabla de entregas.
 * 3. PURE VERDICTS: La tabla de transiciones vive en el estrato L2
 *    ('hookwise-domain-resilience'); aquí solo se aplica su veredicto.
 *
 * # Mathematical Proof (Transactional Exclusivity):
 * Dos escritores concurrentes leen la misma 'lock_version' pero solo
 * uno logra el UPDATE condicionado; el perdedor relee y recalcula, por
 * lo que jamás se pierde una muestra ni se duplica una transición.
 * =================================================================
 */

use crate::errors::StoreError;
use crate::repositories::parse_ledger_timestamp;
use crate::EventLedgerClient;
use chrono::Utc;
use hookwise_domain_models::{CircuitState, Endpoint};
use hookwise_domain_resilience::breaker::BreakerCell;
use hookwise_domain_resilience::window::{DeliverySample, WINDOW_CAPACITY};
use hookwise_domain_resilience::{DeliveryVerdict, ProbeVerdict};
use libsql::{params, Connection, Row};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const ENDPOINT_COLUMNS: &str = "id, integration_id, circuit_state, success_rate_percent, \
     average_response_time_ms, consecutive_failures, consecutive_successes, \
     consecutive_probe_successes, last_probe_at, state_changed_at, lock_version, created_at";

/// Reintentos del compare-and-swap antes de declarar contención agotada.
const CAS_RETRY_LIMIT: usize = 8;

pub struct EndpointRepository {
    database_client: EventLedgerClient,
}

impl EndpointRepository {
    pub fn new(client: EventLedgerClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Garantiza el endpoint 1:1 de una integración (creación perezosa).
     */
    #[instrument(skip(self))]
    pub async fn ensure_for_integration(&self, integration_id: &str) -> Result<Endpoint, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        database_connection
            .execute(
                "INSERT OR IGNORE INTO endpoints (id, integration_id, state_changed_at, created_at) \
                 VALUES (?1, ?2, ?3, ?3)",
                params![Uuid::new_v4().to_string(), integration_id, Utc::now().to_rfc3339()],
            )
            .await?;

        self.fetch_by_integration(integration_id)
            .await?
            .ok_or(StoreError::EndpointNotFound)
    }

    pub async fn fetch_by_id(&self, endpoint_id: &str) -> Result<Endpoint, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!("SELECT {} FROM endpoints WHERE id = ?1", ENDPOINT_COLUMNS),
                params![endpoint_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => map_row_to_endpoint(&data_row),
            None => Err(StoreError::EndpointNotFound),
        }
    }

    /// El worker consulta por integración; la ausencia NO es un error
    /// (entrega directa sin disyuntor para rastros pre-endpoint).
    pub async fn fetch_by_integration(
        &self,
        integration_id: &str,
    ) -> Result<Option<Endpoint>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!("SELECT {} FROM endpoints WHERE integration_id = ?1", ENDPOINT_COLUMNS),
                params![integration_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(map_row_to_endpoint(&data_row)?)),
            None => Ok(None),
        }
    }

    /// Enumeración por estado (el sondeador consume los OPEN).
    pub async fn list_by_state(&self, state: CircuitState) -> Result<Vec<Endpoint>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!(
                    "SELECT {} FROM endpoints WHERE circuit_state = ?1 ORDER BY state_changed_at ASC",
                    ENDPOINT_COLUMNS
                ),
                params![state.as_tag()],
            )
            .await?;

        let mut matching_endpoints = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            matching_endpoints.push(map_row_to_endpoint(&data_row)?);
        }
        Ok(matching_endpoints)
    }

    /**
     * recordDelivery: registra el resultado de una entrega, recalcula la
     * ventana 20+1 y aplica la tabla de transiciones, todo bajo CAS.
     *
     * @param exclude_delivery_id La fila de entrega recién persistida se
     * excluye de la ventana histórica (es la muestra entrante).
     *
     * # Returns:
     * El veredicto (prev, next, contadores) y el endpoint refrescado.
     */
    #[instrument(skip(self, incoming_sample, exclude_delivery_id))]
    pub async fn record_delivery_outcome(
        &self,
        endpoint_id: &str,
        incoming_sample: DeliverySample,
        exclude_delivery_id: Option<&str>,
    ) -> Result<(DeliveryVerdict, Endpoint), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        for _contention_round in 0..CAS_RETRY_LIMIT {
            // 1. LECTURA DE LA CÉLULA VIGENTE
            let current_endpoint = self.fetch_by_id(endpoint_id).await?;
            let current_cell = cell_of(&current_endpoint);

            // 2. RECONSTRUCCIÓN DE LA VENTANA DESDE EL LEDGER
            let window_samples = load_window_samples(
                &database_connection,
                endpoint_id,
                exclude_delivery_id,
            )
            .await?;

            // 3. VEREDICTO PURO (ESTRATO L2)
            let verdict = current_cell.register_delivery(&window_samples, incoming_sample);

            let state_changed_at = if verdict.transitioned() {
                Utc::now()
            } else {
                current_endpoint.state_changed_at
            };

            // 4. APLICACIÓN CONDICIONADA (COMPARE-AND-SWAP)
            let rows_affected_count = database_connection
                .execute(
                    "UPDATE endpoints SET circuit_state = ?1, success_rate_percent = ?2, \
                     average_response_time_ms = ?3, consecutive_failures = ?4, \
                     consecutive_successes = ?5, consecutive_probe_successes = ?6, \
                     state_changed_at = ?7, lock_version = lock_version + 1 \
                     WHERE id = ?8 AND lock_version = ?9",
                    params![
                        verdict.next_state.as_tag(),
                        verdict.window.success_rate_percent,
                        verdict.window.average_response_time_ms,
                        i64::from(verdict.cell.consecutive_failures),
                        i64::from(verdict.cell.consecutive_successes),
                        i64::from(verdict.cell.consecutive_probe_successes),
                        state_changed_at.to_rfc3339(),
                        endpoint_id,
                        current_endpoint.lock_version
                    ],
                )
                .await?;

            if rows_affected_count == 1 {
                if verdict.transitioned() {
                    info!("🔀 [BREAKER]: Endpoint {} transitioned {} -> {}.",
                        endpoint_id, verdict.previous_state, verdict.next_state);
                }
                let refreshed_endpoint = self.fetch_by_id(endpoint_id).await?;
                return Ok((verdict, refreshed_endpoint));
            }

            debug!("🔁 [BREAKER_CAS]: Version conflict on endpoint {}; re-deriving.", endpoint_id);
        }

        warn!("⛔ [BREAKER_CAS]: Contention exhausted on endpoint {}.", endpoint_id);
        Err(StoreError::ContentionExhausted)
    }

    /**
     * recordHealthCheck: registra el resultado de un sondeo. El dominio
     * ignora el resultado salvo en estado OPEN; 'last_probe_at' se sella
     * siempre.
     */
    #[instrument(skip(self))]
    pub async fn record_probe_outcome(
        &self,
        endpoint_id: &str,
        probe_success: bool,
    ) -> Result<(ProbeVerdict, Endpoint), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        for _contention_round in 0..CAS_RETRY_LIMIT {
            let current_endpoint = self.fetch_by_id(endpoint_id).await?;
            let current_cell = cell_of(&current_endpoint);

            let verdict = current_cell.register_health_probe(probe_success);

            let transitioned = verdict.previous_state != verdict.next_state;
            let state_changed_at = if transitioned {
                Utc::now()
            } else {
                current_endpoint.state_changed_at
            };

            let rows_affected_count = database_connection
                .execute(
                    "UPDATE endpoints SET circuit_state = ?1, consecutive_failures = ?2, \
                     consecutive_successes = ?3, consecutive_probe_successes = ?4, \
                     last_probe_at = ?5, state_changed_at = ?6, lock_version = lock_version + 1 \
                     WHERE id = ?7 AND lock_version = ?8",
                    params![
                        verdict.next_state.as_tag(),
                        i64::from(verdict.cell.consecutive_failures),
                        i64::from(verdict.cell.consecutive_successes),
                        i64::from(verdict.cell.consecutive_probe_successes),
                        Utc::now().to_rfc3339(),
                        state_changed_at.to_rfc3339(),
                        endpoint_id,
                        current_endpoint.lock_version
                    ],
                )
                .await?;

            if rows_affected_count == 1 {
                if transitioned {
                    info!("🩺 [BREAKER]: Probe moved endpoint {} from {} to {}.",
                        endpoint_id, verdict.previous_state, verdict.next_state);
                }
                let refreshed_endpoint = self.fetch_by_id(endpoint_id).await?;
                return Ok((verdict, refreshed_endpoint));
            }
        }

        Err(StoreError::ContentionExhausted)
    }

    /**
     * enqueueForReplay: asigna posición MAX+1 e inserta la ranura, con la
     * adquisición CAS del endpoint dentro de la misma transacción para
     * serializar encolados concurrentes.
     */
    #[instrument(skip(self, correlation_key))]
    pub async fn enqueue_for_replay(
        &self,
        endpoint_id: &str,
        event_id: &str,
        correlation_key: Option<&str>,
    ) -> Result<i64, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        for _contention_round in 0..CAS_RETRY_LIMIT {
            let current_endpoint = self.fetch_by_id(endpoint_id).await?;

            let database_transaction = database_connection
                .transaction()
                .await
                .map_err(|_| StoreError::TransactionError)?;

            // 1. ADQUISICIÓN DEL CERROJO LÓGICO (CAS en transacción)
            let lock_acquired = database_transaction
                .execute(
                    "UPDATE endpoints SET lock_version = lock_version + 1 \
                     WHERE id = ?1 AND lock_version = ?2",
                    params![endpoint_id, current_endpoint.lock_version],
                )
                .await?;

            if lock_acquired == 0 {
                // Otro escritor ganó la versión; se reintenta desde cero.
                continue;
            }

            // 2. ASIGNACIÓN MONOTÓNICA DE POSICIÓN (MAX + 1)
            let mut position_query = database_transaction
                .query(
                    "SELECT COALESCE(MAX(position), 0) + 1 FROM replay_queue_items \
                     WHERE endpoint_id = ?1",
                    params![endpoint_id],
                )
                .await?;

            let allocated_position: i64 = match position_query.next().await? {
                Some(data_row) => data_row.get(0)?,
                None => 1,
            };

            // 3. CRISTALIZACIÓN DE LA RANURA
            database_transaction
                .execute(
                    "INSERT INTO replay_queue_items (id, endpoint_id, event_id, position, \
                     correlation_key, status, attempts, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6)",
                    params![
                        Uuid::new_v4().to_string(),
                        endpoint_id,
                        event_id,
                        allocated_position,
                        correlation_key.map(str::to_string),
                        Utc::now().to_rfc3339()
                    ],
                )
                .await?;

            database_transaction.commit().await.map_err(|_| StoreError::TransactionError)?;

            info!("📦 [REPLAY_BUFFER]: Event {} parked at position {} for endpoint {}.",
                event_id, allocated_position, endpoint_id);
            return Ok(allocated_position);
        }

        Err(StoreError::ContentionExhausted)
    }

    /**
     * Apertura forzada por fallo terminal ('should_open_circuit' del
     * clasificador: ssl / connection_refused). No espera rachas.
     *
     * # Returns:
     * El estado previo y el endpoint refrescado (no-op si ya estaba OPEN).
     */
    #[instrument(skip(self))]
    pub async fn force_open(
        &self,
        endpoint_id: &str,
    ) -> Result<(CircuitState, Endpoint), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        for _contention_round in 0..CAS_RETRY_LIMIT {
            let current_endpoint = self.fetch_by_id(endpoint_id).await?;

            if current_endpoint.circuit_state == CircuitState::Open {
                return Ok((CircuitState::Open, current_endpoint));
            }

            // Higiene de contadores de llegada a OPEN: solo el sondeo de
            // salud cuenta a partir de aquí.
            let rows_affected_count = database_connection
                .execute(
                    "UPDATE endpoints SET circuit_state = 'open', consecutive_successes = 0, \
                     consecutive_probe_successes = 0, state_changed_at = ?1, \
                     lock_version = lock_version + 1 \
                     WHERE id = ?2 AND lock_version = ?3",
                    params![Utc::now().to_rfc3339(), endpoint_id, current_endpoint.lock_version],
                )
                .await?;

            if rows_affected_count == 1 {
                info!("⚡ [BREAKER]: Endpoint {} force-opened ({} -> open) on terminal fault.",
                    endpoint_id, current_endpoint.circuit_state);
                let refreshed_endpoint = self.fetch_by_id(endpoint_id).await?;
                return Ok((current_endpoint.circuit_state, refreshed_endpoint));
            }
        }

        Err(StoreError::ContentionExhausted)
    }

    /// getNextReplayPosition: lectura sin cerrojo de la siguiente posición.
    pub async fn next_replay_position(&self, endpoint_id: &str) -> Result<i64, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut position_query = database_connection
            .query(
                "SELECT COALESCE(MAX(position), 0) + 1 FROM replay_queue_items \
                 WHERE endpoint_id = ?1",
                params![endpoint_id],
            )
            .await?;

        match position_query.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Ok(1),
        }
    }
}

/// Proyección de la fila del endpoint a la célula pura del dominio.
fn cell_of(endpoint: &Endpoint) -> BreakerCell {
    BreakerCell {
        state: endpoint.circuit_state,
        consecutive_failures: endpoint.consecutive_failures,
        consecutive_successes: endpoint.consecutive_successes,
        consecutive_probe_successes: endpoint.consecutive_probe_successes,
    }
}

/// Ventana histórica del endpoint (máximo 20, más recientes primero).
async fn load_window_samples(
    database_connection: &Connection,
    endpoint_id: &str,
    exclude_delivery_id: Option<&str>,
) -> Result<Vec<DeliverySample>, StoreError> {
    let mut query_results = database_connection
        .query(
            "SELECT status, response_time_ms FROM deliveries \
             WHERE endpoint_id = ?1 AND id != COALESCE(?2, '') \
             ORDER BY attempted_at DESC, attempt_number DESC LIMIT ?3",
            params![endpoint_id, exclude_delivery_id.map(str::to_string), WINDOW_CAPACITY as i64],
        )
        .await?;

    let mut window_samples = Vec::with_capacity(WINDOW_CAPACITY);
    while let Some(data_row) = query_results.next().await? {
        let status_tag: String = data_row.get(0)?;
        let response_time_ms = data_row.get::<Option<i64>>(1)?.unwrap_or(0).max(0) as u64;

        window_samples.push(DeliverySample { success: status_tag == "delivered", response_time_ms });
    }
    Ok(window_samples)
}

fn map_row_to_endpoint(data_row: &Row) -> Result<Endpoint, StoreError> {
    let state_tag: String = data_row.get(2)?;
    let last_probe_raw: Option<String> = data_row.get(8)?;
    let state_changed_raw: String = data_row.get(9)?;
    let created_at_raw: String = data_row.get(11)?;

    Ok(Endpoint {
        id: data_row.get(0)?,
        integration_id: data_row.get(1)?,
        circuit_state: CircuitState::from_tag(&state_tag)
            .ok_or_else(|| StoreError::MappingError(format!("UNKNOWN_CIRCUIT_TAG: {}", state_tag)))?,
        success_rate_percent: data_row.get::<f64>(3)?,
        average_response_time_ms: data_row.get::<f64>(4)?,
        consecutive_failures: data_row.get::<i64>(5)?.max(0) as u32,
        consecutive_successes: data_row.get::<i64>(6)?.max(0) as u32,
        consecutive_probe_successes: data_row.get::<i64>(7)?.max(0) as u32,
        last_probe_at: last_probe_raw.as_deref().and_then(parse_ledger_timestamp),
        state_changed_at: parse_ledger_timestamp(&state_changed_raw)
            .ok_or_else(|| StoreError::MappingError("STATE_CHANGED_AT_UNPARSEABLE".into()))?,
        lock_version: data_row.get(10)?,
        created_at: parse_ledger_timestamp(&created_at_raw)
            .ok_or_else(|| StoreError::MappingError("CREATED_AT_UNPARSEABLE".into()))?,
    })
}
