// [apps/gateway/src/services/health_prober.rs]
/*!
 * =================================================================
 * APARATO: HEALTH PROBER DAEMON (V4.0 - RECOVERY DRIVER)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: SONDEO PERIÓDICO DE DESTINOS CON CIRCUITO ABIERTO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RECOVERY PATH: Es el ÚNICO camino de OPEN a HALF_OPEN: tres
 *    sondeos exitosos consecutivos promueven el endpoint.
 * 2. EXACTLY-ONCE IGNITION: La señal 'endpoint/replay-started' se
 *    emite una sola vez por transición, anclada al sello temporal del
 *    cambio de estado mediante la clave de idempotencia del Outbox.
 * 3. PARALLEL SWEEP: Los destinos se sondean en ráfaga concurrente;
 *    un destino lento jamás retrasa el diagnóstico de los demás.
 * =================================================================
 */

use crate::state::AppState;
use anyhow::Result;
use futures::future::join_all;
use hookwise_domain_models::{Endpoint, ReplayStartedSignal, TaskTopic};
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Cadencia del barrido de sondeo.
const PROBE_SWEEP_INTERVAL_SECONDS: u64 = 60;

pub struct HealthProberService {
    application_state: AppState,
}

impl HealthProberService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Bucle perpetuo del sondeador en el reactor de Tokio.
     */
    pub async fn spawn_prober_daemon(self) {
        let mut probe_ticker = interval(Duration::from_secs(PROBE_SWEEP_INTERVAL_SECONDS));
        info!("🩺 [PROBER]: Health recovery daemon initiated (60s cadence).");

        loop {
            probe_ticker.tick().await;

            if let Err(sweep_fault) = self.execute_probe_sweep().await {
                error!("❌ [PROBER_FAULT]: Sweep collapsed: {}", sweep_fault);
            }
        }
    }

    /**
     * Un barrido completo: enumera endpoints OPEN y los sondea en ráfaga.
     */
    #[instrument(skip(self))]
    pub async fn execute_probe_sweep(&self) -> Result<()> {
        let open_endpoints = self
            .application_state
            .endpoint_repository
            .list_by_state(hookwise_domain_models::CircuitState::Open)
            .await?;

        if open_endpoints.is_empty() {
            debug!("💤 [PROBER]: No open circuits to probe.");
            return Ok(());
        }

        info!("🔦 [PROBER]: Probing {} open circuit(s)...", open_endpoints.len());

        // Orquestación de ráfaga concurrente (un destino lento no bloquea).
        let probe_tasks = open_endpoints
            .into_iter()
            .map(|endpoint| self.probe_single_endpoint(endpoint));

        for probe_result in join_all(probe_tasks).await {
            if let Err(probe_fault) = probe_result {
                warn!("⚠️ [PROBER]: Individual probe failed: {}", probe_fault);
            }
        }

        Ok(())
    }

    /// Sondea un endpoint y aplica el resultado a la autoridad del disyuntor.
    async fn probe_single_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        let integration = self
            .application_state
            .integration_repository
            .fetch_by_id(&endpoint.integration_id)
            .await?;

        // 1. SONDEO FÍSICO (HEAD con respaldo GET, 2xx = éxito)
        let probe_success = self
            .application_state
            .probe_engine
            .probe_destination(&integration.destination_url)
            .await;

        // 2. APLICACIÓN DEL RESULTADO (ignorado salvo estado OPEN)
        let (verdict, refreshed_endpoint) = self
            .application_state
            .endpoint_repository
            .record_probe_outcome(&endpoint.id, probe_success)
            .await?;

        self.application_state
            .refresh_breaker_cache(&endpoint.id, refreshed_endpoint.circuit_state);

        // 3. IGNICIÓN DEL REPLAY (exactamente una vez por transición)
        if verdict.replay_should_start() {
            let signal = ReplayStartedSignal {
                endpoint_id: endpoint.id.clone(),
                integration_id: endpoint.integration_id.clone(),
            };

            let idempotency_key =
                signal.idempotency_key(&refreshed_endpoint.state_changed_at.to_rfc3339());

            self.application_state
                .task_outbox
                .enqueue(
                    TaskTopic::EndpointReplayStarted,
                    &serde_json::to_string(&signal)?,
                    &idempotency_key,
                    0,
                )
                .await?;
            self.application_state.task_wake_signal.notify_one();

            info!("🌅 [PROBER]: Endpoint {} promoted to HALF_OPEN; replay ignition parked.",
                endpoint.id);
        }

        Ok(())
    }
}
