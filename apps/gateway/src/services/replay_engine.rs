// [apps/gateway/src/services/replay_engine.rs]
/*!
 * =================================================================
 * APARATO: ORDERED REPLAY ENGINE (V5.2 - ADAPTIVE DRAIN)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: DRENAJE ORDENADO DEL BÚFER TRAS LA RECUPERACIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. POSITION ORDER: Ráfagas de 10 por 'position ASC'; dentro de una
 *    clave de correlación el orden de entrega ES el orden de llegada.
 * 2. ADAPTIVE LADDER: 1 -> 2 -> 5 -> 10 ev/s tras 5 éxitos
 *    consecutivos; CUALQUIER fallo colapsa el ritmo a la base.
 * 3. SKIP AND CONTINUE: Una ranura con el presupuesto agotado se marca
 *    'skipped' y JAMÁS bloquea posiciones posteriores.
 * 4. DEDUP FIRST: Si otro evento con el mismo identificador del
 *    proveedor ya fue entregado, la ranura se sella sin tocar la red.
 *
 * # Mathematical Proof (Bounded Convergence):
 * Cada visita a una ranura incrementa 'attempts' o la sella; con
 * presupuesto 3 el drenaje converge en O(pendientes · 3) intentos o
 * termina antes por reapertura del disyuntor.
 * =================================================================
 */

use crate::services::delivery_worker::{execute_classified_attempt, NOMINAL_DELIVERY_TIMEOUT_MS};
use crate::state::AppState;
use anyhow::Result;
use chrono::Utc;
use hookwise_domain_models::{CircuitState, ReplayStartedSignal};
use hookwise_domain_resilience::replay_rate::{ReplayPacer, REPLAY_BATCH_SIZE, REPLAY_SKIP_BUDGET};
use hookwise_infra_db::StoreError;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct ReplayEngineService {
    application_state: AppState,
}

impl ReplayEngineService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Handler de 'endpoint/replay-started': drena el búfer del endpoint
     * hasta vaciarlo o hasta que el disyuntor re-abra.
     */
    #[instrument(skip(self, signal), fields(endpoint = %signal.endpoint_id))]
    pub async fn handle_replay_started(&self, signal: ReplayStartedSignal) -> Result<()> {
        let endpoint_id = &signal.endpoint_id;
        let mut pacer = ReplayPacer::new();

        let pending_count = self.application_state.replay_repository.count_pending(endpoint_id).await?;
        info!("🎬 [REPLAY]: Drain starting on endpoint {} ({} slot(s) parked).",
            endpoint_id, pending_count);

        'drain: loop {
            // TERMINACIÓN 1: el disyuntor volvió a abrir.
            let endpoint = self.application_state.endpoint_repository.fetch_by_id(endpoint_id).await?;
            self.application_state.refresh_breaker_cache(&endpoint.id, endpoint.circuit_state);

            if endpoint.circuit_state == CircuitState::Open {
                warn!("🛑 [REPLAY]: Circuit re-opened; drain on {} suspended.", endpoint_id);
                break 'drain;
            }

            // TERMINACIÓN 2: búfer vacío.
            let pending_batch = self
                .application_state
                .replay_repository
                .fetch_pending_batch(endpoint_id, REPLAY_BATCH_SIZE as i64)
                .await?;

            if pending_batch.is_empty() {
                info!("🏁 [REPLAY]: Buffer drained on endpoint {}.", endpoint_id);
                break 'drain;
            }

            let integration = self
                .application_state
                .integration_repository
                .fetch_by_id(&endpoint.integration_id)
                .await?;

            for parked_item in pending_batch {
                // 1. RE-CHEQUEO DEL DISYUNTOR (lectura caliente)
                let gate_state = self
                    .application_state
                    .cached_breaker_state(endpoint_id)
                    .unwrap_or(endpoint.circuit_state);
                if gate_state == CircuitState::Open {
                    break 'drain;
                }

                // 2. DEDUPLICACIÓN POR IDENTIDAD DEL PROVEEDOR
                let event = match self
                    .application_state
                    .event_repository
                    .fetch_by_id(&parked_item.event_id)
                    .await
                {
                    Ok(event) => event,
                    Err(StoreError::EventNotFound) => {
                        // Fallo semántico terminal: el evento murió en vuelo.
                        warn!("🗑️ [REPLAY]: Slot {} references vanished event; sealed failed.",
                            parked_item.id);
                        self.application_state.replay_repository.mark_failed(&parked_item.id).await?;
                        continue;
                    }
                    Err(store_fault) => return Err(store_fault.into()),
                };

                if let Some(provider_event_id) = &event.provider_event_id {
                    let already_delivered = self
                        .application_state
                        .delivery_repository
                        .exists_delivered_for_provider_event(
                            &integration.id,
                            provider_event_id,
                            &event.id,
                        )
                        .await?;

                    if already_delivered {
                        info!("♻️  [REPLAY]: Slot {} deduplicated on provider id {}; no HTTP.",
                            parked_item.id, provider_event_id);
                        self.application_state.replay_repository.mark_delivered(&parked_item.id).await?;
                        continue;
                    }
                }

                // 3. PRESUPUESTO DE SALTO
                if parked_item.attempts >= REPLAY_SKIP_BUDGET {
                    warn!("⏭️ [REPLAY]: Slot {} exhausted its budget; skipped (never blocks).",
                        parked_item.id);
                    self.application_state.replay_repository.mark_skipped(&parked_item.id).await?;
                    continue;
                }

                // 4. TRANSICIÓN GUARDADA A 'delivering'
                if self
                    .application_state
                    .replay_repository
                    .begin_delivering(&parked_item.id)
                    .await
                    .is_err()
                {
                    // Otro drenador ganó la ranura.
                    continue;
                }

                // 5. RITMO DE LA ESCALERA VIGENTE
                if let Some(pacing_delay) = pacer.pacing_delay() {
                    tokio::time::sleep(pacing_delay).await;
                }

                // 6-7. REENVÍO CLASIFICADO Y APLICACIÓN DEL VEREDICTO
                let report = execute_classified_attempt(
                    &self.application_state,
                    &event,
                    &integration,
                    Some(&endpoint),
                    parked_item.attempts + 1,
                    Duration::from_millis(NOMINAL_DELIVERY_TIMEOUT_MS),
                    true,
                )
                .await?;

                if report.succeeded {
                    self.application_state.replay_repository.mark_delivered(&parked_item.id).await?;
                    pacer.register_success();
                } else {
                    self.application_state
                        .replay_repository
                        .return_to_pending(&parked_item.id)
                        .await?;
                    pacer.register_failure();

                    if report.breaker_state_after == Some(CircuitState::Open) {
                        warn!("🛑 [REPLAY]: Failure re-opened circuit on {}; drain aborted.",
                            endpoint_id);
                        break 'drain;
                    }
                }
            }
        }

        let drained_at = Utc::now();
        info!("🎞️ [REPLAY]: Drain session on endpoint {} closed at {}.",
            endpoint_id, drained_at.to_rfc3339());
        Ok(())
    }
}
