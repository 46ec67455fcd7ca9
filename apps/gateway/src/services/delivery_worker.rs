// [apps/gateway/src/services/delivery_worker.rs]
/*!
 * =================================================================
 * APARATO: SMART DELIVERY WORKER (V5.1 - CLASSIFIED RETRY)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: PIPELINE DE ENTREGA GATEADO POR EL DISYUNTOR
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. BREAKER GATE: OPEN aparca en el búfer de replay; HALF_OPEN entrega
 *    a 1 ev/s por endpoint; CLOSED entrega de inmediato.
 * 2. ONE RETRY PER BUCKET: El fan-out de reintento ocurre solo en la
 *    vía primaria; el handler de 'webhook/retry' repite el intento con
 *    su plazo y número, sin volver a ramificar.
 * 3. TERMINAL TRIAGE: 'ssl' y 'connection_refused' sellan la entrega
 *    como dead_letter y fuerzan la apertura del disyuntor; la
 *    recuperación llega por el sondeo de salud.
 *
 * # Mathematical Proof (Idempotent Samples):
 * La fila de entrega se inserta ANTES de 'recordDelivery' y se excluye
 * de la ventana histórica como muestra entrante; un reintento del
 * sistema de tareas detecta la fila ya sellada y NO vuelve a muestrear,
 * por lo que (event_id, attempt_number) contribuye exactamente una vez.
 * =================================================================
 */

use crate::state::AppState;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use hookwise_domain_models::{
    CircuitOpenedSignal, CircuitState, Delivery, DeliveryStatus, Endpoint, Event, FailureKind,
    FlowStepCompletedSignal, Integration, TaskTopic, WebhookReceivedDirective,
    WebhookRetryDirective,
};
use hookwise_domain_resilience::replay_rate::REPLAY_SKIP_BUDGET;
use hookwise_domain_resilience::window::DeliverySample;
use hookwise_domain_resilience::{classify_outcome, FailureAssessment};
use hookwise_domain_signature::correlation::derive_correlation_key;
use hookwise_infra_dispatch::ForwardDirective;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Plazo nominal del transporte de entrega.
pub const NOMINAL_DELIVERY_TIMEOUT_MS: u64 = 5_000;
/// Plazo duplicado para el reintento posterior a un timeout.
pub const TIMEOUT_RETRY_TIMEOUT_MS: u64 = 10_000;

/// Desenlace de un intento ya clasificado y registrado.
pub(crate) struct AttemptReport {
    pub delivery_id: String,
    pub succeeded: bool,
    /// Veredicto del clasificador (None en éxito o duplicado absorbido).
    pub assessment: Option<FailureAssessment>,
    /// Estado del disyuntor tras aplicar la muestra (None sin endpoint).
    pub breaker_state_after: Option<CircuitState>,
    /// El sistema de tareas repitió un intento ya sellado (no-op).
    pub absorbed_duplicate: bool,
}

pub struct DeliveryWorkerService {
    application_state: AppState,
}

impl DeliveryWorkerService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Handler de 'webhook/received': el pipeline completo §4.G.
     */
    #[instrument(skip(self, directive), fields(event = %directive.event_id))]
    pub async fn handle_webhook_received(
        &self,
        directive: WebhookReceivedDirective,
    ) -> Result<()> {
        // 1. HIDRATACIÓN DEL CONTEXTO DE ENTREGA
        let event = self.application_state.event_repository.fetch_by_id(&directive.event_id).await?;
        let integration =
            self.application_state.integration_repository.fetch_by_id(&directive.integration_id).await?;
        let endpoint =
            self.application_state.endpoint_repository.fetch_by_integration(&integration.id).await?;

        // 2. COMPUERTA DEL DISYUNTOR
        if let Some(endpoint) = &endpoint {
            self.application_state.refresh_breaker_cache(&endpoint.id, endpoint.circuit_state);

            match endpoint.circuit_state {
                CircuitState::Open => {
                    // El destino está caído: la entrega se aparca en orden.
                    let correlation_key =
                        derive_correlation_key(integration.provider, &event.payload);
                    let parked_position = self
                        .application_state
                        .endpoint_repository
                        .enqueue_for_replay(&endpoint.id, &event.id, correlation_key.as_deref())
                        .await?;

                    info!("📦 [WORKER]: Circuit OPEN; event {} queued at position {}.",
                        event.id, parked_position);
                    return Ok(());
                }
                CircuitState::HalfOpen => {
                    // Probatoria: 1 ev/s por endpoint mediante token de ritmo.
                    let pacing_delay = self.application_state.acquire_half_open_slot(&endpoint.id);
                    if !pacing_delay.is_zero() {
                        debug!("🐢 [WORKER]: Half-open throttle; sleeping {:?}.", pacing_delay);
                        tokio::time::sleep(pacing_delay).await;
                    }
                }
                CircuitState::Closed => {}
            }
        }

        // 3-6. INTENTO PRIMARIO CLASIFICADO
        let report = execute_classified_attempt(
            &self.application_state,
            &event,
            &integration,
            endpoint.as_ref(),
            1,
            Duration::from_millis(NOMINAL_DELIVERY_TIMEOUT_MS),
            false,
        )
        .await?;

        if report.absorbed_duplicate || report.succeeded {
            return Ok(());
        }

        // 7. FAN-OUT DE REINTENTO (exclusivo de la vía primaria)
        if let Some(assessment) = report.assessment {
            if assessment.should_retry {
                self.schedule_single_retry(&directive, assessment).await?;
            }
        }

        Ok(())
    }

    /**
     * Handler de 'webhook/retry': repite los pasos 3-6 con el número de
     * intento y plazo de la directiva, SIN volver a ramificar.
     */
    #[instrument(skip(self, directive), fields(event = %directive.event_id, attempt = directive.attempt_number))]
    pub async fn handle_webhook_retry(&self, directive: WebhookRetryDirective) -> Result<()> {
        let event = self.application_state.event_repository.fetch_by_id(&directive.event_id).await?;
        let integration =
            self.application_state.integration_repository.fetch_by_id(&directive.integration_id).await?;
        let endpoint =
            self.application_state.endpoint_repository.fetch_by_integration(&integration.id).await?;

        let report = execute_classified_attempt(
            &self.application_state,
            &event,
            &integration,
            endpoint.as_ref(),
            directive.attempt_number,
            Duration::from_millis(directive.timeout_ms),
            false,
        )
        .await?;

        if !report.succeeded && !report.absorbed_duplicate {
            info!("🪦 [WORKER]: Retry bucket exhausted for event {}; attempt trail sealed.",
                directive.event_id);
        }
        Ok(())
    }

    /// Programa el único reintento del bucket según el veredicto 4.E.
    async fn schedule_single_retry(
        &self,
        directive: &WebhookReceivedDirective,
        assessment: FailureAssessment,
    ) -> Result<()> {
        let retry_timeout_ms = if assessment.error_kind == FailureKind::Timeout {
            TIMEOUT_RETRY_TIMEOUT_MS
        } else {
            NOMINAL_DELIVERY_TIMEOUT_MS
        };

        let retry_directive = WebhookRetryDirective {
            event_id: directive.event_id.clone(),
            integration_id: directive.integration_id.clone(),
            destination_url: directive.destination_url.clone(),
            attempt_number: 2,
            timeout_ms: retry_timeout_ms,
        };

        let retry_delay_ms = assessment.retry_delay_ms.unwrap_or(0);

        self.application_state
            .task_outbox
            .enqueue(
                TaskTopic::WebhookRetry,
                &serde_json::to_string(&retry_directive)?,
                &retry_directive.idempotency_key(),
                retry_delay_ms,
            )
            .await?;
        self.application_state.task_wake_signal.notify_one();

        info!("🔁 [WORKER]: Retry for event {} parked ({}ms delay, {}ms deadline).",
            directive.event_id, retry_delay_ms, retry_timeout_ms);
        Ok(())
    }
}

/**
 * Núcleo compartido de los pasos 3-6 del §4.G: transporte, clasificación,
 * sellado idempotente de la entrega y aplicación del veredicto del
 * disyuntor. Usado por la vía primaria, el reintento y el replay.
 */
pub(crate) async fn execute_classified_attempt(
    application_state: &AppState,
    event: &Event,
    integration: &Integration,
    endpoint: Option<&Endpoint>,
    attempt_number: u32,
    transport_timeout: Duration,
    is_replay: bool,
) -> Result<AttemptReport> {
    // 3. POST DEL PAYLOAD CANÓNICO
    let forward_directive = ForwardDirective {
        destination_url: integration.destination_url.clone(),
        event_id: event.id.clone(),
        integration_id: integration.id.clone(),
        body_bytes: event.canonical_body(),
        retry_count: (attempt_number > 1).then(|| attempt_number - 1),
        is_replay,
        timeout: transport_timeout,
    };

    let outcome = application_state.delivery_transport.forward_event(&forward_directive).await;
    let succeeded = outcome.is_success();

    // 4-5. CLASIFICACIÓN Y SELLADO DE LA ENTREGA
    let assessment = (!succeeded).then(|| {
        classify_outcome(
            outcome.status_code,
            outcome.transport_error.as_deref(),
            outcome.retry_after_header.as_deref(),
        )
    });

    let delivery_status =
        resolve_terminal_status(succeeded, attempt_number, assessment.as_ref(), is_replay);

    // El siguiente reintento solo existe en la vía primaria no-replay.
    let next_retry_at = match assessment.as_ref() {
        Some(a) if !is_replay && attempt_number == 1 && a.should_retry => {
            Some(Utc::now() + ChronoDuration::milliseconds(a.retry_delay_ms.unwrap_or(0) as i64))
        }
        _ => None,
    };

    let delivery = Delivery {
        id: Uuid::new_v4().to_string(),
        event_id: event.id.clone(),
        endpoint_id: endpoint.map(|e| e.id.clone()),
        status: delivery_status,
        status_code: outcome.status_code,
        response_time_ms: Some(outcome.response_time_ms),
        response_body_excerpt: outcome.response_body_excerpt.clone(),
        error_kind: assessment.as_ref().map(|a| a.error_kind),
        attempt_number,
        attempted_at: Utc::now(),
        next_retry_at,
    };

    let freshly_sealed = application_state.delivery_repository.insert_attempt(&delivery).await?;
    if !freshly_sealed {
        // Reintento del sistema de colas sobre un paso ya materializado.
        return Ok(AttemptReport {
            delivery_id: delivery.id,
            succeeded,
            assessment: None,
            breaker_state_after: endpoint.map(|e| e.circuit_state),
            absorbed_duplicate: true,
        });
    }

    // 6. APLICACIÓN DE LA MUESTRA AL DISYUNTOR
    let mut breaker_state_after = None;

    if let Some(endpoint) = endpoint {
        let incoming_sample =
            DeliverySample { success: succeeded, response_time_ms: outcome.response_time_ms };

        let (verdict, refreshed_endpoint) = application_state
            .endpoint_repository
            .record_delivery_outcome(&endpoint.id, incoming_sample, Some(&delivery.id))
            .await?;

        let mut circuit_just_opened = verdict.opened();
        let mut current_endpoint = refreshed_endpoint;

        // Los fallos terminales fuerzan la apertura sin esperar rachas.
        if let Some(assessment) = assessment.as_ref() {
            if assessment.should_open_circuit
                && current_endpoint.circuit_state != CircuitState::Open
            {
                let (previous_state, forced_endpoint) = application_state
                    .endpoint_repository
                    .force_open(&endpoint.id)
                    .await?;
                circuit_just_opened = previous_state != CircuitState::Open;
                current_endpoint = forced_endpoint;
            }
        }

        application_state.refresh_breaker_cache(&endpoint.id, current_endpoint.circuit_state);
        breaker_state_after = Some(current_endpoint.circuit_state);

        if circuit_just_opened {
            emit_circuit_opened_signal(application_state, &current_endpoint).await;
        }
    }

    // 8. SEÑAL BEST-EFFORT HACIA EL RASTREADOR DE FLUJOS
    if succeeded {
        emit_flow_step_signal(application_state, event, integration).await;
    } else if let Some(assessment) = assessment.as_ref() {
        warn!("📉 [WORKER]: Attempt {} for event {} classified as '{}' (retry: {}).",
            attempt_number, event.id, assessment.error_kind.as_tag(), assessment.should_retry);
    }

    Ok(AttemptReport {
        delivery_id: delivery.id,
        succeeded,
        assessment,
        breaker_state_after,
        absorbed_duplicate: false,
    })
}

/// Estado terminal de la fila de entrega: 'dead_letter' cuando ningún
/// intento automático (reintento o replay) seguirá a este.
fn resolve_terminal_status(
    succeeded: bool,
    attempt_number: u32,
    assessment: Option<&FailureAssessment>,
    is_replay: bool,
) -> DeliveryStatus {
    if succeeded {
        return DeliveryStatus::Delivered;
    }

    let terminal_kind = assessment.is_some_and(|a| !a.should_retry);

    if is_replay {
        // En replay el presupuesto de saltos gobierna la continuidad.
        if terminal_kind || attempt_number >= REPLAY_SKIP_BUDGET {
            DeliveryStatus::DeadLetter
        } else {
            DeliveryStatus::Failed
        }
    } else if !terminal_kind && attempt_number < 2 {
        DeliveryStatus::Failed
    } else {
        DeliveryStatus::DeadLetter
    }
}

/// Emisión 'endpoint/circuit-opened': Outbox (observadores durables) con
/// clave anclada al sello de transición (exactamente una por apertura).
async fn emit_circuit_opened_signal(application_state: &AppState, endpoint: &Endpoint) {
    let signal = CircuitOpenedSignal {
        endpoint_id: endpoint.id.clone(),
        integration_id: endpoint.integration_id.clone(),
    };

    let idempotency_key = signal.idempotency_key(&endpoint.state_changed_at.to_rfc3339());
    let payload_json = match serde_json::to_string(&signal) {
        Ok(payload) => payload,
        Err(serialization_fault) => {
            warn!("⚠️ [WORKER]: Circuit-opened envelope collapsed: {}", serialization_fault);
            return;
        }
    };

    if let Err(enqueue_fault) = application_state
        .task_outbox
        .enqueue(TaskTopic::EndpointCircuitOpened, &payload_json, &idempotency_key, 0)
        .await
    {
        warn!("⚠️ [WORKER]: Circuit-opened signal not parked: {}", enqueue_fault);
    }
    application_state.task_wake_signal.notify_one();
}

/// Emisión best-effort de 'flow/step-completed' (jamás falla la entrega).
async fn emit_flow_step_signal(
    application_state: &AppState,
    event: &Event,
    integration: &Integration,
) {
    let signal = FlowStepCompletedSignal {
        event_id: event.id.clone(),
        integration_id: integration.id.clone(),
        correlation_key: derive_correlation_key(integration.provider, &event.payload),
    };

    let Ok(payload_json) = serde_json::to_string(&signal) else { return };

    if let Err(enqueue_fault) = application_state
        .task_outbox
        .enqueue(TaskTopic::FlowStepCompleted, &payload_json, &signal.idempotency_key(), 0)
        .await
    {
        debug!("📡 [WORKER]: Flow signal not parked (best-effort): {}", enqueue_fault);
    }
    application_state.task_wake_signal.notify_one();
}
