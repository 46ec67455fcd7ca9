// [apps/gateway/src/services/task_dispatcher.rs]
/*!
 * =================================================================
 * APARATO: TASK DISPATCHER DAEMON (V4.4 - OUTBOX CONSUMER)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: CONSUMO DEL OUTBOX Y RUTEO POR TÓPICO CANÓNICO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TOPIC ROUTING: 'webhook/received' y 'webhook/retry' alimentan al
 *    worker de entrega; 'endpoint/replay-started' al motor de replay;
 *    las señales de observador se espejan en el bus de difusión.
 * 2. FAILURE TRIAGE (§7): Fallo semántico (entidad desaparecida,
 *    sobre ilegible) -> tarea terminada; fallo de infraestructura ->
 *    re-programación con back-off, explotando la idempotencia por paso.
 * 3. SUB-SECOND HAND-OFF: El despertador 'Notify' colapsa la latencia
 *    ingesta->entrega muy por debajo del intervalo de escaneo.
 * =================================================================
 */

use crate::services::delivery_worker::DeliveryWorkerService;
use crate::services::replay_engine::ReplayEngineService;
use crate::state::AppState;
use anyhow::Result;
use hookwise_domain_models::{
    CircuitOpenedSignal, FlowStepCompletedSignal, ReplayStartedSignal, TaskTopic,
    WebhookReceivedDirective, WebhookRetryDirective,
};
use hookwise_infra_db::repositories::OutboxTask;
use hookwise_infra_db::StoreError;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Intervalo de escaneo de tareas vencidas (los timers del §9).
const DISPATCH_SCAN_INTERVAL_MS: u64 = 1_000;
/// Ráfaga máxima de tareas reclamadas por escaneo.
const DISPATCH_BATCH_SIZE: i64 = 16;

pub struct TaskDispatcherService {
    application_state: AppState,
}

impl TaskDispatcherService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Bucle perpetuo del despachador: reclama, rutea y sella.
     */
    pub async fn spawn_dispatcher_daemon(self) {
        info!("📬 [DISPATCHER]: Outbox consumer daemon initiated.");

        loop {
            match self.application_state.task_outbox.claim_due_batch(DISPATCH_BATCH_SIZE).await {
                Ok(claimed_batch) if !claimed_batch.is_empty() => {
                    for claimed_task in claimed_batch {
                        let task_state = self.application_state.clone();
                        tokio::spawn(async move {
                            dispatch_claimed_task(task_state, claimed_task).await;
                        });
                    }
                }
                Ok(_) => {
                    // Sin tareas vencidas: dormir hasta el siguiente escaneo
                    // o hasta el próximo despertador de encolado local.
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(DISPATCH_SCAN_INTERVAL_MS)) => {},
                        _ = self.application_state.task_wake_signal.notified() => {},
                    }
                }
                Err(claim_fault) => {
                    error!("❌ [DISPATCHER_FAULT]: Claim cycle collapsed: {}", claim_fault);
                    tokio::time::sleep(Duration::from_millis(DISPATCH_SCAN_INTERVAL_MS)).await;
                }
            }
        }
    }
}

/**
 * Ejecuta una tarea reclamada y aplica el triaje de fallos del §7.
 */
#[instrument(skip(application_state, claimed_task), fields(topic = %claimed_task.topic, task = %claimed_task.id))]
async fn dispatch_claimed_task(application_state: AppState, claimed_task: OutboxTask) {
    match route_task_by_topic(&application_state, &claimed_task).await {
        Ok(()) => {
            if let Err(seal_fault) =
                application_state.task_outbox.mark_completed(&claimed_task.id).await
            {
                error!("❌ [DISPATCHER]: Completion seal failed: {}", seal_fault);
            }
        }
        Err(task_fault) if is_semantic_fault(&task_fault) => {
            // Entidad desaparecida en vuelo o sobre ilegible: terminal.
            warn!("🗑️ [DISPATCHER]: Task {} terminated on semantic fault: {}",
                claimed_task.id, task_fault);
            let _ = application_state.task_outbox.abandon(&claimed_task.id).await;
        }
        Err(task_fault) => {
            // Infraestructura: fail-loud y re-programación con back-off.
            error!("🔥 [DISPATCHER]: Task {} failed (attempt {}): {}",
                claimed_task.id, claimed_task.attempt_count, task_fault);
            let _ = application_state
                .task_outbox
                .reschedule_after_failure(&claimed_task.id, claimed_task.attempt_count)
                .await;
        }
    }
}

/// Ruteo por tópico canónico.
async fn route_task_by_topic(application_state: &AppState, claimed_task: &OutboxTask) -> Result<()> {
    match claimed_task.topic {
        TaskTopic::WebhookReceived => {
            let directive: WebhookReceivedDirective =
                serde_json::from_str(&claimed_task.payload_json)?;
            DeliveryWorkerService::new(application_state.clone())
                .handle_webhook_received(directive)
                .await
        }
        TaskTopic::WebhookRetry => {
            let directive: WebhookRetryDirective = serde_json::from_str(&claimed_task.payload_json)?;
            DeliveryWorkerService::new(application_state.clone())
                .handle_webhook_retry(directive)
                .await
        }
        TaskTopic::EndpointReplayStarted => {
            let signal: ReplayStartedSignal = serde_json::from_str(&claimed_task.payload_json)?;
            ReplayEngineService::new(application_state.clone())
                .handle_replay_started(signal)
                .await
        }
        TaskTopic::EndpointCircuitOpened => {
            let signal: CircuitOpenedSignal = serde_json::from_str(&claimed_task.payload_json)?;
            application_state.signal_bus.notify_circuit_opened(signal);
            Ok(())
        }
        TaskTopic::FlowStepCompleted => {
            let signal: FlowStepCompletedSignal = serde_json::from_str(&claimed_task.payload_json)?;
            application_state.signal_bus.notify_flow_step_completed(signal);
            Ok(())
        }
    }
}

/// Triaje §7: los fallos semánticos terminan la tarea, no la reintentan.
fn is_semantic_fault(task_fault: &anyhow::Error) -> bool {
    if task_fault.downcast_ref::<serde_json::Error>().is_some() {
        return true;
    }
    task_fault.downcast_ref::<StoreError>().is_some_and(StoreError::is_semantic)
}
