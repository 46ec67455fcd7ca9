// [libs/domain/models/src/task.rs]
/*!
 * =================================================================
 * APARATO: TASK ENVELOPE CONTRACTS (V1.4 - OUTBOX PROTOCOL)
 * CLASIFICACIÓN: DOMAIN CONTRACTS (ESTRATO L2)
 * RESPONSABILIDAD: TÓPICOS CANÓNICOS Y SOBRES DEL OUTBOX DURABLE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CANONICAL TOPICS: Los nombres 'webhook/received', 'webhook/retry',
 *    'endpoint/circuit-opened', 'endpoint/replay-started' y
 *    'flow/step-completed' son contratos congelados del §6.
 * 2. AT-MOST-ONCE ENQUEUE: Cada sobre conoce su clave de idempotencia,
 *    de modo que el productor jamás pueda duplicar un paso lógico.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Tópicos canónicos del sistema de tareas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskTopic {
    WebhookReceived,
    WebhookRetry,
    EndpointCircuitOpened,
    EndpointReplayStarted,
    FlowStepCompleted,
}

impl TaskTopic {
    /// Nombre canónico de cable, estable frente a refactors internos.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Self::WebhookReceived => "webhook/received",
            Self::WebhookRetry => "webhook/retry",
            Self::EndpointCircuitOpened => "endpoint/circuit-opened",
            Self::EndpointReplayStarted => "endpoint/replay-started",
            Self::FlowStepCompleted => "flow/step-completed",
        }
    }

    pub fn from_canonical_name(raw_name: &str) -> Option<Self> {
        match raw_name {
            "webhook/received" => Some(Self::WebhookReceived),
            "webhook/retry" => Some(Self::WebhookRetry),
            "endpoint/circuit-opened" => Some(Self::EndpointCircuitOpened),
            "endpoint/replay-started" => Some(Self::EndpointReplayStarted),
            "flow/step-completed" => Some(Self::FlowStepCompleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskTopic {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.canonical_name())
    }
}

/// Sobre de 'webhook/received': emitido por ingesta y reconciliación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookReceivedDirective {
    pub event_id: String,
    pub integration_id: String,
    pub destination_url: String,
}

impl WebhookReceivedDirective {
    /// Una emisión lógica por evento: el sweeper de huérfanos reutiliza
    /// la misma clave para que su redrive sea un no-op si la original vive.
    pub fn idempotency_key(&self) -> String {
        format!("webhook-received:{}", self.event_id)
    }
}

/// Sobre de 'webhook/retry': un bucket de reintento como máximo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRetryDirective {
    pub event_id: String,
    pub integration_id: String,
    pub destination_url: String,
    /// Número de intento a ejecutar (base 1; siempre >= 2 aquí).
    pub attempt_number: u32,
    /// Plazo del transporte para este intento (10s tras un timeout).
    pub timeout_ms: u64,
}

impl WebhookRetryDirective {
    pub fn idempotency_key(&self) -> String {
        format!("webhook-retry:{}:{}", self.event_id, self.attempt_number)
    }
}

/// Señal de observadores: el disyuntor de un endpoint acaba de abrirse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitOpenedSignal {
    pub endpoint_id: String,
    pub integration_id: String,
}

impl CircuitOpenedSignal {
    pub fn idempotency_key(&self, state_changed_at_rfc3339: &str) -> String {
        format!("circuit-opened:{}:{}", self.endpoint_id, state_changed_at_rfc3339)
    }
}

/// Disparador del motor de replay tras una transición OPEN -> HALF_OPEN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayStartedSignal {
    pub endpoint_id: String,
    pub integration_id: String,
}

impl ReplayStartedSignal {
    /// Exactamente una emisión por transición (anclada al sello temporal).
    pub fn idempotency_key(&self, state_changed_at_rfc3339: &str) -> String {
        format!("replay-started:{}:{}", self.endpoint_id, state_changed_at_rfc3339)
    }
}

/// Señal best-effort hacia el rastreador de flujos (colaborador externo).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStepCompletedSignal {
    pub event_id: String,
    pub integration_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_key: Option<String>,
}

impl FlowStepCompletedSignal {
    pub fn idempotency_key(&self) -> String {
        format!("flow-step:{}", self.event_id)
    }
}
