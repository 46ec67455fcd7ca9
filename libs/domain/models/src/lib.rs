// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN MODEL REGISTRY (V2.4 - RELAY ALIGNED)
 * CLASIFICACIÓN: DOMAIN CONTRACTS (ESTRATO L2)
 * RESPONSABILIDAD: FUENTE ÚNICA DE VERDAD PARA ENTIDADES Y SEÑALES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE SOURCE OF TRUTH: Toda entidad persistida (Integration, Event,
 *    Delivery, Endpoint, ReplayQueueItem, ReconciliationRun) nace aquí y
 *    es consumida sin re-declaración por los estratos L3/L4.
 * 2. WIRE STABILITY: Los tags de enumeración son contratos congelados
 *    ('closed', 'half_open', 'open', ...) compartidos con el Dashboard.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

pub mod delivery;
pub mod endpoint;
pub mod event;
pub mod integration;
pub mod reconciliation;
pub mod replay;
pub mod task;

pub use delivery::{Delivery, DeliveryStatus, FailureKind};
pub use endpoint::{CircuitState, Endpoint};
pub use event::{Event, EventSource};
pub use integration::{Integration, IntegrationStatus, ProviderKind};
pub use reconciliation::ReconciliationRun;
pub use replay::{ReplayItemStatus, ReplayQueueItem};
pub use task::{
    CircuitOpenedSignal, FlowStepCompletedSignal, ReplayStartedSignal, TaskTopic,
    WebhookReceivedDirective, WebhookRetryDirective,
};
