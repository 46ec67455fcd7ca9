// [libs/infra/db/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY REGISTRY (V3.3 - ACCESS MATRIX)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: AUTORIDAD ÚNICA DE ACCESO POR AGREGADO
 *
 * # Topología de Módulos:
 * - integration:   Configuración de productores y credenciales selladas.
 * - endpoint:      Autoridad del disyuntor (CAS sobre lock_version).
 * - event:         Ledger inmutable de notificaciones aceptadas.
 * - delivery:      Rastro de intentos (sustrato de la ventana 20+1).
 * - replay_queue:  Búfer ordenado por posición monotónica.
 * - reconciliation: Auditorías de ciclos de pull.
 * - task_outbox:   Cola durable de tareas con claves de idempotencia.
 * =================================================================
 */

pub mod delivery;
pub mod endpoint;
pub mod event;
pub mod integration;
pub mod reconciliation;
pub mod replay_queue;
pub mod task_outbox;

pub use delivery::DeliveryRepository;
pub use endpoint::EndpointRepository;
pub use event::EventRepository;
pub use integration::IntegrationRepository;
pub use reconciliation::ReconciliationRepository;
pub use replay_queue::ReplayQueueRepository;
pub use task_outbox::{OutboxTask, TaskOutboxRepository};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Normaliza los sellos temporales del Ledger: acepta RFC-3339 (escrituras
/// propias) y el formato 'CURRENT_TIMESTAMP' de SQLite (defaults).
pub(crate) fn parse_ledger_timestamp(raw_timestamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw_timestamp) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw_timestamp, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
