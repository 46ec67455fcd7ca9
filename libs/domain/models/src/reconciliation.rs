// [libs/domain/models/src/reconciliation.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Auditoría inmutable de un ciclo de reconciliación contra el proveedor.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: String,

    #[serde(rename = "integration_identifier")]
    pub integration_id: String,

    pub provider_events_found: u32,
    pub local_events_found: u32,

    /// Eventos del proveedor sin contraparte local al iniciar el ciclo.
    pub gaps_detected: u32,

    /// Huecos cerrados mediante inyección de eventos sintéticos.
    pub gaps_resolved: u32,

    #[typeshare(serialized_as = "String")]
    pub ran_at: DateTime<Utc>,
}
