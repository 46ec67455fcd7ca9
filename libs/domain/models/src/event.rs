// [libs/domain/models/src/event.rs]
/*!
 * =================================================================
 * APARATO: EVENT CONTRACT (V2.2 - IMMUTABLE LEDGER ENTRY)
 * CLASIFICACIÓN: DOMAIN ENTITY (ESTRATO L2)
 * RESPONSABILIDAD: NOTIFICACIÓN RECIBIDA, INMUTABLE TRAS SU INSERCIÓN
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Origen del evento: ingesta directa o relleno por reconciliación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Webhook,
    Reconciliation,
}

impl EventSource {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Reconciliation => "reconciliation",
        }
    }

    pub fn from_tag(raw_tag: &str) -> Option<Self> {
        match raw_tag {
            "webhook" => Some(Self::Webhook),
            "reconciliation" => Some(Self::Reconciliation),
            _ => None,
        }
    }
}

/**
 * Notificación aceptada. El payload crudo se conserva byte-a-byte en su
 * serialización almacenada: las firmas del proveedor deben seguir siendo
 * verificables aguas abajo, por lo que el núcleo jamás lo muta.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,

    #[serde(rename = "integration_identifier")]
    pub integration_id: String,

    pub event_type: String,

    /// Cuerpo estructurado; ante un fallo de parseo se almacena
    /// `{"raw": "<texto>"}` para preservar el material forense.
    pub payload: serde_json::Value,

    /// Cabeceras crudas con claves en minúscula.
    pub headers: BTreeMap<String, String>,

    pub received_at: DateTime<Utc>,

    /// Veredicto durable del verificador 4.A. Una firma inválida no
    /// rechaza la petición: el flag existe para diagnóstico.
    pub signature_valid: bool,

    /// Identificador de evento suministrado por el proveedor; ancla de
    /// deduplicación entre la vía webhook y la vía reconciliación.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_event_id: Option<String>,

    pub source: EventSource,
}

impl Event {
    /// Serialización canónica enviada al destino (byte-a-byte estable).
    pub fn canonical_body(&self) -> Vec<u8> {
        serde_json::to_vec(&self.payload).unwrap_or_else(|_| b"{}".to_vec())
    }
}
