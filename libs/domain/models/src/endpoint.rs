// [libs/domain/models/src/endpoint.rs]
/*!
 * =================================================================
 * APARATO: ENDPOINT HEALTH CONTRACT (V3.0 - BREAKER CELL)
 * CLASIFICACIÓN: DOMAIN ENTITY (ESTRATO L2)
 * RESPONSABILIDAD: CÉLULA DE ESTADO DEL DISYUNTOR POR DESTINO
 *
 * # Mathematical Proof (Single Cell, Not a Log):
 * El estado del disyuntor es una célula derivada: cada escritura lo
 * recalcula desde las últimas 20 filas de 'deliveries' bajo cerrojo,
 * de modo que un reinicio del proceso re-deriva el estado correcto en
 * la siguiente entrega sin almacén de contadores paralelo.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estados del disyuntor por destino. Tags congelados del contrato §6.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }

    pub fn from_tag(raw_tag: &str) -> Option<Self> {
        match raw_tag {
            "closed" => Some(Self::Closed),
            "half_open" => Some(Self::HalfOpen),
            "open" => Some(Self::Open),
            _ => None,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_tag())
    }
}

/**
 * Estado de salud mutable del destino de una integración (relación 1:1).
 *
 * Invariante: todo cambio de 'circuit_state' actualiza 'state_changed_at'
 * y pone a cero los contadores irrelevantes para el nuevo estado.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,

    #[serde(rename = "integration_identifier")]
    pub integration_id: String,

    pub circuit_state: CircuitState,

    /// Porcentaje de éxito sobre la ventana deslizante (0.0 - 100.0).
    pub success_rate_percent: f64,

    /// Latencia media de respuesta sobre la ventana deslizante.
    pub average_response_time_ms: f64,

    pub consecutive_failures: u32,
    pub consecutive_successes: u32,

    /// Éxitos consecutivos del sondeo de salud (solo relevante en OPEN).
    pub consecutive_probe_successes: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_probe_at: Option<DateTime<Utc>>,

    pub state_changed_at: DateTime<Utc>,

    /// Columna de versión para el compare-and-swap que serializa todas
    /// las mutaciones read-modify-write sobre esta fila.
    pub lock_version: i64,

    pub created_at: DateTime<Utc>,
}
