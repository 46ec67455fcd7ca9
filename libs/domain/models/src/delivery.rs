// [libs/domain/models/src/delivery.rs]
/*!
 * =================================================================
 * APARATO: DELIVERY CONTRACT (V2.3 - ATTEMPT LEDGER)
 * CLASIFICACIÓN: DOMAIN ENTITY (ESTRATO L2)
 * RESPONSABILIDAD: RASTRO INMUTABLE DE CADA INTENTO DE ENTREGA
 *
 * # Mathematical Proof (Window Substrate):
 * Las últimas 20 filas de entrega por endpoint SON la ventana deslizante
 * del disyuntor. La idempotencia por (event_id, attempt_number) garantiza
 * que un reintento del sistema de tareas nunca duplique una muestra.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estado terminal de un intento de entrega. Tags congelados del §6.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    DeadLetter,
}

impl DeliveryStatus {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::DeadLetter => "dead_letter",
        }
    }

    pub fn from_tag(raw_tag: &str) -> Option<Self> {
        match raw_tag {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "dead_letter" => Some(Self::DeadLetter),
            _ => None,
        }
    }
}

/// Taxonomía de fallos de transporte producida por el clasificador 4.E.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ServerError,
    RateLimit,
    Ssl,
    ConnectionRefused,
    Unknown,
}

impl FailureKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::RateLimit => "rate_limit",
            Self::Ssl => "ssl",
            Self::ConnectionRefused => "connection_refused",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_tag(raw_tag: &str) -> Option<Self> {
        match raw_tag {
            "timeout" => Some(Self::Timeout),
            "server_error" => Some(Self::ServerError),
            "rate_limit" => Some(Self::RateLimit),
            "ssl" => Some(Self::Ssl),
            "connection_refused" => Some(Self::ConnectionRefused),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Fallos que cortocircuitan el reintento y disparan el disyuntor.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ssl | Self::ConnectionRefused)
    }
}

/**
 * Registro de un intento de entrega. Una fila por intento; los intentos
 * de un mismo evento quedan totalmente ordenados por 'attempt_number'.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,

    #[serde(rename = "event_identifier")]
    pub event_id: String,

    /// Nulo únicamente para eventos aceptados antes de existir el endpoint.
    #[serde(rename = "endpoint_identifier", skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,

    pub status: DeliveryStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    /// Cuerpo de respuesta truncado a 1024 bytes para diagnóstico.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body_excerpt: Option<String>,

    #[serde(rename = "error_type", skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,

    /// Número de intento, base 1.
    pub attempt_number: u32,

    pub attempted_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}
