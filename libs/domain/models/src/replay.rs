// [libs/domain/models/src/replay.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estados de una ranura del búfer de replay. Tags congelados del §6.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayItemStatus {
    Pending,
    Delivering,
    Delivered,
    Failed,
    Skipped,
}

impl ReplayItemStatus {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_tag(raw_tag: &str) -> Option<Self> {
        match raw_tag {
            "pending" => Some(Self::Pending),
            "delivering" => Some(Self::Delivering),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/**
 * Ranura ordenada del búfer de replay de un endpoint.
 *
 * Invariante: 'position' es estrictamente creciente por endpoint y define
 * el orden total de drenaje; los items saltados jamás bloquean posiciones
 * posteriores.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayQueueItem {
    pub id: String,

    #[serde(rename = "endpoint_identifier")]
    pub endpoint_id: String,

    #[serde(rename = "event_identifier")]
    pub event_id: String,

    /// Posición monotónica asignada como MAX(existente) + 1 bajo cerrojo.
    pub position: i64,

    /// Pista de agrupación por objeto de negocio; no es identidad.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_key: Option<String>,

    pub status: ReplayItemStatus,

    pub attempts: u32,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}
