// [libs/domain/models/src/integration.rs]
/*!
 * =================================================================
 * APARATO: INTEGRATION CONTRACT (V2.1 - VAULT READY)
 * CLASIFICACIÓN: DOMAIN ENTITY (ESTRATO L2)
 * RESPONSABILIDAD: CONFIGURACIÓN SOBERANA DE PRODUCTORES DE EVENTOS
 *
 * # Mathematical Proof (Referential Anchor):
 * La Integración es la raíz de propiedad del agregado: Endpoint, Events
 * y ReconciliationRuns descienden de ella y nunca la sobreviven. El
 * borrado está vetado mientras existan eventos que la referencien.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proveedores soportados por el estrato de verificación de firmas.
/// Los tags serializados son contratos de API congelados.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Stripe,
    Shopify,
    Github,
}

impl ProviderKind {
    /// Tag estable persistido en el Ledger y expuesto al Dashboard.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Shopify => "shopify",
            Self::Github => "github",
        }
    }

    pub fn from_tag(raw_tag: &str) -> Option<Self> {
        match raw_tag {
            "stripe" => Some(Self::Stripe),
            "shopify" => Some(Self::Shopify),
            "github" => Some(Self::Github),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_tag())
    }
}

/// Estados del ciclo de vida de una integración.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Active,
    Paused,
    Error,
}

impl IntegrationStatus {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }

    pub fn from_tag(raw_tag: &str) -> Option<Self> {
        match raw_tag {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/**
 * Configuración de un productor de webhooks inscrito por un operador.
 *
 * El secreto de firma viaja en claro únicamente dentro del proceso; la
 * credencial de reconciliación solo existe como sobre sellado AES-GCM
 * (ver estrato L1 'credential-vault').
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,

    /// Operador propietario (multi-tenant boundary).
    #[serde(rename = "operator_identifier")]
    pub operator_id: String,

    pub provider: ProviderKind,

    /// Secreto HMAC compartido con el proveedor para la verificación 4.A.
    pub signing_secret: String,

    /// Destino HTTP del cliente al que se reenvían los eventos.
    pub destination_url: String,

    pub status: IntegrationStatus,

    /// Política de reenvío para eventos con firma inválida.
    /// 'true' preserva el comportamiento histórico (almacenar y reenviar).
    pub forward_unverified: bool,

    /// Sobre cifrado (JSON del EncryptedCredentialEnvelope) o None si la
    /// reconciliación está deshabilitada para esta integración.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation_credential: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    /// Determina si el ciclo de reconciliación debe visitar esta integración.
    pub fn is_reconciliation_enabled(&self) -> bool {
        self.status == IntegrationStatus::Active
            && self.reconciliation_credential.is_some()
            && self.provider != ProviderKind::Github
    }
}
