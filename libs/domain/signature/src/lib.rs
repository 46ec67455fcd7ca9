// [libs/domain/signature/src/lib.rs]
/*!
 * =================================================================
 * APARATO: SIGNATURE VERIFICATION ENGINE (V3.2 - TRI-PROVIDER)
 * CLASIFICACIÓN: DOMAIN SECURITY (ESTRATO L2)
 * RESPONSABILIDAD: VERIFICACIÓN HMAC Y EXTRACCIÓN DE IDENTIDAD DE EVENTOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CONSTANT-TIME GUARANTEE: Toda comparación de firma pasa por
 *    'Mac::verify_slice', eliminando oráculos de temporización.
 * 2. NON-REJECTING POLICY: Una firma inválida NUNCA rechaza la petición;
 *    el veredicto es un flag durable para diagnóstico de configuración.
 * 3. IDENTITY EXTRACTION: El tipo de evento y el identificador del
 *    proveedor se extraen siempre, sea la firma válida o no.
 *
 * # Mathematical Proof (Timestamp Window):
 * Para el esquema temporal de Stripe, la ventana |now - t| <= 300s acota
 * el replay de peticiones capturadas a 5 minutos, el mismo horizonte que
 * el proveedor aplica en su SDK oficial.
 * =================================================================
 */

pub mod correlation;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hookwise_domain_models::ProviderKind;
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Tolerancia máxima entre el sello temporal firmado y el reloj local.
const STRIPE_TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;

#[derive(Error, Debug)]
pub enum SignatureError {
    /// El secreto de firma está vacío o es inutilizable como llave HMAC.
    #[error("[L2_SIGNATURE_FAULT]: SIGNING_SECRET_UNUSABLE")]
    UnusableSecret,
}

/// Veredicto completo del verificador: validez + identidad del evento.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub signature_valid: bool,
    /// Tipo de evento declarado por el proveedor ('unknown' si ilegible).
    pub event_type: String,
    /// Identificador de evento del proveedor (ancla de deduplicación).
    pub provider_event_id: Option<String>,
}

/**
 * Punto de entrada único del verificador: despacha por proveedor.
 *
 * @param provider Proveedor declarado por la integración.
 * @param signing_secret Secreto HMAC compartido.
 * @param headers Cabeceras crudas con claves ya en minúscula.
 * @param raw_body Cuerpo byte-a-byte tal como llegó por el cable.
 * @param payload Cuerpo ya parseado (o el sobre {"raw": ...} de rescate).
 * @param now Reloj inyectado para la ventana temporal (testeable).
 */
pub fn verify_event(
    provider: ProviderKind,
    signing_secret: &str,
    headers: &BTreeMap<String, String>,
    raw_body: &[u8],
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<VerificationOutcome, SignatureError> {
    if signing_secret.is_empty() {
        return Err(SignatureError::UnusableSecret);
    }

    match provider {
        ProviderKind::Stripe => verify_stripe(signing_secret, headers, raw_body, payload, now),
        ProviderKind::Shopify => verify_shopify(signing_secret, headers, raw_body),
        ProviderKind::Github => verify_github(signing_secret, headers, raw_body),
    }
}

/**
 * ESQUEMA P1 (Stripe): cabecera 't=<unix>,v1=<hex>[,v1=<hex>...]'.
 * Mensaje firmado: '<t>.<raw-body>'. Se acepta si ALGÚN candidato v1
 * verifica y el sello temporal cae dentro de la ventana de 300s.
 */
fn verify_stripe(
    signing_secret: &str,
    headers: &BTreeMap<String, String>,
    raw_body: &[u8],
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<VerificationOutcome, SignatureError> {
    // La identidad se extrae del cuerpo sea cual sea el veredicto.
    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let provider_event_id = payload.get("id").and_then(Value::as_str).map(str::to_string);

    let Some(signature_header) = headers.get("stripe-signature") else {
        return Ok(VerificationOutcome { signature_valid: false, event_type, provider_event_id });
    };

    // 1. DESCOMPOSICIÓN DE LA CABECERA (t= y candidatos v1=)
    let mut signed_timestamp: Option<i64> = None;
    let mut candidate_signatures: Vec<&str> = Vec::new();

    for header_segment in signature_header.split(',') {
        let mut segment_parts = header_segment.trim().splitn(2, '=');
        match (segment_parts.next(), segment_parts.next()) {
            (Some("t"), Some(raw_timestamp)) => {
                signed_timestamp = raw_timestamp.parse::<i64>().ok();
            }
            (Some("v1"), Some(candidate_hex)) => candidate_signatures.push(candidate_hex),
            _ => {}
        }
    }

    let Some(signed_timestamp) = signed_timestamp else {
        return Ok(VerificationOutcome { signature_valid: false, event_type, provider_event_id });
    };
    if candidate_signatures.is_empty() {
        return Ok(VerificationOutcome { signature_valid: false, event_type, provider_event_id });
    }

    // 2. VENTANA TEMPORAL ANTI-REPLAY (|now - t| <= 300s)
    if (now.timestamp() - signed_timestamp).abs() > STRIPE_TIMESTAMP_TOLERANCE_SECONDS {
        return Ok(VerificationOutcome { signature_valid: false, event_type, provider_event_id });
    }

    // 3. VERIFICACIÓN DE CANDIDATOS EN TIEMPO CONSTANTE
    let mut any_candidate_verified = false;
    for candidate_hex in candidate_signatures {
        let Ok(candidate_bytes) = hex::decode(candidate_hex) else { continue };

        let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
            .map_err(|_| SignatureError::UnusableSecret)?;
        mac.update(signed_timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw_body);

        if mac.verify_slice(&candidate_bytes).is_ok() {
            any_candidate_verified = true;
        }
    }

    Ok(VerificationOutcome {
        signature_valid: any_candidate_verified,
        event_type,
        provider_event_id,
    })
}

/**
 * ESQUEMA P2 (Shopify): HMAC-SHA-256 del cuerpo crudo, codificado base64,
 * contra 'x-shopify-hmac-sha256'. Tópico e identidad viajan en cabeceras.
 */
fn verify_shopify(
    signing_secret: &str,
    headers: &BTreeMap<String, String>,
    raw_body: &[u8],
) -> Result<VerificationOutcome, SignatureError> {
    let event_type = headers
        .get("x-shopify-topic")
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    let provider_event_id = headers.get("x-shopify-webhook-id").cloned();

    let signature_valid = match headers.get("x-shopify-hmac-sha256") {
        Some(supplied_base64) => match BASE64.decode(supplied_base64.as_bytes()) {
            Ok(supplied_bytes) => {
                let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
                    .map_err(|_| SignatureError::UnusableSecret)?;
                mac.update(raw_body);
                mac.verify_slice(&supplied_bytes).is_ok()
            }
            Err(_) => false,
        },
        None => false,
    };

    Ok(VerificationOutcome { signature_valid, event_type, provider_event_id })
}

/**
 * ESQUEMA P3 (GitHub): 'x-hub-signature-256' = 'sha256=<hex>' del cuerpo
 * crudo. Tipo de evento en 'x-github-event', identidad en 'x-github-delivery'.
 */
fn verify_github(
    signing_secret: &str,
    headers: &BTreeMap<String, String>,
    raw_body: &[u8],
) -> Result<VerificationOutcome, SignatureError> {
    let event_type = headers
        .get("x-github-event")
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    let provider_event_id = headers.get("x-github-delivery").cloned();

    let signature_valid = match headers
        .get("x-hub-signature-256")
        .and_then(|header_value| header_value.strip_prefix("sha256="))
    {
        Some(supplied_hex) => match hex::decode(supplied_hex) {
            Ok(supplied_bytes) => {
                let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
                    .map_err(|_| SignatureError::UnusableSecret)?;
                mac.update(raw_body);
                mac.verify_slice(&supplied_bytes).is_ok()
            }
            Err(_) => false,
        },
        None => false,
    };

    Ok(VerificationOutcome { signature_valid, event_type, provider_event_id })
}

// --- UTILIDADES DE FIRMA PARA EL PROVING GROUNDS ---

/// Calcula la firma hex de Stripe para un cuerpo y sello temporal dados.
/// Expuesto para fixtures de test y herramientas de diagnóstico.
pub fn stripe_signature_hex(signing_secret: &str, timestamp: i64, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC acepta llaves de cualquier longitud");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// Firma base64 estilo Shopify del cuerpo crudo.
pub fn shopify_signature_base64(signing_secret: &str, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC acepta llaves de cualquier longitud");
    mac.update(raw_body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Firma 'sha256=<hex>' estilo GitHub del cuerpo crudo.
pub fn github_signature_header(signing_secret: &str, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC acepta llaves de cualquier longitud");
    mac.update(raw_body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
