// [libs/domain/resilience/src/classifier.rs]
/*!
 * =================================================================
 * APARATO: TRANSPORT FAILURE CLASSIFIER (V3.1 - FIRST MATCH WINS)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: TAXONOMÍA DE FALLOS Y POLÍTICA DE REINTENTO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ORDERED RULES: Las reglas se evalúan en orden estricto y la
 *    primera coincidencia gana; el mensaje de transporte tiene
 *    prioridad sobre el código de estado.
 * 2. TERMINAL SHORT-CIRCUIT: 'ssl' y 'connection_refused' vetan el
 *    reintento y disparan el disyuntor para que la recuperación llegue
 *    por la vía del sondeo de salud, no por martilleo.
 * =================================================================
 */

use hookwise_domain_models::FailureKind;
use serde::{Deserialize, Serialize};

/// Espera por defecto cuando un 429 llega sin cabecera Retry-After.
pub const RATE_LIMIT_FALLBACK_DELAY_MS: u64 = 60_000;
/// Espera fija para un 503 (Service Unavailable).
pub const SERVICE_UNAVAILABLE_DELAY_MS: u64 = 30_000;

/// Veredicto del clasificador para un intento fallido.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailureAssessment {
    pub error_kind: FailureKind,
    pub should_retry: bool,
    /// Espera explícita antes del reintento; None delega en el llamador
    /// (el timeout duplica su plazo, el resto reintenta de inmediato).
    pub retry_delay_ms: Option<u64>,
    pub should_open_circuit: bool,
}

/**
 * Clasifica el resultado de un intento de entrega fallido.
 *
 * @param status_code Código HTTP si hubo respuesta.
 * @param transport_error Mensaje del error de transporte si no la hubo.
 * @param retry_after_header Valor crudo de 'Retry-After' si llegó.
 */
pub fn classify_outcome(
    status_code: Option<u16>,
    transport_error: Option<&str>,
    retry_after_header: Option<&str>,
) -> FailureAssessment {
    let normalized_message = transport_error.map(str::to_ascii_lowercase).unwrap_or_default();

    // REGLA 1: Plazo agotado o conexión abortada -> reintento con plazo doble.
    if normalized_message.contains("abort") || normalized_message.contains("timeout") {
        return FailureAssessment {
            error_kind: FailureKind::Timeout,
            should_retry: true,
            retry_delay_ms: None,
            should_open_circuit: false,
        };
    }

    // REGLA 2: Colapso de canal seguro -> terminal, dispara el disyuntor.
    if normalized_message.contains("ssl")
        || normalized_message.contains("tls")
        || normalized_message.contains("certificate")
    {
        return FailureAssessment {
            error_kind: FailureKind::Ssl,
            should_retry: false,
            retry_delay_ms: None,
            should_open_circuit: true,
        };
    }

    // REGLA 3: Destino inalcanzable -> terminal, dispara el disyuntor.
    if normalized_message.contains("econnrefused")
        || normalized_message.contains("enotfound")
        || normalized_message.contains("connection refused")
    {
        return FailureAssessment {
            error_kind: FailureKind::ConnectionRefused,
            should_retry: false,
            retry_delay_ms: None,
            should_open_circuit: true,
        };
    }

    // REGLA 4: Límite de tasa -> honrar Retry-After (o 60s de rescate).
    if status_code == Some(429) {
        let honored_delay_ms = retry_after_header
            .and_then(parse_leading_integer)
            .map(|seconds| seconds * 1000)
            .unwrap_or(RATE_LIMIT_FALLBACK_DELAY_MS);

        return FailureAssessment {
            error_kind: FailureKind::RateLimit,
            should_retry: true,
            retry_delay_ms: Some(honored_delay_ms),
            should_open_circuit: false,
        };
    }

    // REGLA 5: 503 -> espera fija de 30s antes del único reintento.
    if status_code == Some(503) {
        return FailureAssessment {
            error_kind: FailureKind::ServerError,
            should_retry: true,
            retry_delay_ms: Some(SERVICE_UNAVAILABLE_DELAY_MS),
            should_open_circuit: false,
        };
    }

    // REGLA 6: Cualquier otro 5xx -> un único reintento inmediato.
    if status_code.is_some_and(|code| code >= 500) {
        return FailureAssessment {
            error_kind: FailureKind::ServerError,
            should_retry: true,
            retry_delay_ms: None,
            should_open_circuit: false,
        };
    }

    // REGLA 7: Resto del universo de fallos.
    FailureAssessment {
        error_kind: FailureKind::Unknown,
        should_retry: true,
        retry_delay_ms: None,
        should_open_circuit: false,
    }
}

/// Réplica del 'parseInt' permisivo: consume los dígitos iniciales y
/// descarta el resto ('7 (seconds)' -> 7).
fn parse_leading_integer(raw_value: &str) -> Option<u64> {
    let trimmed_value = raw_value.trim();
    let digit_run: String =
        trimmed_value.chars().take_while(|character| character.is_ascii_digit()).collect();

    if digit_run.is_empty() {
        None
    } else {
        digit_run.parse::<u64>().ok()
    }
}
