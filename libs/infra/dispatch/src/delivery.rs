// [libs/infra/dispatch/src/delivery.rs]
/*!
 * =================================================================
 * APARATO: DELIVERY TRANSPORT (V4.1 - CAPTURE EVERYTHING)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: POST DEL PAYLOAD CANÓNICO CON CAPTURA TOTAL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. NEVER-THROW CONTRACT: El transporte jamás retorna error; todo
 *    desenlace (status, cuerpo truncado, Retry-After, fallo físico)
 *    se captura en un 'DeliveryOutcome' para el clasificador.
 * 2. BYTE PARITY: El cuerpo enviado es la serialización canónica
 *    almacenada, byte a byte; el núcleo no muta payloads jamás.
 * 3. EXPLICIT DEADLINES: El plazo viaja por petición (5s nominal,
 *    10s en el reintento post-timeout, según directiva).
 * =================================================================
 */

use chrono::Utc;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Máximo de bytes del cuerpo de respuesta preservados para diagnóstico.
const RESPONSE_EXCERPT_CEILING_BYTES: usize = 1024;

/// Directiva de reenvío de un evento hacia el destino del cliente.
#[derive(Debug, Clone)]
pub struct ForwardDirective {
    pub destination_url: String,
    pub event_id: String,
    pub integration_id: String,
    /// Serialización canónica del payload almacenado (byte-a-byte).
    pub body_bytes: Vec<u8>,
    /// Conteo de reintentos a estampar (solo presente en reintentos).
    pub retry_count: Option<u32>,
    /// Marca los reenvíos del motor de replay ('X-HookWise-Replay').
    pub is_replay: bool,
    pub timeout: Duration,
}

/// Desenlace completo de un intento de entrega.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub response_body_excerpt: Option<String>,
    pub retry_after_header: Option<String>,
    /// Descripción de la cadena de fallo físico si no hubo respuesta.
    pub transport_error: Option<String>,
}

impl DeliveryOutcome {
    /// Éxito = respuesta 2xx del destino.
    pub fn is_success(&self) -> bool {
        self.status_code.is_some_and(|code| (200..300).contains(&code))
    }
}

/**
 * Transporte endurecido hacia destinos de clientes.
 */
#[derive(Clone)]
pub struct DeliveryTransport {
    network_session_client: Client,
    /// URL pública del despliegue, estampada en 'X-HookWise-Source'.
    public_application_url: String,
}

impl DeliveryTransport {
    /**
     * Inicializa el transporte. El plazo por defecto NO se fija en el
     * cliente: cada directiva transporta el suyo.
     */
    pub fn new(public_application_url: String) -> Self {
        Self {
            network_session_client: Client::builder()
                .user_agent("HookWise-Delivery-Engine/V4.1")
                .tcp_keepalive(Some(Duration::from_secs(60)))
                .build()
                .expect("FATAL: Delivery transport initialization failed."),
            public_application_url,
        }
    }

    /**
     * Ejecuta el POST hacia el destino, capturando todo desenlace.
     *
     * # Performance:
     * Un único roundtrip acotado por 'directive.timeout'; la lectura del
     * cuerpo se trunca a 1024 bytes para el rastro forense.
     */
    #[instrument(skip(self, directive), fields(event = %directive.event_id))]
    pub async fn forward_event(&self, directive: &ForwardDirective) -> DeliveryOutcome {
        let dispatch_started_at = Instant::now();

        // 1. CONSTRUCCIÓN DE LA PETICIÓN CON CABECERAS DE RASTRO
        let mut request_builder = self
            .network_session_client
            .post(&directive.destination_url)
            .timeout(directive.timeout)
            .header("Content-Type", "application/json")
            .header("X-HookWise-Event-ID", &directive.event_id)
            .header("X-HookWise-Timestamp", Utc::now().to_rfc3339())
            .header("X-HookWise-Integration-ID", &directive.integration_id)
            .header("X-HookWise-Source", &self.public_application_url)
            .body(directive.body_bytes.clone());

        if let Some(retry_count) = directive.retry_count {
            request_builder = request_builder.header("X-HookWise-Retry-Count", retry_count);
        }
        if directive.is_replay {
            request_builder = request_builder.header("X-HookWise-Replay", "true");
        }

        // 2. EJECUCIÓN Y CAPTURA TOTAL DEL DESENLACE
        match request_builder.send().await {
            Ok(network_response) => {
                let status_code = network_response.status().as_u16();

                let retry_after_header = network_response
                    .headers()
                    .get("retry-after")
                    .and_then(|header_value| header_value.to_str().ok())
                    .map(str::to_string);

                let raw_body = network_response.text().await.unwrap_or_default();
                let response_time_ms = dispatch_started_at.elapsed().as_millis() as u64;

                debug!("📡 [DISPATCH]: Destination answered HTTP_{} in {}ms.", status_code, response_time_ms);

                DeliveryOutcome {
                    status_code: Some(status_code),
                    response_time_ms,
                    response_body_excerpt: truncate_excerpt(&raw_body),
                    retry_after_header,
                    transport_error: None,
                }
            }
            Err(network_fault) => {
                let response_time_ms = dispatch_started_at.elapsed().as_millis() as u64;
                let fault_description = describe_fault_chain(&network_fault);

                warn!("❌ [DISPATCH]: Physical link failure after {}ms: {}", response_time_ms, fault_description);

                DeliveryOutcome {
                    status_code: None,
                    response_time_ms,
                    response_body_excerpt: None,
                    retry_after_header: None,
                    transport_error: Some(fault_description),
                }
            }
        }
    }
}

/// Trunca el cuerpo a 1024 bytes respetando fronteras UTF-8.
fn truncate_excerpt(raw_body: &str) -> Option<String> {
    if raw_body.is_empty() {
        return None;
    }

    if raw_body.len() <= RESPONSE_EXCERPT_CEILING_BYTES {
        return Some(raw_body.to_string());
    }

    let truncated_bytes = &raw_body.as_bytes()[..RESPONSE_EXCERPT_CEILING_BYTES];
    Some(String::from_utf8_lossy(truncated_bytes).into_owned())
}

/// Aplana la cadena de causas del fallo físico; el clasificador opera
/// sobre este texto ('timeout', 'certificate', 'connection refused', ...).
fn describe_fault_chain(network_fault: &reqwest::Error) -> String {
    let mut fault_description = if network_fault.is_timeout() {
        format!("timeout: {}", network_fault)
    } else {
        network_fault.to_string()
    };

    let mut fault_source = std::error::Error::source(network_fault);
    while let Some(underlying_cause) = fault_source {
        fault_description.push_str(" -> ");
        fault_description.push_str(&underlying_cause.to_string());
        fault_source = underlying_cause.source();
    }

    fault_description
}
