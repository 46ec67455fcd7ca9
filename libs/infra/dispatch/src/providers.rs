// [libs/infra/dispatch/src/providers.rs]
/*!
 * =================================================================
 * APARATO: PROVIDER RECONCILIATION PAGERS (V3.3 - GAP HUNTERS)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PAGINACIÓN DE APIS DE PROVEEDORES PARA DETECTAR HUECOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CURSOR WALK (P1): Recorre '/v1/events' con 'starting_after' hasta
 *    agotar 'has_more', ráfagas de 100.
 * 2. LINK WALK (P2): Sigue la cabecera 'Link: <...>; rel="next"' del
 *    Admin REST de Shopify, sintetizando identidad 'shopify:order:<id>'.
 * 3. BOUNDED GREED: Ambos paseos respetan un techo de páginas; si se
 *    alcanza, se registra el corte en el rastro (nunca silencioso).
 * =================================================================
 */

use crate::errors::DispatchError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Tamaño de ráfaga nominal de la paginación de eventos P1.
const STRIPE_PAGE_LIMIT: usize = 100;
/// Techo de páginas por ciclo para acotar la presión sobre el proveedor.
const PAGINATION_PAGE_CEILING: usize = 10;
/// Plazo de cada petición de reconciliación.
const PROVIDER_REQUEST_TIMEOUT_SECONDS: u64 = 15;

/// Evento del proveedor normalizado para la detección de huecos.
#[derive(Debug, Clone)]
pub struct ProviderEventRecord {
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: Value,
}

fn hardened_client(user_agent: &str) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(PROVIDER_REQUEST_TIMEOUT_SECONDS))
        .user_agent(user_agent)
        .build()
        .expect("FATAL: Provider pager initialization failed.")
}

// --- PAGINADOR P1 (STRIPE-STYLE EVENTS API) ---

pub struct StripeEventsPager {
    network_uplink_client: Client,
    api_base_url: String,
}

impl StripeEventsPager {
    /// La base es configurable vía 'STRIPE_API_BASE_URL' (fixtures/tests).
    pub fn new() -> Self {
        let api_base_url = std::env::var("STRIPE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());

        Self {
            network_uplink_client: hardened_client("HookWise-Reconciliation/V3.3"),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /**
     * Recolecta los eventos del proveedor en la ventana [since, until].
     *
     * # Errors:
     * - `DispatchError::ProviderRejection`: credencial inválida o cuota.
     * - `DispatchError::PayloadCorruption`: contrato de página roto.
     */
    #[instrument(skip(self, api_secret_key))]
    pub async fn collect_events(
        &self,
        api_secret_key: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ProviderEventRecord>, DispatchError> {
        let mut collected_records = Vec::new();
        let mut pagination_cursor: Option<String> = None;

        for _page_round in 0..PAGINATION_PAGE_CEILING {
            // 1. CONSTRUCCIÓN DE LA URL DE PÁGINA (cursor opcional)
            let mut page_url = format!(
                "{}/v1/events?created[gte]={}&created[lte]={}&limit={}",
                self.api_base_url,
                since.timestamp(),
                until.timestamp(),
                STRIPE_PAGE_LIMIT
            );
            if let Some(cursor_identifier) = &pagination_cursor {
                page_url.push_str(&format!("&starting_after={}", cursor_identifier));
            }

            // 2. RÁFAGA DE RED CON AUTORIDAD BEARER
            let network_response = self
                .network_uplink_client
                .get(&page_url)
                .bearer_auth(api_secret_key)
                .send()
                .await?;

            if !network_response.status().is_success() {
                return Err(DispatchError::ProviderRejection(network_response.status().as_u16()));
            }

            let page_envelope: Value = network_response.json().await?;

            // 3. EXTRACCIÓN DE LA RÁFAGA DE EVENTOS
            let page_records = page_envelope
                .get("data")
                .and_then(Value::as_array)
                .ok_or_else(|| DispatchError::PayloadCorruption("EVENTS_PAGE_WITHOUT_DATA".into()))?;

            for event_artifact in page_records {
                let Some(provider_event_id) = event_artifact.get("id").and_then(Value::as_str)
                else {
                    continue;
                };

                pagination_cursor = Some(provider_event_id.to_string());
                collected_records.push(ProviderEventRecord {
                    provider_event_id: provider_event_id.to_string(),
                    event_type: event_artifact
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    payload: event_artifact.clone(),
                });
            }

            // 4. VEREDICTO DE CONTINUIDAD
            let has_more = page_envelope.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            if !has_more || page_records.is_empty() {
                debug!("📑 [RECON_P1]: Cursor walk complete ({} event(s)).", collected_records.len());
                return Ok(collected_records);
            }
        }

        warn!("✂️ [RECON_P1]: Page ceiling reached; window truncated at {} event(s).",
            collected_records.len());
        Ok(collected_records)
    }
}

impl Default for StripeEventsPager {
    fn default() -> Self {
        Self::new()
    }
}

// --- PAGINADOR P2 (SHOPIFY-STYLE ADMIN REST) ---

pub struct ShopifyOrdersPager {
    network_uplink_client: Client,
}

impl ShopifyOrdersPager {
    pub fn new() -> Self {
        Self { network_uplink_client: hardened_client("HookWise-Reconciliation/V3.3") }
    }

    /**
     * Recorre las órdenes del Admin REST siguiendo 'Link: rel="next"'.
     * Cada orden se normaliza con identidad sintética 'shopify:order:<id>'
     * y tipo 'orders/create'.
     *
     * La base admite override vía 'SHOPIFY_API_BASE_URL' (fixtures); en
     * producción se deriva del dominio de la tienda.
     */
    #[instrument(skip(self, access_token))]
    pub async fn collect_orders(
        &self,
        shop_domain: &str,
        access_token: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProviderEventRecord>, DispatchError> {
        let api_base_url = std::env::var("SHOPIFY_API_BASE_URL")
            .unwrap_or_else(|_| format!("https://{}", shop_domain));

        let mut next_page_url = Some(format!(
            "{}/admin/api/2024-01/orders.json?status=any&created_at_min={}&limit=100",
            api_base_url.trim_end_matches('/'),
            since.to_rfc3339()
        ));

        let mut collected_records = Vec::new();

        for _page_round in 0..PAGINATION_PAGE_CEILING {
            let Some(page_url) = next_page_url.take() else { break };

            let network_response = self
                .network_uplink_client
                .get(&page_url)
                .header("X-Shopify-Access-Token", access_token)
                .send()
                .await?;

            if !network_response.status().is_success() {
                return Err(DispatchError::ProviderRejection(network_response.status().as_u16()));
            }

            // La cabecera Link debe leerse antes de consumir el cuerpo.
            next_page_url = network_response
                .headers()
                .get("link")
                .and_then(|header_value| header_value.to_str().ok())
                .and_then(extract_next_link);

            let page_envelope: Value = network_response.json().await?;

            let page_orders = page_envelope
                .get("orders")
                .and_then(Value::as_array)
                .ok_or_else(|| DispatchError::PayloadCorruption("ORDERS_PAGE_WITHOUT_ORDERS".into()))?;

            for order_artifact in page_orders {
                let Some(order_identifier) = scalar_as_text(order_artifact.get("id")) else {
                    continue;
                };

                collected_records.push(ProviderEventRecord {
                    provider_event_id: format!("shopify:order:{}", order_identifier),
                    event_type: "orders/create".to_string(),
                    payload: order_artifact.clone(),
                });
            }

            if next_page_url.is_none() {
                info!("📑 [RECON_P2]: Link walk complete ({} order(s)).", collected_records.len());
                return Ok(collected_records);
            }
        }

        warn!("✂️ [RECON_P2]: Page ceiling reached; window truncated at {} order(s).",
            collected_records.len());
        Ok(collected_records)
    }
}

impl Default for ShopifyOrdersPager {
    fn default() -> Self {
        Self::new()
    }
}

/// Extrae la URL 'rel="next"' de una cabecera Link RFC-5988. La
/// referencia entre '<' y '>' debe parsear como URL absoluta; una
/// referencia malformada termina el paseo en vez de propagarse como
/// petición corrupta.
fn extract_next_link(link_header: &str) -> Option<String> {
    for link_segment in link_header.split(',') {
        if !link_segment.contains("rel=\"next\"") {
            continue;
        }
        let url_start = link_segment.find('<')? + 1;
        let url_end = link_segment.find('>')?;

        let next_page_url = Url::parse(&link_segment[url_start..url_end]).ok()?;
        return Some(next_page_url.into());
    }
    None
}

/// Los ids de órdenes llegan como número o como texto según la versión.
fn scalar_as_text(candidate: Option<&Value>) -> Option<String> {
    match candidate? {
        Value::String(text_identifier) => Some(text_identifier.clone()),
        Value::Number(numeric_identifier) => Some(numeric_identifier.to_string()),
        _ => None,
    }
}
