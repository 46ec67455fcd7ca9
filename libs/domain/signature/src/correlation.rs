// [libs/domain/signature/src/correlation.rs]
/*!
 * =================================================================
 * APARATO: CORRELATION KEY DERIVATION (V1.3 - HINT ENGINE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: AGRUPACIÓN DE EVENTOS POR OBJETO DE NEGOCIO
 *
 * # Mathematical Proof (Hint, Not Identity):
 * La clave de correlación agrupa eventos relacionados para el replay
 * ordenado pero NO forma un espacio exactly-once: la deduplicación usa
 * 'provider_event_id'. Una clave nula simplemente deja el evento fuera
 * de toda agrupación.
 * =================================================================
 */

use hookwise_domain_models::ProviderKind;
use serde_json::Value;

/**
 * Deriva la clave de correlación de un payload según el proveedor.
 *
 * Reglas (primera coincidencia gana):
 * - Stripe:  data.object.customer -> 'stripe:customer:<id>'
 *            data.object.id       -> 'stripe:object:<id>'
 * - Shopify: order_id (raíz)      -> 'shopify:order:<id>'
 *            id (raíz)            -> 'shopify:resource:<id>'
 * - GitHub:  repository.full_name -> 'github:repo:<name>'
 */
pub fn derive_correlation_key(provider: ProviderKind, payload: &Value) -> Option<String> {
    match provider {
        ProviderKind::Stripe => {
            let business_object = payload.get("data")?.get("object")?;

            if let Some(customer_identifier) = scalar_identifier(business_object.get("customer")) {
                return Some(format!("stripe:customer:{}", customer_identifier));
            }
            scalar_identifier(business_object.get("id"))
                .map(|object_identifier| format!("stripe:object:{}", object_identifier))
        }
        ProviderKind::Shopify => {
            if let Some(order_identifier) = scalar_identifier(payload.get("order_id")) {
                return Some(format!("shopify:order:{}", order_identifier));
            }
            scalar_identifier(payload.get("id"))
                .map(|resource_identifier| format!("shopify:resource:{}", resource_identifier))
        }
        ProviderKind::Github => payload
            .get("repository")
            .and_then(|repository| repository.get("full_name"))
            .and_then(Value::as_str)
            .map(|repository_name| format!("github:repo:{}", repository_name)),
    }
}

/// Los proveedores alternan entre ids numéricos y de texto; ambos se
/// normalizan a su representación decimal/textual exacta.
fn scalar_identifier(candidate: Option<&Value>) -> Option<String> {
    match candidate? {
        Value::String(text_identifier) if !text_identifier.is_empty() => {
            Some(text_identifier.clone())
        }
        Value::Number(numeric_identifier) => Some(numeric_identifier.to_string()),
        _ => None,
    }
}
