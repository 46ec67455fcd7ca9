// [apps/gateway/src/handlers/ingest.rs]
/*!
 * =================================================================
 * APARATO: INGESTION ENDPOINT (V5.0 - 50MS CRITICAL PATH)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: ACUSE RÁPIDO CON PERSISTENCIA DURABLE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. 50MS BUDGET: La ruta caliente solo espera la inserción del evento
 *    y el hand-off local al Outbox; el fan-out de entrega ocurre en
 *    los daemons.
 * 2. NEVER REJECT ON SIGNATURE: Una firma inválida se persiste con su
 *    flag durable y responde 200; diagnosticar una mala configuración
 *    exige conservar el payload.
 * 3. ENQUEUE IS BEST-EFFORT: Si el encolado falla, el evento ya está a
 *    salvo y el sweeper de huérfanos lo re-emitirá; el productor
 *    SIEMPRE observa éxito.
 * =================================================================
 */

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse as AxumResponse,
    Json,
};
use chrono::Utc;
use hookwise_domain_models::{Event, EventSource, IntegrationStatus, TaskTopic, WebhookReceivedDirective};
use hookwise_domain_signature::{verify_event, VerificationOutcome};
use hookwise_infra_db::StoreError;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub struct IngestionHandler;

impl IngestionHandler {
    /**
     * Endpoint: POST /ingest/{integration_id}
     *
     * Respuestas: 200 {"received":true} en aceptación (firma inválida
     * incluida), 404 en integración desconocida, 409 en pausada/error.
     */
    #[instrument(skip(application_state, raw_headers, raw_body), fields(integration = %integration_id))]
    pub async fn handle_event_ingestion(
        State(application_state): State<AppState>,
        Path(integration_id): Path<String>,
        raw_headers: HeaderMap,
        raw_body: Bytes,
    ) -> impl AxumResponse {
        // 1. RESOLUCIÓN DEL PRODUCTOR
        let integration = match application_state
            .integration_repository
            .fetch_by_id(&integration_id)
            .await
        {
            Ok(integration) => integration,
            Err(StoreError::IntegrationNotFound) => {
                return (StatusCode::NOT_FOUND, Json(json!({ "error": "integration_not_found" })))
                    .into_response();
            }
            Err(lookup_fault) => {
                error!("❌ [INGEST]: Integration lookup collapsed: {}", lookup_fault);
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "storage_fault" })))
                    .into_response();
            }
        };

        if integration.status != IntegrationStatus::Active {
            return (StatusCode::CONFLICT, Json(json!({ "error": "integration_not_active" })))
                .into_response();
        }

        // 2. CAPTURA DE CABECERAS (claves en minúscula)
        let lowered_headers: BTreeMap<String, String> = raw_headers
            .iter()
            .map(|(header_name, header_value)| {
                (
                    header_name.as_str().to_lowercase(),
                    header_value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        // 3. PARSEO CON SOBRE DE RESCATE
        let payload = serde_json::from_slice::<serde_json::Value>(&raw_body)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&raw_body) }));

        // 4. VEREDICTO DEL VERIFICADOR (jamás rechaza la petición)
        let verification = verify_event(
            integration.provider,
            &integration.signing_secret,
            &lowered_headers,
            &raw_body,
            &payload,
            Utc::now(),
        )
        .unwrap_or_else(|verifier_fault| {
            warn!("⚠️ [INGEST]: Verifier unusable for {}: {}", integration.id, verifier_fault);
            VerificationOutcome {
                signature_valid: false,
                event_type: "unknown".to_string(),
                provider_event_id: None,
            }
        });

        if !verification.signature_valid {
            warn!("🔏 [INGEST]: Invalid signature on integration {} (stored with durable flag).",
                integration.id);
        }

        // 5. CRISTALIZACIÓN DEL EVENTO (el único roundtrip esperado)
        let event = Event {
            id: Uuid::new_v4().to_string(),
            integration_id: integration.id.clone(),
            event_type: verification.event_type.clone(),
            payload,
            headers: lowered_headers,
            received_at: Utc::now(),
            signature_valid: verification.signature_valid,
            provider_event_id: verification.provider_event_id.clone(),
            source: EventSource::Webhook,
        };

        if let Err(storage_fault) = application_state.event_repository.insert(&event).await {
            // Infraestructura caída: fail-loud; el productor reintentará.
            error!("🔥 [INGEST]: Event crystallization collapsed: {}", storage_fault);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "storage_fault" })))
                .into_response();
        }

        // 6. HAND-OFF AL OUTBOX (best-effort, jamás bloquea el acuse)
        let forwarding_authorized = verification.signature_valid || integration.forward_unverified;

        if forwarding_authorized {
            let directive = WebhookReceivedDirective {
                event_id: event.id.clone(),
                integration_id: integration.id.clone(),
                destination_url: integration.destination_url.clone(),
            };

            match serde_json::to_string(&directive) {
                Ok(directive_json) => {
                    if let Err(enqueue_fault) = application_state
                        .task_outbox
                        .enqueue(
                            TaskTopic::WebhookReceived,
                            &directive_json,
                            &directive.idempotency_key(),
                            0,
                        )
                        .await
                    {
                        // El evento está a salvo; el sweeper lo re-emitirá.
                        warn!("🚑 [INGEST]: Enqueue failed for event {} (sweeper will redrive): {}",
                            event.id, enqueue_fault);
                    } else {
                        application_state.task_wake_signal.notify_one();
                    }
                }
                Err(envelope_fault) => {
                    warn!("🚑 [INGEST]: Directive envelope collapsed for {}: {}", event.id, envelope_fault);
                }
            }
        } else {
            info!("🔇 [INGEST]: Event {} stored but not forwarded (forward_unverified=false).",
                event.id);
        }

        debug!("✅ [INGEST]: Event {} acknowledged (type: {}).", event.id, event.event_type);
        (StatusCode::OK, Json(json!({ "received": true }))).into_response()
    }
}
