// [apps/gateway/src/handlers/admin.rs]
/*!
 * =================================================================
 * APARATO: MANAGEMENT SURFACE HANDLER (V4.1 - STORE-FACING SUBSET)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: CRUD DE INTEGRACIONES, INSPECCIÓN Y REPLAY MANUAL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SECRET DISCIPLINE: Las vistas de integración jamás exponen el
 *    secreto de firma ni el sobre de credencial; solo hechos.
 * 2. VAULT AT THE EDGE: La credencial de reconciliación llega en claro
 *    por esta superficie y se sella AES-GCM antes de tocar el Ledger.
 * 3. REFERENTIAL VETO: El borrado responde 409 mientras existan
 *    eventos del productor.
 * =================================================================
 */

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse as AxumResponse,
    Json,
};
use chrono::{DateTime, Utc};
use hookwise_core_credential_vault::CredentialVaultEngine;
use hookwise_domain_models::{
    Integration, IntegrationStatus, ProviderKind, TaskTopic, WebhookReceivedDirective,
};
use hookwise_infra_db::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// --- CONTRATOS DE LA SUPERFICIE DE GESTIÓN ---

#[derive(Deserialize)]
pub struct CreateIntegrationPayload {
    pub operator_id: String,
    pub provider: ProviderKind,
    pub signing_secret: String,
    pub destination_url: String,
    #[serde(default)]
    pub forward_unverified: Option<bool>,
    /// Credencial de reconciliación EN CLARO; se sella antes de persistir.
    #[serde(default)]
    pub reconciliation_credential: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateIntegrationPayload {
    #[serde(default)]
    pub destination_url: Option<String>,
    #[serde(default)]
    pub status: Option<IntegrationStatus>,
    #[serde(default)]
    pub forward_unverified: Option<bool>,
}

#[derive(Deserialize)]
pub struct ManualReplayPayload {
    #[serde(rename = "eventIds")]
    pub event_ids: Vec<String>,
}

/// Vista pública de una integración (sin material sensible).
#[derive(Serialize)]
pub struct IntegrationView {
    pub id: String,
    pub operator_id: String,
    pub provider: ProviderKind,
    pub destination_url: String,
    pub status: IntegrationStatus,
    pub forward_unverified: bool,
    pub reconciliation_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Integration> for IntegrationView {
    fn from(integration: &Integration) -> Self {
        Self {
            id: integration.id.clone(),
            operator_id: integration.operator_id.clone(),
            provider: integration.provider,
            destination_url: integration.destination_url.clone(),
            status: integration.status,
            forward_unverified: integration.forward_unverified,
            reconciliation_enabled: integration.reconciliation_credential.is_some(),
            created_at: integration.created_at,
            updated_at: integration.updated_at,
        }
    }
}

pub struct ManagementHandler;

impl ManagementHandler {
    /**
     * Endpoint: POST /api/integrations
     * Inscribe el productor y su endpoint 1:1.
     */
    #[instrument(skip(application_state, request_payload))]
    pub async fn handle_integration_creation(
        State(application_state): State<AppState>,
        Json(request_payload): Json<CreateIntegrationPayload>,
    ) -> impl AxumResponse {
        let integration_id = Uuid::new_v4().to_string();

        // 1. SELLADO DE LA CREDENCIAL (si viaja en la inscripción)
        let sealed_credential = match request_payload.reconciliation_credential.as_deref() {
            Some(plaintext_credential) => {
                let Ok(master_key) = std::env::var("VAULT_MASTER_KEY") else {
                    error!("🔥 [ADMIN]: VAULT_MASTER_KEY void; credential rejected.");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "vault_master_key_undefined" })),
                    )
                        .into_response();
                };

                match CredentialVaultEngine::seal(plaintext_credential, &master_key, &integration_id)
                {
                    Ok(sealed_envelope) => Some(sealed_envelope),
                    Err(seal_fault) => {
                        error!("🔥 [ADMIN]: Credential sealing collapsed: {}", seal_fault);
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({ "error": "credential_seal_fault" })),
                        )
                            .into_response();
                    }
                }
            }
            None => None,
        };

        let now = Utc::now();
        let integration = Integration {
            id: integration_id,
            operator_id: request_payload.operator_id,
            provider: request_payload.provider,
            signing_secret: request_payload.signing_secret,
            destination_url: request_payload.destination_url,
            status: IntegrationStatus::Active,
            forward_unverified: request_payload.forward_unverified.unwrap_or(true),
            reconciliation_credential: sealed_credential,
            created_at: now,
            updated_at: now,
        };

        // 2. CRISTALIZACIÓN DEL AGREGADO (integración + endpoint 1:1)
        if let Err(creation_fault) =
            application_state.integration_repository.create(&integration).await
        {
            error!("🔥 [ADMIN]: Integration creation collapsed: {}", creation_fault);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "storage_fault" })))
                .into_response();
        }

        if let Err(endpoint_fault) =
            application_state.endpoint_repository.ensure_for_integration(&integration.id).await
        {
            error!("🔥 [ADMIN]: Endpoint ignition collapsed: {}", endpoint_fault);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "storage_fault" })))
                .into_response();
        }

        (StatusCode::CREATED, Json(IntegrationView::from(&integration))).into_response()
    }

    /// Endpoint: GET /api/integrations
    #[instrument(skip(application_state))]
    pub async fn handle_integration_listing(
        State(application_state): State<AppState>,
    ) -> impl AxumResponse {
        match application_state.integration_repository.list_all().await {
            Ok(integrations) => {
                let views: Vec<IntegrationView> =
                    integrations.iter().map(IntegrationView::from).collect();
                (StatusCode::OK, Json(views)).into_response()
            }
            Err(listing_fault) => {
                error!("❌ [ADMIN]: Listing collapsed: {}", listing_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /**
     * Endpoint: GET /api/integrations/:id
     * Vista de la integración junto al estado de salud de su endpoint.
     */
    #[instrument(skip(application_state))]
    pub async fn handle_integration_inspection(
        State(application_state): State<AppState>,
        Path(integration_id): Path<String>,
    ) -> impl AxumResponse {
        let integration =
            match application_state.integration_repository.fetch_by_id(&integration_id).await {
                Ok(integration) => integration,
                Err(StoreError::IntegrationNotFound) => {
                    return StatusCode::NOT_FOUND.into_response();
                }
                Err(lookup_fault) => {
                    error!("❌ [ADMIN]: Inspection collapsed: {}", lookup_fault);
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };

        let endpoint_health = application_state
            .endpoint_repository
            .fetch_by_integration(&integration_id)
            .await
            .ok()
            .flatten();

        (
            StatusCode::OK,
            Json(json!({
                "integration": IntegrationView::from(&integration),
                "endpoint": endpoint_health,
            })),
        )
            .into_response()
    }

    /// Endpoint: PATCH /api/integrations/:id
    #[instrument(skip(application_state, request_payload))]
    pub async fn handle_integration_update(
        State(application_state): State<AppState>,
        Path(integration_id): Path<String>,
        Json(request_payload): Json<UpdateIntegrationPayload>,
    ) -> impl AxumResponse {
        let update_result = application_state
            .integration_repository
            .update_settings(
                &integration_id,
                request_payload.destination_url.as_deref(),
                request_payload.status,
                request_payload.forward_unverified,
            )
            .await;

        match update_result {
            Ok(()) => {
                info!("🔧 [ADMIN]: Integration {} settings leveled.", integration_id);
                StatusCode::OK.into_response()
            }
            Err(StoreError::IntegrationNotFound) => StatusCode::NOT_FOUND.into_response(),
            Err(update_fault) => {
                error!("❌ [ADMIN]: Update collapsed: {}", update_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Endpoint: DELETE /api/integrations/:id (vetado con eventos vivos).
    #[instrument(skip(application_state))]
    pub async fn handle_integration_deletion(
        State(application_state): State<AppState>,
        Path(integration_id): Path<String>,
    ) -> impl AxumResponse {
        match application_state.integration_repository.delete_guarded(&integration_id).await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(StoreError::IntegrationNotFound) => StatusCode::NOT_FOUND.into_response(),
            Err(StoreError::IntegrationStillReferenced) => {
                (StatusCode::CONFLICT, Json(json!({ "error": "events_still_reference_integration" })))
                    .into_response()
            }
            Err(deletion_fault) => {
                error!("❌ [ADMIN]: Deletion collapsed: {}", deletion_fault);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /**
     * Endpoint: GET /api/events/:id
     * El evento junto a su rastro completo de entregas.
     */
    #[instrument(skip(application_state))]
    pub async fn handle_event_inspection(
        State(application_state): State<AppState>,
        Path(event_id): Path<String>,
    ) -> impl AxumResponse {
        let event = match application_state.event_repository.fetch_by_id(&event_id).await {
            Ok(event) => event,
            Err(StoreError::EventNotFound) => return StatusCode::NOT_FOUND.into_response(),
            Err(lookup_fault) => {
                error!("❌ [ADMIN]: Event inspection collapsed: {}", lookup_fault);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let attempt_trail =
            application_state.delivery_repository.list_for_event(&event_id).await.unwrap_or_default();

        (StatusCode::OK, Json(json!({ "event": event, "deliveries": attempt_trail })))
            .into_response()
    }

    /**
     * Endpoint: POST /api/replay {"eventIds": [...]}
     * Re-emite 'webhook/received' por cada evento solicitado.
     */
    #[instrument(skip(application_state, request_payload))]
    pub async fn handle_manual_replay(
        State(application_state): State<AppState>,
        Json(request_payload): Json<ManualReplayPayload>,
    ) -> impl AxumResponse {
        let mut redriven_count = 0u32;
        let mut missing_identifiers: Vec<String> = Vec::new();

        for event_id in &request_payload.event_ids {
            // 1. HIDRATACIÓN DEL EVENTO Y SU PRODUCTOR
            let event = match application_state.event_repository.fetch_by_id(event_id).await {
                Ok(event) => event,
                Err(StoreError::EventNotFound) => {
                    missing_identifiers.push(event_id.clone());
                    continue;
                }
                Err(lookup_fault) => {
                    error!("❌ [ADMIN]: Replay lookup collapsed: {}", lookup_fault);
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };

            let integration = match application_state
                .integration_repository
                .fetch_by_id(&event.integration_id)
                .await
            {
                Ok(integration) => integration,
                Err(_) => {
                    missing_identifiers.push(event_id.clone());
                    continue;
                }
            };

            // 2. REDRIVE SOBRE LA CLAVE ORIGINAL (revive tareas selladas)
            let directive = WebhookReceivedDirective {
                event_id: event.id.clone(),
                integration_id: integration.id.clone(),
                destination_url: integration.destination_url.clone(),
            };

            let Ok(directive_json) = serde_json::to_string(&directive) else { continue };

            match application_state
                .task_outbox
                .redrive(TaskTopic::WebhookReceived, &directive_json, &directive.idempotency_key())
                .await
            {
                Ok(_) => redriven_count += 1,
                Err(redrive_fault) => {
                    warn!("⚠️ [ADMIN]: Manual replay of {} failed: {}", event_id, redrive_fault);
                }
            }
        }

        application_state.task_wake_signal.notify_one();
        info!("🔁 [ADMIN]: Manual replay parked {} task(s) ({} missing).",
            redriven_count, missing_identifiers.len());

        (
            StatusCode::OK,
            Json(json!({ "replayed": redriven_count, "missing": missing_identifiers })),
        )
            .into_response()
    }
}
