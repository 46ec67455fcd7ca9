// [apps/gateway/src/routes.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN ROUTING MATRIX (V4.2 - GATEWAY TOPOLOGY)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: ORQUESTACIÓN DE LA INGESTA Y LA SUPERFICIE DE GESTIÓN
 *
 * VISION HIPER-HOLÍSTICA:
 * La topología expone dos estratos:
 * 1. INGESTA (High Frequency): POST /ingest/{integration_id}, sin
 *    autenticación más allá de la firma del proveedor.
 * 2. GESTIÓN (Dashboard): CRUD de integraciones, inspección de eventos
 *    y replay manual, con escudo CORS para el Dashboard.
 * =================================================================
 */

use crate::handlers::{admin::ManagementHandler, ingest::IngestionHandler};
use crate::state::AppState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

pub fn create_sovereign_router(application_shared_state: AppState) -> Router {
    // Escudo de Red: CORS para el Dashboard y herramientas de Ops
    let network_security_shield = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    // ESTRATO DE GESTIÓN: Superficie del Dashboard
    let management_stratum = Router::new()
        .route(
            "/integrations",
            get(ManagementHandler::handle_integration_listing)
                .post(ManagementHandler::handle_integration_creation),
        )
        .route(
            "/integrations/:integration_id",
            get(ManagementHandler::handle_integration_inspection)
                .patch(ManagementHandler::handle_integration_update)
                .delete(ManagementHandler::handle_integration_deletion),
        )
        // Inspección del rastro de entregas de un evento
        .route("/events/:event_id", get(ManagementHandler::handle_event_inspection))
        // Replay manual por lista de eventos
        .route("/replay", post(ManagementHandler::handle_manual_replay));

    // COMPOSICIÓN GLOBAL (Root Topology)
    Router::new()
        .route("/health", get(|| async { "STATUS_OK" }))
        // Ruta caliente de productores (presupuesto 50ms p99)
        .route("/ingest/:integration_id", post(IngestionHandler::handle_event_ingestion))
        .nest("/api", management_stratum)
        .layer(network_security_shield)
        .with_state(application_shared_state)
}
