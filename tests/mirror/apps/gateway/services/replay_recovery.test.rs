// [tests/mirror/apps/gateway/services/replay_recovery.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE RECUPERACIÓN Y REPLAY (V5.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DEL DRENAJE ORDENADO POST-RECUPERACIÓN
 *
 * # Mathematical Proof (Ordered Drain):
 * El drenaje procesa estrictamente por 'position ASC'; para cualquier
 * par de ranuras entregadas, menor posición implica 'delivered_at' no
 * posterior. El test certifica el invariante sobre 8 ranuras reales.
 * =================================================================
 */

use axum::{http::StatusCode, routing::post, Router};
use chrono::Utc;
use hookwise_domain_models::{
    CircuitState, Delivery, DeliveryStatus, Event, EventSource, Integration, IntegrationStatus,
    ProviderKind, ReplayStartedSignal,
};
use hookwise_gateway::services::ReplayEngineService;
use hookwise_gateway::state::AppState;
use hookwise_infra_db::EventLedgerClient;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

async fn proving_grounds(memory_anchor: &str) -> AppState {
    let client = EventLedgerClient::connect(memory_anchor, None)
        .await
        .expect("CRITICAL_FAULT: Failed to anchor in-memory event ledger.");
    AppState::new(client, "http://localhost:0".to_string())
}

async fn spawn_counting_destination(hit_counter: Arc<AtomicU32>) -> String {
    let destination_router = Router::new().route(
        "/hooks",
        post(move || {
            let hit_counter = hit_counter.clone();
            async move {
                hit_counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::OK, "ok")
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("INFRA_FAULT: ephemeral port allocation failed.");
    let local_address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, destination_router)
            .await
            .expect("INFRA_FAULT: ephemeral destination died.");
    });

    format!("http://{}/hooks", local_address)
}

async fn enroll_producer(
    application_state: &AppState,
    integration_id: &str,
    destination_url: &str,
) -> String {
    let now = Utc::now();
    let integration = Integration {
        id: integration_id.to_string(),
        operator_id: "OPERATOR_CERT".to_string(),
        provider: ProviderKind::Shopify,
        signing_secret: "shared_secret".to_string(),
        destination_url: destination_url.to_string(),
        status: IntegrationStatus::Active,
        forward_unverified: true,
        reconciliation_credential: None,
        created_at: now,
        updated_at: now,
    };
    application_state.integration_repository.create(&integration).await.unwrap();

    let endpoint =
        application_state.endpoint_repository.ensure_for_integration(integration_id).await.unwrap();
    endpoint.id
}

async fn park_event(
    application_state: &AppState,
    endpoint_id: &str,
    event_id: &str,
    integration_id: &str,
    provider_event_id: Option<&str>,
) -> i64 {
    let event = Event {
        id: event_id.to_string(),
        integration_id: integration_id.to_string(),
        event_type: "orders/create".to_string(),
        payload: json!({ "order_id": 777, "id": event_id }),
        headers: BTreeMap::new(),
        received_at: Utc::now(),
        signature_valid: true,
        provider_event_id: provider_event_id.map(str::to_string),
        source: EventSource::Webhook,
    };
    application_state.event_repository.insert(&event).await.unwrap();

    application_state
        .endpoint_repository
        .enqueue_for_replay(endpoint_id, event_id, Some("shopify:order:777"))
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookwise_domain_resilience::window::DeliverySample;

    /**
     * ESCENARIO: Circuito abierto con 8 ranuras; 3 sondeos exitosos
     * promueven a HALF_OPEN; el drenaje entrega las 8 en orden estricto.
     */
    #[tokio::test]
    async fn certify_recover_and_drain_in_order() {
        println!("\n🎬 [INICIO]: Auditando recuperación y drenaje ordenado...");

        let application_state =
            proving_grounds("file:mem_recovery_a?mode=memory&cache=shared").await;

        let hit_counter = Arc::new(AtomicU32::new(0));
        let destination_url = spawn_counting_destination(hit_counter.clone()).await;
        let endpoint_id = enroll_producer(&application_state, "INT_RCV_A", &destination_url).await;

        // FASE 1: Apertura del circuito por racha de fallos.
        for _ in 0..5 {
            application_state
                .endpoint_repository
                .record_delivery_outcome(
                    &endpoint_id,
                    DeliverySample { success: false, response_time_ms: 300 },
                    None,
                )
                .await
                .unwrap();
        }

        // FASE 2: Ocho eventos aparcados en orden de llegada.
        for slot_index in 1..=8u32 {
            let allocated_position = park_event(
                &application_state,
                &endpoint_id,
                &format!("EV_RCV_{}", slot_index),
                "INT_RCV_A",
                Some(&format!("prov_rcv_{}", slot_index)),
            )
            .await;
            assert_eq!(allocated_position, i64::from(slot_index));
        }

        // FASE 3: Tres sondeos exitosos -> HALF_OPEN.
        for _ in 0..3 {
            application_state
                .endpoint_repository
                .record_probe_outcome(&endpoint_id, true)
                .await
                .unwrap();
        }
        let recovered_endpoint =
            application_state.endpoint_repository.fetch_by_id(&endpoint_id).await.unwrap();
        assert_eq!(recovered_endpoint.circuit_state, CircuitState::HalfOpen);

        // FASE 4: Drenaje completo.
        let replay_engine = ReplayEngineService::new(application_state.clone());
        replay_engine
            .handle_replay_started(ReplayStartedSignal {
                endpoint_id: endpoint_id.clone(),
                integration_id: "INT_RCV_A".to_string(),
            })
            .await
            .unwrap();

        // Las 8 ranuras quedaron entregadas, en orden de posición.
        let delivered_items =
            application_state.replay_repository.list_delivered(&endpoint_id).await.unwrap();
        assert_eq!(delivered_items.len(), 8, "L4_DRAIN_DRIFT: buffer not fully drained.");

        let delivered_positions: Vec<i64> =
            delivered_items.iter().map(|item| item.position).collect();
        assert_eq!(delivered_positions, (1..=8).collect::<Vec<i64>>());

        // Invariante de orden: menor posición, sello no posterior.
        for adjacent_pair in delivered_items.windows(2) {
            let earlier_seal = adjacent_pair[0].delivered_at.expect("SEAL_VOID");
            let later_seal = adjacent_pair[1].delivered_at.expect("SEAL_VOID");
            assert!(earlier_seal <= later_seal,
                "L4_ORDER_DRIFT: position {} sealed after position {}.",
                adjacent_pair[0].position, adjacent_pair[1].position);
        }

        assert_eq!(hit_counter.load(Ordering::SeqCst), 8);
        assert_eq!(application_state.replay_repository.count_pending(&endpoint_id).await.unwrap(), 0);

        // Ocho éxitos en probatoria: aún no bastan para cerrar (10).
        let post_drain_endpoint =
            application_state.endpoint_repository.fetch_by_id(&endpoint_id).await.unwrap();
        assert_eq!(post_drain_endpoint.circuit_state, CircuitState::HalfOpen);
        assert_eq!(post_drain_endpoint.consecutive_successes, 8);
    }

    /**
     * ESCENARIO: Deduplicación: una identidad del proveedor ya entregada
     * sella la ranura sin tocar la red.
     */
    #[tokio::test]
    async fn certify_dedup_seals_without_network() {
        let application_state =
            proving_grounds("file:mem_recovery_b?mode=memory&cache=shared").await;

        let hit_counter = Arc::new(AtomicU32::new(0));
        let destination_url = spawn_counting_destination(hit_counter.clone()).await;
        let endpoint_id = enroll_producer(&application_state, "INT_RCV_B", &destination_url).await;

        // El gemelo primario ya fue entregado por la vía directa.
        let primary_event = Event {
            id: "EV_TWIN_PRIMARY".to_string(),
            integration_id: "INT_RCV_B".to_string(),
            event_type: "orders/create".to_string(),
            payload: json!({ "id": "EV_TWIN_PRIMARY" }),
            headers: BTreeMap::new(),
            received_at: Utc::now(),
            signature_valid: true,
            provider_event_id: Some("prov_twin".to_string()),
            source: EventSource::Webhook,
        };
        application_state.event_repository.insert(&primary_event).await.unwrap();
        application_state
            .delivery_repository
            .insert_attempt(&Delivery {
                id: "DL_TWIN_PRIMARY".to_string(),
                event_id: "EV_TWIN_PRIMARY".to_string(),
                endpoint_id: Some(endpoint_id.clone()),
                status: DeliveryStatus::Delivered,
                status_code: Some(200),
                response_time_ms: Some(80),
                response_body_excerpt: None,
                error_kind: None,
                attempt_number: 1,
                attempted_at: Utc::now(),
                next_retry_at: None,
            })
            .await
            .unwrap();

        // El gemelo tardío (vía reconciliación) entra al búfer.
        park_event(&application_state, &endpoint_id, "EV_TWIN_LATE", "INT_RCV_B", Some("prov_twin"))
            .await;

        let replay_engine = ReplayEngineService::new(application_state.clone());
        replay_engine
            .handle_replay_started(ReplayStartedSignal {
                endpoint_id: endpoint_id.clone(),
                integration_id: "INT_RCV_B".to_string(),
            })
            .await
            .unwrap();

        let delivered_items =
            application_state.replay_repository.list_delivered(&endpoint_id).await.unwrap();
        assert_eq!(delivered_items.len(), 1, "L4_DEDUP_DRIFT: twin slot not sealed.");
        assert_eq!(hit_counter.load(Ordering::SeqCst), 0, "L4_DEDUP_DRIFT: dedup hit the wire.");

        // El gemelo tardío no generó fila de entrega propia.
        assert!(application_state
            .delivery_repository
            .list_for_event("EV_TWIN_LATE")
            .await
            .unwrap()
            .is_empty());
    }

    /**
     * ESCENARIO: Presupuesto de salto: la ranura con 3 intentos quemados
     * se marca 'skipped' sin tocar la red y sin bloquear el drenaje.
     */
    #[tokio::test]
    async fn certify_skip_budget_never_blocks() {
        let application_state =
            proving_grounds("file:mem_recovery_c?mode=memory&cache=shared").await;

        let hit_counter = Arc::new(AtomicU32::new(0));
        let destination_url = spawn_counting_destination(hit_counter.clone()).await;
        let endpoint_id = enroll_producer(&application_state, "INT_RCV_C", &destination_url).await;

        park_event(&application_state, &endpoint_id, "EV_BURNED", "INT_RCV_C", None).await;
        park_event(&application_state, &endpoint_id, "EV_FRESH", "INT_RCV_C", None).await;

        // Se queman los 3 intentos de la primera ranura.
        let burned_item = application_state
            .replay_repository
            .fetch_pending_batch(&endpoint_id, 1)
            .await
            .unwrap()
            .remove(0);
        for _ in 0..3 {
            application_state.replay_repository.begin_delivering(&burned_item.id).await.unwrap();
            application_state.replay_repository.return_to_pending(&burned_item.id).await.unwrap();
        }

        let replay_engine = ReplayEngineService::new(application_state.clone());
        replay_engine
            .handle_replay_started(ReplayStartedSignal {
                endpoint_id: endpoint_id.clone(),
                integration_id: "INT_RCV_C".to_string(),
            })
            .await
            .unwrap();

        // La ranura quemada quedó 'skipped'; la fresca se entregó detrás.
        let delivered_items =
            application_state.replay_repository.list_delivered(&endpoint_id).await.unwrap();
        assert_eq!(delivered_items.len(), 1);
        assert_eq!(delivered_items[0].event_id, "EV_FRESH",
            "L4_SKIP_DRIFT: burned slot blocked its successors.");
        assert_eq!(hit_counter.load(Ordering::SeqCst), 1, "L4_SKIP_DRIFT: skipped slot hit the wire.");
        assert_eq!(application_state.replay_repository.count_pending(&endpoint_id).await.unwrap(), 0);
    }
}
