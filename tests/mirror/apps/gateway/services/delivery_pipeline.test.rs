// [tests/mirror/apps/gateway/services/delivery_pipeline.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL PIPELINE DE ENTREGA (V5.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE LOS ESCENARIOS DE MITIGACIÓN
 *
 * Escenarios certificados contra destinos efímeros reales:
 * 1. Camino feliz (200 -> delivered, circuito intacto).
 * 2. Apertura por 503 en serie y aparcamiento del sexto evento.
 * 3. Terminalidad de 'connection_refused' (sin reintento automático).
 * 4. Honra de Retry-After en 429 con éxito en el intento 2.
 * =================================================================
 */

use axum::{http::StatusCode, response::IntoResponse, routing::post, Router};
use chrono::Utc;
use hookwise_domain_models::{
    CircuitState, DeliveryStatus, Event, EventSource, FailureKind, Integration, IntegrationStatus,
    ProviderKind, TaskTopic, WebhookReceivedDirective, WebhookRetryDirective,
};
use hookwise_gateway::services::DeliveryWorkerService;
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

async fn spawn_destination(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("INFRA_FAULT: ephemeral port allocation failed.");
    let local_address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("INFRA_FAULT: ephemeral destination died.");
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
        provider: ProviderKind::Stripe,
        signing_secret: "whsec_pipeline".to_string(),
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

async fn crystallize_event(
    application_state: &AppState,
    event_id: &str,
    integration_id: &str,
) -> Event {
    let event = Event {
        id: event_id.to_string(),
        integration_id: integration_id.to_string(),
        event_type: "charge.succeeded".to_string(),
        payload: json!({ "id": event_id, "data": { "object": { "customer": "cus_42" } } }),
        headers: BTreeMap::new(),
        received_at: Utc::now(),
        signature_valid: true,
        provider_event_id: Some(format!("prov_{}", event_id)),
        source: EventSource::Webhook,
    };
    application_state.event_repository.insert(&event).await.unwrap();
    event
}

fn received_directive(event: &Event, destination_url: &str) -> WebhookReceivedDirective {
    WebhookReceivedDirective {
        event_id: event.id.clone(),
        integration_id: event.integration_id.clone(),
        destination_url: destination_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * ESCENARIO 1: Camino feliz: una entrega, un 200, circuito intacto.
     */
    #[tokio::test]
    async fn certify_happy_path_delivery() {
        println!("\n🚚 [INICIO]: Auditando el camino feliz de la entrega...");

        let application_state =
            proving_grounds("file:mem_pipeline_a?mode=memory&cache=shared").await;

        let hit_counter = Arc::new(AtomicU32::new(0));
        let destination_hits = hit_counter.clone();
        let destination_url = spawn_destination(Router::new().route(
            "/hooks",
            post(move || {
                let destination_hits = destination_hits.clone();
                async move {
                    destination_hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::OK, "ok")
                }
            }),
        ))
        .await;

        let endpoint_id = enroll_producer(&application_state, "INT_PIPE_A", &destination_url).await;
        let event = crystallize_event(&application_state, "EV_HAPPY", "INT_PIPE_A").await;

        let worker = DeliveryWorkerService::new(application_state.clone());
        worker
            .handle_webhook_received(received_directive(&event, &destination_url))
            .await
            .unwrap();

        // La entrega quedó sellada con su evidencia completa.
        let attempt_trail =
            application_state.delivery_repository.list_for_event("EV_HAPPY").await.unwrap();
        assert_eq!(attempt_trail.len(), 1);
        assert_eq!(attempt_trail[0].status, DeliveryStatus::Delivered);
        assert_eq!(attempt_trail[0].status_code, Some(200));
        assert_eq!(attempt_trail[0].attempt_number, 1);

        // El circuito permanece cerrado y el destino vio UN solo POST.
        let endpoint = application_state.endpoint_repository.fetch_by_id(&endpoint_id).await.unwrap();
        assert_eq!(endpoint.circuit_state, CircuitState::Closed);
        assert_eq!(hit_counter.load(Ordering::SeqCst), 1);

        // La señal best-effort del rastreador de flujos quedó aparcada.
        let claimed_batch = application_state.task_outbox.claim_due_batch(50).await.unwrap();
        assert!(claimed_batch.iter().any(|task| task.topic == TaskTopic::FlowStepCompleted),
            "L4_SIGNAL_DRIFT: flow/step-completed missing.");
    }

    /**
     * ESCENARIO 2: Cinco 503 consecutivos abren el circuito; el sexto
     * evento se aparca sin tocar la red.
     */
    #[tokio::test]
    async fn certify_streak_opens_and_sixth_event_parks() {
        let application_state =
            proving_grounds("file:mem_pipeline_b?mode=memory&cache=shared").await;

        let hit_counter = Arc::new(AtomicU32::new(0));
        let destination_hits = hit_counter.clone();
        let destination_url = spawn_destination(Router::new().route(
            "/hooks",
            post(move || {
                let destination_hits = destination_hits.clone();
                async move {
                    destination_hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::SERVICE_UNAVAILABLE, "convalescing")
                }
            }),
        ))
        .await;

        let endpoint_id = enroll_producer(&application_state, "INT_PIPE_B", &destination_url).await;
        let worker = DeliveryWorkerService::new(application_state.clone());

        for failure_round in 1..=5u32 {
            let event = crystallize_event(
                &application_state,
                &format!("EV_503_{}", failure_round),
                "INT_PIPE_B",
            )
            .await;
            worker
                .handle_webhook_received(received_directive(&event, &destination_url))
                .await
                .unwrap();

            let attempt_trail = application_state
                .delivery_repository
                .list_for_event(&event.id)
                .await
                .unwrap();
            assert_eq!(attempt_trail[0].error_kind, Some(FailureKind::ServerError));
        }

        let opened_endpoint =
            application_state.endpoint_repository.fetch_by_id(&endpoint_id).await.unwrap();
        assert_eq!(opened_endpoint.circuit_state, CircuitState::Open,
            "L4_BREAKER_DRIFT: streak did not open the circuit.");
        assert_eq!(opened_endpoint.consecutive_failures, 5);
        assert_eq!(hit_counter.load(Ordering::SeqCst), 5);

        // El sexto evento se aparca en el búfer: CERO tráfico adicional.
        let sixth_event = crystallize_event(&application_state, "EV_503_6", "INT_PIPE_B").await;
        worker
            .handle_webhook_received(received_directive(&sixth_event, &destination_url))
            .await
            .unwrap();

        assert_eq!(hit_counter.load(Ordering::SeqCst), 5, "L4_GATE_DRIFT: parked event hit the wire.");
        assert_eq!(application_state.replay_repository.count_pending(&endpoint_id).await.unwrap(), 1);
        assert!(application_state.delivery_repository.list_for_event("EV_503_6").await.unwrap().is_empty());

        // La señal de apertura quedó aparcada para los observadores.
        let claimed_batch = application_state.task_outbox.claim_due_batch(50).await.unwrap();
        assert!(claimed_batch.iter().any(|task| task.topic == TaskTopic::EndpointCircuitOpened),
            "L4_SIGNAL_DRIFT: endpoint/circuit-opened missing.");
    }

    /**
     * ESCENARIO 3: 'connection_refused' es terminal: dead_letter, disparo
     * del disyuntor y CERO reintentos automáticos.
     */
    #[tokio::test]
    async fn certify_connection_refused_terminality() {
        let application_state =
            proving_grounds("file:mem_pipeline_c?mode=memory&cache=shared").await;

        // Puerto 1: nadie escucha; el SO rechaza el handshake.
        let unreachable_destination = "http://127.0.0.1:1/hooks";
        let endpoint_id =
            enroll_producer(&application_state, "INT_PIPE_C", unreachable_destination).await;
        let event = crystallize_event(&application_state, "EV_REFUSED", "INT_PIPE_C").await;

        let worker = DeliveryWorkerService::new(application_state.clone());
        worker
            .handle_webhook_received(received_directive(&event, unreachable_destination))
            .await
            .unwrap();

        let attempt_trail =
            application_state.delivery_repository.list_for_event("EV_REFUSED").await.unwrap();
        assert_eq!(attempt_trail.len(), 1, "L4_TERMINAL_DRIFT: ghost retries detected.");
        assert_eq!(attempt_trail[0].error_kind, Some(FailureKind::ConnectionRefused));
        assert_eq!(attempt_trail[0].status, DeliveryStatus::DeadLetter);

        // El disyuntor abre por la vía 'should_open_circuit'.
        let endpoint = application_state.endpoint_repository.fetch_by_id(&endpoint_id).await.unwrap();
        assert_eq!(endpoint.circuit_state, CircuitState::Open);

        // Jamás se aparcó un 'webhook/retry'.
        let claimed_batch = application_state.task_outbox.claim_due_batch(50).await.unwrap();
        assert!(!claimed_batch.iter().any(|task| task.topic == TaskTopic::WebhookRetry),
            "L4_TERMINAL_DRIFT: retry parked for terminal fault.");
    }

    /**
     * ESCENARIO 4: 429 con Retry-After: el reintento espera el plazo y el
     * intento 2 sella la entrega.
     */
    #[tokio::test]
    async fn certify_rate_limit_honored_with_second_attempt() {
        let application_state =
            proving_grounds("file:mem_pipeline_d?mode=memory&cache=shared").await;

        // Primer golpe: 429 con Retry-After 2; después: 200.
        let hit_counter = Arc::new(AtomicU32::new(0));
        let destination_hits = hit_counter.clone();
        let destination_url = spawn_destination(Router::new().route(
            "/hooks",
            post(move || {
                let destination_hits = destination_hits.clone();
                async move {
                    if destination_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::TOO_MANY_REQUESTS, [("Retry-After", "2")], "slow down")
                            .into_response()
                    } else {
                        (StatusCode::OK, "ok").into_response()
                    }
                }
            }),
        ))
        .await;

        enroll_producer(&application_state, "INT_PIPE_D", &destination_url).await;
        let event = crystallize_event(&application_state, "EV_LIMITED", "INT_PIPE_D").await;

        let worker = DeliveryWorkerService::new(application_state.clone());
        worker
            .handle_webhook_received(received_directive(&event, &destination_url))
            .await
            .unwrap();

        // El reintento está diferido: no es reclamable de inmediato.
        let premature_batch = application_state.task_outbox.claim_due_batch(50).await.unwrap();
        assert!(!premature_batch.iter().any(|task| task.topic == TaskTopic::WebhookRetry),
            "L4_TIMER_DRIFT: Retry-After ignored.");

        // Tras el plazo del proveedor, la tarea vence y se ejecuta.
        tokio::time::sleep(std::time::Duration::from_millis(2_200)).await;
        let due_batch = application_state.task_outbox.claim_due_batch(50).await.unwrap();
        let retry_task = due_batch
            .iter()
            .find(|task| task.topic == TaskTopic::WebhookRetry)
            .expect("L4_TIMER_DRIFT: retry task never came due.");

        let retry_directive: WebhookRetryDirective =
            serde_json::from_str(&retry_task.payload_json).unwrap();
        assert_eq!(retry_directive.attempt_number, 2);

        worker.handle_webhook_retry(retry_directive).await.unwrap();

        let attempt_trail =
            application_state.delivery_repository.list_for_event("EV_LIMITED").await.unwrap();
        assert_eq!(attempt_trail.len(), 2, "L4_RETRY_DRIFT: attempt trail incomplete.");
        assert_eq!(attempt_trail[0].error_kind, Some(FailureKind::RateLimit));
        assert_eq!(attempt_trail[1].status, DeliveryStatus::Delivered);
        assert_eq!(attempt_trail[1].attempt_number, 2);
        assert_eq!(hit_counter.load(Ordering::SeqCst), 2);
    }
}
