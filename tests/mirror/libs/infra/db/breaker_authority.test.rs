// [tests/mirror/libs/infra/db/breaker_authority.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE LA AUTORIDAD DEL DISYUNTOR (V4.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DEL CAS, LA VENTANA 20+1 Y EL SONDEO
 *
 * # Mathematical Proof (Crash-Safe Cell):
 * El estado del disyuntor se re-deriva de las filas de 'deliveries' en
 * cada escritura; el test certifica que una ventana hostil persistida
 * dispara la apertura aunque los contadores en RAM hayan nacido limpios.
 * =================================================================
 */

use chrono::Utc;
use hookwise_domain_models::{
    CircuitState, Delivery, DeliveryStatus, Integration, IntegrationStatus, ProviderKind,
};
use hookwise_domain_resilience::window::DeliverySample;
use hookwise_infra_db::repositories::{
    DeliveryRepository, EndpointRepository, EventRepository, IntegrationRepository,
};
use hookwise_infra_db::EventLedgerClient;
use serde_json::json;
use std::collections::BTreeMap;

async fn proving_grounds(memory_anchor: &str) -> (EventLedgerClient, String) {
    let client = EventLedgerClient::connect(memory_anchor, None)
        .await
        .expect("CRITICAL_FAULT: Failed to anchor in-memory event ledger.");

    let now = Utc::now();
    let integration = Integration {
        id: "INT_BRK".to_string(),
        operator_id: "OPERATOR_CERT".to_string(),
        provider: ProviderKind::Github,
        signing_secret: "shared_secret".to_string(),
        destination_url: "https://destination.example/hooks".to_string(),
        status: IntegrationStatus::Active,
        forward_unverified: true,
        reconciliation_credential: None,
        created_at: now,
        updated_at: now,
    };
    IntegrationRepository::new(client.clone()).create(&integration).await.unwrap();

    let endpoint = EndpointRepository::new(client.clone())
        .ensure_for_integration("INT_BRK")
        .await
        .unwrap();

    (client, endpoint.id)
}

fn failure_sample() -> DeliverySample {
    DeliverySample { success: false, response_time_ms: 250 }
}

fn success_sample() -> DeliverySample {
    DeliverySample { success: true, response_time_ms: 100 }
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * CERTIFICACIÓN: El endpoint 1:1 es idempotente y nace CLOSED.
     */
    #[tokio::test]
    async fn certify_endpoint_genesis_is_idempotent() {
        println!("\n🔌 [INICIO]: Auditando génesis del endpoint 1:1...");

        let (client, endpoint_id) =
            proving_grounds("file:mem_breaker_a?mode=memory&cache=shared").await;
        let endpoint_repository = EndpointRepository::new(client);

        let twin = endpoint_repository.ensure_for_integration("INT_BRK").await.unwrap();
        assert_eq!(twin.id, endpoint_id, "L3_GENESIS_DRIFT: duplicate endpoint created.");
        assert_eq!(twin.circuit_state, CircuitState::Closed);
        assert_eq!(twin.lock_version, 0);
    }

    /**
     * CERTIFICACIÓN: Cinco fallos consecutivos abren el circuito bajo
     * CAS; el sello temporal y la versión avanzan con la transición.
     */
    #[tokio::test]
    async fn certify_failure_streak_opens_under_cas() {
        let (client, endpoint_id) =
            proving_grounds("file:mem_breaker_b?mode=memory&cache=shared").await;
        let endpoint_repository = EndpointRepository::new(client);

        let genesis = endpoint_repository.fetch_by_id(&endpoint_id).await.unwrap();

        for failure_round in 1..=5u32 {
            let (verdict, refreshed) = endpoint_repository
                .record_delivery_outcome(&endpoint_id, failure_sample(), None)
                .await
                .unwrap();

            if failure_round < 5 {
                assert_eq!(verdict.next_state, CircuitState::Closed);
            } else {
                assert!(verdict.opened(), "L3_CAS_DRIFT: no trip at fifth failure.");
                assert_eq!(refreshed.circuit_state, CircuitState::Open);
                assert!(refreshed.state_changed_at > genesis.state_changed_at,
                    "L3_CAS_DRIFT: transition did not reseal state_changed_at.");
                assert_eq!(refreshed.consecutive_failures, 5);
            }
        }

        let final_cell = endpoint_repository.fetch_by_id(&endpoint_id).await.unwrap();
        assert_eq!(final_cell.lock_version, 5, "L3_CAS_DRIFT: version did not advance per write.");
    }

    /**
     * CERTIFICACIÓN: La ventana se re-deriva del Ledger: filas hostiles
     * persistidas disparan la apertura con contadores vírgenes.
     */
    #[tokio::test]
    async fn certify_window_rederivation_from_ledger() {
        let (client, endpoint_id) =
            proving_grounds("file:mem_breaker_c?mode=memory&cache=shared").await;

        let event_repository = EventRepository::new(client.clone());
        let delivery_repository = DeliveryRepository::new(client.clone());

        // Seis entregas fallidas cristalizadas directamente en el Ledger
        // (simulan la vida previa a un reinicio del proceso).
        for hostile_round in 0..6 {
            let event_id = format!("EV_HOSTILE_{}", hostile_round);
            event_repository
                .insert(&hookwise_domain_models::Event {
                    id: event_id.clone(),
                    integration_id: "INT_BRK".to_string(),
                    event_type: "push".to_string(),
                    payload: json!({ "round": hostile_round }),
                    headers: BTreeMap::new(),
                    received_at: Utc::now(),
                    signature_valid: true,
                    provider_event_id: None,
                    source: hookwise_domain_models::EventSource::Webhook,
                })
                .await
                .unwrap();

            delivery_repository
                .insert_attempt(&Delivery {
                    id: format!("DL_HOSTILE_{}", hostile_round),
                    event_id,
                    endpoint_id: Some(endpoint_id.clone()),
                    status: DeliveryStatus::Failed,
                    status_code: Some(503),
                    response_time_ms: Some(900),
                    response_body_excerpt: None,
                    error_kind: Some(hookwise_domain_models::FailureKind::ServerError),
                    attempt_number: 1,
                    attempted_at: Utc::now(),
                    next_retry_at: None,
                })
                .await
                .unwrap();
        }

        // Una única muestra nueva basta: la ventana (6 fallos + 1 éxito)
        // rinde ~14% de éxito con tamaño >= 5.
        let endpoint_repository = EndpointRepository::new(client);
        let (verdict, refreshed) = endpoint_repository
            .record_delivery_outcome(&endpoint_id, success_sample(), None)
            .await
            .unwrap();

        assert_eq!(verdict.window.sample_count, 7, "L3_WINDOW_DRIFT: ledger rows invisible.");
        assert!(verdict.window.success_rate_percent < 50.0);
        assert_eq!(refreshed.circuit_state, CircuitState::Open,
            "L3_WINDOW_DRIFT: hostile ledger did not trip the breaker.");
    }

    /**
     * CERTIFICACIÓN: Ciclo de recuperación completo: 3 sondeos ->
     * HALF_OPEN (ignición única), 2 fallos -> OPEN, 3 sondeos ->
     * HALF_OPEN, 10 éxitos -> CLOSED.
     */
    #[tokio::test]
    async fn certify_full_recovery_cycle() {
        let (client, endpoint_id) =
            proving_grounds("file:mem_breaker_d?mode=memory&cache=shared").await;
        let endpoint_repository = EndpointRepository::new(client);

        // FASE 1: Apertura por racha.
        for _ in 0..5 {
            endpoint_repository
                .record_delivery_outcome(&endpoint_id, failure_sample(), None)
                .await
                .unwrap();
        }

        // FASE 2: El sondeo fuera de OPEN sería ignorado; aquí conduce la
        // promoción exactamente en el tercer éxito.
        for probe_round in 1..=3u32 {
            let (probe_verdict, _) =
                endpoint_repository.record_probe_outcome(&endpoint_id, true).await.unwrap();

            if probe_round < 3 {
                assert_eq!(probe_verdict.next_state, CircuitState::Open);
                assert!(!probe_verdict.replay_should_start());
            } else {
                assert!(probe_verdict.replay_should_start(),
                    "L3_PROBE_DRIFT: single ignition flag missing at third probe.");
            }
        }

        // FASE 3: Probatoria fallida (2 fallos re-abren).
        endpoint_repository.record_delivery_outcome(&endpoint_id, failure_sample(), None).await.unwrap();
        let (demotion_verdict, _) = endpoint_repository
            .record_delivery_outcome(&endpoint_id, failure_sample(), None)
            .await
            .unwrap();
        assert_eq!(demotion_verdict.next_state, CircuitState::Open,
            "L3_TABLE_DRIFT: probation survived 2 failures.");

        // FASE 4: Segunda recuperación + cierre con 10 éxitos.
        for _ in 0..3 {
            endpoint_repository.record_probe_outcome(&endpoint_id, true).await.unwrap();
        }

        for success_round in 1..=10u32 {
            let (closing_verdict, refreshed) = endpoint_repository
                .record_delivery_outcome(&endpoint_id, success_sample(), None)
                .await
                .unwrap();

            if success_round < 10 {
                assert_eq!(closing_verdict.next_state, CircuitState::HalfOpen);
            } else {
                assert_eq!(closing_verdict.next_state, CircuitState::Closed,
                    "L3_TABLE_DRIFT: no close at tenth success.");
                assert_eq!(refreshed.consecutive_failures, 0);
            }
        }
    }

    /**
     * CERTIFICACIÓN: La apertura forzada (fallo terminal) es inmediata e
     * idempotente.
     */
    #[tokio::test]
    async fn certify_force_open_is_idempotent() {
        let (client, endpoint_id) =
            proving_grounds("file:mem_breaker_e?mode=memory&cache=shared").await;
        let endpoint_repository = EndpointRepository::new(client);

        let (previous_state, forced) = endpoint_repository.force_open(&endpoint_id).await.unwrap();
        assert_eq!(previous_state, CircuitState::Closed);
        assert_eq!(forced.circuit_state, CircuitState::Open);

        let (second_previous, _) = endpoint_repository.force_open(&endpoint_id).await.unwrap();
        assert_eq!(second_previous, CircuitState::Open, "L3_FORCE_DRIFT: double transition.");
    }
}
