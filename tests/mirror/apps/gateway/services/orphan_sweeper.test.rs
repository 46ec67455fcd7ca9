// [tests/mirror/apps/gateway/services/orphan_sweeper.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL SWEEPER DE HUÉRFANOS (V3.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE LA REPARACIÓN DE INGESTAS COJAS
 *
 * # Mathematical Proof (Zero Lost Events):
 * Ingesta exitosa + encolado fallido deja un evento sin entrega; el
 * sweeper lo detecta tras 60s y re-emite sobre la clave original, de
 * modo que la emisión lógica sigue siendo como máximo una.
 * =================================================================
 */

use chrono::{Duration, Utc};
use hookwise_domain_models::{
    Event, EventSource, Integration, IntegrationStatus, ProviderKind, TaskTopic,
};
use hookwise_gateway::services::OrphanSweeperService;
use hookwise_gateway::state::AppState;
use hookwise_infra_db::EventLedgerClient;
use serde_json::json;
use std::collections::BTreeMap;

async fn proving_grounds(memory_anchor: &str) -> AppState {
    let client = EventLedgerClient::connect(memory_anchor, None)
        .await
        .expect("CRITICAL_FAULT: Failed to anchor in-memory event ledger.");
    AppState::new(client, "http://localhost:0".to_string())
}

async fn enroll_producer(
    application_state: &AppState,
    integration_id: &str,
    forward_unverified: bool,
) {
    let now = Utc::now();
    let integration = Integration {
        id: integration_id.to_string(),
        operator_id: "OPERATOR_CERT".to_string(),
        provider: ProviderKind::Github,
        signing_secret: "shared_secret".to_string(),
        destination_url: "https://destination.example/hooks".to_string(),
        status: IntegrationStatus::Active,
        forward_unverified,
        reconciliation_credential: None,
        created_at: now,
        updated_at: now,
    };
    application_state.integration_repository.create(&integration).await.unwrap();
    application_state.endpoint_repository.ensure_for_integration(integration_id).await.unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * CERTIFICACIÓN: Un evento viejo sin entrega ni tarea se re-emite; un
     * segundo ciclo sobre la tarea viva es un no-op.
     */
    #[tokio::test]
    async fn certify_orphan_redrive_is_single_shot() {
        println!("\n🧹 [INICIO]: Auditando la reparación de huérfanos...");

        let application_state =
            proving_grounds("file:mem_sweeper_a?mode=memory&cache=shared").await;
        enroll_producer(&application_state, "INT_SWP_A", true).await;

        // Ingesta coja: el evento existe, la tarea jamás nació.
        let orphaned_event = Event {
            id: "EV_ORPHAN_A".to_string(),
            integration_id: "INT_SWP_A".to_string(),
            event_type: "push".to_string(),
            payload: json!({ "ref": "refs/heads/main" }),
            headers: BTreeMap::new(),
            received_at: Utc::now() - Duration::seconds(120),
            signature_valid: true,
            provider_event_id: Some("gh_orphan_a".to_string()),
            source: EventSource::Webhook,
        };
        application_state.event_repository.insert(&orphaned_event).await.unwrap();

        let sweeper = OrphanSweeperService::new(application_state.clone());
        sweeper.execute_hygiene_cycle().await.unwrap();

        // La tarea de reparación quedó aparcada sobre la clave canónica.
        assert_eq!(application_state.task_outbox.count_with_status("pending").await.unwrap(), 1,
            "L4_REPAIR_DRIFT: orphan not redriven.");

        // Un segundo ciclo NO duplica la emisión lógica.
        sweeper.execute_hygiene_cycle().await.unwrap();
        assert_eq!(application_state.task_outbox.count_with_status("pending").await.unwrap(), 1,
            "L4_REPAIR_DRIFT: double emission detected.");

        let claimed_batch = application_state.task_outbox.claim_due_batch(10).await.unwrap();
        assert_eq!(claimed_batch.len(), 1);
        assert_eq!(claimed_batch[0].topic, TaskTopic::WebhookReceived);
        assert!(claimed_batch[0].payload_json.contains("EV_ORPHAN_A"));
    }

    /**
     * CERTIFICACIÓN: Los eventos jóvenes y los ya atendidos son invisibles
     * para el sweeper.
     */
    #[tokio::test]
    async fn certify_young_events_are_left_alone() {
        let application_state =
            proving_grounds("file:mem_sweeper_b?mode=memory&cache=shared").await;
        enroll_producer(&application_state, "INT_SWP_B", true).await;

        let young_event = Event {
            id: "EV_YOUNG_B".to_string(),
            integration_id: "INT_SWP_B".to_string(),
            event_type: "push".to_string(),
            payload: json!({ "ref": "refs/heads/dev" }),
            headers: BTreeMap::new(),
            received_at: Utc::now(),
            signature_valid: true,
            provider_event_id: None,
            source: EventSource::Webhook,
        };
        application_state.event_repository.insert(&young_event).await.unwrap();

        OrphanSweeperService::new(application_state.clone())
            .execute_hygiene_cycle()
            .await
            .unwrap();

        assert_eq!(application_state.task_outbox.count_with_status("pending").await.unwrap(), 0,
            "L4_REPAIR_DRIFT: grace window violated.");
    }

    /**
     * CERTIFICACIÓN: El radar replica la compuerta de reenvío de la
     * ingesta: un evento silenciado por política (firma inválida con
     * forward_unverified=false) JAMÁS se redrivea; con firma válida la
     * misma integración sí recupera su huérfano.
     */
    #[tokio::test]
    async fn certify_policy_muted_orphans_stay_muted() {
        let application_state =
            proving_grounds("file:mem_sweeper_c?mode=memory&cache=shared").await;
        enroll_producer(&application_state, "INT_SWP_MUTE", false).await;

        // Huérfano silenciado: viejo, sin entrega, firma inválida bajo
        // política restrictiva. La ingesta no lo reenvió; el sweeper
        // tampoco debe hacerlo.
        let muted_event = Event {
            id: "EV_MUTED_C".to_string(),
            integration_id: "INT_SWP_MUTE".to_string(),
            event_type: "push".to_string(),
            payload: json!({ "ref": "refs/heads/main" }),
            headers: BTreeMap::new(),
            received_at: Utc::now() - Duration::seconds(120),
            signature_valid: false,
            provider_event_id: None,
            source: EventSource::Webhook,
        };
        application_state.event_repository.insert(&muted_event).await.unwrap();

        let sweeper = OrphanSweeperService::new(application_state.clone());
        sweeper.execute_hygiene_cycle().await.unwrap();

        assert_eq!(application_state.task_outbox.count_with_status("pending").await.unwrap(), 0,
            "L4_POLICY_DRIFT: muted event redriven past the ingestion gate.");

        // Contraste: la misma política restrictiva no silencia firmas
        // válidas; ese huérfano sí se recupera.
        let verified_orphan = Event {
            id: "EV_VERIFIED_C".to_string(),
            integration_id: "INT_SWP_MUTE".to_string(),
            event_type: "push".to_string(),
            payload: json!({ "ref": "refs/heads/main" }),
            headers: BTreeMap::new(),
            received_at: Utc::now() - Duration::seconds(120),
            signature_valid: true,
            provider_event_id: None,
            source: EventSource::Webhook,
        };
        application_state.event_repository.insert(&verified_orphan).await.unwrap();

        sweeper.execute_hygiene_cycle().await.unwrap();

        let claimed_batch = application_state.task_outbox.claim_due_batch(10).await.unwrap();
        assert_eq!(claimed_batch.len(), 1, "L4_POLICY_DRIFT: verified orphan left behind.");
        assert_eq!(claimed_batch[0].topic, TaskTopic::WebhookReceived);
        assert!(claimed_batch[0].payload_json.contains("EV_VERIFIED_C"));
    }
}
