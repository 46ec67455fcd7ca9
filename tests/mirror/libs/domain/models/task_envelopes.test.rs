// [tests/mirror/libs/domain/models/task_envelopes.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE SOBRES DEL OUTBOX (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L2-MIRROR
 * RESPONSABILIDAD: PARIDAD DE SOBRES Y ESTABILIDAD DE CLAVES
 * =================================================================
 */

use hookwise_domain_models::{
    CircuitOpenedSignal, ReplayStartedSignal, TaskTopic, WebhookReceivedDirective,
};

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * CERTIFICACIÓN: Roundtrip JSON del sobre primario de entrega.
     */
    #[test]
    fn certify_received_directive_roundtrip() {
        println!("\n📨 [INICIO]: Auditando paridad de sobres del Outbox...");

        let directive = WebhookReceivedDirective {
            event_id: "EV_ENVELOPE_1".to_string(),
            integration_id: "INT_ENVELOPE_1".to_string(),
            destination_url: "https://destination.example/hooks".to_string(),
        };

        let serialized_envelope = serde_json::to_string(&directive)
            .expect("CRITICAL_FAULT: Serialization strata collapsed.");
        let recovered: WebhookReceivedDirective = serde_json::from_str(&serialized_envelope)
            .expect("CRITICAL_FAULT: Deserialization failed. Schema drift detected.");

        assert_eq!(recovered.event_id, directive.event_id);
        assert_eq!(recovered.destination_url, directive.destination_url);
        assert_eq!(directive.idempotency_key(), "webhook-received:EV_ENVELOPE_1");
    }

    /**
     * CERTIFICACIÓN: Las claves de señal quedan ancladas al sello de la
     * transición (exactamente una emisión por apertura/recuperación).
     */
    #[test]
    fn certify_signal_keys_anchor_to_transition_stamp() {
        let replay_signal = ReplayStartedSignal {
            endpoint_id: "EP_1".to_string(),
            integration_id: "INT_1".to_string(),
        };
        let circuit_signal = CircuitOpenedSignal {
            endpoint_id: "EP_1".to_string(),
            integration_id: "INT_1".to_string(),
        };

        let first_stamp = "2026-03-14T12:00:00+00:00";
        let second_stamp = "2026-03-14T12:05:00+00:00";

        assert_eq!(
            replay_signal.idempotency_key(first_stamp),
            "replay-started:EP_1:2026-03-14T12:00:00+00:00"
        );
        assert_ne!(
            replay_signal.idempotency_key(first_stamp),
            replay_signal.idempotency_key(second_stamp),
            "L2_KEY_DRIFT: distinct transitions share a key."
        );
        assert_ne!(
            circuit_signal.idempotency_key(first_stamp),
            replay_signal.idempotency_key(first_stamp),
            "L2_KEY_DRIFT: distinct topics share a key."
        );
    }

    /**
     * CERTIFICACIÓN: Nombres canónicos estables frente a refactors.
     */
    #[test]
    fn certify_topic_names_are_frozen() {
        let frozen_pairs = [
            (TaskTopic::WebhookReceived, "webhook/received"),
            (TaskTopic::WebhookRetry, "webhook/retry"),
            (TaskTopic::EndpointCircuitOpened, "endpoint/circuit-opened"),
            (TaskTopic::EndpointReplayStarted, "endpoint/replay-started"),
            (TaskTopic::FlowStepCompleted, "flow/step-completed"),
        ];

        for (topic, canonical_name) in frozen_pairs {
            assert_eq!(topic.canonical_name(), canonical_name);
            assert_eq!(TaskTopic::from_canonical_name(canonical_name), Some(topic));
        }
    }
}
