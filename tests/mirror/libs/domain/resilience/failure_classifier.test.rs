// [tests/mirror/libs/domain/resilience/failure_classifier.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL CLASIFICADOR DE FALLOS (V2.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L2-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DEL ORDEN DE REGLAS Y SUS VEREDICTOS
 * =================================================================
 */

use hookwise_domain_models::FailureKind;
use hookwise_domain_resilience::classifier::{
    classify_outcome, RATE_LIMIT_FALLBACK_DELAY_MS, SERVICE_UNAVAILABLE_DELAY_MS,
};

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * CERTIFICACIÓN: Matriz completa de reglas en orden (primera gana).
     */
    #[test]
    fn certify_rule_matrix_in_order() {
        println!("\n🧮 [INICIO]: Auditando matriz de clasificación 4.E...");

        // R1: timeout -> reintento sin espera (el llamador duplica el plazo).
        let timeout_verdict = classify_outcome(None, Some("request timeout elapsed"), None);
        assert_eq!(timeout_verdict.error_kind, FailureKind::Timeout);
        assert!(timeout_verdict.should_retry);
        assert_eq!(timeout_verdict.retry_delay_ms, None);
        assert!(!timeout_verdict.should_open_circuit);

        // R2: ssl -> terminal y dispara el disyuntor.
        let ssl_verdict = classify_outcome(None, Some("invalid peer certificate: Expired"), None);
        assert_eq!(ssl_verdict.error_kind, FailureKind::Ssl);
        assert!(!ssl_verdict.should_retry);
        assert!(ssl_verdict.should_open_circuit);

        // R3: destino inalcanzable -> terminal y dispara el disyuntor.
        let refused_verdict =
            classify_outcome(None, Some("tcp connect error: Connection refused (os error 111)"), None);
        assert_eq!(refused_verdict.error_kind, FailureKind::ConnectionRefused);
        assert!(!refused_verdict.should_retry);
        assert!(refused_verdict.should_open_circuit);

        // R4: 429 honra Retry-After en segundos.
        let limited_verdict = classify_outcome(Some(429), None, Some("7"));
        assert_eq!(limited_verdict.error_kind, FailureKind::RateLimit);
        assert_eq!(limited_verdict.retry_delay_ms, Some(7_000));

        // R4 sin cabecera: rescate de 60s.
        let blind_limited_verdict = classify_outcome(Some(429), None, None);
        assert_eq!(blind_limited_verdict.retry_delay_ms, Some(RATE_LIMIT_FALLBACK_DELAY_MS));

        // R5: 503 espera fija de 30s.
        let unavailable_verdict = classify_outcome(Some(503), None, None);
        assert_eq!(unavailable_verdict.error_kind, FailureKind::ServerError);
        assert_eq!(unavailable_verdict.retry_delay_ms, Some(SERVICE_UNAVAILABLE_DELAY_MS));

        // R6: otros 5xx reintentan una vez sin espera.
        let server_verdict = classify_outcome(Some(500), None, None);
        assert_eq!(server_verdict.error_kind, FailureKind::ServerError);
        assert_eq!(server_verdict.retry_delay_ms, None);
        assert!(server_verdict.should_retry);

        // R7: el resto del universo.
        let unknown_verdict = classify_outcome(Some(404), None, None);
        assert_eq!(unknown_verdict.error_kind, FailureKind::Unknown);
        assert!(unknown_verdict.should_retry);
        assert!(!unknown_verdict.should_open_circuit);
    }

    /**
     * CERTIFICACIÓN: El mensaje de transporte prima sobre el status
     * (un timeout con 503 residual sigue siendo timeout).
     */
    #[test]
    fn certify_message_outranks_status() {
        let verdict = classify_outcome(Some(503), Some("connection aborted mid-flight"), None);
        assert_eq!(verdict.error_kind, FailureKind::Timeout, "L2_ORDER_DRIFT: status outranked message.");
    }

    /**
     * CERTIFICACIÓN: Retry-After ilegible degrada al rescate de 60s.
     */
    #[test]
    fn certify_unparseable_retry_after_falls_back() {
        let verdict = classify_outcome(Some(429), None, Some("mañana"));
        assert_eq!(verdict.retry_delay_ms, Some(RATE_LIMIT_FALLBACK_DELAY_MS));
    }
}
