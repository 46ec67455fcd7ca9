// [tests/mirror/libs/domain/signature/stripe_verification.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE FIRMAS P1 (V2.0 - TEMPORAL SCHEME)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L2-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DEL ESQUEMA 't=/v1=' Y SU VENTANA ANTI-REPLAY
 *
 * # Mathematical Proof (Byte Sensitivity):
 * HMAC-SHA-256 garantiza que la inversión de un único byte del payload
 * colapse la verificación; el test certifica esa sensibilidad junto a
 * la tolerancia temporal de 300 segundos.
 * =================================================================
 */

use chrono::{Duration, TimeZone, Utc};
use hookwise_domain_models::ProviderKind;
use hookwise_domain_signature::{stripe_signature_hex, verify_event};
use std::collections::BTreeMap;

const TEST_SIGNING_SECRET: &str = "whsec_proving_grounds_alpha";

fn stripe_headers(timestamp: i64, signature_hex: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("stripe-signature".to_string(), format!("t={},v1={}", timestamp, signature_hex));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * CERTIFICACIÓN: Un payload firmado con el secreto de prueba verifica
     * y extrae la identidad del evento del cuerpo.
     */
    #[test]
    fn certify_valid_signature_verifies_and_extracts_identity() {
        println!("\n🔏 [INICIO]: Auditando firma P1 nominal...");

        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let raw_body =
            br#"{"id":"evt_cert_001","type":"charge.succeeded","data":{"object":{"id":"ch_9"}}}"#;
        let payload: serde_json::Value = serde_json::from_slice(raw_body).unwrap();

        let signature_hex = stripe_signature_hex(TEST_SIGNING_SECRET, now.timestamp(), raw_body);
        let headers = stripe_headers(now.timestamp(), &signature_hex);

        let outcome = verify_event(
            ProviderKind::Stripe,
            TEST_SIGNING_SECRET,
            &headers,
            raw_body,
            &payload,
            now,
        )
        .expect("VERIFIER_FAULT: usable secret rejected.");

        assert!(outcome.signature_valid, "L2_SIGNATURE_DRIFT: valid signature rejected.");
        assert_eq!(outcome.event_type, "charge.succeeded");
        assert_eq!(outcome.provider_event_id.as_deref(), Some("evt_cert_001"));
    }

    /**
     * CERTIFICACIÓN: La inversión de un byte del payload colapsa el veredicto.
     */
    #[test]
    fn certify_flipped_payload_byte_invalidates() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let raw_body = br#"{"id":"evt_cert_002","type":"charge.succeeded"}"#;
        let payload: serde_json::Value = serde_json::from_slice(raw_body.as_slice()).unwrap();

        let signature_hex = stripe_signature_hex(TEST_SIGNING_SECRET, now.timestamp(), raw_body);
        let headers = stripe_headers(now.timestamp(), &signature_hex);

        // Mutación de un único byte tras la firma.
        let mut tampered_body = raw_body.to_vec();
        tampered_body[10] ^= 0x01;

        let outcome = verify_event(
            ProviderKind::Stripe,
            TEST_SIGNING_SECRET,
            &headers,
            &tampered_body,
            &payload,
            now,
        )
        .unwrap();

        assert!(!outcome.signature_valid, "L2_SIGNATURE_DRIFT: tampered payload accepted.");
    }

    /**
     * CERTIFICACIÓN: Un sello temporal fuera de la ventana de 300s se
     * rechaza aunque la firma sea matemáticamente correcta.
     */
    #[test]
    fn certify_stale_timestamp_is_rejected() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let stale_moment = now - Duration::seconds(301);
        let raw_body = br#"{"id":"evt_cert_003","type":"charge.succeeded"}"#;
        let payload: serde_json::Value = serde_json::from_slice(raw_body.as_slice()).unwrap();

        let signature_hex =
            stripe_signature_hex(TEST_SIGNING_SECRET, stale_moment.timestamp(), raw_body);
        let headers = stripe_headers(stale_moment.timestamp(), &signature_hex);

        let outcome = verify_event(
            ProviderKind::Stripe,
            TEST_SIGNING_SECRET,
            &headers,
            raw_body,
            &payload,
            now,
        )
        .unwrap();

        assert!(!outcome.signature_valid, "L2_REPLAY_SHIELD: stale timestamp accepted.");

        // El borde exacto de la ventana (300s) sigue siendo válido.
        let edge_moment = now - Duration::seconds(300);
        let edge_signature =
            stripe_signature_hex(TEST_SIGNING_SECRET, edge_moment.timestamp(), raw_body);
        let edge_headers = stripe_headers(edge_moment.timestamp(), &edge_signature);

        let edge_outcome = verify_event(
            ProviderKind::Stripe,
            TEST_SIGNING_SECRET,
            &edge_headers,
            raw_body,
            &payload,
            now,
        )
        .unwrap();
        assert!(edge_outcome.signature_valid, "L2_WINDOW_DRIFT: 300s edge rejected.");
    }

    /**
     * CERTIFICACIÓN: Con múltiples candidatos v1, basta que uno verifique.
     */
    #[test]
    fn certify_any_v1_candidate_suffices() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let raw_body = br#"{"id":"evt_cert_004","type":"invoice.paid"}"#;
        let payload: serde_json::Value = serde_json::from_slice(raw_body.as_slice()).unwrap();

        let genuine_signature = stripe_signature_hex(TEST_SIGNING_SECRET, now.timestamp(), raw_body);

        let mut headers = BTreeMap::new();
        headers.insert(
            "stripe-signature".to_string(),
            format!("t={},v1={},v1={}", now.timestamp(), "deadbeef".repeat(8), genuine_signature),
        );

        let outcome = verify_event(
            ProviderKind::Stripe,
            TEST_SIGNING_SECRET,
            &headers,
            raw_body,
            &payload,
            now,
        )
        .unwrap();
        assert!(outcome.signature_valid, "L2_CANDIDATE_DRIFT: rotation candidate rejected.");
    }

    /**
     * CERTIFICACIÓN: Sin cabecera de firma, el veredicto es inválido pero
     * la identidad del evento se extrae igualmente (política non-rejecting).
     */
    #[test]
    fn certify_missing_header_still_extracts_identity() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let raw_body = br#"{"id":"evt_cert_005","type":"charge.refunded"}"#;
        let payload: serde_json::Value = serde_json::from_slice(raw_body.as_slice()).unwrap();

        let outcome = verify_event(
            ProviderKind::Stripe,
            TEST_SIGNING_SECRET,
            &BTreeMap::new(),
            raw_body,
            &payload,
            now,
        )
        .unwrap();

        assert!(!outcome.signature_valid);
        assert_eq!(outcome.event_type, "charge.refunded");
        assert_eq!(outcome.provider_event_id.as_deref(), Some("evt_cert_005"));
    }
}
