// [tests/mirror/libs/core/credential_vault/seal_roundtrip.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL VAULT DE CREDENCIALES (V2.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L1-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DEL SELLADO AES-256-GCM EN REPOSO
 * =================================================================
 */

use hookwise_core_credential_vault::{CredentialVaultEngine, VaultError};

const MASTER_KEY: &str = "proving-grounds-master-phrase";
const INTEGRATION_ANCHOR: &str = "INT_VAULT_CERT_01";

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * CERTIFICACIÓN: Roundtrip sellado -> apertura bit-perfecto.
     */
    #[test]
    fn certify_seal_and_unseal_roundtrip() {
        println!("\n🔐 [INICIO]: Auditando roundtrip del Vault...");

        let plaintext_credential = r#"{"api_key":"sk_test_cert_material"}"#;

        let sealed_envelope =
            CredentialVaultEngine::seal(plaintext_credential, MASTER_KEY, INTEGRATION_ANCHOR)
                .expect("SEAL_FAULT: sealing collapsed.");

        // El sobre jamás transporta el texto claro.
        assert!(!sealed_envelope.contains("sk_test_cert_material"),
            "L1_VAULT_LEAK: plaintext visible in sealed envelope.");

        let recovered_credential =
            CredentialVaultEngine::unseal(&sealed_envelope, MASTER_KEY, INTEGRATION_ANCHOR)
                .expect("UNSEAL_FAULT: opening collapsed.");

        assert_eq!(recovered_credential, plaintext_credential, "L1_VAULT_DRIFT: roundtrip mismatch.");
    }

    /**
     * CERTIFICACIÓN: Llave maestra incorrecta colapsa en error, jamás en
     * texto claro corrupto.
     */
    #[test]
    fn certify_wrong_master_key_is_rejected() {
        let sealed_envelope =
            CredentialVaultEngine::seal("secreto", MASTER_KEY, INTEGRATION_ANCHOR).unwrap();

        let verdict =
            CredentialVaultEngine::unseal(&sealed_envelope, "frase-equivocada", INTEGRATION_ANCHOR);
        assert!(matches!(verdict, Err(VaultError::DecryptionError)));
    }

    /**
     * CERTIFICACIÓN: La sal está anclada a la integración; otro ancla no
     * puede abrir el sobre.
     */
    #[test]
    fn certify_salt_is_bound_to_integration() {
        let sealed_envelope =
            CredentialVaultEngine::seal("secreto", MASTER_KEY, INTEGRATION_ANCHOR).unwrap();

        let verdict = CredentialVaultEngine::unseal(&sealed_envelope, MASTER_KEY, "INT_OTRA");
        assert!(matches!(verdict, Err(VaultError::DecryptionError)));
    }

    /**
     * CERTIFICACIÓN: Un sobre mutado colapsa en el tag de autenticación.
     */
    #[test]
    fn certify_tampered_envelope_is_rejected() {
        let sealed_envelope =
            CredentialVaultEngine::seal("secreto", MASTER_KEY, INTEGRATION_ANCHOR).unwrap();

        // Mutación grosera del material cifrado.
        let tampered_envelope = sealed_envelope.replacen("cipher_text_base64\":\"", "cipher_text_base64\":\"AAAA", 1);

        let verdict =
            CredentialVaultEngine::unseal(&tampered_envelope, MASTER_KEY, INTEGRATION_ANCHOR);
        assert!(verdict.is_err(), "L1_VAULT_DRIFT: tampered envelope accepted.");
    }
}
