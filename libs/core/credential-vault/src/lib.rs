// [libs/core/credential-vault/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL VAULT ENGINE (V2.3 - SEAL & UNSEAL)
 * CLASIFICACIÓN: CORE SECURITY (ESTRATO L1)
 * RESPONSABILIDAD: CIFRADO EN REPOSO DE CREDENCIALES DE RECONCILIACIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. AT-REST GUARANTEE: Las credenciales de API del proveedor solo
 *    existen en el Ledger como sobre sellado AES-256-GCM; el texto
 *    claro vive exclusivamente en RAM durante el ciclo de pull.
 * 2. PER-INTEGRATION SALT: La sal se ancla al identificador de la
 *    integración, de modo que dos credenciales idénticas nunca
 *    compartan material de llave derivada.
 *
 * # Mathematical Proof:
 * PBKDF2-HMAC-SHA256 transforma la frase maestra en una llave de 256
 * bits; el tag de autenticación GCM garantiza que cualquier mutación
 * del sobre (o una llave maestra incorrecta) colapse en error en vez
 * de producir texto claro corrupto.
 * =================================================================
 */

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("[L1_VAULT_FAULT]: BASE64_DECODE_FAULT -> {0}")]
    EncodingError(#[from] base64::DecodeError),

    #[error("[L1_VAULT_FAULT]: ENVELOPE_MALFORMED -> {0}")]
    EnvelopeError(#[from] serde_json::Error),

    #[error("[L1_VAULT_FAULT]: SEAL_MALFUNCTION")]
    EncryptionError,

    #[error("[L1_VAULT_FAULT]: UNSEAL_MALFUNCTION (integrity compromised or wrong master key)")]
    DecryptionError,
}

/// Sobre persistido en la columna 'reconciliation_credential'.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EncryptedCredentialEnvelope {
    pub cipher_text_base64: String,
    pub initialization_vector_base64: String,
}

pub struct CredentialVaultEngine;

impl CredentialVaultEngine {
    const PBKDF2_ITERATIONS: u32 = 150_000;
    const KEY_LENGTH_BYTES: usize = 32;

    /**
     * Sella una credencial en claro para su persistencia.
     *
     * @param plaintext_credential Credencial de API del proveedor.
     * @param master_key Frase maestra del despliegue (VAULT_MASTER_KEY).
     * @param integration_id Ancla de sal determinista por integración.
     *
     * # Errors:
     * - `VaultError::EncryptionError`: colapso interno del motor GCM.
     */
    pub fn seal(
        plaintext_credential: &str,
        master_key: &str,
        integration_id: &str,
    ) -> Result<String, VaultError> {
        let derived_key_buffer = Self::derive_key(master_key, integration_id);

        let key = Key::<Aes256Gcm>::from_slice(&derived_key_buffer);
        let cipher_engine = Aes256Gcm::new(key);

        // Nonce de 96 bits único por sellado.
        let initialization_vector = Aes256Gcm::generate_nonce(&mut OsRng);

        let cipher_text = cipher_engine
            .encrypt(&initialization_vector, plaintext_credential.as_bytes())
            .map_err(|_| VaultError::EncryptionError)?;

        let envelope = EncryptedCredentialEnvelope {
            cipher_text_base64: BASE64.encode(cipher_text),
            initialization_vector_base64: BASE64.encode(initialization_vector),
        };

        Ok(serde_json::to_string(&envelope)?)
    }

    /**
     * Abre un sobre sellado y recupera la credencial en claro.
     *
     * # Errors:
     * - `VaultError::DecryptionError`: sobre mutado o llave incorrecta.
     */
    pub fn unseal(
        sealed_envelope_json: &str,
        master_key: &str,
        integration_id: &str,
    ) -> Result<String, VaultError> {
        let envelope: EncryptedCredentialEnvelope = serde_json::from_str(sealed_envelope_json)?;

        // 1. ADQUISICIÓN DE BUFFERS BINARIOS
        let cipher_text = BASE64.decode(&envelope.cipher_text_base64)?;
        let initialization_vector = BASE64.decode(&envelope.initialization_vector_base64)?;

        // 2. DERIVACIÓN DE LLAVE SOBERANA
        let derived_key_buffer = Self::derive_key(master_key, integration_id);

        // 3. APERTURA CON VERIFICACIÓN DE INTEGRIDAD (Auth Tag)
        let key = Key::<Aes256Gcm>::from_slice(&derived_key_buffer);
        let cipher_engine = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(&initialization_vector);

        let decrypted_bytes = cipher_engine
            .decrypt(nonce, cipher_text.as_ref())
            .map_err(|_| VaultError::DecryptionError)?;

        String::from_utf8(decrypted_bytes).map_err(|_| VaultError::DecryptionError)
    }

    /// La sal se reconstruye de forma determinista por integración.
    fn derive_key(master_key: &str, integration_id: &str) -> [u8; Self::KEY_LENGTH_BYTES] {
        let salt_material = format!("hookwise_vault_v1_{}", integration_id.to_lowercase());

        let mut derived_key_buffer = [0u8; Self::KEY_LENGTH_BYTES];
        pbkdf2_hmac::<Sha256>(
            master_key.as_bytes(),
            salt_material.as_bytes(),
            Self::PBKDF2_ITERATIONS,
            &mut derived_key_buffer,
        );
        derived_key_buffer
    }
}
