// [libs/infra/dispatch/src/errors.rs]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// Fallo físico del enlace de red con la API del proveedor.
    #[error("[L3_UPLINK_FAULT]: PROVIDER_LINK_SEVERED -> {0}")]
    UplinkFault(#[from] reqwest::Error),

    /// La API del proveedor rechazó la petición (status no exitoso).
    #[error("[L3_UPLINK_FAULT]: PROVIDER_REJECTION -> HTTP_{0}")]
    ProviderRejection(u16),

    /// El cuerpo devuelto por el proveedor no respeta el contrato.
    #[error("[L3_UPLINK_FAULT]: PROVIDER_PAYLOAD_CORRUPTION -> {0}")]
    PayloadCorruption(String),

    /// La credencial desellada no tiene la forma esperada.
    #[error("[L3_UPLINK_FAULT]: CREDENTIAL_SHAPE_FAULT -> {0}")]
    CredentialShape(String),
}
