// [libs/infra/db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: STORE ERROR CATALOG (V3.4 - SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SEMANTIC TRIAGE: Distingue fallos de infraestructura (reintentables
 *    por el sistema de tareas) de fallos semánticos (terminales para el
 *    handler) para que el despachador aplique la política del §7.
 * 2. CAS AWARENESS: 'ContentionExhausted' señala el agotamiento del
 *    compare-and-swap sobre la fila del endpoint.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Error de enlace físico o de red con el cluster de Turso.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Fallo en la configuración del entorno (variables vacías o malformadas).
    #[error("[L3_DB_CONFIG_FAULT]: STRATEGIC_ENV_VOID -> {0}")]
    ConfigurationError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el dominio Rust.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// Error al comprometer cambios en una secuencia multi-tabla.
    #[error("[L3_DB_FAULT]: TRANSACTION_COLLAPSE")]
    TransactionError,

    /// El compare-and-swap sobre 'lock_version' agotó sus reintentos.
    #[error("[L3_DB_FAULT]: ENDPOINT_CONTENTION_EXHAUSTED")]
    ContentionExhausted,

    // --- ESTRATO DE ENTIDADES (FALLOS SEMÁNTICOS) ---

    /// La integración solicitada no existe en el Ledger.
    #[error("[L3_ENTITY_FAULT]: INTEGRATION_NOT_FOUND")]
    IntegrationNotFound,

    /// La integración tiene eventos que la referencian; borrado vetado.
    #[error("[L3_ENTITY_FAULT]: INTEGRATION_STILL_REFERENCED")]
    IntegrationStillReferenced,

    /// El endpoint solicitado no existe en el Ledger.
    #[error("[L3_ENTITY_FAULT]: ENDPOINT_NOT_FOUND")]
    EndpointNotFound,

    /// El evento solicitado no existe en el Ledger.
    #[error("[L3_ENTITY_FAULT]: EVENT_NOT_FOUND")]
    EventNotFound,

    /// La ranura de replay solicitada no existe o cambió de estado.
    #[error("[L3_ENTITY_FAULT]: REPLAY_ITEM_NOT_FOUND")]
    ReplayItemNotFound,

    /// La tarea del Outbox no existe o ya fue sellada.
    #[error("[L3_ENTITY_FAULT]: OUTBOX_TASK_NOT_FOUND")]
    TaskNotFound,
}

impl StoreError {
    /// Fallos semánticos: el handler debe terminar la tarea, no reintentarla.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            Self::IntegrationNotFound
                | Self::IntegrationStillReferenced
                | Self::EndpointNotFound
                | Self::EventNotFound
                | Self::ReplayItemNotFound
                | Self::TaskNotFound
        )
    }
}
