// [libs/infra/db/src/lib.rs]
/*!
 * =================================================================
 * APARATO: TACTICAL PERSISTENCE GATEWAY (V3.2 - MOTOR A)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DEL CLIENTE, ESQUEMA Y REPOSITORIOS
 * =================================================================
 */

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use client::EventLedgerClient;
pub use errors::StoreError;
