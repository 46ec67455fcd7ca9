// [apps/gateway/src/lib.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY LIBRARY ROOT (V4.0 - RELAY ALIGNED)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L4)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DE MÓDULOS DEL GATEWAY
 * =================================================================
 */

pub mod handlers;
pub mod kernel;
pub mod routes;
pub mod services;
pub mod state;

/// Preludio nominal para el binario y el proving grounds.
pub mod prelude {
    pub use crate::kernel::GatewayKernel;
    pub use crate::routes::create_sovereign_router;
    pub use crate::state::AppState;
}
