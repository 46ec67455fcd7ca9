// [libs/infra/dispatch/src/lib.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN DISPATCH GATEWAY (V3.0 - UPLINK MATRIX)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DE TRANSPORTES DE RED
 *
 * # Topología de Módulos:
 * - delivery:  POST del payload canónico al destino del cliente.
 * - probe:     Sondeo de salud HEAD (fallback GET) de destinos OPEN.
 * - providers: Paginadores de APIs de proveedores (reconciliación).
 * =================================================================
 */

pub mod delivery;
pub mod errors;
pub mod probe;
pub mod providers;

pub use delivery::{DeliveryOutcome, DeliveryTransport, ForwardDirective};
pub use errors::DispatchError;
pub use probe::HealthProbeEngine;
pub use providers::{ProviderEventRecord, ShopifyOrdersPager, StripeEventsPager};
