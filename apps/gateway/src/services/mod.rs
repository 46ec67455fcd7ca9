// [apps/gateway/src/services/mod.rs]
/*!
 * =================================================================
 * APARATO: SERVICE ORCHESTRATION HUB (V4.0 - COMPLETE MATRIX)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DE LOS MOTORES DEL GATEWAY
 *
 * # Topología de Módulos:
 * - task_dispatcher: Consumo del Outbox y ruteo por tópico.
 * - delivery_worker: Pipeline de entrega gateado por el disyuntor.
 * - replay_engine:   Drenaje ordenado post-recuperación.
 * - health_prober:   Sondeo de destinos con circuito abierto.
 * - orphan_sweeper:  Reparación de huérfanos y leases zombis.
 * - reconciliation:  Pull del proveedor y cierre de huecos.
 * - signal_bus:      Difusión de señales de observador.
 * =================================================================
 */

pub mod delivery_worker;
pub mod health_prober;
pub mod orphan_sweeper;
pub mod reconciliation;
pub mod replay_engine;
pub mod signal_bus;
pub mod task_dispatcher;

pub use delivery_worker::DeliveryWorkerService;
pub use health_prober::HealthProberService;
pub use orphan_sweeper::OrphanSweeperService;
pub use reconciliation::ReconciliationService;
pub use replay_engine::ReplayEngineService;
pub use signal_bus::{GatewaySignal, SignalBus};
pub use task_dispatcher::TaskDispatcherService;
