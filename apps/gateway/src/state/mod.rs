// [apps/gateway/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY STATE ORCHESTRATOR (V4.3 - COMPOSITION ROOT)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: ORQUESTACIÓN DE REPOSITORIOS, TRANSPORTES Y CACHÉS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. COMPOSITION ROOT: Centraliza el rastro de los 7 repositorios, los
 *    transportes de red y el bus de señales en un contenedor Clone.
 * 2. HOT STATE CACHE: Lectura caliente del estado del disyuntor por
 *    endpoint; la obsolescencia está acotada por la ventana del CAS y
 *    se auto-corrige en el siguiente 'recordDelivery'.
 * 3. HALF-OPEN PACING: Registro de tokens por endpoint que serializa
 *    las entregas en probatoria a 1 ev/s.
 * =================================================================
 */

use crate::services::signal_bus::SignalBus;
use hookwise_domain_models::CircuitState;
use hookwise_infra_db::repositories::{
    DeliveryRepository, EndpointRepository, EventRepository, IntegrationRepository,
    ReconciliationRepository, ReplayQueueRepository, TaskOutboxRepository,
};
use hookwise_infra_db::EventLedgerClient;
use hookwise_infra_dispatch::{DeliveryTransport, HealthProbeEngine};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error};

/// Intervalo mínimo entre entregas hacia un endpoint en HALF_OPEN.
const HALF_OPEN_DISPATCH_INTERVAL: Duration = Duration::from_secs(1);

/**
 * Contenedor de estado compartido (Thread-Safe) para el Gateway.
 * Actúa como la placa base donde se conectan todos los estratos.
 */
#[derive(Clone)]
pub struct AppState {
    /// Cliente táctico para el Motor A (Turso Cloud / libSQL).
    pub ledger_client: EventLedgerClient,
    /// Bus de difusión de señales para observadores en tiempo real.
    pub signal_bus: Arc<SignalBus>,
    /// Despertador del despachador de tareas (hand-off sub-segundo).
    pub task_wake_signal: Arc<Notify>,

    // --- ESTRATO L3: TRANSPORTES DE RED ---
    pub delivery_transport: Arc<DeliveryTransport>,
    pub probe_engine: Arc<HealthProbeEngine>,

    // --- ESTRATO L3: REPOSITORIOS DE AUTORIDAD ÚNICA ---
    pub integration_repository: Arc<IntegrationRepository>,
    pub endpoint_repository: Arc<EndpointRepository>,
    pub event_repository: Arc<EventRepository>,
    pub delivery_repository: Arc<DeliveryRepository>,
    pub replay_repository: Arc<ReplayQueueRepository>,
    pub reconciliation_repository: Arc<ReconciliationRepository>,
    pub task_outbox: Arc<TaskOutboxRepository>,

    // --- CACHÉS DE PROCESO (AUTO-CORRECTIVAS) ---
    /// Lectura caliente del estado del disyuntor por endpoint.
    breaker_state_cache: Arc<RwLock<HashMap<String, CircuitState>>>,
    /// Tokens de ritmo por endpoint para el throttle de HALF_OPEN.
    half_open_pacing_registry: Arc<Mutex<HashMap<String, Instant>>>,
}

impl AppState {
    /**
     * Forja una nueva instancia del Estado Maestro inyectando todas las
     * dependencias desde el cliente del Ledger.
     */
    pub fn new(ledger_client: EventLedgerClient, public_application_url: String) -> Self {
        debug!("🧬 [APP_STATE]: Executing sovereign ignition sequence V4.3...");

        Self {
            ledger_client: ledger_client.clone(),
            signal_bus: Arc::new(SignalBus::new()),
            task_wake_signal: Arc::new(Notify::new()),

            delivery_transport: Arc::new(DeliveryTransport::new(public_application_url)),
            probe_engine: Arc::new(HealthProbeEngine::new()),

            integration_repository: Arc::new(IntegrationRepository::new(ledger_client.clone())),
            endpoint_repository: Arc::new(EndpointRepository::new(ledger_client.clone())),
            event_repository: Arc::new(EventRepository::new(ledger_client.clone())),
            delivery_repository: Arc::new(DeliveryRepository::new(ledger_client.clone())),
            replay_repository: Arc::new(ReplayQueueRepository::new(ledger_client.clone())),
            reconciliation_repository: Arc::new(ReconciliationRepository::new(ledger_client.clone())),
            task_outbox: Arc::new(TaskOutboxRepository::new(ledger_client)),

            breaker_state_cache: Arc::new(RwLock::new(HashMap::new())),
            half_open_pacing_registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Lectura caliente del disyuntor (None en frío: el llamador va al Ledger).
    pub fn cached_breaker_state(&self, endpoint_id: &str) -> Option<CircuitState> {
        match self.breaker_state_cache.read() {
            Ok(cache_guard) => cache_guard.get(endpoint_id).copied(),
            Err(lock_poison_fault) => {
                error!("💀 [STATE_CACHE]: Breaker cache lock poisoned: {}", lock_poison_fault);
                None
            }
        }
    }

    /// Refresca la caché tras cada lectura de fila o veredicto aplicado.
    pub fn refresh_breaker_cache(&self, endpoint_id: &str, state: CircuitState) {
        if let Ok(mut cache_guard) = self.breaker_state_cache.write() {
            cache_guard.insert(endpoint_id.to_string(), state);
        }
    }

    /**
     * Reserva el siguiente turno de entrega de un endpoint en probatoria
     * y retorna cuánto debe dormir el llamador para respetar 1 ev/s.
     */
    pub fn acquire_half_open_slot(&self, endpoint_id: &str) -> Duration {
        let now = Instant::now();

        let mut pacing_guard = match self.half_open_pacing_registry.lock() {
            Ok(guard) => guard,
            Err(lock_poison_fault) => {
                error!("💀 [PACING]: Half-open registry poisoned: {}", lock_poison_fault);
                return HALF_OPEN_DISPATCH_INTERVAL;
            }
        };

        let next_free_slot = match pacing_guard.get(endpoint_id) {
            Some(last_reserved_slot) => (*last_reserved_slot + HALF_OPEN_DISPATCH_INTERVAL).max(now),
            None => now,
        };

        pacing_guard.insert(endpoint_id.to_string(), next_free_slot);
        next_free_slot.saturating_duration_since(now)
    }
}
