// [apps/gateway/src/services/signal_bus.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY SIGNAL BUS (V3.0 - OBSERVER SEAM)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: DIFUSIÓN DE SEÑALES DE OBSERVADOR EN TIEMPO REAL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. OBSERVER SEAM: 'endpoint/circuit-opened', 'endpoint/replay-started'
 *    y 'flow/step-completed' se espejan aquí para consumidores vivos
 *    (dashboards, alertas); los colaboradores externos son los dueños
 *    de su semántica, el núcleo solo emite hechos.
 * 2. LOCK-FREE EMISSION: La pérdida de un suscriptor jamás afecta el
 *    determinismo del reactor principal.
 *
 * # Mathematical Proof (Signal Propagation):
 * El bus garantiza despacho O(1) independiente del número de
 * receptores; un canal broadcast sin suscriptores degrada a no-op.
 * =================================================================
 */

use hookwise_domain_models::{CircuitOpenedSignal, FlowStepCompletedSignal, ReplayStartedSignal};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacidad del canal de difusión soberano.
const SOVEREIGN_CHANNEL_CAPACITY: usize = 2048;

/// Señales de observador emitidas por el motor de entrega.
#[derive(Debug, Clone)]
pub enum GatewaySignal {
    CircuitOpened(CircuitOpenedSignal),
    ReplayStarted(ReplayStartedSignal),
    FlowStepCompleted(FlowStepCompletedSignal),
}

/**
 * Orquestador central de señales en tiempo real.
 */
#[derive(Debug)]
pub struct SignalBus {
    internal_transmission_channel: broadcast::Sender<GatewaySignal>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SOVEREIGN_CHANNEL_CAPACITY);
        Self { internal_transmission_channel: sender }
    }

    /// Genera un nuevo receptor para observadores (SSE / alertas).
    pub fn subscribe(&self) -> broadcast::Receiver<GatewaySignal> {
        self.internal_transmission_channel.subscribe()
    }

    /// Notifica la apertura del disyuntor de un endpoint.
    pub fn notify_circuit_opened(&self, signal: CircuitOpenedSignal) {
        info!("📢 [SIGNAL_BUS]: Circuit OPEN on endpoint {} (integration {}).",
            signal.endpoint_id, signal.integration_id);
        self.dispatch(GatewaySignal::CircuitOpened(signal));
    }

    /// Notifica el arranque de un drenaje de replay.
    pub fn notify_replay_started(&self, signal: ReplayStartedSignal) {
        info!("📢 [SIGNAL_BUS]: Replay drain starting on endpoint {}.", signal.endpoint_id);
        self.dispatch(GatewaySignal::ReplayStarted(signal));
    }

    /// Señal best-effort hacia el rastreador de flujos.
    pub fn notify_flow_step_completed(&self, signal: FlowStepCompletedSignal) {
        self.dispatch(GatewaySignal::FlowStepCompleted(signal));
    }

    fn dispatch(&self, signal: GatewaySignal) {
        // Un canal sin receptores degrada a no-op silencioso.
        match self.internal_transmission_channel.send(signal) {
            Ok(receiver_count) => debug!("📡 [SIGNAL_BUS]: Signal fanned out to {} receiver(s).", receiver_count),
            Err(_) => debug!("📡 [SIGNAL_BUS]: No live receivers; signal dropped."),
        }
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
