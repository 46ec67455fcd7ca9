// [libs/domain/resilience/src/breaker.rs]
/*!
 * =================================================================
 * APARATO: CIRCUIT BREAKER TRANSITION TABLE (V4.2 - SINGLE AUTHORITY)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: MÁQUINA DE ESTADOS DEL DISYUNTOR POR DESTINO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. EXACT TABLE: Las cuatro transiciones válidas se implementan tal
 *    cual las define el contrato: CLOSED->OPEN, OPEN->HALF_OPEN,
 *    HALF_OPEN->CLOSED y HALF_OPEN->OPEN. No existe ninguna otra.
 * 2. PROBE ISOLATION: Los resultados de sondeo de salud se ignoran por
 *    completo salvo en estado OPEN.
 * 3. COUNTER HYGIENE: Cada transición pone a cero los contadores
 *    irrelevantes para el estado de llegada, en un único punto.
 *
 * # Mathematical Proof (Monotonic Ordering):
 * El estrato L3 aplica cada veredicto bajo compare-and-swap sobre
 * 'lock_version', por lo que la secuencia de transiciones observada por
 * cualquier lector está totalmente ordenada por 'state_changed_at'.
 * =================================================================
 */

use crate::window::{compute_window, DeliverySample, WindowSnapshot, MINIMUM_SAMPLES_FOR_RATE_TRIP};
use hookwise_domain_models::CircuitState;
use serde::{Deserialize, Serialize};

/// Fallos consecutivos que abren el circuito desde CLOSED.
pub const OPEN_TRIP_CONSECUTIVE_FAILURES: u32 = 5;
/// Tasa de éxito (porcentaje) bajo la cual el circuito abre desde CLOSED.
pub const OPEN_TRIP_SUCCESS_RATE_PERCENT: f64 = 50.0;
/// Sondeos exitosos consecutivos que promueven OPEN -> HALF_OPEN.
pub const HALF_OPEN_PROMOTION_PROBE_SUCCESSES: u32 = 3;
/// Éxitos consecutivos que cierran el circuito desde HALF_OPEN.
pub const CLOSE_PROMOTION_CONSECUTIVE_SUCCESSES: u32 = 10;
/// Fallos consecutivos (dentro de HALF_OPEN) que re-abren el circuito.
pub const HALF_OPEN_DEMOTION_CONSECUTIVE_FAILURES: u32 = 2;

/// Snapshot de los contadores del disyuntor de un endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerCell {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_probe_successes: u32,
}

/// Veredicto de 'register_delivery': célula actualizada + estadística.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryVerdict {
    pub previous_state: CircuitState,
    pub next_state: CircuitState,
    pub cell: BreakerCell,
    pub window: WindowSnapshot,
}

impl DeliveryVerdict {
    pub fn transitioned(&self) -> bool {
        self.previous_state != self.next_state
    }

    pub fn opened(&self) -> bool {
        self.transitioned() && self.next_state == CircuitState::Open
    }
}

/// Veredicto de 'register_health_probe'.
#[derive(Debug, Clone, Copy)]
pub struct ProbeVerdict {
    pub previous_state: CircuitState,
    pub next_state: CircuitState,
    pub cell: BreakerCell,
}

impl ProbeVerdict {
    /// Verdadero exactamente en la transición OPEN -> HALF_OPEN que debe
    /// disparar una única señal 'endpoint/replay-started'.
    pub fn replay_should_start(&self) -> bool {
        self.previous_state == CircuitState::Open && self.next_state == CircuitState::HalfOpen
    }
}

impl BreakerCell {
    /**
     * Registra el resultado de una entrega y evalúa la tabla de
     * transiciones. 'history' son las últimas entregas persistidas del
     * endpoint (máximo 20, más recientes primero), sin la entrante.
     */
    pub fn register_delivery(
        self,
        history: &[DeliverySample],
        incoming: DeliverySample,
    ) -> DeliveryVerdict {
        let window = compute_window(history, incoming);

        // 1. ACTUALIZACIÓN DE RACHAS
        let mut updated_cell = self;
        if incoming.success {
            updated_cell.consecutive_successes = updated_cell.consecutive_successes.saturating_add(1);
            updated_cell.consecutive_failures = 0;
        } else {
            updated_cell.consecutive_failures = updated_cell.consecutive_failures.saturating_add(1);
            updated_cell.consecutive_successes = 0;
        }

        // 2. EVALUACIÓN DE LA TABLA DE TRANSICIONES
        let next_state = match self.state {
            CircuitState::Closed => {
                let tripped_by_streak =
                    updated_cell.consecutive_failures >= OPEN_TRIP_CONSECUTIVE_FAILURES;
                let tripped_by_rate = window.sample_count >= MINIMUM_SAMPLES_FOR_RATE_TRIP
                    && window.success_rate_percent < OPEN_TRIP_SUCCESS_RATE_PERCENT;

                if tripped_by_streak || tripped_by_rate {
                    CircuitState::Open
                } else {
                    CircuitState::Closed
                }
            }
            CircuitState::HalfOpen => {
                if updated_cell.consecutive_failures >= HALF_OPEN_DEMOTION_CONSECUTIVE_FAILURES {
                    CircuitState::Open
                } else if updated_cell.consecutive_successes
                    >= CLOSE_PROMOTION_CONSECUTIVE_SUCCESSES
                {
                    CircuitState::Closed
                } else {
                    CircuitState::HalfOpen
                }
            }
            // Las entregas no mueven un circuito abierto; solo el sondeo
            // de salud puede promoverlo a HALF_OPEN.
            CircuitState::Open => CircuitState::Open,
        };

        updated_cell.state = next_state;
        if next_state != self.state {
            updated_cell = reset_counters_for_arrival(updated_cell, next_state);
        }

        DeliveryVerdict { previous_state: self.state, next_state, cell: updated_cell, window }
    }

    /**
     * Registra el resultado de un sondeo de salud. Ignorado por completo
     * salvo cuando el circuito está OPEN.
     */
    pub fn register_health_probe(self, probe_success: bool) -> ProbeVerdict {
        if self.state != CircuitState::Open {
            return ProbeVerdict { previous_state: self.state, next_state: self.state, cell: self };
        }

        let mut updated_cell = self;
        updated_cell.consecutive_probe_successes = if probe_success {
            updated_cell.consecutive_probe_successes.saturating_add(1)
        } else {
            0
        };

        let next_state =
            if updated_cell.consecutive_probe_successes >= HALF_OPEN_PROMOTION_PROBE_SUCCESSES {
                CircuitState::HalfOpen
            } else {
                CircuitState::Open
            };

        updated_cell.state = next_state;
        if next_state != self.state {
            updated_cell = reset_counters_for_arrival(updated_cell, next_state);
        }

        ProbeVerdict { previous_state: self.state, next_state, cell: updated_cell }
    }
}

/// Punto único de higiene de contadores: al llegar a un estado, los
/// contadores irrelevantes para ese estado quedan a cero.
fn reset_counters_for_arrival(mut cell: BreakerCell, arrival_state: CircuitState) -> BreakerCell {
    match arrival_state {
        // En HALF_OPEN las rachas de entrega arrancan de cero y el sondeo
        // deja de ser relevante.
        CircuitState::HalfOpen => {
            cell.consecutive_failures = 0;
            cell.consecutive_successes = 0;
            cell.consecutive_probe_successes = 0;
        }
        // En OPEN solo cuenta el sondeo de salud, que arranca de cero. La
        // racha de fallos se conserva como rastro forense.
        CircuitState::Open => {
            cell.consecutive_successes = 0;
            cell.consecutive_probe_successes = 0;
        }
        // En CLOSED la racha de éxitos se conserva; fallos y sondeos no
        // aportan nada.
        CircuitState::Closed => {
            cell.consecutive_failures = 0;
            cell.consecutive_probe_successes = 0;
        }
    }
    cell
}
