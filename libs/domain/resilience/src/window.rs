// [libs/domain/resilience/src/window.rs]
/*!
 * =================================================================
 * APARATO: SLIDING WINDOW CALCULATOR (V2.0 - 20+1 SAMPLES)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ESTADÍSTICA RODANTE SOBRE LAS ÚLTIMAS ENTREGAS
 *
 * # Mathematical Proof (Crash-Safe Derivation):
 * La ventana se recalcula en cada escritura desde las últimas 20 filas
 * persistidas más la muestra entrante. No existe acumulador mutable que
 * pueda divergir del Ledger: tras un reinicio, la siguiente entrega
 * re-deriva exactamente el mismo estado.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Capacidad nominal de la ventana deslizante (entregas persistidas).
pub const WINDOW_CAPACITY: usize = 20;

/// Muestra mínima antes de confiar en la tasa de éxito para abrir.
pub const MINIMUM_SAMPLES_FOR_RATE_TRIP: usize = 5;

/// Una entrega observada, reducida a lo que la ventana necesita.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeliverySample {
    pub success: bool,
    pub response_time_ms: u64,
}

/// Estadística derivada de la ventana (muestras históricas + la entrante).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub sample_count: usize,
    pub success_rate_percent: f64,
    pub average_response_time_ms: f64,
}

/**
 * Calcula la estadística rodante sobre 'history' (las últimas entregas
 * persistidas, máximo 20, más recientes primero) más la muestra entrante.
 */
pub fn compute_window(history: &[DeliverySample], incoming: DeliverySample) -> WindowSnapshot {
    let considered_history = &history[..history.len().min(WINDOW_CAPACITY)];

    let sample_count = considered_history.len() + 1;
    let mut success_count: usize = if incoming.success { 1 } else { 0 };
    let mut response_time_total_ms: u128 = u128::from(incoming.response_time_ms);

    for sample in considered_history {
        if sample.success {
            success_count += 1;
        }
        response_time_total_ms += u128::from(sample.response_time_ms);
    }

    WindowSnapshot {
        sample_count,
        success_rate_percent: (success_count as f64 / sample_count as f64) * 100.0,
        average_response_time_ms: response_time_total_ms as f64 / sample_count as f64,
    }
}
