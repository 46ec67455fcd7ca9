// [libs/domain/resilience/src/replay_rate.rs]
/*!
 * =================================================================
 * APARATO: ADAPTIVE REPLAY PACER (V2.2 - TIER LADDER)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: RITMO ADAPTATIVO DEL DRENAJE POST-RECUPERACIÓN
 *
 * # Mathematical Proof (Bounded Pressure):
 * La escalera 1 -> 2 -> 5 -> 10 ev/s acota la presión sobre un destino
 * convaleciente: el caudal solo se duplica/quintuplica tras 5 éxitos
 * consecutivos, y CUALQUIER fallo colapsa el ritmo a la base. El peor
 * caso de presión instantánea tras un fallo es exactamente 1 ev/s.
 * =================================================================
 */

use std::time::Duration;

/// Escalera de caudal del replay (eventos por segundo).
pub const REPLAY_RATE_TIERS: [u32; 4] = [1, 2, 5, 10];
/// Éxitos consecutivos necesarios para subir un peldaño.
pub const TIER_ADVANCE_STREAK: u32 = 5;
/// Intentos máximos de un item antes de marcarse 'skipped'.
pub const REPLAY_SKIP_BUDGET: u32 = 3;
/// Tamaño de ráfaga del drenaje (items por iteración).
pub const REPLAY_BATCH_SIZE: usize = 10;
/// Pausas por debajo de este umbral se omiten.
const MINIMUM_PACING_DELAY_MS: u64 = 100;

/// Regulador de ritmo de un drenaje de replay en curso.
#[derive(Debug, Clone, Copy)]
pub struct ReplayPacer {
    tier_index: usize,
    successes_in_tier: u32,
}

impl ReplayPacer {
    /// Todo drenaje arranca en el peldaño base (1 ev/s).
    pub fn new() -> Self {
        Self { tier_index: 0, successes_in_tier: 0 }
    }

    /// Caudal vigente en eventos por segundo.
    pub fn current_rate(&self) -> u32 {
        REPLAY_RATE_TIERS[self.tier_index]
    }

    /// Registra un éxito; tras 5 consecutivos avanza al siguiente peldaño.
    pub fn register_success(&mut self) {
        self.successes_in_tier += 1;
        if self.successes_in_tier >= TIER_ADVANCE_STREAK
            && self.tier_index + 1 < REPLAY_RATE_TIERS.len()
        {
            self.tier_index += 1;
            self.successes_in_tier = 0;
        }
    }

    /// Cualquier fallo colapsa el ritmo al peldaño base.
    pub fn register_failure(&mut self) {
        self.tier_index = 0;
        self.successes_in_tier = 0;
    }

    /**
     * Pausa entre items: ceil(1000 / caudal) ms, omitida si el resultado
     * cae por debajo de los 100 ms.
     */
    pub fn pacing_delay(&self) -> Option<Duration> {
        let rate = u64::from(self.current_rate());
        let delay_ms = 1000u64.div_ceil(rate);

        if delay_ms < MINIMUM_PACING_DELAY_MS {
            None
        } else {
            Some(Duration::from_millis(delay_ms))
        }
    }
}

impl Default for ReplayPacer {
    fn default() -> Self {
        Self::new()
    }
}
