// [libs/domain/resilience/src/lib.rs]
/*!
 * =================================================================
 * APARATO: RESILIENCE DECISION ENGINE (V4.0 - PURE STRATA)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: POLÍTICA PURA DE MITIGACIÓN (SIN I/O)
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PURE VERDICTS: Este estrato calcula veredictos deterministas a
 *    partir de snapshots; el estrato L3 (db) los aplica bajo su
 *    transacción. Cero I/O, cero relojes, cero aleatoriedad.
 * 2. SINGLE AUTHORITY: La tabla de transiciones del disyuntor vive en
 *    un único módulo ('breaker'); ningún otro estrato re-deriva estado.
 * =================================================================
 */

pub mod breaker;
pub mod classifier;
pub mod replay_rate;
pub mod window;

pub use breaker::{BreakerCell, DeliveryVerdict, ProbeVerdict};
pub use classifier::{classify_outcome, FailureAssessment};
pub use replay_rate::ReplayPacer;
pub use window::{compute_window, DeliverySample, WindowSnapshot};
