// [libs/infra/dispatch/src/probe.rs]
/*!
 * =================================================================
 * APARATO: HEALTH PROBE ENGINE (V2.2 - HEAD WITH GET FALLBACK)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: SONDEO LIVIANO DE DESTINOS CON CIRCUITO ABIERTO
 * =================================================================
 */

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Plazo de cada sondeo individual.
const PROBE_TIMEOUT_SECONDS: u64 = 5;

/**
 * Sonda de salud: HEAD primero (mínimo coste para el convaleciente),
 * GET de respaldo cuando el destino no implementa HEAD.
 */
#[derive(Clone)]
pub struct HealthProbeEngine {
    network_probe_client: Client,
}

impl HealthProbeEngine {
    pub fn new() -> Self {
        Self {
            network_probe_client: Client::builder()
                .user_agent("HookWise-Health-Prober/V2.2")
                .timeout(Duration::from_secs(PROBE_TIMEOUT_SECONDS))
                .build()
                .expect("FATAL: Probe engine initialization failed."),
        }
    }

    /**
     * Sondea un destino; cualquier 2xx cuenta como éxito.
     *
     * # Performance:
     * Máximo dos roundtrips (HEAD + GET de respaldo), 5s de plazo cada uno.
     */
    #[instrument(skip(self))]
    pub async fn probe_destination(&self, destination_url: &str) -> bool {
        // 1. SONDEO PRIMARIO (HEAD)
        if let Ok(head_response) = self.network_probe_client.head(destination_url).send().await {
            if head_response.status().is_success() {
                debug!("💚 [PROBE]: HEAD acknowledged by {}.", destination_url);
                return true;
            }
        }

        // 2. RESPALDO (GET) para destinos sin soporte HEAD
        match self.network_probe_client.get(destination_url).send().await {
            Ok(get_response) => {
                let probe_success = get_response.status().is_success();
                debug!("🩺 [PROBE]: GET fallback on {} -> {}.", destination_url, get_response.status());
                probe_success
            }
            Err(probe_fault) => {
                debug!("💔 [PROBE]: Destination {} unreachable: {}", destination_url, probe_fault);
                false
            }
        }
    }
}

impl Default for HealthProbeEngine {
    fn default() -> Self {
        Self::new()
    }
}
