// [apps/gateway/src/kernel.rs]
/**
 * =================================================================
 * APARATO: GATEWAY SOVEREIGN KERNEL (V4.3 - DAEMON MATRIX)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA:
 * Actúa como la placa base donde se conectan todos los servicios:
 * despachador del Outbox, sondeador de salud, sweeper de huérfanos,
 * reconciliación y el transporte HTTP de Axum.
 * =================================================================
 */

use crate::routes::create_sovereign_router;
use crate::services::{
    HealthProberService, OrphanSweeperService, ReconciliationService, TaskDispatcherService,
};
use crate::state::AppState;
use hookwise_infra_db::EventLedgerClient;
use std::net::{IpAddr, SocketAddr};
use tracing::{error, info, instrument};

pub struct GatewayKernel {
    pub server_network_port: u16,
    pub application_shared_state: AppState,
}

impl GatewayKernel {
    /**
     * Realiza la ignición del cliente táctico y el estado neural.
     * Establece (y nivela el esquema de) la base de datos antes de
     * levantar servicios.
     */
    #[instrument(skip(database_access_token, public_application_url))]
    pub async fn ignite(
        database_connection_url: &str,
        database_access_token: Option<String>,
        listening_port: u16,
        public_application_url: String,
    ) -> Self {
        let ledger_client = EventLedgerClient::connect(database_connection_url, database_access_token)
            .await
            .expect("FATAL: Database link collapse. Ignition aborted.");

        Self {
            server_network_port: listening_port,
            application_shared_state: AppState::new(ledger_client, public_application_url),
        }
    }

    /**
     * Lanza la ejecución de todas las operaciones autónomas del motor.
     * Configura los hilos de fondo (Daemons) y el servidor HTTP principal.
     */
    pub async fn launch_sovereign_operations(self) {
        let shared_application_state = self.application_shared_state.clone();

        // --- 1. DESPACHADOR DEL OUTBOX (la columna vertebral) ---
        let dispatcher = TaskDispatcherService::new(shared_application_state.clone());
        tokio::spawn(async move { dispatcher.spawn_dispatcher_daemon().await });

        // --- 2. SONDEADOR DE SALUD (conductor de la recuperación) ---
        let prober = HealthProberService::new(shared_application_state.clone());
        tokio::spawn(async move { prober.spawn_prober_daemon().await });

        // --- 3. SWEEPER DE HUÉRFANOS Y LEASES (higiene §7) ---
        let sweeper = OrphanSweeperService::new(shared_application_state.clone());
        tokio::spawn(async move { sweeper.spawn_sweeper_daemon().await });

        // --- 4. RECONCILIACIÓN (cierre de huecos del proveedor) ---
        let reconciliation = ReconciliationService::new(shared_application_state.clone());
        tokio::spawn(async move { reconciliation.spawn_reconciliation_daemon().await });

        // --- 5. IGNICIÓN DEL TRANSPORTE HTTP (AXUM) ---
        let sovereign_router = create_sovereign_router(shared_application_state);

        let bind_address = SocketAddr::new(
            "0.0.0.0".parse::<IpAddr>().expect("CRITICAL_FAULT: Invalid bind literal."),
            self.server_network_port,
        );

        info!("🚀 [KERNEL_ONLINE]: Delivery engine listening at {}", bind_address);

        let tcp_listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .expect("CRITICAL_FAULT: Failed to bind network port.");

        if let Err(server_error) = axum::serve(tcp_listener, sovereign_router).await {
            error!("💀 [KERNEL_COLLAPSE]: Runtime failure: {}", server_error);
            std::process::exit(1);
        }
    }
}
