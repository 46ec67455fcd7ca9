// [apps/gateway/src/main.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY MAIN ENTRY POINT (V4.2 - GOLD MASTER)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L4)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DETERMINISTIC IGNITION: El enlace con el Ledger (y su esquema)
 *    se solidifica ANTES de abrir el socket TCP, previniendo que un
 *    productor golpee la ingesta sin sustrato de persistencia.
 * 2. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta en la captura
 *    de entorno y configuración de red.
 * =================================================================
 */

use hookwise_gateway::prelude::*;

use dotenvy::dotenv;
use hookwise_shared_watchtower::init_tracing;
use tracing::info;

/**
 * Punto de ignición supremo del binario del Gateway.
 */
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO SOBERANO
    // Hidrata las variables de .env en el espacio de nombres del proceso.
    dotenv().ok();

    // 2. INICIALIZACIÓN DE OBSERVABILIDAD NEURAL (WATCHTOWER)
    init_tracing("hookwise_gateway");

    // 3. CONFIGURACIÓN DEL RUNTIME SOBERANO
    let runtime_orchestrator = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime_orchestrator.block_on(async {
        info!("🛰️  [GATEWAY]: Global ignition sequence starting...");

        // 4. ADQUISICIÓN DE COORDENADAS TÁCTICAS
        let database_connection_url = std::env::var("DATABASE_URL")
            .expect("CRITICAL_FAULT: DATABASE_URL not defined in runtime environment.");

        let database_access_token = std::env::var("TURSO_AUTH_TOKEN").ok();

        let listening_network_port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let public_application_url = std::env::var("PUBLIC_APP_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", listening_network_port));

        // 5. CONSTRUCCIÓN DEL KERNEL SOBERANO (ESTRATO L1-APP)
        let kernel_instance = GatewayKernel::ignite(
            &database_connection_url,
            database_access_token,
            listening_network_port,
            public_application_url,
        )
        .await;

        // 6. IGNICIÓN DE OPERACIONES DEL MOTOR DE ENTREGA
        // Activa los daemons (despachador, sondeador, sweeper,
        // reconciliación) y levanta el servidor Axum.
        info!("🚀 [HOOKWISE_ONLINE]: Delivery engine operational on port {}.", listening_network_port);
        kernel_instance.launch_sovereign_operations().await;

        Ok(())
    })
}
