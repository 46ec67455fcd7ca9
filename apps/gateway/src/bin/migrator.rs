// [apps/gateway/src/bin/migrator.rs]
/*!
 * =================================================================
 * APARATO: SCHEMA MIGRATOR SHELL (V2.0)
 * CLASIFICACIÓN: OPS TOOLING (ESTRATO L0)
 * RESPONSABILIDAD: NIVELACIÓN DEL ESQUEMA EN HOOKS DE DESPLIEGUE
 *
 * El cliente del Ledger aplica el esquema idempotente durante la
 * conexión; este binario existe para que los pipelines de despliegue
 * puedan nivelar el Motor A sin levantar el Gateway completo.
 * =================================================================
 */

use dotenvy::dotenv;
use hookwise_infra_db::EventLedgerClient;
use hookwise_shared_watchtower::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing("hookwise_migrator");

    let database_connection_url = std::env::var("DATABASE_URL")
        .expect("CRITICAL_FAULT: DATABASE_URL not defined in runtime environment.");
    let database_access_token = std::env::var("TURSO_AUTH_TOKEN").ok();

    // La conexión ejecuta la secuencia completa de sincronización
    // estructural (tablas, evoluciones e índices).
    EventLedgerClient::connect(&database_connection_url, database_access_token).await?;

    info!("✅ [MIGRATOR]: Event Ledger schema level and certified.");
    Ok(())
}
