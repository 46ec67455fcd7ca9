// [libs/infra/db/src/schema.rs]
/**
 * =================================================================
 * APARATO: EVENT LEDGER SCHEMA (V7.0 - MITIGATION STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. MITIGATION TABLES: Integraciones, endpoints, eventos, entregas,
 *    búfer de replay, auditorías de reconciliación y Outbox durable.
 * 2. IDEMPOTENCIA: Gestión de errores para migraciones en caliente.
 * 3. PERFORMANCE: Índices de aceleración para la ventana deslizante
 *    (últimas 20 entregas por endpoint) y el escaneo de tareas vencidas.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del motor de entrega confiable.
 */
const LEDGER_TABLES: &[(&str, &str)] = &[
    ("TABLE_INTEGRATIONS", r#"
        CREATE TABLE IF NOT EXISTS integrations (
            id TEXT PRIMARY KEY,
            operator_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            signing_secret TEXT NOT NULL,
            destination_url TEXT NOT NULL,
            status TEXT DEFAULT 'active',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_ENDPOINTS", r#"
        CREATE TABLE IF NOT EXISTS endpoints (
            id TEXT PRIMARY KEY,
            integration_id TEXT NOT NULL UNIQUE,
            circuit_state TEXT DEFAULT 'closed',
            success_rate_percent REAL DEFAULT 100.0,
            average_response_time_ms REAL DEFAULT 0.0,
            consecutive_failures INTEGER DEFAULT 0,
            consecutive_successes INTEGER DEFAULT 0,
            consecutive_probe_successes INTEGER DEFAULT 0,
            last_probe_at DATETIME,
            state_changed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            lock_version INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            integration_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            headers_json TEXT NOT NULL DEFAULT '{}',
            received_at DATETIME NOT NULL,
            signature_valid INTEGER NOT NULL DEFAULT 0,
            provider_event_id TEXT,
            source TEXT DEFAULT 'webhook'
        );
    "#),
    ("TABLE_DELIVERIES", r#"
        CREATE TABLE IF NOT EXISTS deliveries (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            endpoint_id TEXT,
            status TEXT DEFAULT 'pending',
            status_code INTEGER,
            response_time_ms INTEGER,
            response_body_excerpt TEXT,
            error_type TEXT,
            attempt_number INTEGER NOT NULL,
            attempted_at DATETIME NOT NULL,
            next_retry_at DATETIME,
            UNIQUE(event_id, attempt_number)
        );
    "#),
    ("TABLE_REPLAY_QUEUE", r#"
        CREATE TABLE IF NOT EXISTS replay_queue_items (
            id TEXT PRIMARY KEY,
            endpoint_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            correlation_key TEXT,
            status TEXT DEFAULT 'pending',
            attempts INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            delivered_at DATETIME,
            UNIQUE(endpoint_id, position)
        );
    "#),
    ("TABLE_RECONCILIATION_RUNS", r#"
        CREATE TABLE IF NOT EXISTS reconciliation_runs (
            id TEXT PRIMARY KEY,
            integration_id TEXT NOT NULL,
            provider_events_found INTEGER DEFAULT 0,
            local_events_found INTEGER DEFAULT 0,
            gaps_detected INTEGER DEFAULT 0,
            gaps_resolved INTEGER DEFAULT 0,
            ran_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_TASK_OUTBOX", r#"
        CREATE TABLE IF NOT EXISTS task_outbox (
            id TEXT PRIMARY KEY,
            topic TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            idempotency_key TEXT NOT NULL UNIQUE,
            status TEXT DEFAULT 'pending',
            attempt_count INTEGER DEFAULT 0,
            next_attempt_at DATETIME NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            completed_at DATETIME
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 * Asegura que las tablas existentes se adapten a las nuevas capacidades.
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    // --- POLÍTICA DE REENVÍO Y RECONCILIACIÓN ---
    ("INTEGRATION_FORWARD_UNVERIFIED", "ALTER TABLE integrations ADD COLUMN forward_unverified INTEGER DEFAULT 1"),
    ("INTEGRATION_RECON_CREDENTIAL", "ALTER TABLE integrations ADD COLUMN reconciliation_credential TEXT"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices de Aceleración)
 * Optimiza la ventana deslizante y el escaneo del Outbox.
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_EVENTS_INTEGRATION", "CREATE INDEX IF NOT EXISTS idx_events_integration ON events(integration_id, received_at);"),
    ("IDX_EVENTS_PROVIDER_ID", "CREATE INDEX IF NOT EXISTS idx_events_provider_id ON events(integration_id, provider_event_id);"),
    ("IDX_DELIVERIES_WINDOW", "CREATE INDEX IF NOT EXISTS idx_deliveries_window ON deliveries(endpoint_id, attempted_at);"),
    ("IDX_DELIVERIES_EVENT", "CREATE INDEX IF NOT EXISTS idx_deliveries_event ON deliveries(event_id, attempt_number);"),
    ("IDX_REPLAY_PENDING", "CREATE INDEX IF NOT EXISTS idx_replay_pending ON replay_queue_items(endpoint_id, status, position);"),
    ("IDX_OUTBOX_DUE", "CREATE INDEX IF NOT EXISTS idx_outbox_due ON task_outbox(status, next_attempt_at);"),
    ("IDX_ENDPOINTS_STATE", "CREATE INDEX IF NOT EXISTS idx_endpoints_state ON endpoints(circuit_state);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema estructural.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace con el motor libSQL.
 */
#[instrument(skip(database_connection))]
pub async fn apply_full_ledger_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V7.0...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Event Ledger V7.0 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in LEDGER_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        // Las columnas ya presentes producen un error benigno que se absorbe
        // para mantener la idempotencia de la migración en caliente.
        match db.execute(*sql, ()).await {
            Ok(_) => debug!("  ↳ Evolved: {}", identifier),
            Err(evolution_fault) => {
                let fault_text = evolution_fault.to_string().to_lowercase();
                if fault_text.contains("duplicate column") {
                    debug!("  ↳ Already level: {}", identifier);
                } else {
                    warn!("⚠️ [SCHEMA_EVOLUTION]: {} rejected: {}", identifier, evolution_fault);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("INDEX_HARDENING_FAULT: {}", identifier))?;
    }
    Ok(())
}
