// [apps/gateway/src/services/orphan_sweeper.rs]
/*!
 * =================================================================
 * APARATO: ORPHAN SWEEPER DAEMON (V3.1 - HYGIENE HARDENED)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: REPARACIÓN DE HUÉRFANOS Y PURGA DE LEASES ZOMBIS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ORPHAN REPAIR: Un evento sin NINGUNA entrega tras 60 segundos
 *    delata una ingesta que persistió pero no logró encolar; el sweeper
 *    re-emite 'webhook/received' cerrando el hueco del §7. El radar
 *    replica la compuerta de reenvío de la ingesta: los eventos
 *    silenciados por política (firma inválida con
 *    forward_unverified=false) jamás entran al redrive.
 * 2. LEASE RECLAIM: Tareas 'in_flight' con arrendamiento vencido y
 *    ranuras de replay atascadas en 'delivering' vuelven al redil.
 * 3. ATOMICITY: El redrive reutiliza la clave de idempotencia original,
 *    de modo que una tarea original aún viva lo convierte en no-op.
 * =================================================================
 */

use crate::state::AppState;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use hookwise_domain_models::{TaskTopic, WebhookReceivedDirective};
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Cadencia del ciclo de higiene.
const SWEEP_INTERVAL_SECONDS: u64 = 60;
/// Edad mínima de un evento sin entrega para considerarse huérfano.
const ORPHAN_AGE_SECONDS: i64 = 60;
/// Edad de una ranura 'delivering' para considerarse atascada.
const STALE_DELIVERING_SECONDS: i64 = 600;
/// Ráfaga máxima de redrives por ciclo.
const ORPHAN_BATCH_LIMIT: i64 = 50;

pub struct OrphanSweeperService {
    application_state: AppState,
}

impl OrphanSweeperService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Bucle perpetuo de higiene en el reactor de Tokio.
     */
    pub async fn spawn_sweeper_daemon(self) {
        let mut maintenance_ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));
        info!("🧹 [SWEEPER]: Orphan repair daemon initiated (60s cadence).");

        loop {
            maintenance_ticker.tick().await;

            if let Err(cycle_fault) = self.execute_hygiene_cycle().await {
                error!("❌ [SWEEPER_FAULT]: Hygiene cycle collapsed: {}", cycle_fault);
            }
        }
    }

    /**
     * Un ciclo completo: leases zombis, ranuras atascadas y huérfanos.
     */
    #[instrument(skip(self))]
    pub async fn execute_hygiene_cycle(&self) -> Result<()> {
        let now = Utc::now();

        // 1. RECUPERACIÓN DE LEASES VENCIDOS DEL OUTBOX
        let reclaimed_leases = self.application_state.task_outbox.reclaim_expired_leases(now).await?;
        if reclaimed_leases > 0 {
            self.application_state.task_wake_signal.notify_one();
        }

        // 2. RANURAS DE REPLAY ATASCADAS EN 'delivering'
        let stale_cutoff = now - ChronoDuration::seconds(STALE_DELIVERING_SECONDS);
        let reclaimed_slots = self
            .application_state
            .replay_repository
            .reclaim_stale_delivering(&stale_cutoff.to_rfc3339())
            .await?;
        if reclaimed_slots > 0 {
            warn!("♻️  [SWEEPER]: Returned {} stuck replay slot(s) to pending.", reclaimed_slots);
        }

        // 3. RADAR DE EVENTOS HUÉRFANOS (sin entrega tras 60s)
        // El repositorio ya excluye los eventos silenciados por política.
        let orphan_cutoff = now - ChronoDuration::seconds(ORPHAN_AGE_SECONDS);
        let orphaned_events = self
            .application_state
            .event_repository
            .find_orphaned_events(orphan_cutoff, ORPHAN_BATCH_LIMIT)
            .await?;

        if orphaned_events.is_empty() {
            debug!("💤 [SWEEPER]: No orphans on radar.");
            return Ok(());
        }

        info!("🚑 [SWEEPER]: {} orphaned event(s) detected; redriving.", orphaned_events.len());

        let mut redriven_count = 0u32;
        for orphaned_event in orphaned_events {
            // La integración pudo morir en vuelo; el huérfano se ignora.
            let integration = match self
                .application_state
                .integration_repository
                .fetch_by_id(&orphaned_event.integration_id)
                .await
            {
                Ok(integration) => integration,
                Err(lookup_fault) => {
                    warn!("🗑️ [SWEEPER]: Orphan {} skipped ({}).", orphaned_event.id, lookup_fault);
                    continue;
                }
            };

            let directive = WebhookReceivedDirective {
                event_id: orphaned_event.id.clone(),
                integration_id: integration.id.clone(),
                destination_url: integration.destination_url.clone(),
            };

            let redriven = self
                .application_state
                .task_outbox
                .redrive(
                    TaskTopic::WebhookReceived,
                    &serde_json::to_string(&directive)?,
                    &directive.idempotency_key(),
                )
                .await?;

            if redriven {
                redriven_count += 1;
            }
        }

        if redriven_count > 0 {
            self.application_state.task_wake_signal.notify_one();
            info!("✅ [SWEEPER]: {} orphan task(s) redriven.", redriven_count);
        }
        Ok(())
    }
}
