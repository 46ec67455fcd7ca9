// [apps/gateway/src/services/reconciliation.rs]
/*!
 * =================================================================
 * APARATO: RECONCILIATION ENGINE (V4.2 - GAP CLOSER)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: PULL PERIÓDICO DEL PROVEEDOR Y CIERRE DE HUECOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. GAP DETECTION: Compara los identificadores del proveedor contra
 *    los 'provider_event_id' locales de la ventana; cada hueco inyecta
 *    un evento sintético (source=reconciliation, firma válida, sin
 *    cabeceras) y una tarea 'webhook/received'.
 * 2. VAULT BOUNDARY: La credencial solo se desella en RAM durante el
 *    ciclo; el texto claro jamás toca el Ledger ni el rastro de logs.
 * 3. AUDIT ALWAYS: Cada ciclo con pull exitoso sella su fila de
 *    auditoría, hubiese o no huecos.
 * =================================================================
 */

use crate::state::AppState;
use anyhow::{anyhow, Result};
use chrono::{Duration as ChronoDuration, Utc};
use hookwise_core_credential_vault::CredentialVaultEngine;
use hookwise_domain_models::{
    Event, EventSource, Integration, ProviderKind, ReconciliationRun, TaskTopic,
    WebhookReceivedDirective,
};
use hookwise_infra_dispatch::{ProviderEventRecord, ShopifyOrdersPager, StripeEventsPager};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Cadencia del ciclo de reconciliación.
const RECONCILIATION_INTERVAL_SECONDS: u64 = 300;
/// Ventana retrospectiva del pull (solapa dos ciclos).
const RECONCILIATION_LOOKBACK_MINUTES: i64 = 10;

pub struct ReconciliationService {
    application_state: AppState,
}

impl ReconciliationService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Bucle perpetuo de reconciliación en el reactor de Tokio.
     */
    pub async fn spawn_reconciliation_daemon(self) {
        let mut reconciliation_ticker =
            interval(Duration::from_secs(RECONCILIATION_INTERVAL_SECONDS));
        info!("🧮 [RECONCILIATION]: Gap-closing daemon initiated (300s cadence).");

        loop {
            reconciliation_ticker.tick().await;

            if let Err(sweep_fault) = self.execute_reconciliation_sweep().await {
                error!("❌ [RECONCILIATION_FAULT]: Sweep collapsed: {}", sweep_fault);
            }
        }
    }

    /**
     * Visita cada integración activa con credencial sellada.
     */
    #[instrument(skip(self))]
    pub async fn execute_reconciliation_sweep(&self) -> Result<()> {
        let candidates =
            self.application_state.integration_repository.list_reconciliation_candidates().await?;

        if candidates.is_empty() {
            debug!("💤 [RECONCILIATION]: No credentialed integrations to visit.");
            return Ok(());
        }

        for integration in candidates {
            if let Err(cycle_fault) = self.reconcile_integration(&integration).await {
                // Un proveedor caído no contamina el ciclo de los demás.
                error!("❌ [RECONCILIATION]: Cycle for {} failed: {}", integration.id, cycle_fault);
            }
        }
        Ok(())
    }

    /**
     * Un ciclo completo sobre una integración: pull, diff, inyección y
     * sellado de auditoría.
     */
    #[instrument(skip(self, integration), fields(integration = %integration.id))]
    pub async fn reconcile_integration(&self, integration: &Integration) -> Result<()> {
        let now = Utc::now();
        let window_start = now - ChronoDuration::minutes(RECONCILIATION_LOOKBACK_MINUTES);

        // 1. APERTURA DEL SOBRE DE CREDENCIAL (solo en RAM)
        let master_key = std::env::var("VAULT_MASTER_KEY")
            .map_err(|_| anyhow!("CRITICAL_CONFIG_VOID: VAULT_MASTER_KEY not defined."))?;

        let sealed_envelope = integration
            .reconciliation_credential
            .as_deref()
            .ok_or_else(|| anyhow!("CREDENTIAL_VOID: candidate without sealed envelope."))?;

        let plaintext_credential =
            CredentialVaultEngine::unseal(sealed_envelope, &master_key, &integration.id)?;

        // 2. PULL PAGINADO DEL PROVEEDOR
        let provider_records =
            collect_provider_records(integration, &plaintext_credential, window_start, now).await?;

        // 3. DIFF CONTRA EL LEDGER LOCAL
        let known_identifiers = self
            .application_state
            .event_repository
            .provider_event_ids_since(&integration.id, window_start)
            .await?;
        let local_events_found =
            self.application_state.event_repository.count_since(&integration.id, window_start).await?;

        let gap_records: Vec<&ProviderEventRecord> = provider_records
            .iter()
            .filter(|record| !known_identifiers.contains(&record.provider_event_id))
            .collect();

        // 4. INYECCIÓN DE EVENTOS SINTÉTICOS POR HUECO
        let mut gaps_resolved = 0u32;
        for gap_record in &gap_records {
            match self.inject_synthetic_event(integration, gap_record).await {
                Ok(()) => gaps_resolved += 1,
                Err(injection_fault) => {
                    warn!("⚠️ [RECONCILIATION]: Gap {} not resolved: {}",
                        gap_record.provider_event_id, injection_fault);
                }
            }
        }

        // 5. SELLADO DE LA AUDITORÍA (con o sin huecos)
        let run = ReconciliationRun {
            id: Uuid::new_v4().to_string(),
            integration_id: integration.id.clone(),
            provider_events_found: provider_records.len() as u32,
            local_events_found,
            gaps_detected: gap_records.len() as u32,
            gaps_resolved,
            ran_at: now,
        };
        self.application_state.reconciliation_repository.insert_run(&run).await?;

        Ok(())
    }

    /// Cristaliza un evento sintético y emite su tarea de entrega.
    async fn inject_synthetic_event(
        &self,
        integration: &Integration,
        gap_record: &ProviderEventRecord,
    ) -> Result<()> {
        let synthetic_event = Event {
            id: Uuid::new_v4().to_string(),
            integration_id: integration.id.clone(),
            event_type: gap_record.event_type.clone(),
            payload: gap_record.payload.clone(),
            headers: BTreeMap::new(),
            received_at: Utc::now(),
            signature_valid: true,
            provider_event_id: Some(gap_record.provider_event_id.clone()),
            source: EventSource::Reconciliation,
        };

        self.application_state.event_repository.insert(&synthetic_event).await?;

        let directive = WebhookReceivedDirective {
            event_id: synthetic_event.id.clone(),
            integration_id: integration.id.clone(),
            destination_url: integration.destination_url.clone(),
        };

        self.application_state
            .task_outbox
            .enqueue(
                TaskTopic::WebhookReceived,
                &serde_json::to_string(&directive)?,
                &directive.idempotency_key(),
                0,
            )
            .await?;
        self.application_state.task_wake_signal.notify_one();

        info!("🩹 [RECONCILIATION]: Gap {} closed with synthetic event {}.",
            gap_record.provider_event_id, synthetic_event.id);
        Ok(())
    }
}

/// Despacha el pull al paginador del proveedor correspondiente.
async fn collect_provider_records(
    integration: &Integration,
    plaintext_credential: &str,
    window_start: chrono::DateTime<Utc>,
    window_end: chrono::DateTime<Utc>,
) -> Result<Vec<ProviderEventRecord>> {
    match integration.provider {
        ProviderKind::Stripe => {
            let api_secret_key = stripe_key_of(plaintext_credential);
            let pager = StripeEventsPager::new();
            Ok(pager.collect_events(&api_secret_key, window_start, window_end).await?)
        }
        ProviderKind::Shopify => {
            let (shop_domain, access_token) = shopify_credentials_of(plaintext_credential)?;
            let pager = ShopifyOrdersPager::new();
            Ok(pager.collect_orders(&shop_domain, &access_token, window_start).await?)
        }
        // P3 no ofrece vía de reconciliación.
        ProviderKind::Github => Ok(Vec::new()),
    }
}

/// La credencial P1 admite sobre JSON {"api_key": ...} o la llave cruda.
fn stripe_key_of(plaintext_credential: &str) -> String {
    serde_json::from_str::<Value>(plaintext_credential)
        .ok()
        .and_then(|envelope| {
            envelope.get("api_key").and_then(Value::as_str).map(str::to_string)
        })
        .unwrap_or_else(|| plaintext_credential.to_string())
}

/// La credencial P2 exige sobre JSON {"shop_domain", "access_token"}.
fn shopify_credentials_of(plaintext_credential: &str) -> Result<(String, String)> {
    let envelope: Value = serde_json::from_str(plaintext_credential)
        .map_err(|_| anyhow!("CREDENTIAL_SHAPE_FAULT: P2 envelope must be JSON."))?;

    let shop_domain = envelope
        .get("shop_domain")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("CREDENTIAL_SHAPE_FAULT: shop_domain missing."))?;
    let access_token = envelope
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("CREDENTIAL_SHAPE_FAULT: access_token missing."))?;

    Ok((shop_domain.to_string(), access_token.to_string()))
}
