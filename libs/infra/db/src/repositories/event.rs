// [libs/infra/db/src/repositories/event.rs]
/*!
 * =================================================================
 * APARATO: EVENT REPOSITORY (V3.2 - IMMUTABLE LEDGER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: APÉNDICE DURABLE DE NOTIFICACIONES ACEPTADAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. APPEND-ONLY: Un evento jamás se muta tras su inserción; el payload
 *    almacenado es la fuente byte-a-byte de todo reenvío posterior.
 * 2. GAP DETECTION: Expone el conjunto de 'provider_event_id' locales
 *    para que la reconciliación derive los huecos del proveedor.
 * 3. ORPHAN RADAR: Localiza eventos sin entrega para el sweeper §7.
 * =================================================================
 */

use crate::errors::StoreError;
use crate::repositories::parse_ledger_timestamp;
use crate::EventLedgerClient;
use chrono::{DateTime, Utc};
use hookwise_domain_models::{Event, EventSource};
use libsql::{params, Row};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument};

const EVENT_COLUMNS: &str = "id, integration_id, event_type, payload_json, headers_json, \
     received_at, signature_valid, provider_event_id, source";

pub struct EventRepository {
    database_client: EventLedgerClient,
}

impl EventRepository {
    pub fn new(client: EventLedgerClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Apéndice inmutable de una notificación aceptada.
     *
     * # Performance:
     * Una única inserción; es el único roundtrip de persistencia que la
     * ruta caliente de ingesta tiene permitido esperar.
     */
    #[instrument(skip(self, event), fields(id = %event.id))]
    pub async fn insert(&self, event: &Event) -> Result<(), StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let payload_json = serde_json::to_string(&event.payload)
            .map_err(|fault| StoreError::MappingError(format!("PAYLOAD_SERIALIZATION_FAULT: {}", fault)))?;
        let headers_json = serde_json::to_string(&event.headers)
            .map_err(|fault| StoreError::MappingError(format!("HEADERS_SERIALIZATION_FAULT: {}", fault)))?;

        database_connection
            .execute(
                "INSERT INTO events (id, integration_id, event_type, payload_json, headers_json, \
                 received_at, signature_valid, provider_event_id, source) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.id.clone(),
                    event.integration_id.clone(),
                    event.event_type.clone(),
                    payload_json,
                    headers_json,
                    event.received_at.to_rfc3339(),
                    i64::from(event.signature_valid),
                    event.provider_event_id.clone(),
                    event.source.as_tag()
                ],
            )
            .await?;

        debug!("📥 [EVENT_LEDGER]: Event {} crystallized (type: {}).", event.id, event.event_type);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_id(&self, event_id: &str) -> Result<Event, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                params![event_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => map_row_to_event(&data_row),
            None => Err(StoreError::EventNotFound),
        }
    }

    /// Conjunto de identificadores del proveedor conocidos localmente
    /// desde 'since' (ambas vías: webhook y reconciliación).
    pub async fn provider_event_ids_since(
        &self,
        integration_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                "SELECT provider_event_id FROM events \
                 WHERE integration_id = ?1 AND provider_event_id IS NOT NULL \
                   AND received_at >= ?2",
                params![integration_id, since.to_rfc3339()],
            )
            .await?;

        let mut known_identifiers = HashSet::new();
        while let Some(data_row) = query_results.next().await? {
            if let Some(provider_identifier) = data_row.get::<Option<String>>(0)? {
                known_identifiers.insert(provider_identifier);
            }
        }
        Ok(known_identifiers)
    }

    /**
     * Radar de huérfanos: eventos sin NINGUNA entrega cuya recepción es
     * anterior al corte. Cierra el hueco dejado por una ingesta que
     * persistió el evento pero falló al encolar la tarea.
     *
     * El radar replica la compuerta de reenvío de la ingesta: un evento
     * con firma inválida cuya integración silencia los no-verificados
     * (forward_unverified=0) NO es un huérfano, es política.
     */
    pub async fn find_orphaned_events(
        &self,
        cutoff: DateTime<Utc>,
        batch_limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                "SELECT e.id, e.integration_id, e.event_type, e.payload_json, e.headers_json, \
                        e.received_at, e.signature_valid, e.provider_event_id, e.source \
                 FROM events e \
                 JOIN integrations i ON i.id = e.integration_id \
                 WHERE e.received_at < ?1 \
                   AND NOT EXISTS (SELECT 1 FROM deliveries d WHERE d.event_id = e.id) \
                   AND (e.signature_valid = 1 OR i.forward_unverified = 1) \
                 ORDER BY e.received_at ASC LIMIT ?2",
                params![cutoff.to_rfc3339(), batch_limit],
            )
            .await?;

        let mut orphaned_events = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            orphaned_events.push(map_row_to_event(&data_row)?);
        }
        Ok(orphaned_events)
    }

    /// Conteo de eventos locales de una integración desde 'since'
    /// (métrica 'local_events_found' de la auditoría de reconciliación).
    pub async fn count_since(
        &self,
        integration_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let database_connection = self.database_client.get_connection()?;

        let mut query_results = database_connection
            .query(
                "SELECT COUNT(*) FROM events WHERE integration_id = ?1 AND received_at >= ?2",
                params![integration_id, since.to_rfc3339()],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get::<i64>(0)? as u32),
            None => Ok(0),
        }
    }
}

fn map_row_to_event(data_row: &Row) -> Result<Event, StoreError> {
    let payload_json: String = data_row.get(3)?;
    let headers_json: String = data_row.get(4)?;
    let received_at_raw: String = data_row.get(5)?;
    let source_tag: String = data_row.get(8)?;

    let payload: serde_json::Value = serde_json::from_str(&payload_json)
        .map_err(|fault| StoreError::MappingError(format!("PAYLOAD_CORRUPTION: {}", fault)))?;
    let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)
        .map_err(|fault| StoreError::MappingError(format!("HEADERS_CORRUPTION: {}", fault)))?;

    Ok(Event {
        id: data_row.get(0)?,
        integration_id: data_row.get(1)?,
        event_type: data_row.get(2)?,
        payload,
        headers,
        received_at: parse_ledger_timestamp(&received_at_raw)
            .ok_or_else(|| StoreError::MappingError("RECEIVED_AT_UNPARSEABLE".into()))?,
        signature_valid: data_row.get::<i64>(6)? != 0,
        provider_event_id: data_row.get::<Option<String>>(7)?,
        source: EventSource::from_tag(&source_tag)
            .ok_or_else(|| StoreError::MappingError(format!("UNKNOWN_SOURCE_TAG: {}", source_tag)))?,
    })
}
