// [apps/gateway/src/handlers/mod.rs]
/*!
 * =================================================================
 * APARATO: HANDLER ORCHESTRATION HUB (V4.0)
 * CLASIFICACIÓN: APPLICATION ADAPTERS (ESTRATO L4)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DE PUNTOS DE ENTRADA
 *
 * # Topología de Módulos:
 * - ingest: Ruta caliente de ingesta firmada (acuse en 50ms p99).
 * - admin:  Superficie de gestión (CRUD, inspección, replay manual).
 * =================================================================
 */

pub mod admin;
pub mod ingest;
