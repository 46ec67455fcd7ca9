// [libs/domain/models/src/tests_serialization.rs]
/**
 * =================================================================
 * APARATO: DOMAIN SERIALIZATION TEST (V2.1 - WIRE PARITY)
 * CLASIFICACIÓN: TRINITY EVIDENCE (ESTRATO L2-MODELS)
 * RESPONSABILIDAD: CERTIFICACIÓN DE TAGS DE CABLE CONGELADOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FROZEN TAGS: Los tags de enumeración ('half_open', 'dead_letter',
 *    'connection_refused', ...) son contratos compartidos con el
 *    Dashboard y el Ledger; cualquier deriva rompe consumidores.
 * 2. SCOPE CORRECTION: Vinculación de hookwise_domain_models como
 *    entidad externa, cumpliendo la física de tests de integración.
 *
 * # Mathematical Proof (Tag Bijection):
 * Para cada enumeración E, 'from_tag(as_tag(v)) == v' para todo v,
 * garantizando que persistencia y transporte sean inversos exactos.
 * =================================================================
 */
