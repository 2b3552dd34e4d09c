//! redb table definitions for the GuardAnt coordination store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Composite keys follow the pattern `{nest_id}:{service_id}`.

use redb::TableDefinition;

/// Registered workers keyed by `{worker_id}`. Values carry a TTL lease.
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");

/// Open incidents keyed by `{nest_id}:{service_id}`.
pub const INCIDENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("incidents");

/// Latest check results keyed by `{nest_id}:{service_id}`. Values carry a TTL lease.
pub const STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("status");
