//! StateStore — redb-backed coordination state for GuardAnt.
//!
//! Holds the worker registry, open incidents, and the short-lived status
//! surface. All values are JSON-serialized into redb's `&[u8]` value
//! columns. Worker and status records carry an explicit expiry lease
//! (epoch ms); reads treat expired records as absent and periodic purge
//! passes reclaim them. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// How long a status record stays readable after its check completed.
pub const STATUS_TTL_MS: u64 = 300_000;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe coordination store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "coordination store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory coordination store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORKERS).map_err(map_err!(Table))?;
        txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
        txn.open_table(STATUS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Workers ────────────────────────────────────────────────────

    /// Insert or replace a worker record under a fresh lease.
    pub fn put_worker(&self, node: &WorkerNode, expires_at: u64) -> StateResult<()> {
        let record = RegisteredWorker { expires_at, node: node.clone() };
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(worker_id = %node.id, expires_at, "worker stored");
        Ok(())
    }

    /// Get a worker by id. Expired leases read as absent.
    pub fn get_worker(&self, worker_id: &str, now_ms: u64) -> StateResult<Option<WorkerNode>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        match table.get(worker_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: RegisteredWorker =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok((record.expires_at > now_ms).then_some(record.node))
            }
            None => Ok(None),
        }
    }

    /// Refresh a worker's lease and load counters in one transaction.
    ///
    /// Returns false when the worker is unknown or its lease already
    /// lapsed; such workers must re-register.
    pub fn heartbeat_worker(
        &self,
        worker_id: &str,
        load: &WorkerLoad,
        now_ms: u64,
        expires_at: u64,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let refreshed;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            let current: Option<RegisteredWorker> = match table
                .get(worker_id)
                .map_err(map_err!(Read))?
            {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            match current {
                Some(mut record) if record.expires_at > now_ms => {
                    record.node.status.last_heartbeat = now_ms;
                    record.node.status.active_checks = load.active_checks;
                    record.node.status.checks_completed = load.checks_completed;
                    record.node.status.checks_failed = load.checks_failed;
                    record.expires_at = expires_at;
                    let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    table
                        .insert(worker_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    refreshed = true;
                }
                _ => refreshed = false,
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(refreshed)
    }

    /// List all workers whose lease has not lapsed.
    pub fn list_workers(&self, now_ms: u64) -> StateResult<Vec<WorkerNode>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: RegisteredWorker =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if record.expires_at > now_ms {
                results.push(record.node);
            }
        }
        Ok(results)
    }

    /// Delete a worker record. Returns true if it existed.
    pub fn delete_worker(&self, worker_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            existed = table.remove(worker_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(worker_id, existed, "worker deleted");
        Ok(existed)
    }

    /// Remove all worker records with lapsed leases. Returns number removed.
    pub fn purge_expired_workers(&self, now_ms: u64) -> StateResult<u32> {
        // Collect lapsed keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    let record: RegisteredWorker = serde_json::from_slice(value.value()).ok()?;
                    (record.expires_at <= now_ms).then(|| key.value().to_string())
                })
                .collect()
        };
        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(count)
    }

    // ── Incidents ──────────────────────────────────────────────────

    /// Insert or update an incident under its `{nest_id}:{service_id}` key.
    pub fn put_incident(&self, incident: &Incident) -> StateResult<()> {
        let key = incident.table_key();
        let value = serde_json::to_vec(incident).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, incident_id = %incident.id, "incident stored");
        Ok(())
    }

    /// Get the open incident for a service, if any.
    pub fn get_incident(&self, nest_id: &str, service_id: &str) -> StateResult<Option<Incident>> {
        let key = format!("{nest_id}:{service_id}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let incident: Incident =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(incident))
            }
            None => Ok(None),
        }
    }

    /// Delete a service's incident record. Returns true if it existed.
    pub fn delete_incident(&self, nest_id: &str, service_id: &str) -> StateResult<bool> {
        let key = format!("{nest_id}:{service_id}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// List all open incidents.
    pub fn list_incidents(&self) -> StateResult<Vec<Incident>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let incident: Incident =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(incident);
        }
        Ok(results)
    }

    // ── Status surface ─────────────────────────────────────────────

    /// Record the latest check result for a service, leased for
    /// [`STATUS_TTL_MS`] from `now_ms`.
    pub fn put_status(&self, result: &CheckResult, now_ms: u64) -> StateResult<()> {
        let key = result.status_key();
        let record = CachedStatus {
            expires_at: now_ms + STATUS_TTL_MS,
            result: result.clone(),
        };
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(STATUS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Latest result for a service, or None once the lease lapsed.
    pub fn get_status(
        &self,
        nest_id: &str,
        service_id: &str,
        now_ms: u64,
    ) -> StateResult<Option<CheckResult>> {
        let key = format!("{nest_id}:{service_id}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: CachedStatus =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok((record.expires_at > now_ms).then_some(record.result))
            }
            None => Ok(None),
        }
    }

    /// Remove all status records with lapsed leases. Returns number removed.
    pub fn purge_expired_status(&self, now_ms: u64) -> StateResult<u32> {
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    let record: CachedStatus = serde_json::from_slice(value.value()).ok()?;
                    (record.expires_at <= now_ms).then(|| key.value().to_string())
                })
                .collect()
        };
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(STATUS).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(count)
    }
}
