//! Audit trail for pipeline runs
//!
//! Every chat answer is recorded with a hash of the facts it was built
//! from, so the numbers behind a response can be checked later.
//! Retention is bounded: past capacity the oldest record is evicted.

use crate::error::AgentError;
use crate::models::{AccountId, FinancialFacts, PipelineRecord};
use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_AUDIT_RETENTION: usize = 10_000;

#[derive(Default)]
struct AuditStore {
    records: HashMap<Uuid, PipelineRecord>,
    /// Insertion order, oldest at the front.
    order: VecDeque<Uuid>,
}

/// Audit trail storage
pub struct AuditLog {
    store: Arc<RwLock<AuditStore>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_RETENTION)
    }

    /// Keep at most `capacity` records (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(AuditStore::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Store a pipeline record. Records are never overwritten; the oldest
    /// is evicted once the log is full.
    pub async fn record(&self, record: PipelineRecord) -> Result<Uuid> {
        let audit_id = record.audit_id;
        let mut store = self.store.write().await;

        if store.records.contains_key(&audit_id) {
            return Err(AgentError::Audit(format!(
                "audit record {} already exists",
                audit_id
            )));
        }

        while store.records.len() >= self.capacity {
            let Some(oldest) = store.order.pop_front() else {
                break;
            };
            store.records.remove(&oldest);
            debug!(audit_id = %oldest, "Audit record evicted");
        }

        store.records.insert(audit_id, record);
        store.order.push_back(audit_id);
        Ok(audit_id)
    }

    pub async fn get(&self, audit_id: Uuid) -> Result<Option<PipelineRecord>> {
        let store = self.store.read().await;
        Ok(store.records.get(&audit_id).cloned())
    }

    /// Audit ids for an account, oldest first
    pub async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<Uuid>> {
        let store = self.store.read().await;

        let mut items: Vec<_> = store
            .records
            .values()
            .filter(|record| record.account_id == account_id)
            .map(|record| (record.audit_id, record.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Recompute the facts hash and compare it with the stored one.
    /// Unknown ids verify as false.
    pub async fn verify_integrity(&self, audit_id: Uuid) -> Result<bool> {
        let store = self.store.read().await;

        let Some(record) = store.records.get(&audit_id) else {
            return Ok(false);
        };

        let current_hash = compute_facts_hash(record.facts.as_deref())?;
        let intact = current_hash == record.facts_hash;
        if !intact {
            warn!(audit_id = %audit_id, "Audit record failed integrity check");
        }
        Ok(intact)
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex SHA-256 of the facts' JSON form. Runs without facts hash `null`.
pub fn compute_facts_hash(facts: Option<&FinancialFacts>) -> Result<String> {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    serde_json::to_writer(&mut HashWriter(&mut hasher), &facts)?;

    Ok(hex::encode(hasher.finalize()))
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
