use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::billing::{Invoice, Quote};
use crate::crm::{Account, Contact, Deal, Lead};
use crate::jobs::Job;

pub mod audit;

pub use audit::{snapshot, AuditAction, AuditEntry};

/// Typed record collections plus the append-only audit trail. One value of
/// this struct is the whole observable state of the system.
#[derive(Debug, Default, Clone)]
pub struct StoreInner {
    pub leads: HashMap<Uuid, Lead>,
    pub deals: HashMap<Uuid, Deal>,
    pub accounts: HashMap<Uuid, Account>,
    pub contacts: HashMap<Uuid, Contact>,
    pub quotes: HashMap<Uuid, Quote>,
    pub invoices: HashMap<Uuid, Invoice>,
    pub jobs: HashMap<Uuid, Job>,
    pub audit: Vec<AuditEntry>,
}

impl StoreInner {
    pub fn record(
        &mut self,
        entity_id: Uuid,
        action: AuditAction,
        previous_value: Option<Value>,
        new_value: Option<Value>,
        actor: Uuid,
    ) {
        self.audit.push(AuditEntry {
            id: Uuid::new_v4(),
            entity_id,
            action,
            previous_value,
            new_value,
            created_at: Utc::now(),
            created_by: actor,
        });
    }
}

/// In-memory record store shared by every service. Multi-record operations
/// go through [`MemoryStore::transaction`], which commits all writes of a
/// batch or none of them; readers never observe a half-applied batch.
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
        }
    }

    pub async fn read<T>(&self, f: impl FnOnce(&StoreInner) -> T) -> T {
        let guard = self.inner.read().await;
        f(&guard)
    }

    /// Runs `f` against a draft copy of the state under the write lock and
    /// swaps the draft in only when `f` returns `Ok`. An `Err` leaves the
    /// store byte-for-byte untouched, including the audit trail.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut StoreInner) -> Result<T, E>,
    {
        let mut guard = self.inner.write().await;
        let mut draft = (*guard).clone();
        let out = f(&mut draft)?;
        *guard = draft;
        Ok(out)
    }

    pub async fn audit_for(&self, entity_id: Uuid) -> Vec<AuditEntry> {
        let guard = self.inner.read().await;
        guard
            .audit
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub async fn audit_len(&self) -> usize {
        self.inner.read().await.audit.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::{CreateLeadRequest, Lead, LeadStatus};

    fn sample_lead() -> Lead {
        Lead::create(
            CreateLeadRequest {
                name: "Ada Lovelace".to_string(),
                company: Some("Analytical Engines".to_string()),
                email: Some("ada@analytical.example".to_string()),
                phone: None,
                estimated_value: Some(4200.0),
                source: None,
                campaign_id: None,
            },
            Uuid::nil(),
        )
    }

    #[tokio::test]
    async fn transaction_commits_on_ok() {
        let store = MemoryStore::new();
        let lead = sample_lead();
        let id = lead.id;

        store
            .transaction::<_, (), _>(|s| {
                s.leads.insert(id, lead.clone());
                s.record(id, AuditAction::Created, None, None, Uuid::nil());
                Ok(())
            })
            .await
            .unwrap();

        let stored = store.read(|s| s.leads.get(&id).cloned()).await.unwrap();
        assert_eq!(stored.status, LeadStatus::New);
        assert_eq!(store.audit_for(id).await.len(), 1);
    }

    #[tokio::test]
    async fn transaction_discards_all_writes_on_err() {
        let store = MemoryStore::new();
        let lead = sample_lead();
        let id = lead.id;

        let result = store
            .transaction::<(), &str, _>(|s| {
                s.leads.insert(id, lead.clone());
                s.record(id, AuditAction::Created, None, None, Uuid::nil());
                Err("abort mid-batch")
            })
            .await;

        assert!(result.is_err());
        assert!(store.read(|s| s.leads.is_empty()).await);
        assert_eq!(store.audit_len().await, 0);
    }
}
