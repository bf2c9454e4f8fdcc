use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::crm::{
    Account, Contact, CreateDealRequest, CreateLeadRequest, Deal, DealStage, Lead, LeadStatus,
};
use crate::store::{snapshot, AuditAction, MemoryStore, StoreInner};

#[derive(Debug, Clone)]
pub enum ConversionError {
    LeadNotFound(Uuid),
    DealNotFound(Uuid),
    AlreadyConverted,
    InvalidStageTransition(DealStage),
    InvalidStatusChange(LeadStatus),
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LeadNotFound(id) => write!(f, "Lead not found: {id}"),
            Self::DealNotFound(id) => write!(f, "Deal not found: {id}"),
            Self::AlreadyConverted => write!(f, "Lead has already been converted"),
            Self::InvalidStageTransition(stage) => {
                write!(f, "Deal is already in terminal stage {stage:?}")
            }
            Self::InvalidStatusChange(status) => {
                write!(f, "Lead status cannot be set to {status:?} directly")
            }
        }
    }
}

impl std::error::Error for ConversionError {}

#[derive(Debug, Clone, Serialize)]
pub struct LeadConversion {
    pub deal_id: Uuid,
    pub account_id: Uuid,
    pub contact_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct DealClose {
    pub deal_id: Uuid,
    pub stage: DealStage,
    pub created_account_id: Option<Uuid>,
}

/// Lifecycle transitions between Lead, Deal, Account and Contact. Every
/// operation validates its preconditions before touching any record and
/// commits all of its writes in one store transaction.
pub struct ConversionService {
    store: Arc<MemoryStore>,
}

impl ConversionService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn create_lead(&self, req: CreateLeadRequest, actor: Uuid) -> Lead {
        let lead = Lead::create(req, actor);
        let created = lead.clone();
        let _: Result<(), ConversionError> = self
            .store
            .transaction(|s| {
                s.record(lead.id, AuditAction::Created, None, snapshot(&lead), actor);
                s.leads.insert(lead.id, lead);
                Ok(())
            })
            .await;
        created
    }

    pub async fn create_deal(&self, req: CreateDealRequest, actor: Uuid) -> Deal {
        let deal = Deal::create(req, actor);
        let created = deal.clone();
        let _: Result<(), ConversionError> = self
            .store
            .transaction(|s| {
                s.record(deal.id, AuditAction::Created, None, snapshot(&deal), actor);
                s.deals.insert(deal.id, deal);
                Ok(())
            })
            .await;
        created
    }

    /// Quick conversion: Lead becomes a Prospecting Deal carrying the lead's
    /// value and linkage. A second call for the same lead changes nothing
    /// and reports `AlreadyConverted`.
    pub async fn convert_lead_to_deal(
        &self,
        lead_id: Uuid,
        actor: Uuid,
    ) -> Result<Uuid, ConversionError> {
        let deal_id = self
            .store
            .transaction(|s| {
                let lead = s
                    .leads
                    .get(&lead_id)
                    .ok_or(ConversionError::LeadNotFound(lead_id))?;
                if lead.status == LeadStatus::Converted {
                    return Err(ConversionError::AlreadyConverted);
                }
                let deal = deal_from_lead(lead, actor);
                let deal_id = deal.id;
                mark_lead_converted(s, lead_id, deal_id, actor);
                s.record(deal_id, AuditAction::Created, None, snapshot(&deal), actor);
                s.deals.insert(deal_id, deal);
                Ok(deal_id)
            })
            .await?;

        tracing::info!("Lead {lead_id} converted to deal {deal_id}");
        Ok(deal_id)
    }

    /// Full conversion: Account + Contact + Deal from one lead, four writes,
    /// one transaction. Nothing is persisted when any precondition fails.
    pub async fn convert_lead(
        &self,
        lead_id: Uuid,
        actor: Uuid,
    ) -> Result<LeadConversion, ConversionError> {
        let outcome = self
            .store
            .transaction(|s| {
                let lead = s
                    .leads
                    .get(&lead_id)
                    .ok_or(ConversionError::LeadNotFound(lead_id))?;
                if lead.status == LeadStatus::Converted {
                    return Err(ConversionError::AlreadyConverted);
                }

                let now = Utc::now();
                let account = Account {
                    id: Uuid::new_v4(),
                    name: lead.company.clone().unwrap_or_else(|| lead.name.clone()),
                    industry: None,
                    email: lead.email.clone(),
                    phone: lead.phone.clone(),
                    created_at: now,
                    updated_at: now,
                    created_by: actor,
                };
                let (first_name, last_name) = lead.split_name();
                let contact = Contact {
                    id: Uuid::new_v4(),
                    account_id: Some(account.id),
                    first_name,
                    last_name,
                    email: lead.email.clone(),
                    phone: lead.phone.clone(),
                    created_at: now,
                    updated_at: now,
                    created_by: actor,
                };
                let mut deal = deal_from_lead(lead, actor);
                deal.account_id = Some(account.id);
                deal.contact_id = Some(contact.id);

                let outcome = LeadConversion {
                    deal_id: deal.id,
                    account_id: account.id,
                    contact_id: contact.id,
                };

                mark_lead_converted(s, lead_id, deal.id, actor);
                s.record(account.id, AuditAction::Created, None, snapshot(&account), actor);
                s.record(contact.id, AuditAction::Created, None, snapshot(&contact), actor);
                s.record(deal.id, AuditAction::Created, None, snapshot(&deal), actor);
                s.accounts.insert(account.id, account);
                s.contacts.insert(contact.id, contact);
                s.deals.insert(deal.id, deal);
                Ok(outcome)
            })
            .await?;

        tracing::info!(
            "Lead {lead_id} fully converted: deal {}, account {}",
            outcome.deal_id,
            outcome.account_id
        );
        Ok(outcome)
    }

    /// Closing Won spawns an Account (+ Contact when the deal carries contact
    /// details) only when the deal is not yet tied to one;
    /// `created_account_id` is therefore set at most once, ever.
    pub async fn close_deal_as_won(
        &self,
        deal_id: Uuid,
        actor: Uuid,
    ) -> Result<DealClose, ConversionError> {
        let close = self
            .store
            .transaction(|s| {
                let deal = s
                    .deals
                    .get(&deal_id)
                    .ok_or(ConversionError::DealNotFound(deal_id))?;
                if deal.stage.is_terminal() {
                    return Err(ConversionError::InvalidStageTransition(deal.stage));
                }

                let now = Utc::now();
                let mut deal = deal.clone();
                let previous_stage = deal.stage;
                let mut created_account_id = None;

                if deal.account_id.is_none() {
                    let account = Account {
                        id: Uuid::new_v4(),
                        name: deal.company.clone().unwrap_or_else(|| deal.name.clone()),
                        industry: None,
                        email: deal.contact_email.clone(),
                        phone: None,
                        created_at: now,
                        updated_at: now,
                        created_by: actor,
                    };
                    if deal.contact_name.is_some() || deal.contact_email.is_some() {
                        let name = deal.contact_name.clone().unwrap_or_default();
                        let (first_name, last_name) = match name.split_once(' ') {
                            Some((first, rest)) => (first.to_string(), Some(rest.to_string())),
                            None => (name, None),
                        };
                        let contact = Contact {
                            id: Uuid::new_v4(),
                            account_id: Some(account.id),
                            first_name,
                            last_name,
                            email: deal.contact_email.clone(),
                            phone: None,
                            created_at: now,
                            updated_at: now,
                            created_by: actor,
                        };
                        deal.contact_id = Some(contact.id);
                        s.record(contact.id, AuditAction::Created, None, snapshot(&contact), actor);
                        s.contacts.insert(contact.id, contact);
                    }
                    deal.account_id = Some(account.id);
                    deal.created_account_id = Some(account.id);
                    created_account_id = Some(account.id);
                    s.record(account.id, AuditAction::Created, None, snapshot(&account), actor);
                    s.accounts.insert(account.id, account);
                }

                deal.stage = DealStage::ClosedWon;
                deal.updated_at = now;
                s.record(
                    deal_id,
                    AuditAction::StageChanged,
                    snapshot(&previous_stage),
                    snapshot(&DealStage::ClosedWon),
                    actor,
                );
                s.deals.insert(deal_id, deal);

                Ok(DealClose {
                    deal_id,
                    stage: DealStage::ClosedWon,
                    created_account_id,
                })
            })
            .await?;

        tracing::info!(
            "Deal {deal_id} closed won (created account: {:?})",
            close.created_account_id
        );
        Ok(close)
    }

    pub async fn close_deal_as_lost(
        &self,
        deal_id: Uuid,
        reason: Option<String>,
        actor: Uuid,
    ) -> Result<DealClose, ConversionError> {
        self.store
            .transaction(|s| {
                let deal = s
                    .deals
                    .get(&deal_id)
                    .ok_or(ConversionError::DealNotFound(deal_id))?;
                if deal.stage.is_terminal() {
                    return Err(ConversionError::InvalidStageTransition(deal.stage));
                }

                let mut deal = deal.clone();
                let previous_stage = deal.stage;
                deal.stage = DealStage::ClosedLost;
                deal.lost_reason = reason;
                deal.updated_at = Utc::now();
                s.record(
                    deal_id,
                    AuditAction::StageChanged,
                    snapshot(&previous_stage),
                    snapshot(&DealStage::ClosedLost),
                    actor,
                );
                s.deals.insert(deal_id, deal);

                Ok(DealClose {
                    deal_id,
                    stage: DealStage::ClosedLost,
                    created_account_id: None,
                })
            })
            .await
    }

    /// Pipeline progression for unconverted leads. Converted leads are
    /// frozen, and `Converted` itself is only reachable through conversion.
    pub async fn update_lead_status(
        &self,
        lead_id: Uuid,
        status: LeadStatus,
        actor: Uuid,
    ) -> Result<Lead, ConversionError> {
        if status == LeadStatus::Converted {
            return Err(ConversionError::InvalidStatusChange(status));
        }
        self.store
            .transaction(|s| {
                let lead = s
                    .leads
                    .get(&lead_id)
                    .ok_or(ConversionError::LeadNotFound(lead_id))?;
                if lead.status == LeadStatus::Converted {
                    return Err(ConversionError::AlreadyConverted);
                }

                let mut lead = lead.clone();
                let previous = lead.status;
                lead.status = status;
                lead.updated_at = Utc::now();
                s.record(
                    lead_id,
                    AuditAction::StatusChanged,
                    snapshot(&previous),
                    snapshot(&status),
                    actor,
                );
                let updated = lead.clone();
                s.leads.insert(lead_id, lead);
                Ok(updated)
            })
            .await
    }

    pub async fn get_lead(&self, id: Uuid) -> Option<Lead> {
        self.store.read(|s| s.leads.get(&id).cloned()).await
    }

    pub async fn list_leads(&self) -> Vec<Lead> {
        self.store.read(|s| s.leads.values().cloned().collect()).await
    }

    pub async fn get_deal(&self, id: Uuid) -> Option<Deal> {
        self.store.read(|s| s.deals.get(&id).cloned()).await
    }

    pub async fn list_deals(&self) -> Vec<Deal> {
        self.store.read(|s| s.deals.values().cloned().collect()).await
    }

    pub async fn list_accounts(&self) -> Vec<Account> {
        self.store
            .read(|s| s.accounts.values().cloned().collect())
            .await
    }

    pub async fn list_contacts(&self) -> Vec<Contact> {
        self.store
            .read(|s| s.contacts.values().cloned().collect())
            .await
    }
}

fn deal_from_lead(lead: &Lead, actor: Uuid) -> Deal {
    let now = Utc::now();
    Deal {
        id: Uuid::new_v4(),
        name: lead.name.clone(),
        amount: lead.estimated_value,
        stage: DealStage::Prospecting,
        account_id: lead.account_id,
        contact_id: None,
        lead_id: Some(lead.id),
        created_account_id: None,
        campaign_id: lead.campaign_id,
        company: lead.company.clone(),
        contact_name: Some(lead.name.clone()),
        contact_email: lead.email.clone(),
        lost_reason: None,
        created_at: now,
        updated_at: now,
        created_by: actor,
    }
}

fn mark_lead_converted(s: &mut StoreInner, lead_id: Uuid, deal_id: Uuid, actor: Uuid) {
    let previous = match s.leads.get_mut(&lead_id) {
        Some(lead) => {
            let previous = lead.status;
            lead.status = LeadStatus::Converted;
            lead.converted_to_deal_id = Some(deal_id);
            lead.updated_at = Utc::now();
            previous
        }
        None => return,
    };
    s.record(
        lead_id,
        AuditAction::Converted,
        snapshot(&previous),
        snapshot(&LeadStatus::Converted),
        actor,
    );
}
