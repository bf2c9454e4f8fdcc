use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod api;
pub mod conversion;

pub use conversion::{ConversionError, ConversionService, DealClose, LeadConversion};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Prospecting,
    Qualification,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl DealStage {
    pub fn order_index(self) -> u8 {
        match self {
            Self::Prospecting => 0,
            Self::Qualification => 1,
            Self::Proposal => 2,
            Self::Negotiation => 3,
            Self::ClosedWon => 4,
            Self::ClosedLost => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub estimated_value: f64,
    pub source: Option<String>,
    pub campaign_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub converted_to_deal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub name: String,
    pub amount: f64,
    pub stage: DealStage,
    pub account_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub created_account_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub company: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub lost_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub estimated_value: Option<f64>,
    pub source: Option<String>,
    pub campaign_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDealRequest {
    pub name: String,
    pub amount: f64,
    pub account_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub company: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
}

impl Lead {
    pub fn create(req: CreateLeadRequest, actor: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: req.name,
            company: req.company,
            email: req.email,
            phone: req.phone,
            status: LeadStatus::New,
            estimated_value: req.estimated_value.unwrap_or(0.0),
            source: req.source,
            campaign_id: req.campaign_id,
            account_id: None,
            converted_to_deal_id: None,
            created_at: now,
            updated_at: now,
            created_by: actor,
        }
    }

    /// First/last split for the Contact spawned by a full conversion.
    pub fn split_name(&self) -> (String, Option<String>) {
        match self.name.split_once(' ') {
            Some((first, rest)) => (first.to_string(), Some(rest.to_string())),
            None => (self.name.clone(), None),
        }
    }
}

impl Deal {
    pub fn create(req: CreateDealRequest, actor: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: req.name,
            amount: req.amount,
            stage: DealStage::Prospecting,
            account_id: req.account_id,
            contact_id: req.contact_id,
            lead_id: None,
            created_account_id: None,
            campaign_id: None,
            company: req.company,
            contact_name: req.contact_name,
            contact_email: req.contact_email,
            lost_reason: None,
            created_at: now,
            updated_at: now,
            created_by: actor,
        }
    }
}
