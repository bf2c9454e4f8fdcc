use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod api;
pub mod derive;
pub mod quotes;

pub use quotes::{BillingError, BillingService};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Superseded,
}

impl QuoteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Superseded)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Yearly,
}

/// `line_total` is always `qty * unit_price`; tax never participates.
/// Stored totals are only ever produced by [`derive::price_line_items`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub item_type: Option<String>,
    pub item_id: Option<Uuid>,
    pub description: String,
    pub qty: f64,
    pub unit_price: f64,
    pub tax_rate: f64,
    pub line_total: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    pub item_type: Option<String>,
    pub item_id: Option<Uuid>,
    pub description: String,
    pub qty: f64,
    pub unit_price: f64,
    pub tax_rate: Option<f64>,
}

impl LineItemInput {
    pub fn into_line_item(self) -> LineItem {
        let mut item = LineItem {
            id: Uuid::new_v4(),
            item_type: self.item_type,
            item_id: self.item_id,
            description: self.description,
            qty: self.qty,
            unit_price: self.unit_price,
            tax_rate: self.tax_rate.unwrap_or(0.0),
            line_total: 0.0,
        };
        item.line_total = derive::line_total(&item);
        item
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditEntry {
    pub amount: f64,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub quote_number: String,
    pub deal_id: Option<Uuid>,
    pub account_id: Uuid,
    pub status: QuoteStatus,
    pub version: u32,
    pub line_items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax_total: f64,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub account_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub quote_id: Option<Uuid>,
    pub status: InvoiceStatus,
    pub line_items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax_total: f64,
    pub total: f64,
    pub credits: Vec<CreditEntry>,
    pub due_date: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuoteRequest {
    pub account_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub line_items: Vec<LineItemInput>,
}
