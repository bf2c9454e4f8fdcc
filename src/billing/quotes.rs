use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use uuid::Uuid;

use crate::billing::{
    derive, CreateQuoteRequest, CreditEntry, Invoice, InvoiceStatus, Quote, QuoteStatus,
};
use crate::crm::DealStage;
use crate::store::{snapshot, AuditAction, MemoryStore};

#[derive(Debug, Clone)]
pub enum BillingError {
    QuoteNotFound(Uuid),
    InvoiceNotFound(Uuid),
    AccountNotFound(Uuid),
    QuoteNotSendable(QuoteStatus),
    QuoteNotAcceptable(QuoteStatus),
    QuoteNotRevisable(QuoteStatus),
    QuoteNotInvoiceable(QuoteStatus),
    AlreadyInvoiced,
    InvalidCreditAmount(f64),
    InvalidStatus(String),
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuoteNotFound(id) => write!(f, "Quote not found: {id}"),
            Self::InvoiceNotFound(id) => write!(f, "Invoice not found: {id}"),
            Self::AccountNotFound(id) => write!(f, "Account not found: {id}"),
            Self::QuoteNotSendable(status) => {
                write!(f, "Only draft quotes can be sent (status: {status:?})")
            }
            Self::QuoteNotAcceptable(status) => {
                write!(f, "Only sent quotes can be accepted (status: {status:?})")
            }
            Self::QuoteNotRevisable(status) => {
                write!(f, "Only outstanding quotes can be revised (status: {status:?})")
            }
            Self::QuoteNotInvoiceable(status) => {
                write!(f, "Only accepted quotes can be invoiced (status: {status:?})")
            }
            Self::AlreadyInvoiced => write!(f, "Quote has already been invoiced"),
            Self::InvalidCreditAmount(amount) => {
                write!(f, "Credit amount must be a positive number, got {amount}")
            }
            Self::InvalidStatus(msg) => write!(f, "Invalid status: {msg}"),
        }
    }
}

impl std::error::Error for BillingError {}

/// Quote and invoice lifecycle over the shared record store. Sibling
/// supersession, deal stage bumps and the quote -> invoice conversion are
/// each a single atomic batch.
pub struct BillingService {
    store: Arc<MemoryStore>,
    quote_prefix: String,
    invoice_prefix: String,
    next_quote_number: AtomicU64,
    next_invoice_number: AtomicU64,
    default_due_days: i64,
}

impl BillingService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            quote_prefix: "QTE".to_string(),
            invoice_prefix: "INV".to_string(),
            next_quote_number: AtomicU64::new(1000),
            next_invoice_number: AtomicU64::new(1000),
            default_due_days: 30,
        }
    }

    pub fn with_due_days(mut self, days: i64) -> Self {
        self.default_due_days = days;
        self
    }

    fn document_number(&self, prefix: &str, counter: &AtomicU64) -> String {
        let num = counter.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        format!("{}-{}{:02}-{:05}", prefix, now.year(), now.month(), num)
    }

    pub async fn create_quote(
        &self,
        req: CreateQuoteRequest,
        actor: Uuid,
    ) -> Result<Quote, BillingError> {
        let now = Utc::now();
        let mut line_items: Vec<_> = req
            .line_items
            .into_iter()
            .map(|item| item.into_line_item())
            .collect();
        let (sub, tax, tot) = derive::price_line_items(&mut line_items);
        let quote = Quote {
            id: Uuid::new_v4(),
            quote_number: self.document_number(&self.quote_prefix, &self.next_quote_number),
            deal_id: req.deal_id,
            account_id: req.account_id,
            status: QuoteStatus::Draft,
            version: 1,
            line_items,
            subtotal: sub,
            tax_total: tax,
            total: tot,
            created_at: now,
            updated_at: now,
            created_by: actor,
        };

        self.store
            .transaction(|s| {
                if !s.accounts.contains_key(&req.account_id) {
                    return Err(BillingError::AccountNotFound(req.account_id));
                }
                s.record(quote.id, AuditAction::Created, None, snapshot(&quote), actor);
                let created = quote.clone();
                s.quotes.insert(quote.id, quote);
                Ok(created)
            })
            .await
    }

    pub async fn send_quote(&self, quote_id: Uuid, actor: Uuid) -> Result<Quote, BillingError> {
        self.store
            .transaction(|s| {
                let quote = s
                    .quotes
                    .get(&quote_id)
                    .ok_or(BillingError::QuoteNotFound(quote_id))?;
                if quote.status != QuoteStatus::Draft {
                    return Err(BillingError::QuoteNotSendable(quote.status));
                }
                let mut quote = quote.clone();
                quote.status = QuoteStatus::Sent;
                quote.updated_at = Utc::now();
                s.record(
                    quote_id,
                    AuditAction::Sent,
                    snapshot(&QuoteStatus::Draft),
                    snapshot(&QuoteStatus::Sent),
                    actor,
                );
                let sent = quote.clone();
                s.quotes.insert(quote_id, quote);
                Ok(sent)
            })
            .await
    }

    /// Accepting a quote supersedes every non-terminal sibling on the same
    /// deal in the same batch; no reader can observe two accepted quotes for
    /// one deal. The deal is raised to Negotiation, never regressed.
    pub async fn accept_quote(&self, quote_id: Uuid, actor: Uuid) -> Result<Quote, BillingError> {
        let accepted = self
            .store
            .transaction(|s| {
                let quote = s
                    .quotes
                    .get(&quote_id)
                    .ok_or(BillingError::QuoteNotFound(quote_id))?;
                if quote.status != QuoteStatus::Sent {
                    return Err(BillingError::QuoteNotAcceptable(quote.status));
                }

                let now = Utc::now();
                let deal_id = quote.deal_id;
                let mut quote = quote.clone();
                quote.status = QuoteStatus::Accepted;
                quote.updated_at = now;
                s.record(
                    quote_id,
                    AuditAction::Accepted,
                    snapshot(&QuoteStatus::Sent),
                    snapshot(&QuoteStatus::Accepted),
                    actor,
                );
                let accepted = quote.clone();
                s.quotes.insert(quote_id, quote);

                if let Some(deal_id) = deal_id {
                    let siblings: Vec<(Uuid, QuoteStatus)> = s
                        .quotes
                        .values()
                        .filter(|q| {
                            q.id != quote_id
                                && q.deal_id == Some(deal_id)
                                && !q.status.is_terminal()
                        })
                        .map(|q| (q.id, q.status))
                        .collect();
                    for (sibling_id, previous) in siblings {
                        if let Some(sibling) = s.quotes.get_mut(&sibling_id) {
                            sibling.status = QuoteStatus::Superseded;
                            sibling.updated_at = now;
                        }
                        s.record(
                            sibling_id,
                            AuditAction::Superseded,
                            snapshot(&previous),
                            snapshot(&QuoteStatus::Superseded),
                            actor,
                        );
                    }

                    let stage_change = match s.deals.get_mut(&deal_id) {
                        Some(deal)
                            if !deal.stage.is_terminal()
                                && deal.stage.order_index()
                                    < DealStage::Negotiation.order_index() =>
                        {
                            let previous = deal.stage;
                            deal.stage = DealStage::Negotiation;
                            deal.updated_at = now;
                            Some(previous)
                        }
                        _ => None,
                    };
                    if let Some(previous) = stage_change {
                        s.record(
                            deal_id,
                            AuditAction::StageChanged,
                            snapshot(&previous),
                            snapshot(&DealStage::Negotiation),
                            actor,
                        );
                    }
                }

                Ok(accepted)
            })
            .await?;

        tracing::info!("Quote {} accepted", accepted.quote_number);
        Ok(accepted)
    }

    /// Clones an outstanding quote into a fresh draft with a bumped version.
    /// Accepted and superseded quotes are settled history and stay that way.
    pub async fn revise_quote(&self, quote_id: Uuid, actor: Uuid) -> Result<Quote, BillingError> {
        self.store
            .transaction(|s| {
                let source = s
                    .quotes
                    .get(&quote_id)
                    .ok_or(BillingError::QuoteNotFound(quote_id))?;
                if source.status.is_terminal() {
                    return Err(BillingError::QuoteNotRevisable(source.status));
                }

                let now = Utc::now();
                let mut revision = source.clone();
                revision.id = Uuid::new_v4();
                revision.status = QuoteStatus::Draft;
                revision.version = source.version + 1;
                revision.created_at = now;
                revision.updated_at = now;
                revision.created_by = actor;
                s.record(
                    revision.id,
                    AuditAction::Created,
                    None,
                    snapshot(&revision),
                    actor,
                );
                let created = revision.clone();
                s.quotes.insert(revision.id, revision);
                Ok(created)
            })
            .await
    }

    /// At most one invoice ever exists per quote; the back-reference is the
    /// guard.
    pub async fn convert_quote_to_invoice(
        &self,
        quote_id: Uuid,
        actor: Uuid,
    ) -> Result<Invoice, BillingError> {
        let invoice = self
            .store
            .transaction(|s| {
                let quote = s
                    .quotes
                    .get(&quote_id)
                    .ok_or(BillingError::QuoteNotFound(quote_id))?;
                if quote.status != QuoteStatus::Accepted {
                    return Err(BillingError::QuoteNotInvoiceable(quote.status));
                }
                if s.invoices.values().any(|i| i.quote_id == Some(quote_id)) {
                    return Err(BillingError::AlreadyInvoiced);
                }

                let now = Utc::now();
                let invoice = Invoice {
                    id: Uuid::new_v4(),
                    invoice_number: self
                        .document_number(&self.invoice_prefix, &self.next_invoice_number),
                    account_id: quote.account_id,
                    deal_id: quote.deal_id,
                    quote_id: Some(quote_id),
                    status: InvoiceStatus::Draft,
                    line_items: quote.line_items.clone(),
                    subtotal: quote.subtotal,
                    tax_total: quote.tax_total,
                    total: quote.total,
                    credits: Vec::new(),
                    due_date: None,
                    sent_at: None,
                    paid_at: None,
                    created_at: now,
                    updated_at: now,
                    created_by: actor,
                };
                s.record(quote_id, AuditAction::Invoiced, None, snapshot(&invoice.id), actor);
                s.record(invoice.id, AuditAction::Created, None, snapshot(&invoice), actor);
                let created = invoice.clone();
                s.invoices.insert(invoice.id, invoice);
                Ok(created)
            })
            .await?;

        tracing::info!(
            "Quote {quote_id} converted to invoice {}",
            invoice.invoice_number
        );
        Ok(invoice)
    }

    pub async fn send_invoice(
        &self,
        invoice_id: Uuid,
        due_days: Option<i64>,
        actor: Uuid,
    ) -> Result<Invoice, BillingError> {
        let due_days = due_days.unwrap_or(self.default_due_days);
        self.store
            .transaction(|s| {
                let invoice = s
                    .invoices
                    .get(&invoice_id)
                    .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
                if invoice.status != InvoiceStatus::Draft {
                    return Err(BillingError::InvalidStatus(
                        "only draft invoices can be sent".to_string(),
                    ));
                }
                let now = Utc::now();
                let mut invoice = invoice.clone();
                invoice.status = InvoiceStatus::Sent;
                invoice.sent_at = Some(now);
                invoice.due_date = Some(now + Duration::days(due_days));
                invoice.updated_at = now;
                s.record(
                    invoice_id,
                    AuditAction::Sent,
                    snapshot(&InvoiceStatus::Draft),
                    snapshot(&InvoiceStatus::Sent),
                    actor,
                );
                let sent = invoice.clone();
                s.invoices.insert(invoice_id, invoice);
                Ok(sent)
            })
            .await
    }

    pub async fn mark_invoice_paid(
        &self,
        invoice_id: Uuid,
        actor: Uuid,
    ) -> Result<Invoice, BillingError> {
        self.store
            .transaction(|s| {
                let invoice = s
                    .invoices
                    .get(&invoice_id)
                    .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
                if !matches!(invoice.status, InvoiceStatus::Sent | InvoiceStatus::Overdue) {
                    return Err(BillingError::InvalidStatus(
                        "only sent or overdue invoices can be paid".to_string(),
                    ));
                }
                let now = Utc::now();
                let previous = invoice.status;
                let mut invoice = invoice.clone();
                invoice.status = InvoiceStatus::Paid;
                invoice.paid_at = Some(now);
                invoice.updated_at = now;
                s.record(
                    invoice_id,
                    AuditAction::Paid,
                    snapshot(&previous),
                    snapshot(&InvoiceStatus::Paid),
                    actor,
                );
                let paid = invoice.clone();
                s.invoices.insert(invoice_id, invoice);
                Ok(paid)
            })
            .await
    }

    /// Flips every sent invoice past its due date to Overdue. Returns the
    /// ids it touched.
    pub async fn check_overdue(&self, actor: Uuid) -> Vec<Uuid> {
        let flipped: Result<Vec<Uuid>, BillingError> = self
            .store
            .transaction(|s| {
                let now = Utc::now();
                let due: Vec<Uuid> = s
                    .invoices
                    .values()
                    .filter(|i| {
                        i.status == InvoiceStatus::Sent
                            && i.due_date.map(|d| now > d).unwrap_or(false)
                    })
                    .map(|i| i.id)
                    .collect();
                for id in &due {
                    if let Some(invoice) = s.invoices.get_mut(id) {
                        invoice.status = InvoiceStatus::Overdue;
                        invoice.updated_at = now;
                    }
                    s.record(
                        *id,
                        AuditAction::StatusChanged,
                        snapshot(&InvoiceStatus::Sent),
                        snapshot(&InvoiceStatus::Overdue),
                        actor,
                    );
                }
                Ok(due)
            })
            .await;
        flipped.unwrap_or_default()
    }

    /// Rejects non-positive or non-finite amounts without touching the
    /// invoice; otherwise appends the credit and clamps the total at zero.
    pub async fn apply_credit(
        &self,
        invoice_id: Uuid,
        amount: f64,
        reason: String,
        actor: Uuid,
    ) -> Result<Invoice, BillingError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(BillingError::InvalidCreditAmount(amount));
        }
        self.store
            .transaction(|s| {
                let invoice = s
                    .invoices
                    .get(&invoice_id)
                    .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

                let now = Utc::now();
                let mut invoice = invoice.clone();
                let previous_total = invoice.total;
                invoice.credits.push(CreditEntry {
                    amount,
                    reason,
                    applied_at: now,
                });
                invoice.total = derive::credited_total(invoice.total, amount);
                invoice.updated_at = now;
                s.record(
                    invoice_id,
                    AuditAction::CreditApplied,
                    snapshot(&previous_total),
                    snapshot(&invoice.total),
                    actor,
                );
                let credited = invoice.clone();
                s.invoices.insert(invoice_id, invoice);
                Ok(credited)
            })
            .await
    }

    pub async fn get_quote(&self, id: Uuid) -> Option<Quote> {
        self.store.read(|s| s.quotes.get(&id).cloned()).await
    }

    pub async fn list_quotes(&self) -> Vec<Quote> {
        self.store
            .read(|s| s.quotes.values().cloned().collect())
            .await
    }

    pub async fn quotes_for_deal(&self, deal_id: Uuid) -> Vec<Quote> {
        self.store
            .read(|s| {
                s.quotes
                    .values()
                    .filter(|q| q.deal_id == Some(deal_id))
                    .cloned()
                    .collect()
            })
            .await
    }

    pub async fn get_invoice(&self, id: Uuid) -> Option<Invoice> {
        self.store.read(|s| s.invoices.get(&id).cloned()).await
    }

    pub async fn list_invoices(&self) -> Vec<Invoice> {
        self.store
            .read(|s| s.invoices.values().cloned().collect())
            .await
    }
}
