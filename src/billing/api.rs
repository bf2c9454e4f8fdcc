use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::{
    derive, BillingCycle, BillingError, CreateQuoteRequest, Invoice, Quote,
};
use crate::crm::api::actor_id;
use crate::shared::state::AppState;

pub fn billing_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes", post(create_quote).get(list_quotes))
        .route("/quotes/{id}", get(get_quote))
        .route("/quotes/{id}/send", post(send_quote))
        .route("/quotes/{id}/accept", post(accept_quote))
        .route("/quotes/{id}/revise", post(revise_quote))
        .route("/quotes/{id}/invoice", post(convert_quote_to_invoice))
        .route("/invoices", get(list_invoices))
        .route("/invoices/{id}", get(get_invoice))
        .route("/invoices/{id}/send", post(send_invoice))
        .route("/invoices/{id}/pay", post(mark_invoice_paid))
        .route("/invoices/{id}/credits", post(apply_credit))
        .route("/next-billing-date", get(next_billing_date))
}

fn billing_error(err: BillingError) -> (StatusCode, String) {
    let status = match err {
        BillingError::QuoteNotFound(_)
        | BillingError::InvoiceNotFound(_)
        | BillingError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        BillingError::QuoteNotSendable(_)
        | BillingError::QuoteNotAcceptable(_)
        | BillingError::QuoteNotRevisable(_)
        | BillingError::QuoteNotInvoiceable(_)
        | BillingError::AlreadyInvoiced
        | BillingError::InvalidStatus(_) => StatusCode::CONFLICT,
        BillingError::InvalidCreditAmount(_) => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string())
}

pub async fn create_quote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateQuoteRequest>,
) -> Result<Json<Quote>, (StatusCode, String)> {
    state
        .billing
        .create_quote(req, actor_id())
        .await
        .map(Json)
        .map_err(billing_error)
}

#[derive(Debug, Deserialize)]
pub struct QuoteListQuery {
    pub deal_id: Option<Uuid>,
}

pub async fn list_quotes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuoteListQuery>,
) -> Json<Vec<Quote>> {
    match query.deal_id {
        Some(deal_id) => Json(state.billing.quotes_for_deal(deal_id).await),
        None => Json(state.billing.list_quotes().await),
    }
}

pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Quote>, (StatusCode, String)> {
    state
        .billing
        .get_quote(id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Quote not found".to_string()))
}

pub async fn send_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Quote>, (StatusCode, String)> {
    state
        .billing
        .send_quote(id, actor_id())
        .await
        .map(Json)
        .map_err(billing_error)
}

pub async fn accept_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Quote>, (StatusCode, String)> {
    state
        .billing
        .accept_quote(id, actor_id())
        .await
        .map(Json)
        .map_err(billing_error)
}

pub async fn revise_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Quote>, (StatusCode, String)> {
    state
        .billing
        .revise_quote(id, actor_id())
        .await
        .map(Json)
        .map_err(billing_error)
}

pub async fn convert_quote_to_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, (StatusCode, String)> {
    state
        .billing
        .convert_quote_to_invoice(id, actor_id())
        .await
        .map(Json)
        .map_err(billing_error)
}

pub async fn list_invoices(State(state): State<Arc<AppState>>) -> Json<Vec<Invoice>> {
    Json(state.billing.list_invoices().await)
}

pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, (StatusCode, String)> {
    state
        .billing
        .get_invoice(id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Invoice not found".to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub struct SendInvoiceRequest {
    #[serde(default)]
    pub due_days: Option<i64>,
}

pub async fn send_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendInvoiceRequest>,
) -> Result<Json<Invoice>, (StatusCode, String)> {
    state
        .billing
        .send_invoice(id, req.due_days, actor_id())
        .await
        .map(Json)
        .map_err(billing_error)
}

pub async fn mark_invoice_paid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, (StatusCode, String)> {
    state
        .billing
        .mark_invoice_paid(id, actor_id())
        .await
        .map(Json)
        .map_err(billing_error)
}

#[derive(Debug, Deserialize)]
pub struct ApplyCreditRequest {
    pub amount: f64,
    pub reason: String,
}

pub async fn apply_credit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApplyCreditRequest>,
) -> Result<Json<Invoice>, (StatusCode, String)> {
    state
        .billing
        .apply_credit(id, req.amount, req.reason, actor_id())
        .await
        .map(Json)
        .map_err(billing_error)
}

#[derive(Debug, Deserialize)]
pub struct NextBillingDateQuery {
    pub start: NaiveDate,
    pub cycle: BillingCycle,
}

#[derive(Debug, Serialize)]
pub struct NextBillingDateResponse {
    pub next: NaiveDate,
}

pub async fn next_billing_date(
    Query(query): Query<NextBillingDateQuery>,
) -> Json<NextBillingDateResponse> {
    Json(NextBillingDateResponse {
        next: derive::next_billing_date(query.start, query.cycle),
    })
}
