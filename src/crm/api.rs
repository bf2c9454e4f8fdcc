use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::crm::{
    Account, Contact, ConversionError, CreateDealRequest, CreateLeadRequest, Deal, DealClose,
    Lead, LeadConversion, LeadStatus,
};
use crate::shared::state::AppState;
use crate::store::AuditEntry;

pub fn crm_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/leads", post(create_lead).get(list_leads))
        .route("/leads/{id}", get(get_lead))
        .route("/leads/{id}/status", put(update_lead_status))
        .route("/leads/{id}/convert", post(convert_lead_to_deal))
        .route("/leads/{id}/convert-full", post(convert_lead_full))
        .route("/deals", post(create_deal).get(list_deals))
        .route("/deals/{id}", get(get_deal))
        .route("/deals/{id}/close-won", post(close_deal_won))
        .route("/deals/{id}/close-lost", post(close_deal_lost))
        .route("/accounts", get(list_accounts))
        .route("/contacts", get(list_contacts))
        .route("/audit/{id}", get(entity_audit))
}

// Request identity is out of scope; everything is attributed to the system
// actor for now.
pub fn actor_id() -> Uuid {
    Uuid::nil()
}

fn conversion_error(err: ConversionError) -> (StatusCode, String) {
    let status = match err {
        ConversionError::LeadNotFound(_) | ConversionError::DealNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ConversionError::AlreadyConverted | ConversionError::InvalidStageTransition(_) => {
            StatusCode::CONFLICT
        }
        ConversionError::InvalidStatusChange(_) => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string())
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLeadRequest>,
) -> Json<Lead> {
    Json(state.crm.create_lead(req, actor_id()).await)
}

pub async fn list_leads(State(state): State<Arc<AppState>>) -> Json<Vec<Lead>> {
    Json(state.crm.list_leads().await)
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, (StatusCode, String)> {
    state
        .crm
        .get_lead(id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Lead not found".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateLeadStatusRequest {
    pub status: LeadStatus,
}

pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLeadStatusRequest>,
) -> Result<Json<Lead>, (StatusCode, String)> {
    state
        .crm
        .update_lead_status(id, req.status, actor_id())
        .await
        .map(Json)
        .map_err(conversion_error)
}

#[derive(Debug, serde::Serialize)]
pub struct ConvertLeadResponse {
    pub deal_id: Uuid,
}

pub async fn convert_lead_to_deal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConvertLeadResponse>, (StatusCode, String)> {
    state
        .crm
        .convert_lead_to_deal(id, actor_id())
        .await
        .map(|deal_id| Json(ConvertLeadResponse { deal_id }))
        .map_err(conversion_error)
}

pub async fn convert_lead_full(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadConversion>, (StatusCode, String)> {
    state
        .crm
        .convert_lead(id, actor_id())
        .await
        .map(Json)
        .map_err(conversion_error)
}

pub async fn create_deal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDealRequest>,
) -> Json<Deal> {
    Json(state.crm.create_deal(req, actor_id()).await)
}

pub async fn list_deals(State(state): State<Arc<AppState>>) -> Json<Vec<Deal>> {
    Json(state.crm.list_deals().await)
}

pub async fn get_deal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Deal>, (StatusCode, String)> {
    state
        .crm
        .get_deal(id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Deal not found".to_string()))
}

pub async fn close_deal_won(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DealClose>, (StatusCode, String)> {
    state
        .crm
        .close_deal_as_won(id, actor_id())
        .await
        .map(Json)
        .map_err(conversion_error)
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseLostRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn close_deal_lost(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CloseLostRequest>,
) -> Result<Json<DealClose>, (StatusCode, String)> {
    state
        .crm
        .close_deal_as_lost(id, req.reason, actor_id())
        .await
        .map(Json)
        .map_err(conversion_error)
}

pub async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<Vec<Account>> {
    Json(state.crm.list_accounts().await)
}

pub async fn list_contacts(State(state): State<Arc<AppState>>) -> Json<Vec<Contact>> {
    Json(state.crm.list_contacts().await)
}

pub async fn entity_audit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<AuditEntry>> {
    Json(state.store.audit_for(id).await)
}
