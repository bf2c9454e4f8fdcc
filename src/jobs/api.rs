use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crm::api::actor_id;
use crate::jobs::{
    current_step, CreateJobRequest, Job, JobWorkflowPatch, WorkflowError, WorkflowStep,
};
use crate::shared::state::AppState;

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/{id}", get(get_job))
        .route("/{id}/workflow", get(get_workflow).patch(update_workflow))
        .route("/{id}/bom/pick", post(pick_bom_item))
        .route("/{id}/skip-logistics", post(skip_logistics))
        .route("/{id}/photos", post(add_photo))
}

fn workflow_error(err: WorkflowError) -> (StatusCode, String) {
    let status = match err {
        WorkflowError::JobNotFound(_) | WorkflowError::BomLineNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::BomNotEmpty => StatusCode::CONFLICT,
        WorkflowError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string())
}

#[derive(Debug, Serialize)]
pub struct JobWithStep {
    #[serde(flatten)]
    pub job: Job,
    pub current_step: WorkflowStep,
    pub step_index: u8,
}

impl From<Job> for JobWithStep {
    fn from(job: Job) -> Self {
        let step = current_step(&job);
        Self {
            job,
            current_step: step,
            step_index: step.index(),
        }
    }
}

pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateJobRequest>,
) -> Json<JobWithStep> {
    Json(state.jobs.create_job(req, actor_id()).await.into())
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobWithStep>> {
    Json(
        state
            .jobs
            .list_jobs()
            .await
            .into_iter()
            .map(Into::into)
            .collect(),
    )
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobWithStep>, (StatusCode, String)> {
    state
        .jobs
        .get_job(id)
        .await
        .map(|job| Json(job.into()))
        .ok_or((StatusCode::NOT_FOUND, "Job not found".to_string()))
}

#[derive(Debug, Serialize)]
pub struct WorkflowStateResponse {
    pub current_step: WorkflowStep,
    pub step_index: u8,
}

pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowStateResponse>, (StatusCode, String)> {
    let job = state
        .jobs
        .get_job(id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Job not found".to_string()))?;
    let step = current_step(&job);
    Ok(Json(WorkflowStateResponse {
        current_step: step,
        step_index: step.index(),
    }))
}

pub async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch_body): Json<JobWorkflowPatch>,
) -> Result<Json<JobWithStep>, (StatusCode, String)> {
    state
        .jobs
        .update_workflow(id, patch_body, actor_id())
        .await
        .map(|job| Json(job.into()))
        .map_err(workflow_error)
}

#[derive(Debug, Deserialize)]
pub struct PickRequest {
    pub inventory_item_id: Uuid,
    pub qty: f64,
}

pub async fn pick_bom_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<PickRequest>,
) -> Result<Json<JobWithStep>, (StatusCode, String)> {
    state
        .jobs
        .pick_bom_item(id, req.inventory_item_id, req.qty, actor_id())
        .await
        .map(|job| Json(job.into()))
        .map_err(workflow_error)
}

pub async fn skip_logistics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobWithStep>, (StatusCode, String)> {
    state
        .jobs
        .skip_logistics(id, actor_id())
        .await
        .map(|job| Json(job.into()))
        .map_err(workflow_error)
}

#[derive(Debug, Deserialize)]
pub struct AddPhotoRequest {
    pub url: String,
}

pub async fn add_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddPhotoRequest>,
) -> Result<Json<JobWithStep>, (StatusCode, String)> {
    state
        .jobs
        .add_evidence_photo(id, req.url, actor_id())
        .await
        .map(|job| Json(job.into()))
        .map_err(workflow_error)
}
