use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod api;
pub mod workflow;

pub use workflow::{current_step, JobWorkflowService, WorkflowError, WorkflowStep};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomLine {
    pub inventory_item_id: Uuid,
    pub description: String,
    pub qty_required: f64,
    pub qty_picked: f64,
}

impl BomLine {
    pub fn is_fully_picked(&self) -> bool {
        self.qty_picked >= self.qty_required
    }
}

/// Field-service job. The workflow step is never stored; it is always
/// derived from these fields (see [`workflow::current_step`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub account_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub status: JobStatus,
    pub swms_signed: bool,
    pub bom: Vec<BomLine>,
    pub evidence_photos: Vec<String>,
    pub completion_signature: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BomLineInput {
    pub inventory_item_id: Uuid,
    pub description: String,
    pub qty_required: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub account_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bom: Vec<BomLineInput>,
}

impl Job {
    pub fn create(req: CreateJobRequest, actor: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: req.title,
            account_id: req.account_id,
            deal_id: req.deal_id,
            status: JobStatus::Scheduled,
            swms_signed: false,
            bom: req
                .bom
                .into_iter()
                .map(|line| BomLine {
                    inventory_item_id: line.inventory_item_id,
                    description: line.description,
                    qty_required: line.qty_required,
                    qty_picked: 0.0,
                })
                .collect(),
            evidence_photos: Vec::new(),
            completion_signature: None,
            completed_at: None,
            scheduled_for: req.scheduled_for,
            created_at: now,
            updated_at: now,
            created_by: actor,
        }
    }
}

/// Merge-patch over the workflow-relevant fields; everything else on a Job
/// is out of the workflow's reach.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobWorkflowPatch {
    pub swms_signed: Option<bool>,
    pub status: Option<JobStatus>,
    pub evidence_photos: Option<Vec<String>>,
    pub completion_signature: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}
