use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::jobs::{CreateJobRequest, Job, JobStatus, JobWorkflowPatch};
use crate::store::{snapshot, AuditAction, MemoryStore};

/// Fixed, monotonic step order. A step is only enterable once its
/// predecessor's exit condition holds.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Prep,
    Logistics,
    Execution,
    Evidence,
    Completion,
    Done,
}

impl WorkflowStep {
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Derives the current step from the job's fields, top-down, first unmet
/// condition wins. Never persisted, so no drift is possible: any external
/// mutation of the fields is reflected immediately.
pub fn current_step(job: &Job) -> WorkflowStep {
    if !job.swms_signed {
        return WorkflowStep::Prep;
    }
    if !job.bom.is_empty() && !job.bom.iter().all(|line| line.is_fully_picked()) {
        return WorkflowStep::Logistics;
    }
    if !matches!(job.status, JobStatus::InProgress | JobStatus::Completed) {
        return WorkflowStep::Execution;
    }
    if job.evidence_photos.is_empty() {
        return WorkflowStep::Evidence;
    }
    if job.completion_signature.is_none() {
        return WorkflowStep::Completion;
    }
    WorkflowStep::Done
}

#[derive(Debug, Clone)]
pub enum WorkflowError {
    JobNotFound(Uuid),
    BomLineNotFound(Uuid),
    BomNotEmpty,
    InvalidQuantity(f64),
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JobNotFound(id) => write!(f, "Job not found: {id}"),
            Self::BomLineNotFound(id) => write!(f, "No BOM line for inventory item {id}"),
            Self::BomNotEmpty => {
                write!(f, "Logistics can only be skipped when the BOM is empty")
            }
            Self::InvalidQuantity(qty) => {
                write!(f, "Picked quantity must be a non-negative number, got {qty}")
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

pub struct JobWorkflowService {
    store: Arc<MemoryStore>,
}

impl JobWorkflowService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn create_job(&self, req: CreateJobRequest, actor: Uuid) -> Job {
        let job = Job::create(req, actor);
        let created = job.clone();
        let _: Result<(), WorkflowError> = self
            .store
            .transaction(|s| {
                s.record(job.id, AuditAction::Created, None, snapshot(&job), actor);
                s.jobs.insert(job.id, job);
                Ok(())
            })
            .await;
        created
    }

    /// Applies the patch and returns the job. A completion signature also
    /// completes the job and stamps `completed_at`.
    pub async fn update_workflow(
        &self,
        job_id: Uuid,
        patch: JobWorkflowPatch,
        actor: Uuid,
    ) -> Result<Job, WorkflowError> {
        self.store
            .transaction(|s| {
                let job = s
                    .jobs
                    .get(&job_id)
                    .ok_or(WorkflowError::JobNotFound(job_id))?;

                let now = Utc::now();
                let mut job = job.clone();
                let step_before = current_step(&job);

                if let Some(signed) = patch.swms_signed {
                    job.swms_signed = signed;
                }
                if let Some(status) = patch.status {
                    job.status = status;
                }
                if let Some(photos) = patch.evidence_photos {
                    job.evidence_photos = photos;
                }
                if let Some(completed_at) = patch.completed_at {
                    job.completed_at = Some(completed_at);
                }
                if let Some(signature) = patch.completion_signature {
                    job.completion_signature = Some(signature);
                    job.status = JobStatus::Completed;
                    job.completed_at = Some(now);
                }
                job.updated_at = now;

                let step_after = current_step(&job);
                let action = if job.status == JobStatus::Completed
                    && step_after == WorkflowStep::Done
                {
                    AuditAction::Completed
                } else {
                    AuditAction::Updated
                };
                s.record(
                    job_id,
                    action,
                    snapshot(&step_before),
                    snapshot(&step_after),
                    actor,
                );
                let updated = job.clone();
                s.jobs.insert(job_id, job);
                Ok(updated)
            })
            .await
    }

    /// Monotonic picking: a pick can raise `qty_picked` up to the required
    /// quantity but never lower a previously higher pick.
    pub async fn pick_bom_item(
        &self,
        job_id: Uuid,
        inventory_item_id: Uuid,
        qty: f64,
        actor: Uuid,
    ) -> Result<Job, WorkflowError> {
        if !qty.is_finite() || qty < 0.0 {
            return Err(WorkflowError::InvalidQuantity(qty));
        }
        self.store
            .transaction(|s| {
                let job = s
                    .jobs
                    .get(&job_id)
                    .ok_or(WorkflowError::JobNotFound(job_id))?;

                let mut job = job.clone();
                let line = job
                    .bom
                    .iter_mut()
                    .find(|line| line.inventory_item_id == inventory_item_id)
                    .ok_or(WorkflowError::BomLineNotFound(inventory_item_id))?;

                let previous = line.qty_picked;
                line.qty_picked = previous.max(qty.min(line.qty_required));
                let picked = line.qty_picked;
                job.updated_at = Utc::now();

                s.record(
                    job_id,
                    AuditAction::Picked,
                    snapshot(&previous),
                    snapshot(&picked),
                    actor,
                );
                let updated = job.clone();
                s.jobs.insert(job_id, job);
                Ok(updated)
            })
            .await
    }

    /// Empty-BOM escape: jumps straight into execution without the picking
    /// gate. Jobs that do carry a BOM must pick instead.
    pub async fn skip_logistics(&self, job_id: Uuid, actor: Uuid) -> Result<Job, WorkflowError> {
        self.store
            .transaction(|s| {
                let job = s
                    .jobs
                    .get(&job_id)
                    .ok_or(WorkflowError::JobNotFound(job_id))?;
                if !job.bom.is_empty() {
                    return Err(WorkflowError::BomNotEmpty);
                }

                let mut job = job.clone();
                let previous = job.status;
                job.status = JobStatus::InProgress;
                job.updated_at = Utc::now();
                s.record(
                    job_id,
                    AuditAction::StatusChanged,
                    snapshot(&previous),
                    snapshot(&JobStatus::InProgress),
                    actor,
                );
                let updated = job.clone();
                s.jobs.insert(job_id, job);
                Ok(updated)
            })
            .await
    }

    pub async fn add_evidence_photo(
        &self,
        job_id: Uuid,
        url: String,
        actor: Uuid,
    ) -> Result<Job, WorkflowError> {
        self.store
            .transaction(|s| {
                let job = s
                    .jobs
                    .get(&job_id)
                    .ok_or(WorkflowError::JobNotFound(job_id))?;

                let mut job = job.clone();
                let count_before = job.evidence_photos.len();
                job.evidence_photos.push(url);
                job.updated_at = Utc::now();
                s.record(
                    job_id,
                    AuditAction::Updated,
                    snapshot(&count_before),
                    snapshot(&job.evidence_photos.len()),
                    actor,
                );
                let updated = job.clone();
                s.jobs.insert(job_id, job);
                Ok(updated)
            })
            .await
    }

    pub async fn get_job(&self, id: Uuid) -> Option<Job> {
        self.store.read(|s| s.jobs.get(&id).cloned()).await
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        self.store.read(|s| s.jobs.values().cloned().collect()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{BomLine, BomLineInput};

    fn job_request(bom: Vec<BomLineInput>) -> CreateJobRequest {
        CreateJobRequest {
            title: "Switchboard upgrade".to_string(),
            account_id: None,
            deal_id: None,
            scheduled_for: None,
            bom,
        }
    }

    fn bom_line(qty_required: f64) -> (Uuid, BomLineInput) {
        let id = Uuid::new_v4();
        (
            id,
            BomLineInput {
                inventory_item_id: id,
                description: "Cable drum".to_string(),
                qty_required,
            },
        )
    }

    fn service() -> JobWorkflowService {
        JobWorkflowService::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn step_derivation_is_pure_and_ordered() {
        let mut job = Job::create(job_request(vec![]), Uuid::nil());
        job.bom = vec![BomLine {
            inventory_item_id: Uuid::new_v4(),
            description: "Conduit".to_string(),
            qty_required: 4.0,
            qty_picked: 0.0,
        }];

        assert_eq!(current_step(&job), WorkflowStep::Prep);

        job.swms_signed = true;
        assert_eq!(current_step(&job), WorkflowStep::Logistics);

        job.bom[0].qty_picked = 4.0;
        assert_eq!(current_step(&job), WorkflowStep::Execution);

        job.status = JobStatus::InProgress;
        assert_eq!(current_step(&job), WorkflowStep::Evidence);

        job.evidence_photos.push("site.png".to_string());
        assert_eq!(current_step(&job), WorkflowStep::Completion);

        job.completion_signature = Some("data:image/png;base64,...".to_string());
        assert_eq!(current_step(&job), WorkflowStep::Done);

        // Same fields, same answer.
        let twin = job.clone();
        assert_eq!(current_step(&twin), current_step(&job));
    }

    #[test]
    fn empty_bom_skips_logistics_in_derivation() {
        let mut job = Job::create(job_request(vec![]), Uuid::nil());
        assert_eq!(current_step(&job), WorkflowStep::Prep);
        job.swms_signed = true;
        assert_eq!(current_step(&job), WorkflowStep::Execution);
    }

    #[tokio::test]
    async fn signature_completes_job_and_stamps_time() {
        let svc = service();
        let job = svc.create_job(job_request(vec![]), Uuid::nil()).await;

        svc.update_workflow(
            job.id,
            JobWorkflowPatch {
                swms_signed: Some(true),
                status: Some(JobStatus::InProgress),
                evidence_photos: Some(vec!["a.png".to_string()]),
                ..Default::default()
            },
            Uuid::nil(),
        )
        .await
        .unwrap();
        let current = svc.get_job(job.id).await.unwrap();
        assert_eq!(current_step(&current), WorkflowStep::Completion);

        let done = svc
            .update_workflow(
                job.id,
                JobWorkflowPatch {
                    completion_signature: Some("data:sig".to_string()),
                    ..Default::default()
                },
                Uuid::nil(),
            )
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(current_step(&done), WorkflowStep::Done);
    }

    #[tokio::test]
    async fn picking_is_capped_and_monotonic() {
        let svc = service();
        let (item_id, line) = bom_line(10.0);
        let job = svc.create_job(job_request(vec![line]), Uuid::nil()).await;

        let picked = svc
            .pick_bom_item(job.id, item_id, 25.0, Uuid::nil())
            .await
            .unwrap();
        assert_eq!(picked.bom[0].qty_picked, 10.0);

        // A lower pick never undoes a higher one.
        let repicked = svc
            .pick_bom_item(job.id, item_id, 3.0, Uuid::nil())
            .await
            .unwrap();
        assert_eq!(repicked.bom[0].qty_picked, 10.0);
    }

    #[tokio::test]
    async fn partial_pick_keeps_logistics_current() {
        let svc = service();
        let (item_id, line) = bom_line(8.0);
        let job = svc.create_job(job_request(vec![line]), Uuid::nil()).await;
        svc.update_workflow(
            job.id,
            JobWorkflowPatch {
                swms_signed: Some(true),
                ..Default::default()
            },
            Uuid::nil(),
        )
        .await
        .unwrap();

        let partial = svc
            .pick_bom_item(job.id, item_id, 5.0, Uuid::nil())
            .await
            .unwrap();
        assert_eq!(partial.bom[0].qty_picked, 5.0);
        assert_eq!(current_step(&partial), WorkflowStep::Logistics);

        let full = svc
            .pick_bom_item(job.id, item_id, 8.0, Uuid::nil())
            .await
            .unwrap();
        assert_eq!(current_step(&full), WorkflowStep::Execution);
    }

    #[tokio::test]
    async fn pick_rejects_unknown_line_and_bad_quantity() {
        let svc = service();
        let (_item_id, line) = bom_line(2.0);
        let job = svc.create_job(job_request(vec![line]), Uuid::nil()).await;

        let err = svc
            .pick_bom_item(job.id, Uuid::new_v4(), 1.0, Uuid::nil())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::BomLineNotFound(_)));

        let err = svc
            .pick_bom_item(job.id, job.bom[0].inventory_item_id, -1.0, Uuid::nil())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn skip_requires_empty_bom() {
        let svc = service();
        let (_item_id, line) = bom_line(1.0);
        let with_bom = svc.create_job(job_request(vec![line]), Uuid::nil()).await;
        let err = svc.skip_logistics(with_bom.id, Uuid::nil()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::BomNotEmpty));

        let without = svc.create_job(job_request(vec![]), Uuid::nil()).await;
        svc.update_workflow(
            without.id,
            JobWorkflowPatch {
                swms_signed: Some(true),
                ..Default::default()
            },
            Uuid::nil(),
        )
        .await
        .unwrap();
        let skipped = svc.skip_logistics(without.id, Uuid::nil()).await.unwrap();
        assert_eq!(skipped.status, JobStatus::InProgress);
        assert_eq!(current_step(&skipped), WorkflowStep::Evidence);
    }

    #[tokio::test]
    async fn evidence_photo_advances_to_completion() {
        let svc = service();
        let job = svc.create_job(job_request(vec![]), Uuid::nil()).await;
        svc.update_workflow(
            job.id,
            JobWorkflowPatch {
                swms_signed: Some(true),
                status: Some(JobStatus::InProgress),
                ..Default::default()
            },
            Uuid::nil(),
        )
        .await
        .unwrap();

        let current = svc.get_job(job.id).await.unwrap();
        assert_eq!(current_step(&current), WorkflowStep::Evidence);

        let with_photo = svc
            .add_evidence_photo(job.id, "after.png".to_string(), Uuid::nil())
            .await
            .unwrap();
        assert_eq!(current_step(&with_photo), WorkflowStep::Completion);
    }
}
