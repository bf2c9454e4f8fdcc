//! End-to-end walk of the CRM lifecycle: lead -> deal -> quote -> invoice,
//! plus a full field-service job workflow, against one shared store.

use std::sync::Arc;

use uuid::Uuid;

use crmserver::billing::{BillingService, InvoiceStatus, LineItemInput, QuoteStatus};
use crmserver::billing::CreateQuoteRequest;
use crmserver::crm::{ConversionService, CreateLeadRequest, DealStage, LeadStatus};
use crmserver::jobs::{
    current_step, BomLineInput, CreateJobRequest, JobStatus, JobWorkflowPatch,
    JobWorkflowService, WorkflowStep,
};
use crmserver::store::MemoryStore;

fn actor() -> Uuid {
    Uuid::nil()
}

fn lead_request() -> CreateLeadRequest {
    CreateLeadRequest {
        name: "Rosa Diaz".to_string(),
        company: Some("Harbour Electrical".to_string()),
        email: Some("rosa@harbour.example".to_string()),
        phone: Some("+61 2 5550 0199".to_string()),
        estimated_value: Some(18000.0),
        source: Some("website".to_string()),
        campaign_id: None,
    }
}

fn line_items() -> Vec<LineItemInput> {
    vec![
        LineItemInput {
            item_type: Some("labor".to_string()),
            item_id: None,
            description: "Site survey and install".to_string(),
            qty: 16.0,
            unit_price: 95.0,
            tax_rate: Some(10.0),
        },
        LineItemInput {
            item_type: Some("product".to_string()),
            item_id: None,
            description: "Distribution board".to_string(),
            qty: 2.0,
            unit_price: 1200.0,
            tax_rate: Some(10.0),
        },
    ]
}

#[tokio::test]
async fn lead_to_paid_invoice_flow() {
    let store = Arc::new(MemoryStore::new());
    let crm = ConversionService::new(store.clone());
    let billing = BillingService::new(store.clone());

    // Lead comes in, gets qualified, converts in full.
    let lead = crm.create_lead(lead_request(), actor()).await;
    crm.update_lead_status(lead.id, LeadStatus::Qualified, actor())
        .await
        .unwrap();
    let conversion = crm.convert_lead(lead.id, actor()).await.unwrap();

    let lead = crm.get_lead(lead.id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::Converted);
    assert_eq!(lead.converted_to_deal_id, Some(conversion.deal_id));

    let deal = crm.get_deal(conversion.deal_id).await.unwrap();
    assert_eq!(deal.stage, DealStage::Prospecting);
    assert_eq!(deal.amount, 18000.0);
    assert_eq!(deal.account_id, Some(conversion.account_id));

    // Two competing quotes; the accepted one supersedes its sibling and
    // pulls the deal into negotiation.
    let winner = billing
        .create_quote(
            CreateQuoteRequest {
                account_id: conversion.account_id,
                deal_id: Some(conversion.deal_id),
                line_items: line_items(),
            },
            actor(),
        )
        .await
        .unwrap();
    let loser = billing
        .create_quote(
            CreateQuoteRequest {
                account_id: conversion.account_id,
                deal_id: Some(conversion.deal_id),
                line_items: line_items(),
            },
            actor(),
        )
        .await
        .unwrap();
    billing.send_quote(winner.id, actor()).await.unwrap();
    billing.send_quote(loser.id, actor()).await.unwrap();
    billing.accept_quote(winner.id, actor()).await.unwrap();

    assert_eq!(
        billing.get_quote(loser.id).await.unwrap().status,
        QuoteStatus::Superseded
    );
    assert_eq!(
        crm.get_deal(conversion.deal_id).await.unwrap().stage,
        DealStage::Negotiation
    );

    // Quote becomes the one and only invoice; credit then payment.
    let invoice = billing
        .convert_quote_to_invoice(winner.id, actor())
        .await
        .unwrap();
    assert_eq!(invoice.subtotal, 3920.0);
    assert_eq!(invoice.total, 4312.0);
    assert!(billing
        .convert_quote_to_invoice(winner.id, actor())
        .await
        .is_err());

    billing.send_invoice(invoice.id, None, actor()).await.unwrap();
    let credited = billing
        .apply_credit(invoice.id, 312.0, "loyalty discount".to_string(), actor())
        .await
        .unwrap();
    assert_eq!(credited.total, 4000.0);

    let paid = billing.mark_invoice_paid(invoice.id, actor()).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);

    // Closing the deal won must not mint another account.
    let close = crm
        .close_deal_as_won(conversion.deal_id, actor())
        .await
        .unwrap();
    assert!(close.created_account_id.is_none());
    assert_eq!(crm.list_accounts().await.len(), 1);

    // Every touched entity left an audit trail.
    assert!(!store.audit_for(lead.id).await.is_empty());
    assert!(!store.audit_for(conversion.deal_id).await.is_empty());
    assert!(!store.audit_for(winner.id).await.is_empty());
    assert!(!store.audit_for(invoice.id).await.is_empty());
}

#[tokio::test]
async fn job_workflow_walk_with_bom() {
    let store = Arc::new(MemoryStore::new());
    let jobs = JobWorkflowService::new(store);

    let breaker = Uuid::new_v4();
    let cable = Uuid::new_v4();
    let job = jobs
        .create_job(
            CreateJobRequest {
                title: "Panel replacement".to_string(),
                account_id: None,
                deal_id: None,
                scheduled_for: None,
                bom: vec![
                    BomLineInput {
                        inventory_item_id: breaker,
                        description: "Circuit breaker".to_string(),
                        qty_required: 6.0,
                    },
                    BomLineInput {
                        inventory_item_id: cable,
                        description: "Cable run".to_string(),
                        qty_required: 40.0,
                    },
                ],
            },
            actor(),
        )
        .await;

    assert_eq!(current_step(&job), WorkflowStep::Prep);

    let job_state = jobs
        .update_workflow(
            job.id,
            JobWorkflowPatch {
                swms_signed: Some(true),
                ..Default::default()
            },
            actor(),
        )
        .await
        .unwrap();
    assert_eq!(current_step(&job_state), WorkflowStep::Logistics);

    // Skipping is only for BOM-less jobs.
    assert!(jobs.skip_logistics(job.id, actor()).await.is_err());

    jobs.pick_bom_item(job.id, breaker, 6.0, actor()).await.unwrap();
    let picked = jobs.pick_bom_item(job.id, cable, 40.0, actor()).await.unwrap();
    assert_eq!(current_step(&picked), WorkflowStep::Execution);

    let started = jobs
        .update_workflow(
            job.id,
            JobWorkflowPatch {
                status: Some(JobStatus::InProgress),
                ..Default::default()
            },
            actor(),
        )
        .await
        .unwrap();
    assert_eq!(current_step(&started), WorkflowStep::Evidence);

    let with_photo = jobs
        .add_evidence_photo(job.id, "board-after.png".to_string(), actor())
        .await
        .unwrap();
    assert_eq!(current_step(&with_photo), WorkflowStep::Completion);

    let done = jobs
        .update_workflow(
            job.id,
            JobWorkflowPatch {
                completion_signature: Some("data:image/png;base64,sig".to_string()),
                ..Default::default()
            },
            actor(),
        )
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.completed_at.is_some());
    assert_eq!(current_step(&done), WorkflowStep::Done);
}
