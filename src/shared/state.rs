use std::sync::Arc;

use crate::billing::BillingService;
use crate::config::AppConfig;
use crate::crm::ConversionService;
use crate::jobs::JobWorkflowService;
use crate::store::MemoryStore;

/// Shared application state: one store, one service per domain, all handed
/// out by reference rather than reached for globally.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<MemoryStore>,
    pub crm: ConversionService,
    pub billing: BillingService,
    pub jobs: JobWorkflowService,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            crm: ConversionService::new(store.clone()),
            billing: BillingService::new(store.clone())
                .with_due_days(config.billing.default_due_days),
            jobs: JobWorkflowService::new(store.clone()),
            store,
            config,
        }
    }
}
