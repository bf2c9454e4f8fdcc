use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crmserver::billing::api::billing_routes;
use crmserver::config::AppConfig;
use crmserver::crm::api::crm_routes;
use crmserver::jobs::api::job_routes;
use crmserver::shared::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config));

    spawn_overdue_sweep(state.clone());

    let app = Router::new()
        .nest("/api/crm", crm_routes())
        .nest("/api/billing", billing_routes())
        .nest("/api/jobs", job_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("crmserver listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_overdue_sweep(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.billing.overdue_check_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let flipped = state.billing.check_overdue(Uuid::nil()).await;
            if !flipped.is_empty() {
                tracing::info!("Marked {} invoice(s) overdue", flipped.len());
            }
        }
    });
}
