pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::assessment_store::PgAssessmentStore;
use crate::services::identity::SessionTokenVerifier;
use crate::services::llm::OpenAiClient;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(settings.telemetry())?;
    core::metrics::init(settings.telemetry())?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let store = Arc::new(PgAssessmentStore::new(db_pool.clone()));
    let llm = Arc::new(OpenAiClient::from_settings(settings.ai())?);
    let identity = Arc::new(SessionTokenVerifier::from_settings(settings.identity())?);

    let state = AppState::new(settings, store, llm, identity);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        generation_model = %state.settings().ai().generation_model,
        "quizgen API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    db_pool.close().await;
    tracing::info!("Database pool closed");

    result?;

    Ok(())
}
