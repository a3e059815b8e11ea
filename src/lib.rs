pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod folder;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::folder::FolderArgs;
use crate::repositories::schools::SchoolStore;
use crate::services::assistant::AiAssistant;
use crate::services::marking_client::AiMarkingClient;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let schools = match &settings.store().school_store_path {
        Some(path) => SchoolStore::open(path)
            .await
            .with_context(|| format!("Failed to open school store at {path}"))?,
        None => {
            tracing::warn!("SCHOOL_STORE_PATH not set; registered schools are kept in memory only");
            SchoolStore::in_memory()
        }
    };
    let marker = Arc::new(AiMarkingClient::from_settings(settings.ai())?);
    let assistant = Arc::new(AiAssistant::from_settings(settings.ai())?);

    let state = AppState::new(settings, schools, marker, assistant);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        model = %state.settings().ai().model,
        "Script marker API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("Script marker API stopped");
    Ok(())
}

/// Marks a folder of scripts from the command line and writes the summary
/// CSV and results archive into the output folder.
pub async fn run_folder() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = FolderArgs::parse(std::env::args().skip(1))?;
    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;

    let marker = Arc::new(AiMarkingClient::from_settings(settings.ai())?);
    let report = folder::mark_folder(
        &args,
        marker,
        settings.uploads(),
        settings.batch().max_concurrent_marking,
    )
    .await?;

    tracing::info!(
        marked = report.marked,
        failed = report.failed,
        archive_written = report.archive_written,
        average_percentage = ?report.analytics.as_ref().and_then(|a| a.average_percentage),
        out = %args.out.display(),
        "Folder marking finished"
    );
    Ok(())
}
