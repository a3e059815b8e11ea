use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let settings = state.settings();
    Json(RootResponse {
        message: settings.api().project_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: settings.runtime().environment.as_str().to_string(),
    })
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut components = HashMap::new();

    let schools = state.schools().count().await;
    let storage = if state.schools().is_persistent() { "file" } else { "memory" };
    components
        .insert("school_store".to_string(), format!("healthy ({storage}, {schools} schools)"));

    let marking =
        if state.settings().ai().api_key.is_empty() { "unconfigured" } else { "configured" };
    components.insert("marking_model".to_string(), marking.to_string());
    components.insert("active_batches".to_string(), state.batches().len().await.to_string());

    let status = if marking == "configured" { "healthy" } else { "degraded" };

    Json(HealthResponse {
        service: "script-marker".to_string(),
        status: status.to_string(),
        components,
    })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
