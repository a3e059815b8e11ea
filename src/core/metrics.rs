use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_marking(status: &'static str, elapsed: Duration) {
    metrics::counter!("marking_jobs_total", "status" => status).increment(1);
    metrics::histogram!("marking_duration_seconds").record(elapsed.as_secs_f64());
}

pub(crate) fn record_batch(scripts: usize) {
    metrics::counter!("batch_scripts_total").increment(scripts as u64);
}

pub(crate) fn record_export(kind: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!("exports_total", "kind" => kind, "status" => status).increment(1);
}
