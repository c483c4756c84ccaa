use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::TelemetrySettings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(telemetry: &TelemetrySettings) -> anyhow::Result<()> {
    if !telemetry.prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

/// Counts one upstream LLM call, labelled by endpoint kind and outcome.
pub(crate) fn record_llm_call(kind: &'static str, outcome: &'static str) {
    metrics::counter!("llm_requests_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub(crate) fn record_assessment_generated(question_count: usize) {
    metrics::counter!("assessments_generated_total").increment(1);
    metrics::histogram!("assessment_questions").record(question_count as f64);
}
