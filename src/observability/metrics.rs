//! Metrics for the ETL stages.
//!
//! Recording goes through the `metrics` facade and is a no-op until [`init`] installs
//! the Prometheus recorder. A batch job has no scrape window, so the rendered snapshot
//! is pushed to a Pushgateway once the run ends.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use tracing::{info, warn};

use crate::config::MetricsConfig;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Stage lifecycle
    StageSuccess,
    StageError,
    StageDuration,

    // Fetch / load
    FetchBytes,
    UploadBytes,

    // Cleaning
    RowsRead,
    RowsWritten,
    DuplicatesDropped,
    NegativeCasesDropped,
    ValuesImputed,
    SentinelsNulled,
    PointConversionFailures,
    DatesCoerced,
    UnexpectedCaseTypes,

    // Geocoding
    GeocodeResolved,
    GeocodeNotFound,
    GeocodeTimeouts,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::StageSuccess => "etl_stage_success_total",
            MetricName::StageError => "etl_stage_error_total",
            MetricName::StageDuration => "etl_stage_duration_seconds",
            MetricName::FetchBytes => "etl_fetch_bytes_total",
            MetricName::UploadBytes => "etl_upload_bytes_total",
            MetricName::RowsRead => "etl_clean_rows_read_total",
            MetricName::RowsWritten => "etl_clean_rows_written_total",
            MetricName::DuplicatesDropped => "etl_clean_duplicates_dropped_total",
            MetricName::NegativeCasesDropped => "etl_clean_negative_cases_dropped_total",
            MetricName::ValuesImputed => "etl_clean_values_imputed_total",
            MetricName::SentinelsNulled => "etl_clean_sentinels_nulled_total",
            MetricName::PointConversionFailures => "etl_clean_point_conversion_failures_total",
            MetricName::DatesCoerced => "etl_clean_dates_coerced_total",
            MetricName::UnexpectedCaseTypes => "etl_clean_unexpected_case_types_total",
            MetricName::GeocodeResolved => "etl_geocode_resolved_total",
            MetricName::GeocodeNotFound => "etl_geocode_not_found_total",
            MetricName::GeocodeTimeouts => "etl_geocode_timeouts_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn add(name: MetricName, n: usize) {
    if n > 0 {
        ::metrics::counter!(name.as_str()).increment(n as u64);
    }
}

/// Install the Prometheus recorder. Returns `None` (and logs) if one is already set.
pub fn init() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Metrics recorder installed");
            Some(handle)
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

/// Push the current snapshot to the configured Pushgateway, if any.
pub async fn push(handle: &PrometheusHandle, config: &MetricsConfig) -> anyhow::Result<()> {
    let Some(url) = config.pushgateway_url.as_deref() else {
        return Ok(());
    };
    let push_url = format!("{}/metrics/job/{}", url.trim_end_matches('/'), config.job);
    let body = handle.render();

    let client = reqwest::Client::new();
    let resp = client
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Pushgateway returned status {}: {}", status, body);
    }
    info!(url = %push_url, "Pushed metrics to Pushgateway");
    Ok(())
}

pub mod stage {
    use super::MetricName;

    pub fn success(stage: &'static str) {
        ::metrics::counter!(MetricName::StageSuccess.as_str(), "stage" => stage).increment(1);
    }

    pub fn error(stage: &'static str) {
        ::metrics::counter!(MetricName::StageError.as_str(), "stage" => stage).increment(1);
    }

    pub fn duration(stage: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(secs);
    }
}

pub mod transfer {
    use super::{add, MetricName};

    pub fn fetched(bytes: usize) {
        add(MetricName::FetchBytes, bytes);
    }

    pub fn uploaded(bytes: usize) {
        add(MetricName::UploadBytes, bytes);
    }
}

pub mod clean {
    use super::{add, MetricName};

    pub fn rows_read(n: usize) {
        add(MetricName::RowsRead, n);
    }

    pub fn rows_written(n: usize) {
        add(MetricName::RowsWritten, n);
    }

    pub fn duplicates_dropped(n: usize) {
        add(MetricName::DuplicatesDropped, n);
    }

    pub fn negative_dropped(n: usize) {
        add(MetricName::NegativeCasesDropped, n);
    }

    pub fn values_imputed(n: usize) {
        add(MetricName::ValuesImputed, n);
    }

    pub fn sentinels_nulled(n: usize) {
        add(MetricName::SentinelsNulled, n);
    }

    pub fn point_failures(n: usize) {
        add(MetricName::PointConversionFailures, n);
    }

    pub fn dates_coerced(n: usize) {
        add(MetricName::DatesCoerced, n);
    }

    pub fn unexpected_case_types(n: usize) {
        add(MetricName::UnexpectedCaseTypes, n);
    }
}

pub mod geocode {
    use super::{add, MetricName};

    pub fn resolved() {
        add(MetricName::GeocodeResolved, 1);
    }

    pub fn not_found() {
        add(MetricName::GeocodeNotFound, 1);
    }

    pub fn timeout() {
        add(MetricName::GeocodeTimeouts, 1);
    }
}
