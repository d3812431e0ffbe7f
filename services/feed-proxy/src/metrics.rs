//! Prometheus metrics exposition
//!
//! - `feed_requests_total` (counter): label `outcome` (cached, fresh, stale, error)
//! - `feed_upstream_errors_total` (counter): label `error_type`
//! - `feed_upstream_duration_seconds` (histogram): listing fetch latency
//!
//! `token_refresh_total`, `feed_carousel_expansion_failures_total` and
//! `feed_unsupported_media_total` are emitted by the library crates and
//! rendered through the same recorder.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const UPSTREAM_DURATION: &str = "feed_upstream_duration_seconds";

/// Bucket boundaries from 50ms to 30s: a listing plus carousel expansion.
const UPSTREAM_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// How a feed request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Cached,
    Fresh,
    Stale,
    Error,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Cached => "cached",
            Outcome::Fresh => "fresh",
            Outcome::Stale => "stale",
            Outcome::Error => "error",
        }
    }
}

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(UPSTREAM_DURATION.to_string()), UPSTREAM_BUCKETS)
        .expect("histogram buckets are non-empty")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_feed_request(outcome: Outcome) {
    metrics::counter!("feed_requests_total", "outcome" => outcome.label()).increment(1);
}

pub fn record_upstream_error(error_type: &'static str) {
    metrics::counter!("feed_upstream_errors_total", "error_type" => error_type).increment(1);
}

pub fn record_upstream_duration(duration_secs: f64) {
    metrics::histogram!(UPSTREAM_DURATION).record(duration_secs);
}
