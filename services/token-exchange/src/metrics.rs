//! Prometheus metrics exposition
//!
//! - `token_exchange_total` (counter): label `outcome`
//! - `token_exchange_duration_seconds` (histogram): label `outcome`
//! - `token_exchange_failures_total` (counter): label `kind`

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "token_exchange_duration_seconds";

/// 5ms to 30s; the token endpoint usually answers well under a second
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// In-process counters reported by `/health`
#[derive(Debug, Clone)]
pub struct ExchangeCounters {
    pub exchanges_total: Arc<AtomicU64>,
    pub failures_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ExchangeCounters {
    pub fn new() -> Self {
        Self {
            exchanges_total: Arc::new(AtomicU64::new(0)),
            failures_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Explicit buckets make the duration render as a histogram (`_bucket` lines)
/// rather than the exporter's default summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished exchange. `outcome` is "success" or "failure".
pub fn record_exchange(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("token_exchange_total", "outcome" => outcome).increment(1);
    metrics::histogram!(DURATION_METRIC, "outcome" => outcome).record(duration_secs);
}

/// Record a failed exchange by error kind.
pub fn record_failure(kind: &'static str) {
    metrics::counter!("token_exchange_failures_total", "kind" => kind).increment(1);
}
