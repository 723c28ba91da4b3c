// src/metrics.rs
//! Prometheus exposition for the sourcing funnel.
//!
//! The library only emits through the `metrics` facade; the binary decides
//! whether a recorder exists at all.

use anyhow::Context;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Adapter calls go through a rendering proxy, so latencies run from
/// sub-second to the configured fetch timeout.
const FETCH_MS_BUCKETS: &[f64] = &[
    250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 20_000.0, 40_000.0, 60_000.0,
];

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder. Only one per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full("sourcing_fetch_ms".to_string()), FETCH_MS_BUCKETS)
            .context("prometheus: fetch latency buckets")?
            .install_recorder()
            .context("prometheus: install recorder")?;
        Ok(Self { handle })
    }

    /// Current exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// `GET /metrics`.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    }
}
