//! # Prometheus Metrics
//!
//! Operational counters for the access flow, scraped at `/metrics` on the
//! metrics port. All metrics live in a dedicated [`prometheus::Registry`]
//! with the `docgate` prefix.
//!
//! Also home to [`MeteredNotifier`], which counts failed deliveries without
//! the library needing to know metrics exist.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use docgate::{Delivery, Notifier, NotifyError};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Credentials successfully issued.
    pub credentials_issued_total: IntCounter,
    /// Verification attempts, labelled by outcome (`success` or an error code).
    pub verifications_total: IntCounterVec,
    /// Deliveries the notifier reported as failed.
    pub notifications_failed_total: IntCounter,
    /// Time spent in the verifier, in seconds.
    pub verification_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("docgate".into()), None)?;

        let credentials_issued_total = IntCounter::new(
            "credentials_issued_total",
            "Total number of one-time credentials issued",
        )?;
        registry.register(Box::new(credentials_issued_total.clone()))?;

        let verifications_total = IntCounterVec::new(
            Opts::new(
                "verifications_total",
                "Total number of verification attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(verifications_total.clone()))?;

        let notifications_failed_total = IntCounter::new(
            "notifications_failed_total",
            "Total number of code deliveries that failed",
        )?;
        registry.register(Box::new(notifications_failed_total.clone()))?;

        let verification_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "verification_latency_seconds",
                "Time spent verifying a submitted code, in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(verification_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            credentials_issued_total,
            verifications_total,
            notifications_failed_total,
            verification_latency_seconds,
        })
    }

    /// Records one verification outcome.
    pub fn record_verification(&self, outcome: &str) {
        self.verifications_total.with_label_values(&[outcome]).inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

/// Wraps a notifier and counts its failures.
pub struct MeteredNotifier {
    inner: Arc<dyn Notifier>,
    metrics: SharedMetrics,
}

impl MeteredNotifier {
    pub fn new(inner: Arc<dyn Notifier>, metrics: SharedMetrics) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl Notifier for MeteredNotifier {
    async fn send(&self, delivery: Delivery) -> Result<(), NotifyError> {
        let result = self.inner.send(delivery).await;
        if result.is_err() {
            self.metrics.notifications_failed_total.inc();
        }
        result
    }
}
