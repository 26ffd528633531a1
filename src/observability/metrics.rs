//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count requests received, responses sent, processing time and responses
//!   by status in a process-wide [`MetricsCollector`]
//! - Mirror the same events to the `metrics` facade for Prometheus scraping
//!
//! # Metrics
//! - `api_requests_total` (counter): responses by method, status
//! - `api_request_duration_seconds` (histogram): latency distribution
//! - `api_rate_limited_total` (counter): rejected admissions by reason
//! - `api_rate_limiter_clients` (gauge): clients tracked by the limiter
//!
//! # Design Decisions
//! - Counters are monotonic and never reset
//! - Hot path is lock-free except for the per-status map shard

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use serde::Serialize;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "api_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("api_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_rate_limited(reason: &'static str) {
    metrics::counter!("api_rate_limited_total", "reason" => reason).increment(1);
}

pub fn record_tracked_clients(count: usize) {
    metrics::gauge!("api_rate_limiter_clients").set(count as f64);
}

/// Process-wide request counters.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_micros: AtomicU64,
    responses_by_status: DashMap<u16, u64>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_micros: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_sent(&self, status: u16, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_micros.fetch_add(micros, Ordering::Relaxed);
        *self.responses_by_status.entry(status).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_micros: self.processing_time_micros.load(Ordering::Relaxed),
            total_responses_sent_by_status: self
                .responses_by_status
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
        }
    }
}

/// Outermost pipeline stage: times the whole downstream chain.
pub async fn metrics_middleware(
    State(collector): State<Arc<MetricsCollector>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    collector.request_received();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    collector.response_sent(status, elapsed);
    record_request(method.as_str(), status, elapsed);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let collector = MetricsCollector::new();
        collector.request_received();
        collector.request_received();
        collector.response_sent(200, Duration::from_micros(150));
        collector.response_sent(429, Duration::from_micros(50));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests_received, 2);
        assert_eq!(snapshot.total_responses_sent, 2);
        assert_eq!(snapshot.total_processing_time_micros, 200);
        assert_eq!(snapshot.total_responses_sent_by_status["200"], 1);
        assert_eq!(snapshot.total_responses_sent_by_status["429"], 1);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let collector = Arc::new(MetricsCollector::new());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        collector.request_received();
                        collector.response_sent(200, Duration::from_micros(1));
                    }
                });
            }
        });

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests_received, 4000);
        assert_eq!(snapshot.total_responses_sent, 4000);
        assert_eq!(snapshot.total_responses_sent_by_status["200"], 4000);
    }
}
