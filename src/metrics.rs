// src/metrics.rs
//! Per-request metrics and the health counters built from them.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Valid,
    Error,
}

/// Collected over the life of one request and handed to a [`MetricsSink`] at
/// the end of it.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub request_id: Uuid,
    pub operation: &'static str,
    pub remote_calls: u32,
    pub store_calls: u32,
    pub saga_steps: u32,
    pub compensations: u32,
    /// Saga steps that stayed applied after a later step failed.
    pub steps_left_applied: u32,
    started: Instant,
}

impl RequestMetrics {
    pub fn start(operation: &'static str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            operation,
            remote_calls: 0,
            store_calls: 0,
            saga_steps: 0,
            compensations: 0,
            steps_left_applied: 0,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

pub trait MetricsSink: Send + Sync {
    fn observe(&self, metrics: &RequestMetrics, outcome: Outcome);
}

/// Emits each finished request as a tracing event.
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn observe(&self, metrics: &RequestMetrics, outcome: Outcome) {
        tracing::info!(
            request_id = %metrics.request_id,
            operation = metrics.operation,
            outcome = ?outcome,
            remote_calls = metrics.remote_calls,
            store_calls = metrics.store_calls,
            saga_steps = metrics.saga_steps,
            compensations = metrics.compensations,
            steps_left_applied = metrics.steps_left_applied,
            elapsed_ms = metrics.elapsed().as_millis() as u64,
            "Request finished"
        );
    }
}

/// Fans one observation out to several sinks.
pub struct FanoutSink(pub Vec<std::sync::Arc<dyn MetricsSink>>);

impl MetricsSink for FanoutSink {
    fn observe(&self, metrics: &RequestMetrics, outcome: Outcome) {
        for sink in &self.0 {
            sink.observe(metrics, outcome);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    valid: u64,
    errors: u64,
    compensations: u64,
}

/// Process-lifetime call totals reported by the health endpoints.
pub struct HealthCounters {
    api: &'static str,
    started_at: DateTime<Utc>,
    started: Instant,
    counts: Mutex<Counts>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub api: &'static str,
    pub status: &'static str,
    pub msg: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime: String,
    pub uptime_seconds: u64,
    pub total_valid_calls: u64,
    pub total_calls_with_errors: u64,
    pub total_calls: u64,
    pub compensations: u64,
}

impl HealthCounters {
    pub fn new(api: &'static str) -> Self {
        Self {
            api,
            started_at: Utc::now(),
            started: Instant::now(),
            counts: Mutex::new(Counts::default()),
        }
    }

    pub fn record(&self, outcome: Outcome) {
        let mut counts = self.counts.lock();
        match outcome {
            Outcome::Valid => counts.valid += 1,
            Outcome::Error => counts.errors += 1,
        }
    }

    pub fn report(&self) -> HealthReport {
        let counts = *self.counts.lock();
        let uptime = self.started.elapsed();
        HealthReport {
            api: self.api,
            status: "ok",
            msg: "Currently healthy",
            started_at: self.started_at,
            uptime: format_uptime(uptime),
            uptime_seconds: uptime.as_secs(),
            total_valid_calls: counts.valid,
            total_calls_with_errors: counts.errors,
            total_calls: counts.valid + counts.errors,
            compensations: counts.compensations,
        }
    }
}

impl MetricsSink for HealthCounters {
    fn observe(&self, metrics: &RequestMetrics, outcome: Outcome) {
        let mut counts = self.counts.lock();
        match outcome {
            Outcome::Valid => counts.valid += 1,
            Outcome::Error => counts.errors += 1,
        }
        counts.compensations += u64::from(metrics.compensations);
    }
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_split_valid_and_error_calls() {
        let health = HealthCounters::new("Votes API");
        health.record(Outcome::Valid);
        health.record(Outcome::Valid);
        health.record(Outcome::Error);

        let mut metrics = RequestMetrics::start("cast");
        metrics.compensations = 2;
        health.observe(&metrics, Outcome::Error);

        let report = health.report();
        assert_eq!(report.api, "Votes API");
        assert_eq!(report.total_valid_calls, 2);
        assert_eq!(report.total_calls_with_errors, 2);
        assert_eq!(report.total_calls, 4);
        assert_eq!(report.compensations, 2);
    }

    #[test]
    fn uptime_is_human_readable() {
        assert_eq!(format_uptime(Duration::from_secs(5)), "5s");
        assert_eq!(format_uptime(Duration::from_secs(65)), "1m5s");
        assert_eq!(format_uptime(Duration::from_secs(3723)), "1h2m3s");
    }

    #[test]
    fn report_serializes_camel_case() {
        let json = serde_json::to_value(HealthCounters::new("Polls API").report()).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["totalCalls"], 0);
        assert!(json.get("totalCallsWithErrors").is_some());
    }
}
