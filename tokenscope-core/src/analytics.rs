//! Per-run analytics records.
//!
//! The pipeline emits one record per completed run. Sinks must not block
//! or fail; delivery is fire-and-forget.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Summary of one completed research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    /// The project name that was researched.
    pub query: String,
    pub results_count: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Receives analytics records.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, record: AnalyticsRecord);
}

/// Writes each record as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn record(&self, record: AnalyticsRecord) {
        info!(
            target: "tokenscope::analytics",
            query = %record.query,
            results_count = record.results_count,
            duration_ms = record.duration.as_millis() as u64,
            "Research run completed"
        );
    }
}

/// Keeps records in memory; used by tests and embedders that poll.
#[derive(Debug, Default)]
pub struct MemoryAnalytics {
    records: Mutex<Vec<AnalyticsRecord>>,
}

impl MemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AnalyticsRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AnalyticsSink for MemoryAnalytics {
    fn record(&self, record: AnalyticsRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}
