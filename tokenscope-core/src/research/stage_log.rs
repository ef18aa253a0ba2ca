//! Append-only stage log for a research run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of a logged stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    /// Completed with partial output or a fallback.
    Degraded,
    Failed,
    Skipped,
}

/// One entry of the stage log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    /// Model used, or `None` for non-LLM stages.
    pub model: Option<String>,
    pub status: StageStatus,
    pub metrics: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl StageRecord {
    pub fn new(name: impl Into<String>, status: StageStatus) -> Self {
        Self {
            name: name.into(),
            model: None,
            status,
            metrics: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }
}

/// Ordered log of stage records. Entries are never removed or rewritten.
#[derive(Debug, Clone, Default)]
pub struct StageLog {
    records: Vec<StageRecord>,
}

impl StageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: StageRecord) {
        tracing::debug!(
            stage = %record.name,
            status = ?record.status,
            model = record.model.as_deref().unwrap_or("-"),
            "Stage recorded"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stages that completed, including degraded ones.
    pub fn succeeded_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.status, StageStatus::Success | StageStatus::Degraded))
            .count()
    }

    /// Stages that ran at all.
    pub fn attempted_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status != StageStatus::Skipped)
            .count()
    }

    pub fn into_records(self) -> Vec<StageRecord> {
        self.records
    }
}
