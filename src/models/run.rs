use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RunStatus;
use super::warning::Warning;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub documents: usize,
    pub pages_total: usize,
    pub pages_ocr: usize,
    pub events_total: usize,
    pub events_exported: usize,
    pub providers_total: usize,
    pub pt_events: usize,
    pub billing_events: usize,
    pub gaps_total: usize,
    pub processing_ms: u64,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub pipeline_version: String,
    pub extractor: String,
    pub ocr_engine: Option<String>,
    pub inputs_hash: String,
    pub config_hash: String,
    pub outputs_hash: Option<String>,
}

/// Lifecycle record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub matter_id: String,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics: RunMetrics,
    pub warnings: Vec<Warning>,
    pub provenance: Provenance,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(matter_id: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            matter_id: matter_id.to_string(),
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            metrics: RunMetrics::default(),
            warnings: Vec::new(),
            provenance: Provenance::default(),
            error: None,
        }
    }

    /// pending -> running. Returns false if the run already left `pending`.
    pub fn start(&mut self) -> bool {
        if self.status != RunStatus::Pending {
            return false;
        }
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// running -> success | partial. A degrading warning forces `partial`.
    pub fn finish(&mut self) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        let degraded = self.warnings.iter().any(|w| w.code.degrades_run());
        self.status = if degraded {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        self.finished_at = Some(Utc::now());
        true
    }

    /// Any non-terminal state -> failed.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = RunStatus::Failed;
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
        true
    }
}
