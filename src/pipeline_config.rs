//! Run configuration.
//!
//! Every knob that changes pipeline output lives here. The serialized form
//! is hashed into the run receipt, so two runs with equal inputs and equal
//! configuration are expected to produce identical graphs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How physical therapy pages become events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtMode {
    /// Bucket dated visits that sit within the aggregate window of each other.
    Aggregate,
    /// One event per dated visit. Only honored when every PT page carries a
    /// tier-1 date label.
    PerVisit,
}

/// What happens to events scoring below the export threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowConfidencePolicy {
    Exclude,
    IncludeWithFlag,
}

/// Severity band for gap detection. Gaps of at least `medium_days` are
/// reported; gaps of at least `high_days` are reported as high severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapBand {
    pub medium_days: i64,
    pub high_days: i64,
}

/// OCR worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    /// Tesseract language string (e.g., "eng", "eng+spa")
    pub language: String,
    pub workers: usize,
    pub per_page_timeout_secs: u64,
    /// Wall-clock budget shared by every OCR call in a run.
    pub total_budget_secs: u64,
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "eng".into(),
            workers: 4,
            per_page_timeout_secs: 30,
            total_budget_secs: 600,
            dpi: 300,
        }
    }
}

/// Pipeline configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_pages: usize,
    pub ocr: OcrConfig,
    pub pt_mode: PtMode,
    pub pt_aggregate_window_days: i64,
    pub provider_gaps: GapBand,
    pub global_gaps: GapBand,
    /// Score (0-100) below which an event is treated as low confidence.
    pub event_confidence_min_export: u8,
    pub low_confidence_event_behavior: LowConfidencePolicy,
    pub export_billing_events: bool,
    /// Undated events are appended after the dated chronology when set.
    pub export_undated_events: bool,
    pub contradiction_window_days: i64,
    /// Whole-run wall clock budget. Checked between stages.
    pub run_budget_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_pages: 1000,
            ocr: OcrConfig::default(),
            pt_mode: PtMode::Aggregate,
            pt_aggregate_window_days: 7,
            provider_gaps: GapBand {
                medium_days: 30,
                high_days: 60,
            },
            global_gaps: GapBand {
                medium_days: 45,
                high_days: 90,
            },
            event_confidence_min_export: 50,
            low_confidence_event_behavior: LowConfidencePolicy::Exclude,
            export_billing_events: false,
            export_undated_events: false,
            contradiction_window_days: 45,
            run_budget_secs: 1800,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading & validation
// ═══════════════════════════════════════════════════════════

impl RunConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid {
                field: "max_pages",
                reason: "must be at least 1".into(),
            });
        }
        if self.ocr.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "ocr.workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.event_confidence_min_export > 100 {
            return Err(ConfigError::Invalid {
                field: "event_confidence_min_export",
                reason: format!("{} is outside 0-100", self.event_confidence_min_export),
            });
        }
        if self.pt_aggregate_window_days < 0 {
            return Err(ConfigError::Invalid {
                field: "pt_aggregate_window_days",
                reason: "must not be negative".into(),
            });
        }
        for (field, band) in [
            ("provider_gaps", self.provider_gaps),
            ("global_gaps", self.global_gaps),
        ] {
            if band.medium_days < 1 || band.high_days < band.medium_days {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!(
                        "need 1 <= medium_days <= high_days, got {}/{}",
                        band.medium_days, band.high_days
                    ),
                });
            }
        }
        Ok(())
    }

    /// SHA-256 (hex) of the canonical JSON form of this config.
    pub fn config_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&canonical))
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_pages, 1000);
        assert_eq!(config.pt_mode, PtMode::Aggregate);
        assert_eq!(config.provider_gaps.medium_days, 30);
        assert_eq!(config.global_gaps.high_days, 90);
        assert!(!config.export_billing_events);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{"max_pages": 20, "pt_mode": "per_visit"}"#).unwrap();
        assert_eq!(config.max_pages, 20);
        assert_eq!(config.pt_mode, PtMode::PerVisit);
        assert_eq!(config.ocr.workers, 4);
        assert_eq!(config.event_confidence_min_export, 50);
    }

    #[test]
    fn inverted_gap_band_rejected() {
        let mut config = RunConfig::default();
        config.global_gaps = GapBand {
            medium_days: 90,
            high_days: 45,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "global_gaps", .. })
        ));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = RunConfig::default();
        config.ocr.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_hash_stable_and_sensitive() {
        let a = RunConfig::default();
        let b = RunConfig::default();
        assert_eq!(a.config_hash(), b.config_hash());
        assert_eq!(a.config_hash().len(), 64);

        let mut c = RunConfig::default();
        c.export_billing_events = true;
        assert_ne!(a.config_hash(), c.config_hash());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"event_confidence_min_export": 70}"#).unwrap();
        let config = RunConfig::from_json_file(&path).unwrap();
        assert_eq!(config.event_confidence_min_export, 70);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            RunConfig::from_json_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
