use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{GapScope, GapSeverity};

/// Date range a records request should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// A stretch of time with no treatment records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub gap_id: String,
    pub scope: GapScope,
    pub provider_id: Option<String>,
    pub previous_event_id: String,
    pub next_event_id: String,
    /// Last covered date before the gap
    pub start_date: NaiveDate,
    /// First date after the gap
    pub end_date: NaiveDate,
    pub gap_days: i64,
    pub severity: GapSeverity,
    pub citations_before: Vec<String>,
    pub citations_after: Vec<String>,
    pub suggested_request: Option<RequestRange>,
}
