use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{EventFlag, EventType, EvidenceTier, FactKind};

/// Maximum facts an event may carry after merging.
pub const MAX_EVENT_FACTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateValue {
    Single { date: NaiveDate },
    Range { start: NaiveDate, end: NaiveDate },
}

/// A resolved event date with its evidence tier and the label it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDate {
    pub value: DateValue,
    pub tier: EvidenceTier,
    pub label: String,
}

impl EventDate {
    pub fn single(date: NaiveDate, tier: EvidenceTier, label: &str) -> Self {
        Self {
            value: DateValue::Single { date },
            tier,
            label: label.to_string(),
        }
    }

    /// A range collapses to a single date when both ends are equal.
    pub fn range(start: NaiveDate, end: NaiveDate, tier: EvidenceTier, label: &str) -> Self {
        let value = if start == end {
            DateValue::Single { date: start }
        } else {
            DateValue::Range {
                start: start.min(end),
                end: start.max(end),
            }
        };
        Self {
            value,
            tier,
            label: label.to_string(),
        }
    }

    pub fn start(&self) -> NaiveDate {
        match self.value {
            DateValue::Single { date } => date,
            DateValue::Range { start, .. } => start,
        }
    }

    pub fn end(&self) -> NaiveDate {
        match self.value {
            DateValue::Single { date } => date,
            DateValue::Range { end, .. } => end,
        }
    }

    /// Display form used in exports: `2024-01-02` or `2024-01-02..2024-01-09`.
    pub fn display(&self) -> String {
        match self.value {
            DateValue::Single { date } => date.to_string(),
            DateValue::Range { start, end } => format!("{start}..{end}"),
        }
    }
}

/// A single cited statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub text: String,
    pub kind: FactKind,
    /// Relative weight (0-100) used when trimming facts to the cap.
    pub confidence: u8,
    pub citation_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingDetails {
    pub modality: String,
    pub body_part: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingLineItem {
    pub code: Option<String>,
    pub description: String,
    pub amount_cents: i64,
    pub citation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingDetails {
    pub statement_date: Option<NaiveDate>,
    pub service_start: Option<NaiveDate>,
    pub service_end: Option<NaiveDate>,
    pub total_cents: Option<i64>,
    pub line_items: Vec<BillingLineItem>,
}

/// A dated (or explicitly dateless) medical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: EventType,
    pub date: Option<EventDate>,
    pub provider_id: Option<String>,
    pub provider_tier: Option<EvidenceTier>,
    pub facts: Vec<Fact>,
    pub citation_ids: Vec<String>,
    pub source_pages: Vec<u32>,
    pub confidence: u8,
    pub flags: Vec<EventFlag>,
    /// Encounter-type cue matched in the text (ER, discharge, modality, ...)
    pub strong_cue: bool,
    /// Content anchor present (chief complaint, assessment, plan, impression)
    pub anchored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imaging: Option<ImagingDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingDetails>,
    /// Position in extraction order, used as the stable chronology tie-break.
    pub extraction_order: u32,
}

impl Event {
    pub fn has_flag(&self, flag: EventFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn flag(&mut self, flag: EventFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    pub fn clear_flag(&mut self, flag: EventFlag) {
        self.flags.retain(|f| *f != flag);
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.date.as_ref().map(EventDate::start)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.date.as_ref().map(EventDate::end)
    }
}
