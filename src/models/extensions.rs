//! Derived blocks attached to the evidence graph.
//!
//! Everything here is computed from the core graph collections and never
//! feeds back into them. Unknown keys from newer writers survive a
//! round-trip through `other`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{AmountType, CareSetting, EventType, PageType, ProviderKind, Sex, SpecialsFlag};
use crate::pipeline_config::GapBand;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingRecordRuleset {
    pub provider: GapBand,
    pub global: GapBand,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapSummary {
    pub total: usize,
    pub provider_gaps: usize,
    pub global_gaps: usize,
    pub high: usize,
    pub medium: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingRecords {
    pub ruleset: MissingRecordRuleset,
    pub gap_ids: Vec<String>,
    pub summary: GapSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    Urgent,
    Standard,
}

/// Suggested records request for one provider and date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRequest {
    pub provider_id: String,
    pub provider_name: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub priority: RequestPriority,
    pub gap_ids: Vec<String>,
    pub citation_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionCategory {
    PainSeverity,
    Laterality,
    Mechanism,
    FunctionalStatus,
}

impl ContradictionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PainSeverity => "pain_severity",
            Self::Laterality => "laterality",
            Self::Mechanism => "mechanism",
            Self::FunctionalStatus => "functional_status",
        }
    }
}

/// One side of a contradiction pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionSide {
    pub event_id: String,
    pub date: Option<NaiveDate>,
    pub value: String,
    pub statement: String,
    pub citation_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub category: ContradictionCategory,
    pub a: ContradictionSide,
    pub b: ContradictionSide,
    pub strength_delta: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativePoint {
    pub event_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub text: String,
    pub basis: String,
    pub citation_ids: Vec<String>,
}

/// Two readings of the same record, built only from cited facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeDuality {
    pub plaintiff: Vec<NarrativePoint>,
    pub defense: Vec<NarrativePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub provider_id: String,
    pub display_name: String,
    pub kind: ProviderKind,
    pub care_setting: CareSetting,
    pub first_seen: Option<NaiveDate>,
    pub last_seen: Option<NaiveDate>,
    pub event_count: u32,
    pub citation_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    NoAnchor,
    NoModality,
    NoTrigger,
    NoExamDate,
    NoBillingDate,
    NoAmounts,
}

/// A page range an extractor looked at and declined to turn into an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEvent {
    pub page_numbers: Vec<u32>,
    pub page_type: PageType,
    pub intended_type: Option<EventType>,
    pub reason: SkipReason,
}

/// One amount on a billing page. Lines carrying several amounts yield one
/// entry per amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingLine {
    pub line_id: String,
    /// `None` when the page has no resolved provider
    pub provider_id: Option<String>,
    pub service_date: Option<NaiveDate>,
    pub description: String,
    pub code: Option<String>,
    pub amount_cents: i64,
    pub amount_type: AmountType,
    pub page_number: u32,
    pub citation_ids: Vec<String>,
    pub confidence: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingLedger {
    pub billing_pages: usize,
    pub lines: Vec<BillingLine>,
}

/// Amount buckets. A bucket is `None` when no line of that kind exists in
/// the ledger, which is different from a zero sum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialsTotals {
    pub charges_cents: i64,
    pub payments_cents: Option<i64>,
    pub adjustments_cents: Option<i64>,
    pub balance_cents: Option<i64>,
    /// Sum of the statements' own total lines, kept apart from charges
    pub stated_totals_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpecials {
    pub provider_id: Option<String>,
    pub display_name: String,
    pub totals: SpecialsTotals,
    pub line_count: usize,
    pub confidence: u8,
    pub flags: Vec<SpecialsFlag>,
    pub citation_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialsCoverage {
    pub earliest_service_date: Option<NaiveDate>,
    pub latest_service_date: Option<NaiveDate>,
    pub billing_pages: usize,
}

/// Medical specials: billed totals over the deduplicated ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialsSummary {
    pub totals: SpecialsTotals,
    pub by_provider: Vec<ProviderSpecials>,
    pub coverage: SpecialsCoverage,
    pub lines_raw: usize,
    pub lines_deduped: usize,
    pub confidence: u8,
    pub flags: Vec<SpecialsFlag>,
}

/// Patient identity as stated in the records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientDemographics {
    pub name: Option<String>,
    pub mrn: Option<String>,
    pub sex: Option<Sex>,
    /// Share of sex mentions agreeing with `sex` (0-100)
    pub sex_confidence: u8,
    pub age: Option<u32>,
    pub dob: Option<NaiveDate>,
    pub citation_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_records: Option<MissingRecords>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_requests: Option<Vec<RecordRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contradiction_matrix: Option<Vec<Contradiction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_duality: Option<NarrativeDuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_directory: Option<Vec<DirectoryEntry>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_events: Vec<SkippedEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_lines: Option<BillingLedger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specials_summary: Option<SpecialsSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientDemographics>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}
