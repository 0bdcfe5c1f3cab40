//! Tiered date resolution.
//!
//! Every date on a page is found, then labeled by the closest label in the
//! 80 characters before it (never reaching back past the previous date).
//! Labels decide the evidence tier: explicit encounter labels are tier 1,
//! generic or header dates are tier 2, and production metadata (print/fax
//! stamps), birth dates and injury dates are never event dates.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::models::{EvidenceTier, PageType};

/// How far before a date a label may sit, in bytes.
const LABEL_WINDOW: usize = 80;

/// Unlabeled dates in this leading share of the page count as header dates.
const HEADER_FRACTION: f32 = 0.2;

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DateLabel {
    ServiceDate,
    VisitDate,
    EncounterDate,
    ExamDate,
    StudyDate,
    AdmitDate,
    DischargeDate,
    ProcedureDate,
    StatementDate,
    ReportDate,
    SeenOn,
    Generic,
    Header,
    Production,
    Birth,
    Injury,
}

impl DateLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceDate => "service_date",
            Self::VisitDate => "visit_date",
            Self::EncounterDate => "encounter_date",
            Self::ExamDate => "exam_date",
            Self::StudyDate => "study_date",
            Self::AdmitDate => "admit_date",
            Self::DischargeDate => "discharge_date",
            Self::ProcedureDate => "procedure_date",
            Self::StatementDate => "statement_date",
            Self::ReportDate => "report_date",
            Self::SeenOn => "seen_on",
            Self::Generic => "date",
            Self::Header => "header",
            Self::Production => "production",
            Self::Birth => "birth",
            Self::Injury => "injury",
        }
    }

    fn base_tier(&self) -> Option<EvidenceTier> {
        match self {
            Self::ServiceDate
            | Self::VisitDate
            | Self::EncounterDate
            | Self::ExamDate
            | Self::StudyDate
            | Self::AdmitDate
            | Self::DischargeDate
            | Self::ProcedureDate
            | Self::StatementDate => Some(EvidenceTier::Tier1),
            Self::ReportDate | Self::SeenOn | Self::Generic | Self::Header => {
                Some(EvidenceTier::Tier2)
            }
            Self::Production | Self::Birth | Self::Injury => None,
        }
    }
}

/// A date found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMention {
    pub date: NaiveDate,
    pub label: DateLabel,
    /// `None` when the date must not be used as an event date.
    pub tier: Option<EvidenceTier>,
    /// Byte span of the date in the page text
    pub offset: usize,
    pub end: usize,
    /// Full text line containing the date, for citation
    pub line: String,
}

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(?P<iy>\d{4})-(?P<im>\d{1,2})-(?P<id>\d{1,2})\b
        |
        \b(?P<nm>\d{1,2})[/-](?P<nd>\d{1,2})[/-](?P<ny>\d{4}|\d{2})\b
        |
        \b(?P<mn>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?
            |aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)
          \.?\s+(?P<md>\d{1,2})(?:st|nd|rd|th)?,?\s+(?P<my>\d{4})\b
        ",
    )
    .expect("date pattern is valid")
});

static LABELS: LazyLock<Vec<(Regex, DateLabel)>> = LazyLock::new(|| {
    let table: &[(&str, DateLabel)] = &[
        (r"\b(printed|generated|faxed|created|run)\s+(on|date)\b|\b(print|fax)\s+date\b|\bdate\s+printed\b", DateLabel::Production),
        (r"\bdate\s+of\s+birth\b|\bbirth\s*date\b|\bd\.?o\.?b\.?(?:\s|:|$)", DateLabel::Birth),
        (r"\bdate\s+of\s+(injury|accident|loss)\b|\b(injury|accident)\s+date\b|\bd\.?o\.?i\.?(?:\s|:)", DateLabel::Injury),
        (r"\bdates?\s+of\s+service\b|\bdate\(s\)\s+of\s+service\b|\bservice\s+dates?\b|\bd\.?o\.?s\.?(?:\s|:)", DateLabel::ServiceDate),
        (r"\bvisit\s+date\b|\bdate\s+of\s+visit\b", DateLabel::VisitDate),
        (r"\bencounter\s+date\b|\bdate\s+of\s+encounter\b", DateLabel::EncounterDate),
        (r"\bexam(ination)?\s+date\b|\bdate\s+of\s+exam(ination)?\b", DateLabel::ExamDate),
        (r"\bstudy\s+date\b|\bdate\s+of\s+study\b", DateLabel::StudyDate),
        (r"\badmi(t|ssion)\s+date\b|\bdate\s+of\s+admission\b|\badmitted(\s+on)?\b", DateLabel::AdmitDate),
        (r"\bdischarge\s+date\b|\bdate\s+of\s+discharge\b|\bdischarged(\s+on)?\b", DateLabel::DischargeDate),
        (r"\b(procedure|surgery)\s+date\b|\bdate\s+of\s+(procedure|surgery)\b", DateLabel::ProcedureDate),
        (r"\bstatement\s+date\b|\bbilling\s+date\b", DateLabel::StatementDate),
        (r"\breport\s+date\b|\bdictated(\s+on)?\b|\btranscribed(\s+on)?\b|\bsigned(\s+on)?\b", DateLabel::ReportDate),
        (r"\bseen\s+on\b", DateLabel::SeenOn),
        (r"\bdate\b", DateLabel::Generic),
    ];
    table
        .iter()
        .map(|(p, label)| (Regex::new(&format!("(?i){p}")).expect("date label pattern is valid"), *label))
        .collect()
});

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(-|to|through|thru)\s*$").expect("range pattern is valid")
});

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let m = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn build_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn date_from_captures(caps: &regex::Captures<'_>) -> Option<NaiveDate> {
    if let (Some(y), Some(m), Some(d)) = (caps.name("iy"), caps.name("im"), caps.name("id")) {
        return build_date(y.as_str().parse().ok()?, m.as_str().parse().ok()?, d.as_str().parse().ok()?);
    }
    if let (Some(m), Some(d), Some(y)) = (caps.name("nm"), caps.name("nd"), caps.name("ny")) {
        let mut year: i32 = y.as_str().parse().ok()?;
        if y.as_str().len() == 2 {
            year += if year < 50 { 2000 } else { 1900 };
        }
        return build_date(year, m.as_str().parse().ok()?, d.as_str().parse().ok()?);
    }
    if let (Some(mn), Some(d), Some(y)) = (caps.name("mn"), caps.name("md"), caps.name("my")) {
        return build_date(y.as_str().parse().ok()?, month_number(mn.as_str())?, d.as_str().parse().ok()?);
    }
    None
}

/// Parse a single date token in any supported format.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let caps = DATE_RE.captures(text.trim())?;
    date_from_captures(&caps)
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn line_at(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = text[offset..].find('\n').map_or(text.len(), |i| offset + i);
    text[start..end].trim()
}

/// Closest label in the window before a date. The latest-ending match wins;
/// among labels ending at the same place the longest (most specific) wins.
fn label_before(window: &str) -> Option<DateLabel> {
    let mut best: Option<(usize, usize, DateLabel)> = None;
    for (re, label) in LABELS.iter() {
        for m in re.find_iter(window) {
            let candidate = (m.end(), m.end() - m.start(), *label);
            let better = match best {
                None => true,
                Some((end, len, _)) => candidate.0 > end || (candidate.0 == end && candidate.1 > len),
            };
            if better {
                best = Some(candidate);
            }
        }
    }
    best.map(|(_, _, label)| label)
}

/// Find and label every date on a page.
///
/// Production stamps count as tier-2 dates on administrative pages only.
pub fn find_dates(text: &str, page_type: PageType) -> Vec<DateMention> {
    let header_limit = (text.len() as f32 * HEADER_FRACTION) as usize;
    let mut mentions = Vec::new();
    let mut prev_end = 0usize;

    for caps in DATE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(date) = date_from_captures(&caps) else {
            prev_end = whole.end();
            continue;
        };

        let window_start = floor_char_boundary(text, whole.start().saturating_sub(LABEL_WINDOW).max(prev_end));
        let window = &text[window_start..whole.start()];
        let between_is_range =
            RANGE_RE.is_match(window) && mentions.last().is_some_and(|m: &DateMention| m.end == prev_end);

        let label = if between_is_range {
            // Second half of "X - Y" shares the first half's label
            mentions.last().map_or(DateLabel::Generic, |m| m.label)
        } else {
            match label_before(window) {
                Some(label) => label,
                None if whole.start() <= header_limit => DateLabel::Header,
                None => {
                    prev_end = whole.end();
                    continue;
                }
            }
        };

        let tier = match label {
            DateLabel::Production if page_type == PageType::Administrative => Some(EvidenceTier::Tier2),
            other => other.base_tier(),
        };

        mentions.push(DateMention {
            date,
            label,
            tier,
            offset: whole.start(),
            end: whole.end(),
            line: line_at(text, whole.start()).to_string(),
        });
        prev_end = whole.end();
    }

    mentions
}

/// A service-date range written as `X - Y`, `X to Y` or `X through Y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeMention {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub line: String,
}

/// First service range on a page (a tier-1 mention immediately followed by
/// a range continuation).
pub fn find_service_range(text: &str, mentions: &[DateMention]) -> Option<DateRangeMention> {
    mentions.windows(2).find_map(|pair| {
        let (a, b) = (&pair[0], &pair[1]);
        if a.label != DateLabel::ServiceDate || b.label != DateLabel::ServiceDate {
            return None;
        }
        let between = text.get(a.end..b.offset)?;
        if RANGE_RE.is_match(between) {
            Some(DateRangeMention {
                start: a.date.min(b.date),
                end: a.date.max(b.date),
                line: a.line.clone(),
            })
        } else {
            None
        }
    })
}

/// Date chosen for an event plus the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub tier: EvidenceTier,
    pub label: DateLabel,
    pub page_number: u32,
    pub line: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateResolution {
    pub resolved: Option<ResolvedDate>,
    /// More than one distinct tier-1 date competed for the chosen role.
    pub conflict: bool,
}

/// Resolve an event date from mentions across the event's pages.
///
/// `preference` lists label groups in priority order. The first group with
/// any tier-1 mention decides; if none has one, the first tier-2 mention
/// (generic label, report date or header date) is used.
pub fn resolve_date(mentions: &[(u32, DateMention)], preference: &[&[DateLabel]]) -> DateResolution {
    for group in preference {
        let hits: Vec<&(u32, DateMention)> = mentions
            .iter()
            .filter(|(_, m)| m.tier == Some(EvidenceTier::Tier1) && group.contains(&m.label))
            .collect();
        if let Some((page, first)) = hits.first() {
            let distinct: BTreeSet<NaiveDate> = hits.iter().map(|(_, m)| m.date).collect();
            return DateResolution {
                resolved: Some(ResolvedDate {
                    date: first.date,
                    tier: EvidenceTier::Tier1,
                    label: first.label,
                    page_number: *page,
                    line: first.line.clone(),
                }),
                conflict: distinct.len() > 1,
            };
        }
    }

    let tier2 = mentions.iter().find(|(_, m)| m.tier == Some(EvidenceTier::Tier2));
    if let Some((page, m)) = tier2 {
        return DateResolution {
            resolved: Some(ResolvedDate {
                date: m.date,
                tier: EvidenceTier::Tier2,
                label: m.label,
                page_number: *page,
                line: m.line.clone(),
            }),
            conflict: false,
        };
    }

    DateResolution::default()
}

/// First tier-1 date on a page among the given labels. Used to decide where
/// one encounter ends and the next begins.
pub fn page_anchor_date(mentions: &[DateMention], labels: &[DateLabel]) -> Option<NaiveDate> {
    mentions
        .iter()
        .find(|m| m.tier == Some(EvidenceTier::Tier1) && labels.contains(&m.label))
        .map(|m| m.date)
}

/// Whole days from `a` to `b`.
pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (b - a).num_days()
}

/// Plausibility guard for dates used in date arithmetic downstream.
pub fn is_plausible(date: NaiveDate) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_supported_formats() {
        assert_eq!(parse_date("09/17/2013"), Some(d(2013, 9, 17)));
        assert_eq!(parse_date("9-7-2013"), Some(d(2013, 9, 7)));
        assert_eq!(parse_date("2013-09-17"), Some(d(2013, 9, 17)));
        assert_eq!(parse_date("September 17, 2013"), Some(d(2013, 9, 17)));
        assert_eq!(parse_date("Sept. 17 2013"), Some(d(2013, 9, 17)));
        assert_eq!(parse_date("Nov 3rd, 2013"), Some(d(2013, 11, 3)));
        assert_eq!(parse_date("01/02/24"), Some(d(2024, 1, 2)));
        assert_eq!(parse_date("01/02/87"), Some(d(1987, 1, 2)));
    }

    #[test]
    fn rejects_impossible_dates() {
        assert_eq!(parse_date("02/30/2020"), None);
        assert_eq!(parse_date("13/01/2020"), None);
        assert_eq!(parse_date("01/01/1850"), None);
    }

    #[test]
    fn labels_assign_tiers() {
        let text = "Patient: Jane Doe\nDOB: 04/12/1980\nDate of Service: 01/15/2024\nPrinted on: 02/01/2024";
        let mentions = find_dates(text, PageType::ClinicalNote);
        assert_eq!(mentions.len(), 3);
        assert_eq!(mentions[0].label, DateLabel::Birth);
        assert_eq!(mentions[0].tier, None);
        assert_eq!(mentions[1].label, DateLabel::ServiceDate);
        assert_eq!(mentions[1].tier, Some(EvidenceTier::Tier1));
        assert_eq!(mentions[1].line, "Date of Service: 01/15/2024");
        assert_eq!(mentions[2].label, DateLabel::Production);
        assert_eq!(mentions[2].tier, None);
    }

    #[test]
    fn production_dates_allowed_on_administrative_pages() {
        let mentions = find_dates("Records request\nFaxed on: 03/03/2024", PageType::Administrative);
        assert_eq!(mentions[0].tier, Some(EvidenceTier::Tier2));
    }

    #[test]
    fn injury_date_never_event_date() {
        let text = "Date of Injury: 12/01/2023\nVisit Date: 12/05/2023";
        let mentions = find_dates(text, PageType::ClinicalNote);
        let res = resolve_date(
            &mentions.into_iter().map(|m| (1, m)).collect::<Vec<_>>(),
            &[&[DateLabel::ServiceDate, DateLabel::VisitDate]],
        );
        assert_eq!(res.resolved.unwrap().date, d(2023, 12, 5));
    }

    #[test]
    fn header_date_is_tier2_body_date_ignored() {
        let body = "x".repeat(400);
        let text = format!("03/04/2024\n{body}\nfollow up 05/06/2024");
        let mentions = find_dates(&text, PageType::ClinicalNote);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].label, DateLabel::Header);
        assert_eq!(mentions[0].tier, Some(EvidenceTier::Tier2));
    }

    #[test]
    fn label_does_not_reach_past_previous_date() {
        let text = "Admit Date: 01/01/2024 Discharge Date: 01/05/2024";
        let mentions = find_dates(text, PageType::ClinicalNote);
        assert_eq!(mentions[0].label, DateLabel::AdmitDate);
        assert_eq!(mentions[1].label, DateLabel::DischargeDate);
    }

    #[test]
    fn conflict_when_tier1_dates_disagree() {
        let text = "Date of Service: 01/15/2024\nService Date: 01/16/2024";
        let mentions: Vec<_> = find_dates(text, PageType::ClinicalNote).into_iter().map(|m| (1, m)).collect();
        let res = resolve_date(&mentions, &[&[DateLabel::ServiceDate]]);
        assert!(res.conflict);
        assert_eq!(res.resolved.unwrap().date, d(2024, 1, 15));
    }

    #[test]
    fn repeated_same_date_is_not_conflict() {
        let text = "DOS: 01/15/2024\nDate of Service: 01/15/2024";
        let mentions: Vec<_> = find_dates(text, PageType::ClinicalNote).into_iter().map(|m| (1, m)).collect();
        let res = resolve_date(&mentions, &[&[DateLabel::ServiceDate]]);
        assert!(!res.conflict);
    }

    #[test]
    fn preference_order_wins_over_text_order() {
        let text = "Report Date: 02/02/2024\nExam Date: 01/30/2024";
        let mentions: Vec<_> = find_dates(text, PageType::ImagingReport).into_iter().map(|m| (7, m)).collect();
        let res = resolve_date(&mentions, &[&[DateLabel::ExamDate, DateLabel::StudyDate]]);
        let resolved = res.resolved.unwrap();
        assert_eq!(resolved.date, d(2024, 1, 30));
        assert_eq!(resolved.tier, EvidenceTier::Tier1);
        assert_eq!(resolved.page_number, 7);
    }

    #[test]
    fn falls_back_to_tier2() {
        let mentions: Vec<_> = find_dates("Report Date: 02/02/2024 and more text", PageType::ImagingReport)
            .into_iter()
            .map(|m| (1, m))
            .collect();
        let res = resolve_date(&mentions, &[&[DateLabel::ExamDate]]);
        assert_eq!(res.resolved.unwrap().tier, EvidenceTier::Tier2);
    }

    #[test]
    fn nothing_resolvable_is_none() {
        let mentions: Vec<_> = find_dates("DOB: 01/01/1970", PageType::ClinicalNote)
            .into_iter()
            .map(|m| (1, m))
            .collect();
        assert_eq!(resolve_date(&mentions, &[&[DateLabel::ServiceDate]]), DateResolution::default());
    }

    #[test]
    fn service_range_detected() {
        let text = "Dates of Service: 03/01/2024 - 03/09/2024\nTotal Charges: $900.00";
        let mentions = find_dates(text, PageType::Billing);
        let range = find_service_range(text, &mentions).unwrap();
        assert_eq!((range.start, range.end), (d(2024, 3, 1), d(2024, 3, 9)));
    }

    #[test]
    fn day_arithmetic() {
        assert_eq!(days_between(d(2013, 9, 17), d(2013, 11, 12)), 56);
    }
}
