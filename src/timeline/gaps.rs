use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use sha2::{Digest, Sha256};

use crate::models::{
    Event, EventType, Gap, GapScope, GapSeverity, GapSummary, MissingRecordRuleset, MissingRecords, RequestRange,
};
use crate::pipeline_config::{GapBand, RunConfig};

/// `gap-` followed by 16 hex chars of SHA-256 over scope, provider and dates.
pub fn gap_id(scope: GapScope, provider_id: Option<&str>, start: NaiveDate, end: NaiveDate) -> String {
    let seed = format!("{}|{}|{start}|{end}", scope.as_str(), provider_id.unwrap_or(""));
    let digest = format!("{:x}", Sha256::digest(seed.as_bytes()));
    format!("gap-{}", &digest[..16])
}

fn severity_for(days: i64, band: GapBand) -> Option<GapSeverity> {
    if days >= band.high_days {
        Some(GapSeverity::High)
    } else if days >= band.medium_days {
        Some(GapSeverity::Medium)
    } else {
        None
    }
}

/// Walk dated events in chronology order tracking how far coverage extends.
/// A range event covers through its end date.
fn scan(events: &[&Event], scope: GapScope, provider_id: Option<&str>, band: GapBand) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut covered: Option<(NaiveDate, &Event)> = None;

    for &next in events {
        let (Some(start), Some(end)) = (next.start_date(), next.end_date()) else {
            continue;
        };
        if let Some((until, previous)) = covered {
            let days = (start - until).num_days();
            if let Some(severity) = severity_for(days, band) {
                let from = until + Duration::days(1);
                let to = start - Duration::days(1);
                gaps.push(Gap {
                    gap_id: gap_id(scope, provider_id, until, start),
                    scope,
                    provider_id: provider_id.map(str::to_string),
                    previous_event_id: previous.event_id.clone(),
                    next_event_id: next.event_id.clone(),
                    start_date: until,
                    end_date: start,
                    gap_days: days,
                    severity,
                    citations_before: previous.citation_ids.clone(),
                    citations_after: next.citation_ids.clone(),
                    suggested_request: (from <= to).then_some(RequestRange { from, to }),
                });
            }
        }
        covered = match covered {
            Some((until, previous)) if until > end => Some((until, previous)),
            _ => Some((end, next)),
        };
    }
    gaps
}

/// Gaps between exported, dated, non-billing events. `chronology` must be
/// in export order.
pub fn detect_gaps(events: &[Event], chronology: &[String], config: &RunConfig) -> Vec<Gap> {
    let by_id: HashMap<&str, &Event> = events.iter().map(|e| (e.event_id.as_str(), e)).collect();
    let ordered: Vec<&Event> = chronology
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .filter(|e| e.date.is_some() && e.event_type != EventType::Billing)
        .collect();

    let mut per_provider: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
    for event in &ordered {
        if let Some(provider_id) = event.provider_id.as_deref() {
            per_provider.entry(provider_id).or_default().push(event);
        }
    }

    let mut gaps = Vec::new();
    for (provider_id, provider_events) in &per_provider {
        gaps.extend(scan(provider_events, GapScope::Provider, Some(*provider_id), config.provider_gaps));
    }
    gaps.extend(scan(&ordered, GapScope::Global, None, config.global_gaps));

    gaps.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then(a.end_date.cmp(&b.end_date))
            .then(a.scope.cmp(&b.scope))
            .then(a.provider_id.cmp(&b.provider_id))
    });

    tracing::info!(
        gaps = gaps.len(),
        high = gaps.iter().filter(|g| g.severity == GapSeverity::High).count(),
        "Detected record gaps"
    );
    gaps
}

pub fn missing_records(gaps: &[Gap], config: &RunConfig) -> MissingRecords {
    let count = |f: &dyn Fn(&Gap) -> bool| gaps.iter().filter(|g| f(g)).count();
    MissingRecords {
        ruleset: MissingRecordRuleset {
            provider: config.provider_gaps,
            global: config.global_gaps,
        },
        gap_ids: gaps.iter().map(|g| g.gap_id.clone()).collect(),
        summary: GapSummary {
            total: gaps.len(),
            provider_gaps: count(&|g| g.scope == GapScope::Provider),
            global_gaps: count(&|g| g.scope == GapScope::Global),
            high: count(&|g| g.severity == GapSeverity::High),
            medium: count(&|g| g.severity == GapSeverity::Medium),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDate, EvidenceTier};
    use crate::timeline::build_record_requests;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn event(id: &str, provider: &str, start: NaiveDate, end: NaiveDate) -> Event {
        Event {
            event_id: id.into(),
            event_type: EventType::OfficeVisit,
            date: Some(EventDate::range(start, end, EvidenceTier::Tier1, "service_date")),
            provider_id: Some(provider.into()),
            provider_tier: Some(EvidenceTier::Tier1),
            facts: vec![],
            citation_ids: vec![format!("cit-{id}")],
            source_pages: vec![1],
            confidence: 90,
            flags: vec![],
            strong_cue: true,
            anchored: true,
            imaging: None,
            billing: None,
            extraction_order: 0,
        }
    }

    fn ids(events: &[Event]) -> Vec<String> {
        events.iter().map(|e| e.event_id.clone()).collect()
    }

    #[test]
    fn short_interval_is_not_a_gap() {
        let events = vec![
            event("a", "prv-0001", d(2024, 1, 1), d(2024, 1, 1)),
            event("b", "prv-0001", d(2024, 1, 30), d(2024, 1, 30)),
        ];
        assert!(detect_gaps(&events, &ids(&events), &RunConfig::default()).is_empty());
    }

    #[test]
    fn steady_care_with_one_provider_needs_no_requests() {
        let visits = [
            d(2024, 1, 1),
            d(2024, 1, 30),
            d(2024, 2, 28),
            d(2024, 3, 24),
            d(2024, 4, 22),
            d(2024, 5, 21),
        ];
        let events: Vec<Event> = visits
            .iter()
            .enumerate()
            .map(|(i, &day)| event(&format!("v{i}"), "prv-0001", day, day))
            .collect();
        let config = RunConfig::default();

        let gaps = detect_gaps(&events, &ids(&events), &config);
        assert!(gaps.is_empty(), "{gaps:?}");
        assert_eq!(missing_records(&gaps, &config).summary.total, 0);

        let clinic = crate::models::Provider {
            provider_id: "prv-0001".into(),
            display_name: "Family Clinic".into(),
            normalized_name: "family clinic".into(),
            kind: crate::models::ProviderKind::Facility,
            care_setting: crate::models::CareSetting::Unknown,
            first_seen: visits.first().copied(),
            last_seen: visits.last().copied(),
            event_count: visits.len() as u32,
            evidence: vec![],
        };
        assert!(build_record_requests(&gaps, &[clinic]).is_empty());
    }

    #[test]
    fn provider_gap_of_56_days_is_medium() {
        let events = vec![
            event("er", "prv-0001", d(2013, 9, 17), d(2013, 9, 17)),
            event("fu", "prv-0001", d(2013, 11, 12), d(2013, 11, 12)),
        ];
        let gaps = detect_gaps(&events, &ids(&events), &RunConfig::default());
        let provider: Vec<_> = gaps.iter().filter(|g| g.scope == GapScope::Provider).collect();
        assert_eq!(provider.len(), 1);

        let gap = provider[0];
        assert_eq!(gap.gap_days, 56);
        assert_eq!(gap.severity, GapSeverity::Medium);
        assert_eq!(gap.previous_event_id, "er");
        assert_eq!(gap.next_event_id, "fu");
        assert_eq!(gap.citations_before, vec!["cit-er"]);
        assert_eq!(gap.citations_after, vec!["cit-fu"]);
        assert_eq!(
            gap.suggested_request,
            Some(RequestRange {
                from: d(2013, 9, 18),
                to: d(2013, 11, 11)
            })
        );
        assert!(gap.gap_id.starts_with("gap-"));
        assert_eq!(gap.gap_id.len(), 20);

        // Global band is 45/90, so the same stretch is also a medium global gap
        let global: Vec<_> = gaps.iter().filter(|g| g.scope == GapScope::Global).collect();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].severity, GapSeverity::Medium);
        assert_ne!(global[0].gap_id, gap.gap_id);
    }

    #[test]
    fn range_end_extends_coverage() {
        let events = vec![
            event("pt", "prv-0001", d(2024, 1, 1), d(2024, 3, 1)),
            event("next", "prv-0001", d(2024, 3, 20), d(2024, 3, 20)),
        ];
        assert!(detect_gaps(&events, &ids(&events), &RunConfig::default()).is_empty());
    }

    #[test]
    fn high_severity_and_summary() {
        let events = vec![
            event("a", "prv-0001", d(2024, 1, 1), d(2024, 1, 1)),
            event("b", "prv-0002", d(2024, 2, 15), d(2024, 2, 15)),
            event("c", "prv-0001", d(2024, 6, 1), d(2024, 6, 1)),
        ];
        let config = RunConfig::default();
        let gaps = detect_gaps(&events, &ids(&events), &config);
        let summary = missing_records(&gaps, &config).summary;

        // provider 1: Jan 1 -> Jun 1 (152 days, high)
        // global: Jan 1 -> Feb 15 (45, medium), Feb 15 -> Jun 1 (107, high)
        assert_eq!(summary.total, 3);
        assert_eq!(summary.provider_gaps, 1);
        assert_eq!(summary.global_gaps, 2);
        assert_eq!(summary.high, 2);
        assert_eq!(summary.medium, 1);
    }

    #[test]
    fn gap_ids_are_stable() {
        let a = gap_id(GapScope::Provider, Some("prv-0001"), d(2024, 1, 1), d(2024, 3, 1));
        let b = gap_id(GapScope::Provider, Some("prv-0001"), d(2024, 1, 1), d(2024, 3, 1));
        assert_eq!(a, b);
        assert_ne!(a, gap_id(GapScope::Global, None, d(2024, 1, 1), d(2024, 3, 1)));
    }
}
