use crate::models::{Event, EventType};
use crate::pipeline::confidence::passes_policy;
use crate::pipeline_config::RunConfig;

/// Whether an event makes it into the exported chronology.
pub fn is_exportable(event: &Event, config: &RunConfig) -> bool {
    if !passes_policy(event, config) {
        return false;
    }
    if event.event_type == EventType::Billing && !config.export_billing_events {
        return false;
    }
    event.date.is_some() || config.export_undated_events
}

/// Ordered ids of exported events. Dated events ascend by start date with
/// extraction order breaking ties; undated events (when exported) follow in
/// extraction order.
pub fn assemble_chronology(events: &[Event], config: &RunConfig) -> Vec<String> {
    let mut dated: Vec<&Event> = Vec::new();
    let mut undated: Vec<&Event> = Vec::new();
    for event in events.iter().filter(|e| is_exportable(e, config)) {
        if event.date.is_some() {
            dated.push(event);
        } else {
            undated.push(event);
        }
    }

    dated.sort_by_key(|e| (e.start_date(), e.extraction_order));
    undated.sort_by_key(|e| e.extraction_order);

    let chronology: Vec<String> = dated
        .into_iter()
        .chain(undated)
        .map(|e| e.event_id.clone())
        .collect();

    tracing::info!(
        events = events.len(),
        exported = chronology.len(),
        "Assembled chronology"
    );
    chronology
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDate, EventFlag, EvidenceTier};
    use crate::pipeline_config::LowConfidencePolicy;
    use chrono::NaiveDate;

    fn event(id: &str, order: u32, date: Option<(i32, u32, u32)>, event_type: EventType) -> Event {
        Event {
            event_id: id.into(),
            event_type,
            date: date.map(|(y, m, d)| {
                EventDate::single(NaiveDate::from_ymd_opt(y, m, d).unwrap(), EvidenceTier::Tier1, "service_date")
            }),
            provider_id: Some("prv-0001".into()),
            provider_tier: Some(EvidenceTier::Tier1),
            facts: vec![],
            citation_ids: vec![format!("cit-{id}")],
            source_pages: vec![order],
            confidence: 90,
            flags: vec![],
            strong_cue: true,
            anchored: true,
            imaging: None,
            billing: None,
            extraction_order: order,
        }
    }

    #[test]
    fn sorted_by_date_then_extraction_order() {
        let events = vec![
            event("c", 3, Some((2024, 2, 1)), EventType::OfficeVisit),
            event("b", 2, Some((2024, 1, 5)), EventType::OfficeVisit),
            event("a", 1, Some((2024, 1, 5)), EventType::ErVisit),
        ];
        assert_eq!(assemble_chronology(&events, &RunConfig::default()), vec!["a", "b", "c"]);
    }

    #[test]
    fn billing_and_undated_gated_by_config() {
        let events = vec![
            event("bill", 1, Some((2024, 1, 1)), EventType::Billing),
            event("visit", 2, Some((2024, 1, 2)), EventType::OfficeVisit),
            event("nodate", 3, None, EventType::PtVisit),
        ];
        assert_eq!(assemble_chronology(&events, &RunConfig::default()), vec!["visit"]);

        let config = RunConfig {
            export_billing_events: true,
            export_undated_events: true,
            ..RunConfig::default()
        };
        assert_eq!(assemble_chronology(&events, &config), vec!["bill", "visit", "nodate"]);
    }

    #[test]
    fn low_confidence_follows_policy() {
        let mut low = event("low", 1, Some((2024, 1, 1)), EventType::OfficeVisit);
        low.flag(EventFlag::LowConfidence);
        let events = vec![low];
        assert!(assemble_chronology(&events, &RunConfig::default()).is_empty());

        let config = RunConfig {
            low_confidence_event_behavior: LowConfidencePolicy::IncludeWithFlag,
            ..RunConfig::default()
        };
        assert_eq!(assemble_chronology(&events, &config), vec!["low"]);
    }
}
