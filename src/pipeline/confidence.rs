//! Event confidence scoring and the export eligibility policy.
//!
//! Scores are additive over the evidence an event carries:
//!
//! | signal                  | points |
//! |-------------------------|--------|
//! | tier-1 date             | +40    |
//! | tier-2 date             | +25    |
//! | tier-1 provider         | +30    |
//! | tier-2 provider         | +15    |
//! | strong encounter cue    | +20    |
//! | content anchor          | +10    |
//! | competing tier-1 dates  | -25    |
//!
//! Clamped to 0..=100. The export policy only decides visibility; it never
//! touches scores or flags.

use std::collections::HashMap;

use crate::models::{Event, EventFlag, EvidenceTier, Page};
use crate::pipeline_config::{LowConfidencePolicy, RunConfig};

pub const DATE_TIER1_POINTS: i32 = 40;
pub const DATE_TIER2_POINTS: i32 = 25;
pub const PROVIDER_TIER1_POINTS: i32 = 30;
pub const PROVIDER_TIER2_POINTS: i32 = 15;
pub const STRONG_CUE_POINTS: i32 = 20;
pub const ANCHOR_POINTS: i32 = 10;
pub const CONFLICT_PENALTY: i32 = 25;

pub fn score(event: &Event) -> u8 {
    let mut total = 0;
    total += match event.date.as_ref().map(|d| d.tier) {
        Some(EvidenceTier::Tier1) => DATE_TIER1_POINTS,
        Some(EvidenceTier::Tier2) => DATE_TIER2_POINTS,
        None => 0,
    };
    if event.provider_id.is_some() {
        total += match event.provider_tier {
            Some(EvidenceTier::Tier1) => PROVIDER_TIER1_POINTS,
            Some(EvidenceTier::Tier2) => PROVIDER_TIER2_POINTS,
            None => 0,
        };
    }
    if event.strong_cue {
        total += STRONG_CUE_POINTS;
    }
    if event.anchored {
        total += ANCHOR_POINTS;
    }
    if event.has_flag(EventFlag::MultipleDateConflict) {
        total -= CONFLICT_PENALTY;
    }
    total.clamp(0, 100) as u8
}

/// Score every event and set the derived flags.
pub fn score_events(events: &mut [Event], pages: &[Page], config: &RunConfig) {
    let uncertain: HashMap<u32, bool> = pages.iter().map(|p| (p.page_number, p.type_uncertain())).collect();

    let mut low = 0usize;
    for event in events.iter_mut() {
        event.confidence = score(event);

        if event.confidence < config.event_confidence_min_export {
            event.flag(EventFlag::LowConfidence);
            low += 1;
        } else {
            event.clear_flag(EventFlag::LowConfidence);
        }

        if event.provider_id.is_none() || event.provider_tier != Some(EvidenceTier::Tier1) {
            event.flag(EventFlag::ProviderUncertain);
        } else {
            event.clear_flag(EventFlag::ProviderUncertain);
        }

        if event.source_pages.iter().any(|n| uncertain.get(n).copied().unwrap_or(false)) {
            event.flag(EventFlag::PageTypeUncertain);
        }

        tracing::debug!(event_id = %event.event_id, confidence = event.confidence, flags = ?event.flags, "Scored event");
    }
    tracing::info!(events = events.len(), low_confidence = low, "Scored events");
}

/// Whether the confidence policy lets this event into the chronology.
pub fn passes_policy(event: &Event, config: &RunConfig) -> bool {
    match config.low_confidence_event_behavior {
        LowConfidencePolicy::Exclude => !event.has_flag(EventFlag::LowConfidence),
        LowConfidencePolicy::IncludeWithFlag => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDate, EventType, PageLayout, PageType, TextSource, WarningCode};
    use chrono::NaiveDate;

    fn base_event() -> Event {
        Event {
            event_id: "evt-000001".into(),
            event_type: EventType::ErVisit,
            date: Some(EventDate::single(
                NaiveDate::from_ymd_opt(2013, 9, 17).unwrap(),
                EvidenceTier::Tier1,
                "service_date",
            )),
            provider_id: Some("prv-0001".into()),
            provider_tier: Some(EvidenceTier::Tier1),
            facts: vec![],
            citation_ids: vec!["cit-000001".into()],
            source_pages: vec![1],
            confidence: 0,
            flags: vec![],
            strong_cue: true,
            anchored: true,
            imaging: None,
            billing: None,
            extraction_order: 1,
        }
    }

    fn page(n: u32, uncertain: bool) -> Page {
        Page {
            page_number: n,
            source_document_id: "src".into(),
            source_page_index: n - 1,
            text: String::new(),
            text_source: TextSource::Embedded,
            page_type: PageType::ClinicalNote,
            page_type_score: 3,
            layout: PageLayout::LETTER,
            flags: if uncertain { vec![WarningCode::PageTypeLowConf] } else { vec![] },
        }
    }

    #[test]
    fn full_evidence_scores_100() {
        assert_eq!(score(&base_event()), 100);
    }

    #[test]
    fn conflict_costs_25() {
        let mut event = base_event();
        event.flag(EventFlag::MultipleDateConflict);
        assert_eq!(score(&event), 75);
    }

    #[test]
    fn dateless_unlinked_scores_low() {
        let mut event = base_event();
        event.date = None;
        event.provider_id = None;
        event.provider_tier = None;
        event.strong_cue = false;
        assert_eq!(score(&event), 10);

        event.anchored = false;
        event.flag(EventFlag::MultipleDateConflict);
        assert_eq!(score(&event), 0);
    }

    #[test]
    fn flags_derived_from_score_and_pages() {
        let mut events = vec![base_event(), base_event()];
        events[1].event_id = "evt-000002".into();
        events[1].provider_tier = Some(EvidenceTier::Tier2);
        events[1].strong_cue = false;
        events[1].anchored = false;
        events[1].date.as_mut().unwrap().tier = EvidenceTier::Tier2;
        events[1].source_pages = vec![2];

        score_events(&mut events, &[page(1, false), page(2, true)], &RunConfig::default());

        assert!(events[0].flags.is_empty());
        assert_eq!(events[1].confidence, 40);
        assert!(events[1].has_flag(EventFlag::LowConfidence));
        assert!(events[1].has_flag(EventFlag::ProviderUncertain));
        assert!(events[1].has_flag(EventFlag::PageTypeUncertain));
    }

    #[test]
    fn policy_never_changes_scores() {
        let mut events = vec![base_event()];
        events[0].strong_cue = false;
        events[0].anchored = false;
        events[0].provider_id = None;
        let config = RunConfig {
            low_confidence_event_behavior: LowConfidencePolicy::IncludeWithFlag,
            ..RunConfig::default()
        };
        score_events(&mut events, &[], &config);
        assert_eq!(events[0].confidence, 40);
        assert!(passes_policy(&events[0], &config));
        assert!(events[0].has_flag(EventFlag::LowConfidence));
        assert!(!passes_policy(&events[0], &RunConfig::default()));
    }
}
