//! Merges events that describe the same encounter.

use crate::models::{Event, MAX_EVENT_FACTS};
use crate::pipeline::events::common::{cap_facts, push_unique};

fn same_key(a: &Event, b: &Event) -> bool {
    match (&a.date, &b.date) {
        (Some(da), Some(db)) => {
            a.provider_id == b.provider_id && a.event_type == b.event_type && da.value == db.value
        }
        // Dateless events never merge
        _ => false,
    }
}

fn pages_touch(a: &Event, b: &Event) -> bool {
    a.source_pages
        .iter()
        .any(|pa| b.source_pages.iter().any(|pb| pa.abs_diff(*pb) <= 1))
}

fn citations_intersect(a: &Event, b: &Event) -> bool {
    a.citation_ids.iter().any(|c| b.citation_ids.contains(c))
}

pub fn can_merge(a: &Event, b: &Event) -> bool {
    same_key(a, b) && (pages_touch(a, b) || citations_intersect(a, b))
}

/// Fold `other` into `into`. The survivor keeps its id and extraction order.
fn merge_into(into: &mut Event, other: Event) {
    let mut facts = std::mem::take(&mut into.facts);
    for fact in other.facts {
        match facts.iter_mut().find(|f| f.text == fact.text) {
            Some(existing) => push_unique(&mut existing.citation_ids, fact.citation_ids),
            None => facts.push(fact),
        }
    }
    into.facts = cap_facts(facts, MAX_EVENT_FACTS);

    push_unique(&mut into.citation_ids, other.citation_ids);

    into.source_pages.extend(other.source_pages);
    into.source_pages.sort_unstable();
    into.source_pages.dedup();

    for flag in other.flags {
        into.flag(flag);
    }

    if let (Some(date), Some(other_date)) = (into.date.as_mut(), other.date) {
        date.tier = date.tier.min(other_date.tier);
    }
    into.provider_tier = match (into.provider_tier, other.provider_tier) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    into.strong_cue |= other.strong_cue;
    into.anchored |= other.anchored;
    if into.imaging.is_none() {
        into.imaging = other.imaging;
    }
    if into.billing.is_none() {
        into.billing = other.billing;
    }
    into.extraction_order = into.extraction_order.min(other.extraction_order);
}

/// Merge until no pair qualifies. Earlier events absorb later ones, so the
/// result does not depend on anything but input order.
pub fn merge_events(mut events: Vec<Event>) -> Vec<Event> {
    let before = events.len();
    loop {
        let pair = (0..events.len()).find_map(|i| {
            (i + 1..events.len())
                .find(|&j| can_merge(&events[i], &events[j]))
                .map(|j| (i, j))
        });
        let Some((i, j)) = pair else { break };
        let other = events.remove(j);
        tracing::debug!(into = %events[i].event_id, merged = %other.event_id, "Merged duplicate events");
        merge_into(&mut events[i], other);
    }
    tracing::info!(before, after = events.len(), "Deduplicated events");
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDate, EventFlag, EventType, EvidenceTier, Fact, FactKind};
    use chrono::NaiveDate;

    fn event(id: &str, pages: &[u32], date: Option<(u32, u32)>, cits: &[&str], facts: &[&str]) -> Event {
        Event {
            event_id: id.into(),
            event_type: EventType::OfficeVisit,
            date: date.map(|(m, d)| {
                EventDate::single(NaiveDate::from_ymd_opt(2024, m, d).unwrap(), EvidenceTier::Tier2, "date")
            }),
            provider_id: Some("prv-0001".into()),
            provider_tier: Some(EvidenceTier::Tier2),
            facts: facts
                .iter()
                .map(|t| Fact {
                    text: t.to_string(),
                    kind: FactKind::Assessment,
                    confidence: 90,
                    citation_ids: vec![],
                })
                .collect(),
            citation_ids: cits.iter().map(|c| c.to_string()).collect(),
            source_pages: pages.to_vec(),
            confidence: 0,
            flags: vec![],
            strong_cue: false,
            anchored: true,
            imaging: None,
            billing: None,
            extraction_order: id.trim_start_matches("evt-").parse().unwrap_or(0),
        }
    }

    #[test]
    fn same_day_contiguous_events_merge() {
        let mut b = event("evt-2", &[4], Some((1, 2)), &["cit-2"], &["strain", "spasm"]);
        b.date.as_mut().unwrap().tier = EvidenceTier::Tier1;
        b.flags.push(EventFlag::OcrDerived);
        let merged = merge_events(vec![event("evt-1", &[3], Some((1, 2)), &["cit-1"], &["strain"]), b]);

        assert_eq!(merged.len(), 1);
        let e = &merged[0];
        assert_eq!(e.event_id, "evt-1");
        assert_eq!(e.source_pages, vec![3, 4]);
        assert_eq!(e.citation_ids, vec!["cit-1", "cit-2"]);
        assert_eq!(e.facts.len(), 2);
        assert_eq!(e.date.as_ref().unwrap().tier, EvidenceTier::Tier1);
        assert!(e.has_flag(EventFlag::OcrDerived));
    }

    #[test]
    fn distant_pages_do_not_merge() {
        let merged = merge_events(vec![
            event("evt-1", &[1], Some((1, 2)), &["a"], &[]),
            event("evt-2", &[5], Some((1, 2)), &["b"], &[]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn shared_citation_merges_distant_pages() {
        let merged = merge_events(vec![
            event("evt-1", &[1], Some((1, 2)), &["a"], &[]),
            event("evt-2", &[9], Some((1, 2)), &["a", "b"], &[]),
        ]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn dateless_never_merge() {
        let merged = merge_events(vec![
            event("evt-1", &[1], None, &["a"], &[]),
            event("evt-2", &[2], None, &["a"], &[]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merges_chain_to_fixpoint() {
        // 1 and 3 are not adjacent, but both touch 2
        let merged = merge_events(vec![
            event("evt-1", &[1], Some((1, 2)), &["a"], &[]),
            event("evt-2", &[3], Some((1, 2)), &["c"], &[]),
            event("evt-3", &[2], Some((1, 2)), &["b"], &[]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_pages, vec![1, 2, 3]);
    }

    #[test]
    fn merged_facts_capped() {
        let many: Vec<String> = (0..8).map(|i| format!("fact {i}")).collect();
        let more: Vec<String> = (8..14).map(|i| format!("fact {i}")).collect();
        let a = event("evt-1", &[1], Some((1, 2)), &["a"], &many.iter().map(String::as_str).collect::<Vec<_>>());
        let b = event("evt-2", &[2], Some((1, 2)), &["b"], &more.iter().map(String::as_str).collect::<Vec<_>>());
        let merged = merge_events(vec![a, b]);
        assert_eq!(merged[0].facts.len(), MAX_EVENT_FACTS);
        assert_eq!(merged[0].facts[0].text, "fact 0");
    }
}
