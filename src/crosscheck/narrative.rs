use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Contradiction, Event, FactKind, Gap, NarrativeDuality, NarrativePoint};

/// Points kept per side.
pub const MAX_NARRATIVE_POINTS: usize = 12;

const SUPPORTIVE_KINDS: &[FactKind] = &[
    FactKind::Impression,
    FactKind::Assessment,
    FactKind::Diagnosis,
    FactKind::Procedure,
    FactKind::Restriction,
];

static OPPOSING_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(normal|unremarkable|no acute|degenerative|pre-?existing|full duty|no restrictions|returned to work)\b",
    )
    .expect("opposing cue pattern is valid")
});

pub fn has_opposing_cue(text: &str) -> bool {
    OPPOSING_CUES.is_match(text)
}

fn fact_point(event: &Event, fact_index: usize, basis: &str) -> Option<NarrativePoint> {
    let fact = event.facts.get(fact_index)?;
    Some(NarrativePoint {
        event_id: Some(event.event_id.clone()),
        date: event.start_date(),
        text: fact.text.clone(),
        basis: basis.to_string(),
        citation_ids: fact.citation_ids.clone(),
    })
}

/// Regroup cited facts into a supporting and an opposing reading. Nothing is
/// paraphrased: every point is an existing fact, a contradiction pair or a gap.
pub fn build_narrative(events: &[&Event], contradictions: &[Contradiction], gaps: &[Gap]) -> NarrativeDuality {
    let mut duality = NarrativeDuality::default();

    for &event in events {
        for (i, fact) in event.facts.iter().enumerate() {
            if has_opposing_cue(&fact.text) {
                if duality.defense.len() < MAX_NARRATIVE_POINTS {
                    duality.defense.extend(fact_point(event, i, "opposing_cue"));
                }
            } else if SUPPORTIVE_KINDS.contains(&fact.kind) && duality.plaintiff.len() < MAX_NARRATIVE_POINTS {
                duality.plaintiff.extend(fact_point(event, i, fact.kind.as_str()));
            }
        }
    }

    for contradiction in contradictions {
        if duality.defense.len() >= MAX_NARRATIVE_POINTS {
            break;
        }
        let mut citation_ids = contradiction.a.citation_ids.clone();
        citation_ids.extend(
            contradiction
                .b
                .citation_ids
                .iter()
                .filter(|c| !contradiction.a.citation_ids.contains(c))
                .cloned(),
        );
        duality.defense.push(NarrativePoint {
            event_id: Some(contradiction.b.event_id.clone()),
            date: contradiction.b.date,
            text: contradiction.b.statement.clone(),
            basis: format!("contradiction_{}", contradiction.category.as_str()),
            citation_ids,
        });
    }

    for gap in gaps {
        if duality.defense.len() >= MAX_NARRATIVE_POINTS {
            break;
        }
        let mut citation_ids = gap.citations_before.clone();
        citation_ids.extend(gap.citations_after.iter().filter(|c| !gap.citations_before.contains(c)).cloned());
        duality.defense.push(NarrativePoint {
            event_id: None,
            date: Some(gap.start_date),
            text: format!(
                "No records between {} and {} ({} days)",
                gap.start_date, gap.end_date, gap.gap_days
            ),
            basis: format!("gap_{}", gap.scope.as_str()),
            citation_ids,
        });
    }

    tracing::info!(
        plaintiff = duality.plaintiff.len(),
        defense = duality.defense.len(),
        "Built narrative views"
    );
    duality
}
