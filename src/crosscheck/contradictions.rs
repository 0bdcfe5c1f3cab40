use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{Contradiction, ContradictionCategory, ContradictionSide, Event};

/// Pain scores this far apart conflict.
pub const PAIN_DELTA_THRESHOLD: i64 = 3;
pub const MAX_CONTRADICTIONS: usize = 24;
/// Citations carried per side.
const MAX_SIDE_CITATIONS: usize = 3;

static PAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\s*/\s*10\b").expect("pain pattern is valid"));

static LATERALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(left|right)\s+(?:sided\s+)?(shoulder|arm|elbow|wrist|hand|hip|leg|knee|ankle|foot|neck|back|side)\b",
    )
    .expect("laterality pattern is valid")
});

static MECHANISMS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("mva", r"(?i)\b(mva|mvc|motor vehicle|rear[- ]end(ed)?|collision)\b"),
        ("fall", r"(?i)\b(fell|fall|slip and fall|tripped)\b"),
        ("work_injury", r"(?i)\b(work injury|injured at work|occupational)\b"),
    ]
    .iter()
    .map(|(value, p)| (*value, Regex::new(p).expect("mechanism pattern is valid")))
    .collect()
});

static RESTRICTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(unable to work|off work|work restrictions?|modified duty|light duty)\b")
        .expect("restricted pattern is valid")
});

static FULL_DUTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(returned to work|full duty|no restrictions)\b").expect("full duty pattern is valid")
});

/// One categorized value stated by a fact.
#[derive(Debug, Clone)]
pub struct Mention<'a> {
    pub category: ContradictionCategory,
    /// Narrower comparison key, e.g. the body region for laterality
    pub scope: Option<String>,
    pub value: String,
    pub event: &'a Event,
    pub statement: &'a str,
    pub citation_ids: Vec<String>,
}

impl Mention<'_> {
    fn date(&self) -> Option<NaiveDate> {
        self.event.start_date()
    }

    fn side(&self) -> ContradictionSide {
        ContradictionSide {
            event_id: self.event.event_id.clone(),
            date: self.date(),
            value: self.value.clone(),
            statement: self.statement.to_string(),
            citation_ids: self.citation_ids.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Mention collection
// ---------------------------------------------------------------------------

pub fn find_mentions(text: &str) -> Vec<(ContradictionCategory, Option<String>, String)> {
    let mut found = Vec::new();

    for caps in PAIN.captures_iter(text) {
        if let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<u8>().ok()) {
            if value <= 10 {
                found.push((ContradictionCategory::PainSeverity, None, value.to_string()));
            }
        }
    }

    for caps in LATERALITY.captures_iter(text) {
        let side = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let region = caps.get(2).map_or("", |m| m.as_str()).to_lowercase();
        found.push((ContradictionCategory::Laterality, Some(region), side));
    }

    if let Some((value, _)) = MECHANISMS.iter().find(|(_, re)| re.is_match(text)) {
        found.push((ContradictionCategory::Mechanism, None, value.to_string()));
    }

    if RESTRICTED.is_match(text) {
        found.push((ContradictionCategory::FunctionalStatus, None, "restricted".into()));
    }
    if FULL_DUTY.is_match(text) {
        found.push((ContradictionCategory::FunctionalStatus, None, "full_duty".into()));
    }

    found
}

fn collect_mentions<'a>(events: &[&'a Event]) -> Vec<Mention<'a>> {
    let mut mentions = Vec::new();
    for &event in events {
        for fact in &event.facts {
            let citations = if fact.citation_ids.is_empty() {
                &event.citation_ids
            } else {
                &fact.citation_ids
            };
            for (category, scope, value) in find_mentions(&fact.text) {
                mentions.push(Mention {
                    category,
                    scope,
                    value,
                    event,
                    statement: &fact.text,
                    citation_ids: citations.iter().take(MAX_SIDE_CITATIONS).cloned().collect(),
                });
            }
        }
    }
    mentions
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

fn conflicts(category: ContradictionCategory, a: &str, b: &str) -> bool {
    match category {
        ContradictionCategory::PainSeverity => match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => (x - y).abs() >= PAIN_DELTA_THRESHOLD,
            _ => false,
        },
        ContradictionCategory::Laterality
        | ContradictionCategory::Mechanism
        | ContradictionCategory::FunctionalStatus => a != b,
    }
}

fn comparable(a: &Mention<'_>, b: &Mention<'_>, window_days: i64) -> bool {
    if a.category != b.category || a.scope != b.scope {
        return false;
    }
    if a.event.event_id == b.event.event_id {
        return false;
    }
    let disjoint_citations = !a.citation_ids.iter().any(|c| b.citation_ids.contains(c));
    if a.date() == b.date() && !disjoint_citations {
        return false;
    }
    match (a.date(), b.date()) {
        (Some(da), Some(db)) => (db - da).num_days().abs() <= window_days,
        _ => true,
    }
}

/// Conflicting statements across exported events, strongest disagreement
/// first. `events` should be in chronology order.
pub fn build_contradictions(events: &[&Event], window_days: i64) -> Vec<Contradiction> {
    let mentions = collect_mentions(events);
    // One row per category, scope, value pair and earliest date
    let mut seen: BTreeSet<(ContradictionCategory, Option<String>, String, String, Option<NaiveDate>)> =
        BTreeSet::new();
    let mut matrix = Vec::new();

    for (i, a) in mentions.iter().enumerate() {
        for b in &mentions[i + 1..] {
            if !comparable(a, b, window_days) || !conflicts(a.category, &a.value, &b.value) {
                continue;
            }
            let earliest = match (a.date(), b.date()) {
                (Some(x), Some(y)) => Some(x.min(y)),
                (x, y) => x.or(y),
            };
            if !seen.insert((a.category, a.scope.clone(), a.value.clone(), b.value.clone(), earliest)) {
                continue;
            }
            matrix.push(Contradiction {
                category: a.category,
                a: a.side(),
                b: b.side(),
                strength_delta: a.event.confidence.abs_diff(b.event.confidence),
            });
        }
    }

    matrix.sort_by(|x, y| {
        y.strength_delta
            .cmp(&x.strength_delta)
            .then(x.category.cmp(&y.category))
            .then(x.a.date.cmp(&y.a.date))
    });
    matrix.truncate(MAX_CONTRADICTIONS);

    tracing::info!(mentions = mentions.len(), contradictions = matrix.len(), "Built contradiction matrix");
    matrix
}
