//! Shared helpers for the event extractors: section finding, boilerplate
//! filtering, fact weighting and the event draft builder.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    BillingDetails, Event, EventDate, EventFlag, EventType, EvidenceTier, Fact, FactKind, ImagingDetails,
    TextSource, Warning, WarningCode,
};
use crate::pipeline::context::RunContext;
use crate::pipeline::dates::ResolvedDate;

use super::ExtractionInput;

/// Longest fact text kept, in characters.
pub const MAX_FACT_CHARS: usize = 300;

/// Lines kept per section.
const MAX_SECTION_LINES: usize = 3;

/// A known section header.
pub struct Section {
    pub kind: FactKind,
    header: Regex,
}

impl Section {
    /// `pattern` is the header wording without the trailing colon.
    pub fn new(kind: FactKind, pattern: &str) -> Self {
        let header = Regex::new(&format!(r"(?i)^\s*(?:\d+[.)]\s*)?(?:{pattern})\s*(?::|-|$)\s*(?P<rest>.*)$"))
            .expect("section header pattern is valid");
        Self { kind, header }
    }
}

/// A line found inside a section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionLine {
    pub kind: FactKind,
    pub line: String,
}

static BOILERPLATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)electronically signed",
        r"(?i)\bpage\s+\d+\s+of\s+\d+\b",
        r"(?i)\bconfidential\b",
        r"(?i)\bfax(ed)?\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("boilerplate pattern is valid"))
    .collect()
});

static TITLE_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-zA-Z\s]{2,40}:\s*$").expect("title pattern is valid"));
static NUMBERED_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s+[A-Z][a-zA-Z\s]{2,40}:\s*$").expect("numbered pattern is valid"));
static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-=_]{3,}$").expect("separator pattern is valid"));

pub fn is_boilerplate(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() < 4 || BOILERPLATE.iter().any(|re| re.is_match(trimmed))
}

/// Lines that close the current section without opening a known one.
fn is_boundary(line: &str) -> bool {
    let all_caps = line.chars().any(char::is_alphabetic)
        && line.chars().all(|c| c.is_ascii_uppercase() || c == ' ')
        && line.split_whitespace().count() <= 4
        && line.len() >= 3;
    all_caps || TITLE_COLON.is_match(line) || NUMBERED_HEADER.is_match(line) || SEPARATOR.is_match(line)
}

/// Walk a page and collect the lines under each known section header.
///
/// Inline content on the header line (`Assessment: cervical strain`) is
/// returned as the whole line so the fact reads as written.
pub fn section_lines(text: &str, sections: &[Section]) -> Vec<SectionLine> {
    let mut out = Vec::new();
    let mut current: Option<(FactKind, usize)> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((section, caps)) = sections.iter().find_map(|s| s.header.captures(line).map(|c| (s, c))) {
            let rest = caps.name("rest").map_or("", |m| m.as_str().trim());
            current = Some((section.kind, 0));
            if !rest.is_empty() && !is_boilerplate(rest) {
                out.push(SectionLine {
                    kind: section.kind,
                    line: line.to_string(),
                });
                current = Some((section.kind, 1));
            }
            continue;
        }

        if is_boundary(line) {
            current = None;
            continue;
        }

        if let Some((kind, taken)) = current.as_mut() {
            if *taken < MAX_SECTION_LINES && !is_boilerplate(line) {
                out.push(SectionLine {
                    kind: *kind,
                    line: line.to_string(),
                });
                *taken += 1;
            }
        }
    }

    out
}

/// Relative weight of a fact kind, used to choose which facts survive caps.
pub fn fact_weight(kind: FactKind) -> u8 {
    match kind {
        FactKind::Assessment | FactKind::Diagnosis | FactKind::Impression | FactKind::Total => 90,
        FactKind::ChiefComplaint | FactKind::Procedure => 85,
        FactKind::Plan | FactKind::Restriction | FactKind::VisitSummary => 80,
        FactKind::Findings => 75,
        FactKind::History | FactKind::Progress | FactKind::Charge => 70,
        FactKind::Medication => 65,
        FactKind::Vitals | FactKind::Goal => 60,
        FactKind::Other => 50,
    }
}

/// Truncate fact text on a char boundary.
pub fn fact_text(line: &str) -> String {
    line.trim().chars().take(MAX_FACT_CHARS).collect()
}

/// Keep the `cap` strongest facts (ties keep the earlier one) in reading order.
pub fn cap_facts(facts: Vec<Fact>, cap: usize) -> Vec<Fact> {
    if facts.len() <= cap {
        return facts;
    }
    let mut ranked: Vec<(usize, Fact)> = facts.into_iter().enumerate().collect();
    ranked.sort_by(|(ia, a), (ib, b)| b.confidence.cmp(&a.confidence).then(ia.cmp(ib)));
    ranked.truncate(cap);
    ranked.sort_by_key(|(i, _)| *i);
    ranked.into_iter().map(|(_, f)| f).collect()
}

/// Append ids not already present, preserving first-appearance order.
pub fn push_unique(into: &mut Vec<String>, ids: impl IntoIterator<Item = String>) {
    for id in ids {
        if !into.contains(&id) {
            into.push(id);
        }
    }
}

/// An event under construction. Turned into an [`Event`] by [`EventDraft::finish`].
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: EventType,
    pub date: Option<EventDate>,
    pub date_citation: Option<String>,
    pub conflict: bool,
    pub facts: Vec<Fact>,
    pub extra_citations: Vec<String>,
    pub source_pages: Vec<u32>,
    pub strong_cue: bool,
    pub anchored: bool,
    pub imaging: Option<ImagingDetails>,
    pub billing: Option<BillingDetails>,
    pub flags: Vec<EventFlag>,
    /// Set when the caller already knows the provider (PT groups)
    pub provider: Option<(String, EvidenceTier)>,
}

impl EventDraft {
    pub fn new(event_type: EventType, source_pages: Vec<u32>) -> Self {
        Self {
            event_type,
            date: None,
            date_citation: None,
            conflict: false,
            facts: Vec::new(),
            extra_citations: Vec::new(),
            source_pages,
            strong_cue: false,
            anchored: false,
            imaging: None,
            billing: None,
            flags: Vec::new(),
            provider: None,
        }
    }

    /// Record a resolved date and cite the line it came from.
    pub fn with_resolved_date(
        &mut self,
        resolved: &ResolvedDate,
        input: &ExtractionInput<'_>,
        ctx: &mut RunContext,
    ) {
        self.date = Some(EventDate::single(resolved.date, resolved.tier, resolved.label.as_str()));
        self.date_citation = input
            .page(resolved.page_number)
            .and_then(|page| ctx.cite(page, &resolved.line));
    }

    /// Add a fact citing `line` on page `page_number`.
    pub fn add_fact(
        &mut self,
        kind: FactKind,
        line: &str,
        page_number: u32,
        input: &ExtractionInput<'_>,
        ctx: &mut RunContext,
    ) {
        let text = fact_text(line);
        if text.is_empty() || self.facts.iter().any(|f| f.text == text) {
            return;
        }
        let citation_ids: Vec<String> = input
            .page(page_number)
            .and_then(|page| ctx.cite(page, line))
            .into_iter()
            .collect();
        self.facts.push(Fact {
            text,
            kind,
            confidence: fact_weight(kind),
            citation_ids,
        });
    }

    /// Allocate the id, link the provider and set structural flags.
    pub fn finish(mut self, input: &ExtractionInput<'_>, ctx: &mut RunContext, fact_cap: usize) -> Event {
        let event_id = ctx.event_ids.next_id();
        let extraction_order = ctx.event_ids.issued() as u32;
        self.facts = cap_facts(self.facts, fact_cap);

        let mut citation_ids = Vec::new();
        push_unique(&mut citation_ids, self.date_citation.clone());
        for fact in &self.facts {
            push_unique(&mut citation_ids, fact.citation_ids.iter().cloned());
        }
        push_unique(&mut citation_ids, self.extra_citations.iter().cloned());

        let (provider_id, provider_tier) = match self.provider.take() {
            Some((id, tier)) => (Some(id), Some(tier)),
            None => match input.provider_for(&self.source_pages) {
                Some((id, tier)) => (Some(id), Some(tier)),
                None => (None, None),
            },
        };

        let mut event = Event {
            event_id,
            event_type: self.event_type,
            date: self.date,
            provider_id,
            provider_tier,
            facts: self.facts,
            citation_ids,
            source_pages: self.source_pages,
            confidence: 0,
            flags: Vec::new(),
            strong_cue: self.strong_cue,
            anchored: self.anchored,
            imaging: self.imaging,
            billing: self.billing,
            extraction_order,
        };
        for flag in self.flags {
            event.flag(flag);
        }
        if self.conflict {
            event.flag(EventFlag::MultipleDateConflict);
        }
        if event.date.is_none() {
            event.flag(EventFlag::MissingDate);
            let first_page = event.source_pages.first().copied();
            let mut warning = Warning::new(
                WarningCode::MissingDate,
                format!("{} {} has no resolvable date", event.event_type, event.event_id),
            );
            if let Some(page) = first_page {
                warning = warning.on_page(page);
            }
            ctx.warn(warning);
        }
        if event.citation_ids.is_empty() {
            event.flag(EventFlag::MissingCitation);
        }
        if event
            .source_pages
            .iter()
            .filter_map(|n| input.page(*n))
            .any(|p| p.text_source == TextSource::Ocr)
        {
            event.flag(EventFlag::OcrDerived);
        }

        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            pages = ?event.source_pages,
            facts = event.facts.len(),
            "Extracted event"
        );
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections() -> Vec<Section> {
        [
            (FactKind::ChiefComplaint, r"chief complaint|cc"),
            (FactKind::Assessment, r"assessment(?: and plan)?"),
            (FactKind::Plan, r"plan"),
        ]
        .iter()
        .map(|(k, p)| Section::new(*k, p))
        .collect()
    }

    #[test]
    #[should_panic(expected = "section header pattern is valid")]
    fn malformed_section_header_panics() {
        Section::new(FactKind::Plan, "plan(");
    }

    #[test]
    fn inline_and_block_sections() {
        let text = "Chief Complaint: neck pain\nASSESSMENT\nCervical strain\nMuscle spasm\nPlan:\nPT 2x/week\nPage 1 of 2";
        let lines = section_lines(text, &sections());
        assert_eq!(
            lines,
            vec![
                SectionLine { kind: FactKind::ChiefComplaint, line: "Chief Complaint: neck pain".into() },
                SectionLine { kind: FactKind::Assessment, line: "Cervical strain".into() },
                SectionLine { kind: FactKind::Assessment, line: "Muscle spasm".into() },
                SectionLine { kind: FactKind::Plan, line: "PT 2x/week".into() },
            ]
        );
    }

    #[test]
    fn unknown_header_closes_section() {
        let text = "Assessment:\nLumbar strain\nSocial History:\nSmoker";
        let lines = section_lines(text, &sections());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, "Lumbar strain");
    }

    #[test]
    fn boilerplate_lines_dropped() {
        assert!(is_boilerplate("Electronically signed by Dr. Lee"));
        assert!(is_boilerplate("Page 2 of 5"));
        assert!(is_boilerplate("ok"));
        assert!(!is_boilerplate("Cervical strain"));
    }

    #[test]
    fn cap_keeps_strongest_in_reading_order() {
        let fact = |text: &str, confidence: u8| Fact {
            text: text.into(),
            kind: FactKind::Other,
            confidence,
            citation_ids: vec![],
        };
        let kept = cap_facts(vec![fact("a", 60), fact("b", 90), fact("c", 60), fact("d", 80)], 3);
        let texts: Vec<&str> = kept.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "d"]);
    }

    #[test]
    fn fact_text_is_truncated() {
        assert_eq!(fact_text(&"x".repeat(400)).chars().count(), MAX_FACT_CHARS);
    }
}
