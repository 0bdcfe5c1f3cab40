//! Clinical encounters from clinical notes and operative reports.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{EventType, FactKind, Page, PageType, SkipReason, SkippedEvent};
use crate::pipeline::context::RunContext;
use crate::pipeline::dates::{page_anchor_date, resolve_date, DateLabel};

use super::common::{section_lines, EventDraft, Section};
use super::{EventExtractor, ExtractionInput, ExtractionOutput};

pub const CLINICAL_FACT_CAP: usize = 6;

/// Labels that tie a page to one specific encounter.
const ENCOUNTER_LABELS: &[DateLabel] = &[DateLabel::ServiceDate, DateLabel::VisitDate, DateLabel::EncounterDate];

const ANCHOR_KINDS: &[FactKind] = &[
    FactKind::ChiefComplaint,
    FactKind::Assessment,
    FactKind::Diagnosis,
    FactKind::Plan,
    FactKind::Restriction,
];

static SECTIONS: LazyLock<Vec<Section>> = LazyLock::new(|| {
    [
        (FactKind::ChiefComplaint, r"chief complaint|reason for (?:visit|consultation)|cc"),
        (FactKind::History, r"history of present illness|hpi|interval history"),
        (FactKind::Diagnosis, r"(?:pre|post)-?operative diagnos[ie]s|(?:final |discharge |admitting )?diagnos[ie]s"),
        (FactKind::Assessment, r"assessment(?:\s*(?:and|&)\s*plan)?|impression|clinical impression"),
        (FactKind::Procedure, r"procedures? performed|procedures?|operation performed"),
        (FactKind::Restriction, r"work status|(?:activity |work )?restrictions|duty status"),
        (FactKind::Plan, r"plan|recommendations?|disposition"),
        (FactKind::Medication, r"(?:discharge |current )?medications"),
        (FactKind::Vitals, r"vital signs|vitals"),
        (FactKind::Findings, r"physical exam(?:ination)?|exam|findings"),
    ]
    .iter()
    .map(|(kind, pattern)| Section::new(*kind, pattern))
    .collect()
});

fn markers(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("encounter marker pattern is valid"))
        .collect()
}

/// Encounter subtype markers in priority order.
static SUBTYPES: LazyLock<Vec<(EventType, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            EventType::ErVisit,
            markers(&[
                r"\bemergency (department|room)\b",
                r"\b(er|ed) (visit|course|provider|note)\b",
                r"\btriage\b",
            ]),
        ),
        (
            EventType::HospitalDischarge,
            markers(&[r"\bdischarge summary\b", r"\bdischarged (home|to)\b", r"\bdischarge diagnos"]),
        ),
        (
            EventType::HospitalAdmission,
            markers(&[
                r"\badmission (history|note|h&p)\b",
                r"\bhistory and physical\b",
                r"\badmitted (to|for)\b",
                r"\binpatient admission\b",
            ]),
        ),
        (
            EventType::Procedure,
            markers(&[r"\boperative report\b", r"\bprocedure note\b", r"\bprocedures? performed\b"]),
        ),
        (
            EventType::OfficeVisit,
            markers(&[
                r"\boffice visit\b",
                r"\bprogress note\b",
                r"\bfollow[- ]up\b",
                r"\bclinic visit\b",
                r"\bnew patient\b",
            ]),
        ),
    ]
});

/// Date label groups per subtype, strongest first.
fn date_preference(event_type: EventType) -> &'static [&'static [DateLabel]] {
    const VISIT: &[DateLabel] = &[DateLabel::ServiceDate, DateLabel::VisitDate, DateLabel::EncounterDate];
    match event_type {
        EventType::HospitalDischarge => &[&[DateLabel::DischargeDate], VISIT, &[DateLabel::AdmitDate]],
        EventType::HospitalAdmission => &[&[DateLabel::AdmitDate], VISIT],
        EventType::Procedure => &[&[DateLabel::ProcedureDate], VISIT],
        _ => &[VISIT, &[DateLabel::ExamDate, DateLabel::ProcedureDate, DateLabel::AdmitDate]],
    }
}

/// Encounter subtype and whether any marker matched.
pub fn detect_subtype(text: &str, has_operative_page: bool) -> (EventType, bool) {
    for (event_type, patterns) in SUBTYPES.iter() {
        let matched = patterns.iter().any(|re| re.is_match(text));
        if *event_type == EventType::Procedure && (matched || has_operative_page) {
            return (EventType::Procedure, true);
        }
        if matched {
            return (*event_type, true);
        }
    }
    (EventType::OfficeVisit, false)
}

struct Block<'a> {
    pages: Vec<&'a Page>,
    date: Option<NaiveDate>,
}

fn build_blocks<'a>(input: &ExtractionInput<'a>, pages: Vec<&'a Page>) -> Vec<Block<'a>> {
    let mut blocks: Vec<Block<'a>> = Vec::new();
    for page in pages {
        let anchor = page_anchor_date(input.dates(page.page_number), ENCOUNTER_LABELS);
        let segment = input.segment_of(page.page_number).map(|d| d.document_id.as_str());

        let continues = blocks.last().is_some_and(|block| {
            block.pages.last().is_some_and(|last| {
                last.page_number + 1 == page.page_number
                    && input.segment_of(last.page_number).map(|d| d.document_id.as_str()) == segment
                    && !matches!((block.date, anchor), (Some(a), Some(b)) if a != b)
            })
        });

        match blocks.last_mut() {
            Some(block) if continues => {
                block.pages.push(page);
                block.date = block.date.or(anchor);
            }
            _ => blocks.push(Block {
                pages: vec![page],
                date: anchor,
            }),
        }
    }
    blocks
}

pub struct ClinicalExtractor;

impl EventExtractor for ClinicalExtractor {
    fn name(&self) -> &'static str {
        "clinical"
    }

    fn page_types(&self) -> &'static [PageType] {
        &[PageType::ClinicalNote, PageType::OperativeReport]
    }

    fn extract(&self, input: &ExtractionInput<'_>, ctx: &mut RunContext, out: &mut ExtractionOutput) {
        let pages = input.pages_of_type(self.page_types());

        for block in build_blocks(input, pages) {
            let page_numbers: Vec<u32> = block.pages.iter().map(|p| p.page_number).collect();
            let text = block.pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n");
            let has_operative = block.pages.iter().any(|p| p.page_type == PageType::OperativeReport);
            let (event_type, strong_cue) = detect_subtype(&text, has_operative);

            let lines: Vec<(u32, _)> = block
                .pages
                .iter()
                .flat_map(|p| section_lines(&p.text, &SECTIONS).into_iter().map(move |l| (p.page_number, l)))
                .collect();

            if !lines.iter().any(|(_, l)| ANCHOR_KINDS.contains(&l.kind)) {
                out.skipped.push(SkippedEvent {
                    page_numbers,
                    page_type: block.pages[0].page_type,
                    intended_type: Some(event_type),
                    reason: SkipReason::NoAnchor,
                });
                continue;
            }

            let mut draft = EventDraft::new(event_type, page_numbers.clone());
            draft.strong_cue = strong_cue;
            draft.anchored = true;

            let resolution = resolve_date(&input.dates_on(&page_numbers), date_preference(event_type));
            draft.conflict = resolution.conflict;
            if let Some(resolved) = &resolution.resolved {
                draft.with_resolved_date(resolved, input, ctx);
            }

            for (page_number, line) in &lines {
                draft.add_fact(line.kind, &line.line, *page_number, input, ctx);
            }

            out.events.push(draft.finish(input, ctx, CLINICAL_FACT_CAP));
        }
    }
}
