//! Physical therapy visits.
//!
//! Aggregate mode (the default) folds dated visits from one provider into a
//! single event per run of visits no more than the configured window apart.
//! Per-visit mode emits one event per page, but only when every PT page has
//! a tier-1 visit date; otherwise it falls back to aggregate and says so.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;

use crate::models::{
    Event, EventDate, EventFlag, EventType, EvidenceTier, Fact, FactKind, Page, PageType, Warning, WarningCode,
};
use crate::pipeline::context::RunContext;
use crate::pipeline::dates::{resolve_date, DateLabel, ResolvedDate};
use crate::pipeline_config::PtMode;

use super::common::{fact_weight, is_boilerplate, push_unique, section_lines, EventDraft, Section};
use super::{EventExtractor, ExtractionInput, ExtractionOutput};

pub const PT_FACT_CAP: usize = 6;

/// Pages per aggregated group whose progress and goal notes become facts.
const SUMMARY_PAGES: usize = 2;

const DATE_PREFERENCE: &[&[DateLabel]] = &[&[DateLabel::ServiceDate, DateLabel::VisitDate, DateLabel::EncounterDate]];

static SECTIONS: LazyLock<Vec<Section>> = LazyLock::new(|| {
    [
        (FactKind::Progress, r"progress(?: toward goals)?|patient progress|assessment"),
        (FactKind::Goal, r"(?:short|long)[- ]term goals?|goals?"),
    ]
    .iter()
    .map(|(kind, pattern)| Section::new(*kind, pattern))
    .collect()
});

struct Visit<'a> {
    page: &'a Page,
    resolved: ResolvedDate,
    date_citation: Option<String>,
    provider: Option<(String, EvidenceTier)>,
}

fn add_section_facts(draft: &mut EventDraft, page: &Page, input: &ExtractionInput<'_>, ctx: &mut RunContext) {
    for line in section_lines(&page.text, &SECTIONS) {
        draft.add_fact(line.kind, &line.line, page.page_number, input, ctx);
        draft.anchored = true;
    }
}

fn visit_date(visit: &Visit<'_>) -> NaiveDate {
    visit.resolved.date
}

pub struct PtExtractor;

impl PtExtractor {
    fn dateless_event(&self, page: &Page, input: &ExtractionInput<'_>, ctx: &mut RunContext) -> Event {
        let mut draft = EventDraft::new(EventType::PtVisit, vec![page.page_number]);
        draft.strong_cue = !page.type_uncertain();
        if let Some(first) = page.text.lines().map(str::trim).find(|l| !is_boilerplate(l)) {
            draft.add_fact(FactKind::VisitSummary, first, page.page_number, input, ctx);
        }
        add_section_facts(&mut draft, page, input, ctx);
        draft.finish(input, ctx, PT_FACT_CAP)
    }

    fn per_visit_event(&self, visit: &Visit<'_>, input: &ExtractionInput<'_>, ctx: &mut RunContext) -> Event {
        let mut draft = EventDraft::new(EventType::PtVisit, vec![visit.page.page_number]);
        draft.strong_cue = !visit.page.type_uncertain();
        draft.date = Some(EventDate::single(visit.resolved.date, visit.resolved.tier, visit.resolved.label.as_str()));
        draft.date_citation = visit.date_citation.clone();
        draft.provider = visit.provider.clone();
        add_section_facts(&mut draft, visit.page, input, ctx);
        draft.finish(input, ctx, PT_FACT_CAP)
    }

    fn aggregate_event(
        &self,
        group: &[Visit<'_>],
        fallback: bool,
        input: &ExtractionInput<'_>,
        ctx: &mut RunContext,
    ) -> Option<Event> {
        let first = group.first()?;
        let start = group.iter().map(visit_date).min()?;
        let end = group.iter().map(visit_date).max()?;
        let tier = if group.iter().all(|v| v.resolved.tier == EvidenceTier::Tier1) {
            EvidenceTier::Tier1
        } else {
            EvidenceTier::Tier2
        };

        let mut pages: Vec<u32> = group.iter().map(|v| v.page.page_number).collect();
        pages.sort_unstable();
        pages.dedup();

        let mut draft = EventDraft::new(EventType::PtVisit, pages);
        draft.date = Some(EventDate::range(start, end, tier, first.resolved.label.as_str()));
        draft.provider = first.provider.clone();
        draft.strong_cue = group.iter().any(|v| !v.page.type_uncertain());

        let sessions: BTreeSet<NaiveDate> = group.iter().map(visit_date).collect();
        let mut date_citations: Vec<String> = Vec::new();
        push_unique(&mut date_citations, group.iter().filter_map(|v| v.date_citation.clone()));
        draft.facts.push(Fact {
            text: format!("PT sessions documented: {}", sessions.len()),
            kind: FactKind::VisitSummary,
            confidence: fact_weight(FactKind::VisitSummary),
            citation_ids: date_citations.clone(),
        });
        draft.extra_citations = date_citations;

        for visit in group.iter().take(SUMMARY_PAGES) {
            add_section_facts(&mut draft, visit.page, input, ctx);
        }
        if fallback {
            draft.flags.push(EventFlag::PtPerVisitFallback);
        }
        Some(draft.finish(input, ctx, PT_FACT_CAP))
    }
}

impl EventExtractor for PtExtractor {
    fn name(&self) -> &'static str {
        "pt"
    }

    fn page_types(&self) -> &'static [PageType] {
        &[PageType::PtNote]
    }

    fn extract(&self, input: &ExtractionInput<'_>, ctx: &mut RunContext, out: &mut ExtractionOutput) {
        let pages = input.pages_of_type(self.page_types());
        if pages.is_empty() {
            return;
        }

        let mut visits: Vec<Visit<'_>> = Vec::new();
        for &page in &pages {
            let resolution = resolve_date(&input.dates_on(&[page.page_number]), DATE_PREFERENCE);
            match resolution.resolved {
                Some(resolved) => {
                    let date_citation = ctx.cite(page, &resolved.line);
                    visits.push(Visit {
                        page,
                        resolved,
                        date_citation,
                        provider: input.provider_for(&[page.page_number]),
                    });
                }
                None => out.events.push(self.dateless_event(page, input, ctx)),
            }
        }

        let all_tier1 = visits.len() == pages.len() && visits.iter().all(|v| v.resolved.tier == EvidenceTier::Tier1);
        let wants_per_visit = input.config.pt_mode == PtMode::PerVisit;

        if wants_per_visit && all_tier1 {
            for visit in &visits {
                out.events.push(self.per_visit_event(visit, input, ctx));
            }
            return;
        }

        let fallback = wants_per_visit;
        if fallback {
            ctx.warn(Warning::new(
                WarningCode::PtPerVisitFallback,
                format!(
                    "Per-visit PT mode needs a visit date on every PT page; {} of {} pages qualify",
                    visits.iter().filter(|v| v.resolved.tier == EvidenceTier::Tier1).count(),
                    pages.len()
                ),
            ));
        }

        visits.sort_by(|a, b| {
            let pa = a.provider.as_ref().map(|(id, _)| id.as_str());
            let pb = b.provider.as_ref().map(|(id, _)| id.as_str());
            pa.cmp(&pb)
                .then(visit_date(a).cmp(&visit_date(b)))
                .then(a.page.page_number.cmp(&b.page.page_number))
        });

        let window = input.config.pt_aggregate_window_days;
        let mut groups: Vec<Vec<Visit<'_>>> = Vec::new();
        for visit in visits {
            let joins = groups.last().and_then(|g| g.last()).is_some_and(|prev| {
                prev.provider.as_ref().map(|(id, _)| id) == visit.provider.as_ref().map(|(id, _)| id)
                    && (visit_date(&visit) - visit_date(prev)).num_days() <= window
            });
            match groups.last_mut() {
                Some(group) if joins => group.push(visit),
                _ => groups.push(vec![visit]),
            }
        }

        for group in &groups {
            out.events.extend(self.aggregate_event(group, fallback, input, ctx));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateValue;
    use crate::pipeline::events::test_support::{page, run};
    use crate::pipeline_config::RunConfig;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn pt_page(n: u32, date_line: &str) -> Page {
        page(
            n,
            &format!("Physical Therapy Daily Note\n{date_line}\nProgress: improved cervical rotation\nGoals: return to work"),
            PageType::PtNote,
        )
    }

    #[test]
    fn aggregates_visits_within_window() {
        let pages = vec![
            pt_page(1, "Date of Service: 10/01/2013"),
            pt_page(2, "Date of Service: 10/04/2013"),
            pt_page(3, "Date of Service: 10/08/2013"),
            pt_page(4, "Date of Service: 11/20/2013"),
        ];
        let (out, ctx) = run(pages, RunConfig::default(), &PtExtractor);
        assert_eq!(out.events.len(), 2);

        let first = &out.events[0];
        assert_eq!(
            first.date.as_ref().unwrap().value,
            DateValue::Range { start: d(2013, 10, 1), end: d(2013, 10, 8) }
        );
        assert_eq!(first.source_pages, vec![1, 2, 3]);
        assert_eq!(first.facts[0].text, "PT sessions documented: 3");
        assert_eq!(first.facts[0].citation_ids.len(), 3);
        for id in &first.facts[0].citation_ids {
            assert!(ctx.citations.get(id).unwrap().snippet.starts_with("Date of Service"));
        }
        assert!(first.anchored);

        assert_eq!(out.events[1].start_date(), Some(d(2013, 11, 20)));
        assert_eq!(out.events[1].facts[0].text, "PT sessions documented: 1");
    }

    #[test]
    fn dateless_page_emits_flagged_event() {
        let pages = vec![
            pt_page(1, "Date of Service: 10/01/2013"),
            page(2, "Physical Therapy Daily Note\nTherapeutic exercise 30 min", PageType::PtNote),
        ];
        let (out, ctx) = run(pages, RunConfig::default(), &PtExtractor);
        let dateless: Vec<_> = out.events.iter().filter(|e| e.date.is_none()).collect();
        assert_eq!(dateless.len(), 1);
        assert!(dateless[0].has_flag(EventFlag::MissingDate));
        assert!(!dateless[0].citation_ids.is_empty());
        assert!(ctx.has_warning(WarningCode::MissingDate));
    }

    #[test]
    fn per_visit_mode_when_all_dated() {
        let config = RunConfig {
            pt_mode: PtMode::PerVisit,
            ..RunConfig::default()
        };
        let pages = vec![pt_page(1, "Visit Date: 10/01/2013"), pt_page(2, "Visit Date: 10/03/2013")];
        let (out, ctx) = run(pages, config, &PtExtractor);
        assert_eq!(out.events.len(), 2);
        assert!(!ctx.has_warning(WarningCode::PtPerVisitFallback));
    }

    #[test]
    fn per_visit_falls_back_to_aggregate() {
        let config = RunConfig {
            pt_mode: PtMode::PerVisit,
            ..RunConfig::default()
        };
        let pages = vec![pt_page(1, "Visit Date: 10/01/2013"), pt_page(2, "Seen on 10/03/2013")];
        let (out, ctx) = run(pages, config, &PtExtractor);
        assert_eq!(out.events.len(), 1);
        assert!(out.events[0].has_flag(EventFlag::PtPerVisitFallback));
        assert_eq!(out.events[0].date.as_ref().unwrap().tier, EvidenceTier::Tier2);
        assert!(ctx.has_warning(WarningCode::PtPerVisitFallback));
    }
}
