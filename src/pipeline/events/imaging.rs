//! Imaging studies, one per imaging report page.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{EventType, FactKind, ImagingDetails, PageType, SkipReason, SkippedEvent};
use crate::pipeline::context::RunContext;
use crate::pipeline::dates::{resolve_date, DateLabel};

use super::common::{section_lines, EventDraft, Section};
use super::{EventExtractor, ExtractionInput, ExtractionOutput};

/// Impression (or findings) lines kept per study.
pub const MAX_IMAGING_LINES: usize = 3;

const DATE_PREFERENCE: &[&[DateLabel]] = &[
    &[DateLabel::ExamDate, DateLabel::StudyDate, DateLabel::ServiceDate, DateLabel::ProcedureDate],
    &[DateLabel::VisitDate, DateLabel::EncounterDate],
];

static MODALITIES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("MRI", r"(?i)\bmri\b|\bmagnetic resonance\b"),
        ("CT", r"(?i)\bct\b|\bcomputed tomography\b|\bcat scan\b"),
        ("XR", r"(?i)\bx-?rays?\b|\bradiograph|\bxr\b"),
        ("US", r"(?i)\bultrasound\b|\bsonogra"),
    ]
    .iter()
    .map(|(name, p)| (*name, Regex::new(p).expect("modality pattern is valid")))
    .collect()
});

static BODY_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(left|right|bilateral)\s+)?(cervical spine|thoracic spine|lumbar spine|lumbosacral spine|brain|head|chest|abdomen|pelvis|shoulder|elbow|wrist|hand|hip|knee|ankle|foot|neck)\b",
    )
    .expect("body part pattern is valid")
});

static SECTIONS: LazyLock<Vec<Section>> = LazyLock::new(|| {
    [
        (FactKind::Impression, r"impressions?|conclusions?"),
        (FactKind::Findings, r"findings"),
    ]
    .iter()
    .map(|(kind, pattern)| Section::new(*kind, pattern))
    .collect()
});

/// Modality whose first mention comes earliest in the text.
pub fn detect_modality(text: &str) -> Option<&'static str> {
    MODALITIES
        .iter()
        .filter_map(|(name, re)| re.find(text).map(|m| (m.start(), *name)))
        .min()
        .map(|(_, name)| name)
}

pub fn detect_body_part(text: &str) -> Option<String> {
    BODY_PART.captures(text).map(|caps| {
        let part = caps.get(2).map_or("", |m| m.as_str()).to_lowercase();
        match caps.get(1) {
            Some(side) => format!("{} {part}", side.as_str().to_lowercase()),
            None => part,
        }
    })
}

pub struct ImagingExtractor;

impl EventExtractor for ImagingExtractor {
    fn name(&self) -> &'static str {
        "imaging"
    }

    fn page_types(&self) -> &'static [PageType] {
        &[PageType::ImagingReport]
    }

    fn extract(&self, input: &ExtractionInput<'_>, ctx: &mut RunContext, out: &mut ExtractionOutput) {
        for page in input.pages_of_type(self.page_types()) {
            let skip = |reason| SkippedEvent {
                page_numbers: vec![page.page_number],
                page_type: page.page_type,
                intended_type: Some(EventType::ImagingStudy),
                reason,
            };

            let Some(modality) = detect_modality(&page.text) else {
                out.skipped.push(skip(SkipReason::NoModality));
                continue;
            };

            let lines = section_lines(&page.text, &SECTIONS);
            let impressions: Vec<_> = lines.iter().filter(|l| l.kind == FactKind::Impression).collect();
            let chosen: Vec<_> = if impressions.is_empty() {
                lines.iter().filter(|l| l.kind == FactKind::Findings).collect()
            } else {
                impressions.clone()
            };
            if chosen.is_empty() {
                out.skipped.push(skip(SkipReason::NoTrigger));
                continue;
            }

            let resolution = resolve_date(&input.dates_on(&[page.page_number]), DATE_PREFERENCE);
            let Some(resolved) = &resolution.resolved else {
                out.skipped.push(skip(SkipReason::NoExamDate));
                continue;
            };

            let mut draft = EventDraft::new(EventType::ImagingStudy, vec![page.page_number]);
            draft.strong_cue = true;
            draft.anchored = !impressions.is_empty();
            draft.conflict = resolution.conflict;
            draft.imaging = Some(ImagingDetails {
                modality: modality.to_string(),
                body_part: detect_body_part(&page.text),
            });
            draft.with_resolved_date(resolved, input, ctx);
            for line in chosen.into_iter().take(MAX_IMAGING_LINES) {
                draft.add_fact(line.kind, &line.line, page.page_number, input, ctx);
            }

            out.events.push(draft.finish(input, ctx, MAX_IMAGING_LINES));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvidenceTier;
    use crate::pipeline::events::test_support::{page, run};
    use crate::pipeline_config::RunConfig;
    use chrono::NaiveDate;

    #[test]
    fn mri_with_impression() {
        let text = "RADIOLOGY REPORT\nExam: MRI of the lumbar spine without contrast\nExam Date: 10/01/2013\n\
                    Report Date: 10/03/2013\nFindings:\nMild disc desiccation.\nImpression:\n\
                    1 L4-5 disc protrusion\n2 Mild foraminal narrowing";
        let (out, _) = run(vec![page(1, text, PageType::ImagingReport)], RunConfig::default(), &ImagingExtractor);
        let event = &out.events[0];
        assert_eq!(event.event_type, EventType::ImagingStudy);
        assert_eq!(event.start_date(), NaiveDate::from_ymd_opt(2013, 10, 1));
        assert_eq!(event.date.as_ref().unwrap().tier, EvidenceTier::Tier1);
        let imaging = event.imaging.as_ref().unwrap();
        assert_eq!(imaging.modality, "MRI");
        assert_eq!(imaging.body_part.as_deref(), Some("lumbar spine"));
        assert!(event.anchored);
        assert_eq!(event.facts.len(), 2);
        assert!(event.facts.iter().all(|f| f.kind == FactKind::Impression));
    }

    #[test]
    fn findings_used_without_impression() {
        let text = "X-ray right knee\nDate: 05/05/2024\nFindings: no fracture or dislocation";
        let (out, _) = run(vec![page(1, text, PageType::ImagingReport)], RunConfig::default(), &ImagingExtractor);
        let event = &out.events[0];
        assert!(!event.anchored);
        assert_eq!(event.facts[0].kind, FactKind::Findings);
        assert_eq!(event.imaging.as_ref().unwrap().body_part.as_deref(), Some("right knee"));
        assert_eq!(event.date.as_ref().unwrap().tier, EvidenceTier::Tier2);
    }

    #[test]
    fn skip_reasons() {
        let pages = vec![
            page(1, "Radiology report\nImpression: normal", PageType::ImagingReport),
            page(2, "CT head\nDate: 01/01/2024\nComparison: none", PageType::ImagingReport),
            page(3, "CT head\nImpression: no acute bleed\nplenty of text without a date", PageType::ImagingReport),
        ];
        let (out, _) = run(pages, RunConfig::default(), &ImagingExtractor);
        assert!(out.events.is_empty());
        let reasons: Vec<SkipReason> = out.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec![SkipReason::NoModality, SkipReason::NoTrigger, SkipReason::NoExamDate]);
    }

    #[test]
    fn earliest_modality_wins() {
        assert_eq!(detect_modality("CT abdomen; prior MRI reviewed"), Some("CT"));
        assert_eq!(detect_modality("nothing here"), None);
    }
}
