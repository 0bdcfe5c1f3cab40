//! Rule-based page classification.
//!
//! Rules are evaluated in a fixed priority order; the first rule reaching the
//! match threshold wins even if a later rule scores higher. Pages no rule
//! claims fall back to the best-scoring rule (or `other`) and are marked
//! low-confidence.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Page, PageType, TextSource, Warning, WarningCode};
use crate::pipeline::context::RunContext;

/// Points for one strong keyword.
const STRONG_WEIGHT: u32 = 3;
/// Points for one weak keyword.
const WEAK_WEIGHT: u32 = 1;
/// Score at which a rule claims the page.
const MATCH_THRESHOLD: u32 = 3;

struct Rule {
    page_type: PageType,
    strong: Vec<Regex>,
    weak: Vec<Regex>,
    /// One of these must match before the rule may claim a page. A rule
    /// missing its structure can still be the low-confidence fallback.
    requires: Vec<Regex>,
}

impl Rule {
    fn has_structure(&self, text: &str) -> bool {
        self.requires.is_empty() || self.requires.iter().any(|re| re.is_match(text))
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("classification pattern is valid"))
        .collect()
}

/// Priority order: operative > imaging > billing > PT > administrative > clinical.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            page_type: PageType::OperativeReport,
            strong: compile(&[
                r"\boperative report\b",
                r"\bop(erative)? note\b",
                r"\bpre-?operative diagnosis\b",
                r"\bpost-?operative diagnosis\b",
                r"\bprocedure note\b",
                r"\bsurgeon\s*:",
            ]),
            weak: compile(&[
                r"\banesthesia\b",
                r"\bincision\b",
                r"\bestimated blood loss\b",
                r"\bprocedure performed\b",
                r"\bsutur",
                r"\bfluoroscop",
                r"\binjection\b",
            ]),
            requires: Vec::new(),
        },
        Rule {
            page_type: PageType::ImagingReport,
            strong: compile(&[
                r"\bradiology report\b",
                r"\bradiologist\b",
                r"\btechnique\s*:",
                r"\b(mri|ct|x-?ray|ultrasound)\s+(of\s+the\s+)?(cervical|thoracic|lumbar|left|right|brain|head|chest|abdomen|pelvis|shoulder|knee|hip|wrist|ankle)",
                r"\bexam(ination)?\s*:\s*(mri|ct|x-?ray|ultrasound|xr|us)\b",
            ]),
            weak: compile(&[
                r"\bmri\b",
                r"\bct\b",
                r"\bx-?ray\b",
                r"\bradiograph",
                r"\bultrasound\b",
                r"\bimpression\s*:",
                r"\bfindings\s*:",
                r"\bcomparison\s*:",
                r"\bcontrast\b",
            ]),
            // A modality mention alone is an order or a referral, not a report
            requires: compile(&[
                r"\bradiology\b",
                r"\bradiologist\b",
                r"\bimaging report\b",
                r"\bexam(ination)?\s*:",
                r"\btechnique\s*:",
                r"\bimpression\s*:",
                r"\bfindings\s*:",
                r"\bcomparison\s*:",
            ]),
        },
        Rule {
            page_type: PageType::Billing,
            strong: compile(&[
                r"\bstatement date\b",
                r"\bamount due\b",
                r"\bbalance due\b",
                r"\btotal charges\b",
                r"\bitemized (statement|bill)\b",
                r"\bpatient balance\b",
                r"\bcpt\b",
                r"\bub-?04\b",
                r"\bhcfa\b|\bcms-?1500\b",
            ]),
            weak: compile(&[
                r"\$\s?\d",
                r"\bcharges?\b",
                r"\bpayments?\b",
                r"\binsurance\b",
                r"\binvoice\b",
                r"\badjustments?\b",
            ]),
            requires: Vec::new(),
        },
        Rule {
            page_type: PageType::PtNote,
            strong: compile(&[
                r"\bphysical therapy (daily |progress |treatment )?(note|evaluation|re-?evaluation)\b",
                r"\bpt (daily |progress )?(note|evaluation|visit)\b",
                r"\btherapeutic exercises?\b",
                r"\bplan of care\b",
                r"\bvisit\s*#\s*\d+",
            ]),
            weak: compile(&[
                r"\bphysical therapy\b",
                r"\brange of motion\b",
                r"\btherapist\b",
                r"\bmanual therapy\b",
                r"\bhome exercise program\b",
                r"\bgoals?\s*:",
                r"\bstrength\b",
            ]),
            requires: Vec::new(),
        },
        Rule {
            page_type: PageType::Administrative,
            strong: compile(&[
                r"\bfax cover\b",
                r"\brecords? request\b",
                r"\bauthorization (for|to) release\b",
                r"\bcertification of records\b",
                r"\bcustodian of records\b",
                r"\bsubpoena\b",
            ]),
            weak: compile(&[
                r"\bfax\b",
                r"\bto whom it may concern\b",
                r"\bpages? including cover\b",
                r"\bsincerely\b",
                r"\battention\s*:",
                r"\bre\s*:",
            ]),
            requires: Vec::new(),
        },
        Rule {
            page_type: PageType::ClinicalNote,
            strong: compile(&[
                r"\bchief complaint\b",
                r"\bhistory of present illness\b",
                r"\bhpi\s*:",
                r"\bassessment( and plan)?\s*:",
                r"\bemergency (department|room)\b",
                r"\bdischarge summary\b",
                r"\bprogress note\b",
                r"\breview of systems\b",
                r"\bhistory and physical\b",
            ]),
            weak: compile(&[
                r"\bvitals?\b",
                r"\bblood pressure\b",
                r"\bmedications?\s*:",
                r"\ballergies\b",
                r"\bphysical exam",
                r"\bdiagnos[ie]s\b",
                r"\bplan\s*:",
                r"\bpatient\b",
            ]),
            requires: Vec::new(),
        },
    ]
});

/// Result of classifying one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub page_type: PageType,
    pub score: u32,
    /// No rule reached the threshold; the type is a best guess.
    pub low_confidence: bool,
}

fn score(rule: &Rule, text: &str) -> u32 {
    let strong = rule.strong.iter().filter(|re| re.is_match(text)).count() as u32;
    let weak = rule.weak.iter().filter(|re| re.is_match(text)).count() as u32;
    strong * STRONG_WEIGHT + weak * WEAK_WEIGHT
}

/// Classify page text. Rule order decides between rules that both match.
pub fn classify_text(text: &str) -> Classification {
    let mut best: Option<(PageType, u32)> = None;

    for rule in RULES.iter() {
        let s = score(rule, text);
        if s >= MATCH_THRESHOLD && rule.has_structure(text) {
            return Classification {
                page_type: rule.page_type,
                score: s,
                low_confidence: false,
            };
        }
        // Strictly greater keeps the higher-priority rule on ties
        if s > 0 && best.map_or(true, |(_, b)| s > b) {
            best = Some((rule.page_type, s));
        }
    }

    match best {
        Some((page_type, s)) => Classification {
            page_type,
            score: s,
            low_confidence: true,
        },
        None => Classification {
            page_type: PageType::Other,
            score: 0,
            low_confidence: true,
        },
    }
}

/// Assign a page type to every page. Pages without text (OCR failed or
/// unavailable) are always `other`.
pub fn classify_pages(pages: &mut [Page], ctx: &mut RunContext) {
    for page in pages.iter_mut() {
        let result = if page.text_source == TextSource::None || page.text.trim().is_empty() {
            Classification {
                page_type: PageType::Other,
                score: 0,
                low_confidence: true,
            }
        } else {
            classify_text(&page.text)
        };

        page.page_type = result.page_type;
        page.page_type_score = result.score;

        if result.low_confidence {
            page.flag(WarningCode::PageTypeLowConf);
            ctx.warn(
                Warning::new(
                    WarningCode::PageTypeLowConf,
                    format!(
                        "No classification rule matched; using {} (score {})",
                        result.page_type, result.score
                    ),
                )
                .on_page(page.page_number)
                .in_document(&page.source_document_id),
            );
        }
    }

    tracing::info!(pages = pages.len(), "Classified pages");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rule_keeps_all_its_patterns() {
        assert_eq!(RULES.len(), 6);
        let imaging = RULES.iter().find(|r| r.page_type == PageType::ImagingReport).unwrap();
        assert_eq!((imaging.strong.len(), imaging.weak.len(), imaging.requires.len()), (5, 9, 8));
    }

    #[test]
    #[should_panic(expected = "classification pattern is valid")]
    fn malformed_pattern_panics() {
        compile(&[r"\bunclosed(group"]);
    }

    #[test]
    fn clinical_note_by_chief_complaint() {
        let c = classify_text("Chief Complaint: neck pain\nAssessment: cervical strain\nPlan: PT");
        assert_eq!(c.page_type, PageType::ClinicalNote);
        assert!(!c.low_confidence);
    }

    #[test]
    fn imaging_outranks_billing() {
        let text = "RADIOLOGY REPORT\nMRI of the lumbar spine\nImpression: disc bulge L4-5\n\
                    Statement Date: 02/01/2024\nTotal Charges: $2,400.00";
        let c = classify_text(text);
        assert_eq!(c.page_type, PageType::ImagingReport);
    }

    #[test]
    fn office_visit_ordering_mri_stays_clinical() {
        let text = "Family Medicine Office Visit\nDate of Service: 03/04/2014\n\
                    Chief Complaint: low back pain radiating to left leg\n\
                    Assessment: lumbar radiculopathy\nPlan: MRI of the lumbar spine, naproxen";
        let c = classify_text(text);
        assert_eq!(c.page_type, PageType::ClinicalNote);
        assert!(!c.low_confidence);
    }

    #[test]
    fn modality_without_report_sections_is_only_a_guess() {
        let c = classify_text("MRI of the lumbar spine ordered");
        assert_eq!(c.page_type, PageType::ImagingReport);
        assert!(c.low_confidence);
    }

    #[test]
    fn imaging_report_with_findings_section() {
        let c = classify_text("MRI of the cervical spine\nFindings: C5-6 disc protrusion");
        assert_eq!(c.page_type, PageType::ImagingReport);
        assert!(!c.low_confidence);
    }

    #[test]
    fn operative_outranks_everything() {
        let text = "OPERATIVE REPORT\nPreoperative diagnosis: torn meniscus\nChief complaint: knee pain\nMRI of the left knee reviewed";
        assert_eq!(classify_text(text).page_type, PageType::OperativeReport);
    }

    #[test]
    fn billing_statement() {
        let text = "Statement Date: 03/15/2024\nCPT 99213 Office visit $150.00\nAmount Due: $150.00";
        assert_eq!(classify_text(text).page_type, PageType::Billing);
    }

    #[test]
    fn pt_note_needs_pt_specific_terms() {
        let pt = "Physical Therapy Daily Note\nVisit # 4\nTherapeutic exercise 20 min";
        assert_eq!(classify_text(pt).page_type, PageType::PtNote);

        let referral = "Chief Complaint: back pain\nPlan: refer to physical therapy";
        assert_eq!(classify_text(referral).page_type, PageType::ClinicalNote);
    }

    #[test]
    fn administrative_fax_cover() {
        let text = "FAX COVER SHEET\nTo whom it may concern\n5 pages including cover";
        assert_eq!(classify_text(text).page_type, PageType::Administrative);
    }

    #[test]
    fn weak_signal_is_best_guess() {
        let c = classify_text("The patient called about insurance.");
        assert!(c.low_confidence);
        assert_ne!(c.page_type, PageType::Other);
        assert!(c.score < MATCH_THRESHOLD);
    }

    #[test]
    fn no_signal_is_other() {
        let c = classify_text("Lorem ipsum dolor sit amet");
        assert_eq!(c.page_type, PageType::Other);
        assert!(c.low_confidence);
        assert_eq!(c.score, 0);
    }

    #[test]
    fn textless_pages_are_other_and_warned() {
        use crate::models::PageLayout;
        let mut pages = vec![Page {
            page_number: 1,
            source_document_id: "s".into(),
            source_page_index: 0,
            text: String::new(),
            text_source: TextSource::None,
            page_type: PageType::ClinicalNote,
            page_type_score: 0,
            layout: PageLayout::LETTER,
            flags: vec![WarningCode::OcrUnavailable],
        }];
        let mut ctx = RunContext::new();
        classify_pages(&mut pages, &mut ctx);
        assert_eq!(pages[0].page_type, PageType::Other);
        assert!(pages[0].type_uncertain());
        assert!(ctx.has_warning(WarningCode::PageTypeLowConf));
    }
}
