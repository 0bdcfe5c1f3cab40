//! Splits the page stream into logical documents.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Document, DocumentType, Page, PageSpan, PageType};
use crate::pipeline::context::RunContext;
use crate::pipeline::providers::PageProvider;

static PAGE_ONE_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpage\s+1\s+of\s+\d+\b").expect("page-one pattern is valid")
});

/// Header or footer line with digits removed, so page numbers and dates do
/// not register as a change.
fn signature(line: Option<&str>) -> String {
    line.unwrap_or("")
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn header_signature(page: &Page) -> String {
    signature(page.text.lines().next())
}

fn footer_signature(page: &Page) -> String {
    signature(page.text.lines().last())
}

fn starts_new_segment(prev: &Page, page: &Page) -> bool {
    if prev.source_document_id != page.source_document_id {
        return true;
    }
    if prev.page_type.document_class() != page.page_type.document_class() {
        return true;
    }
    if PAGE_ONE_OF.is_match(&page.text) {
        return true;
    }
    let both_have_text = !prev.text.is_empty() && !page.text.is_empty();
    both_have_text
        && header_signature(prev) != header_signature(page)
        && footer_signature(prev) != footer_signature(page)
}

/// Most frequent value; ties go to the one seen first.
fn most_frequent<T: Clone + Ord>(items: impl IntoIterator<Item = T>) -> Option<T> {
    let mut counts: BTreeMap<T, (usize, usize)> = BTreeMap::new();
    for (order, item) in items.into_iter().enumerate() {
        counts.entry(item).or_insert((0, order)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, oa)), (_, (cb, ob))| ca.cmp(cb).then(ob.cmp(oa)))
        .map(|(item, _)| item)
}

fn spans(pages: &[&Page]) -> Vec<PageSpan> {
    let mut out: Vec<PageSpan> = Vec::new();
    for page in pages {
        match out.last_mut() {
            Some(span) if span.page_type == page.page_type && span.page_end + 1 == page.page_number => {
                span.page_end = page.page_number;
            }
            _ => out.push(PageSpan {
                page_type: page.page_type,
                page_start: page.page_number,
                page_end: page.page_number,
            }),
        }
    }
    out
}

fn build_document(
    pages: &[&Page],
    page_providers: &BTreeMap<u32, PageProvider>,
    ctx: &mut RunContext,
) -> Option<Document> {
    let first = pages.first()?;
    let last = pages.last()?;
    let dominant = most_frequent(pages.iter().map(|p| p.page_type)).unwrap_or(PageType::Other);
    let declared_type: DocumentType = dominant.document_class();
    let provider_id = most_frequent(
        pages
            .iter()
            .filter_map(|p| page_providers.get(&p.page_number))
            .map(|pp| pp.provider_id.clone()),
    );

    Some(Document {
        document_id: ctx.segment_ids.next_id(),
        source_document_id: first.source_document_id.clone(),
        page_start: first.page_number,
        page_end: last.page_number,
        page_types: spans(pages),
        declared_type,
        dominant_page_type: dominant,
        provider_id,
    })
}

/// Group consecutive pages into documents.
pub fn segment_documents(
    pages: &[Page],
    page_providers: &BTreeMap<u32, PageProvider>,
    ctx: &mut RunContext,
) -> Vec<Document> {
    let mut documents = Vec::new();
    let mut current: Vec<&Page> = Vec::new();

    for page in pages {
        if let Some(prev) = current.last() {
            if starts_new_segment(prev, page) {
                documents.extend(build_document(&current, page_providers, ctx));
                current.clear();
            }
        }
        current.push(page);
    }
    documents.extend(build_document(&current, page_providers, ctx));

    tracing::info!(pages = pages.len(), documents = documents.len(), "Segmented documents");
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceTier, PageLayout, TextSource};

    fn page(n: u32, src: &str, text: &str, page_type: PageType) -> Page {
        Page {
            page_number: n,
            source_document_id: src.into(),
            source_page_index: n - 1,
            text: text.into(),
            text_source: TextSource::Embedded,
            page_type,
            page_type_score: 3,
            layout: PageLayout::LETTER,
            flags: vec![],
        }
    }

    fn providers(entries: &[(u32, &str)]) -> BTreeMap<u32, PageProvider> {
        entries
            .iter()
            .map(|(n, id)| {
                (
                    *n,
                    PageProvider {
                        provider_id: id.to_string(),
                        tier: EvidenceTier::Tier1,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn splits_on_source_and_class_change() {
        let pages = vec![
            page(1, "a", "Mercy Clinic\nnote\nPage 1", PageType::ClinicalNote),
            page(2, "a", "Mercy Clinic\nnote\nPage 2", PageType::ImagingReport),
            page(3, "a", "Mercy Billing\nstatement\nPage 3", PageType::Billing),
            page(4, "b", "Mercy Billing\nstatement\nPage 4", PageType::Billing),
        ];
        let docs = segment_documents(&pages, &BTreeMap::new(), &mut RunContext::new());
        assert_eq!(docs.len(), 3);
        assert_eq!((docs[0].page_start, docs[0].page_end), (1, 2));
        assert_eq!(docs[0].declared_type, DocumentType::MedicalRecord);
        assert_eq!(docs[0].page_types.len(), 2);
        assert_eq!(docs[1].declared_type, DocumentType::MedicalBill);
        assert_eq!(docs[2].source_document_id, "b");
        assert_eq!(docs[2].document_id, "doc-0003");
    }

    #[test]
    fn page_one_restarts_segment() {
        let pages = vec![
            page(1, "a", "Clinic A\nnote\nPage 1 of 2", PageType::ClinicalNote),
            page(2, "a", "Clinic A\nnote\nPage 2 of 2", PageType::ClinicalNote),
            page(3, "a", "Clinic A\nnote\nPage 1 of 1", PageType::ClinicalNote),
        ];
        let docs = segment_documents(&pages, &BTreeMap::new(), &mut RunContext::new());
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].page_start, 3);
    }

    #[test]
    fn header_and_footer_shift_splits() {
        let pages = vec![
            page(1, "a", "Mercy Clinic 01/02/2024\nbody\nMercy footer 1", PageType::ClinicalNote),
            page(2, "a", "Mercy Clinic 01/03/2024\nbody\nMercy footer 2", PageType::ClinicalNote),
            page(3, "a", "Valley Orthopedics\nbody\nValley footer", PageType::ClinicalNote),
            page(4, "a", "Valley Orthopedics\nbody\nother footer", PageType::ClinicalNote),
        ];
        let docs = segment_documents(&pages, &BTreeMap::new(), &mut RunContext::new());
        assert_eq!(docs.len(), 2);
        assert_eq!((docs[1].page_start, docs[1].page_end), (3, 4));
    }

    #[test]
    fn provider_is_most_frequent_page_provider() {
        let pages = vec![
            page(1, "a", "x\ny", PageType::ClinicalNote),
            page(2, "a", "x\ny", PageType::ClinicalNote),
            page(3, "a", "x\ny", PageType::ClinicalNote),
        ];
        let pp = providers(&[(1, "prv-0002"), (2, "prv-0001"), (3, "prv-0001")]);
        let docs = segment_documents(&pages, &pp, &mut RunContext::new());
        assert_eq!(docs[0].provider_id.as_deref(), Some("prv-0001"));
    }

    #[test]
    fn ties_go_to_first_seen() {
        assert_eq!(most_frequent(["b", "a", "a", "b"]), Some("b"));
        assert_eq!(most_frequent(Vec::<u8>::new()), None);
    }
}
