//! Splits source PDFs into globally numbered pages.

use crate::models::{Page, PageLayout, PageType, SourceDocument, TextSource, Warning, WarningCode};
use crate::pipeline::context::RunContext;

use super::sanitize::{is_meaningful, sanitize_extracted_text};
use super::types::PdfExtractor;
use super::ExtractionError;

/// Pages produced by pagination, plus whether the page cap cut anything off.
#[derive(Debug)]
pub struct Pagination {
    pub pages: Vec<Page>,
    pub truncated: bool,
}

/// Paginate every source document in upload order.
///
/// Pages whose embedded text is not meaningful come back with
/// `text_source = none` and empty text; the text acquirer decides whether to
/// OCR them. A PDF that cannot be opened aborts the run.
pub fn paginate(
    sources: &mut [SourceDocument],
    extractor: &dyn PdfExtractor,
    max_pages: usize,
    ctx: &mut RunContext,
) -> Result<Pagination, ExtractionError> {
    let mut pages = Vec::new();
    let mut truncated = false;

    for source in sources.iter_mut() {
        let raw_pages = extractor.extract_pages(&source.bytes).map_err(|e| {
            tracing::error!(document_id = %source.document_id, filename = %source.filename, error = %e, "Cannot open PDF");
            e
        })?;
        source.page_count = raw_pages.len() as u32;

        for raw in raw_pages {
            if ctx.pages.allocated() >= max_pages {
                truncated = true;
                break;
            }

            let cleaned = sanitize_extracted_text(&raw.text);
            let (text, text_source) = if is_meaningful(&cleaned) {
                (cleaned, TextSource::Embedded)
            } else {
                (String::new(), TextSource::None)
            };

            pages.push(Page {
                page_number: ctx.pages.allocate(),
                source_document_id: source.document_id.clone(),
                source_page_index: raw.index as u32,
                text,
                text_source,
                page_type: PageType::Other,
                page_type_score: 0,
                layout: PageLayout::points(raw.width, raw.height),
                flags: Vec::new(),
            });
        }

        tracing::debug!(
            document_id = %source.document_id,
            pages = source.page_count,
            "Paginated source document"
        );
    }

    if truncated {
        let total: u32 = sources.iter().map(|s| s.page_count).sum();
        ctx.warn(Warning::new(
            WarningCode::MaxPagesExceeded,
            format!("Processed {max_pages} of {total} pages; remaining pages were skipped"),
        ));
    }

    Ok(Pagination { pages, truncated })
}

// ── Mock for testing ──────────────────────────────────────

/// Mock extractor returning fixed page texts for every document.
#[cfg(test)]
pub(crate) struct MockPdfExtractor {
    pub pages: Vec<String>,
}

#[cfg(test)]
impl MockPdfExtractor {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[cfg(test)]
impl PdfExtractor for MockPdfExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<super::RawPage>, ExtractionError> {
        if !pdf_bytes.starts_with(b"%PDF") {
            return Err(ExtractionError::PdfParsing("mock: not a pdf".into()));
        }
        Ok(self
            .pages
            .iter()
            .enumerate()
            .map(|(index, text)| super::RawPage {
                index,
                text: text.clone(),
                width: 612.0,
                height: 792.0,
            })
            .collect())
    }

    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.pages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::import::{import_source, SourceInput};

    const LONG: &str = "Chief Complaint: neck pain after motor vehicle collision.\nAssessment: cervical strain.";

    fn source(name: &str) -> SourceDocument {
        import_source(SourceInput::new(name, format!("%PDF-1.4 {name}").into_bytes())).unwrap()
    }

    #[test]
    fn numbers_pages_globally_in_upload_order() {
        let mut sources = vec![source("a.pdf"), source("b.pdf")];
        let extractor = MockPdfExtractor::new(&[LONG, LONG]);
        let mut ctx = RunContext::new();
        let result = paginate(&mut sources, &extractor, 100, &mut ctx).unwrap();

        let numbers: Vec<u32> = result.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(result.pages[2].source_document_id, sources[1].document_id);
        assert_eq!(result.pages[2].source_page_index, 0);
        assert_eq!(sources[0].page_count, 2);
        assert!(!result.truncated);
    }

    #[test]
    fn short_text_left_for_ocr() {
        let mut sources = vec![source("a.pdf")];
        let extractor = MockPdfExtractor::new(&["Page 1 of 1", LONG]);
        let mut ctx = RunContext::new();
        let result = paginate(&mut sources, &extractor, 100, &mut ctx).unwrap();
        assert_eq!(result.pages[0].text_source, TextSource::None);
        assert!(result.pages[0].text.is_empty());
        assert_eq!(result.pages[1].text_source, TextSource::Embedded);
    }

    #[test]
    fn page_cap_truncates_and_warns() {
        let mut sources = vec![source("a.pdf"), source("b.pdf")];
        let extractor = MockPdfExtractor::new(&[LONG, LONG, LONG]);
        let mut ctx = RunContext::new();
        let result = paginate(&mut sources, &extractor, 4, &mut ctx).unwrap();
        assert_eq!(result.pages.len(), 4);
        assert!(result.truncated);
        assert!(ctx.has_warning(WarningCode::MaxPagesExceeded));
    }

    #[test]
    fn unreadable_pdf_is_fatal() {
        let mut sources = vec![source("a.pdf")];
        std::sync::Arc::make_mut(&mut sources[0].bytes).clear();
        let extractor = MockPdfExtractor::new(&[LONG]);
        let mut ctx = RunContext::new();
        assert!(paginate(&mut sources, &extractor, 10, &mut ctx).is_err());
    }
}
