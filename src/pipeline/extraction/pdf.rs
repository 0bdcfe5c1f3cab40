use lopdf::{Document, Object, ObjectId};

use super::types::{PdfExtractor, RawPage};
use super::ExtractionError;

const LETTER_WIDTH_PT: f32 = 612.0;
const LETTER_HEIGHT_PT: f32 = 792.0;

/// Guard against cyclic `Parent` chains in malformed page trees.
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// PDF text extractor using lopdf for structure and pdf-extract for text.
///
/// lopdf must be able to open the file: a PDF it cannot parse is a fatal
/// input error. pdf-extract is best effort: when it fails (common for
/// scanned packets with exotic encodings) every page comes back without
/// text and is left for OCR.
pub struct PdfTextExtractor;

impl PdfExtractor for PdfTextExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<RawPage>, ExtractionError> {
        let document = load_document(pdf_bytes)?;
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();

        let mut texts = match pdf_extract::extract_text_from_mem_by_pages(pdf_bytes) {
            Ok(texts) => texts,
            Err(e) => {
                tracing::debug!(error = %e, "Text layer unreadable, pages left for OCR");
                Vec::new()
            }
        };
        texts.resize(page_ids.len(), String::new());

        let pages = page_ids
            .iter()
            .zip(texts)
            .enumerate()
            .map(|(index, (page_id, text))| {
                let (width, height) =
                    media_box(&document, *page_id).unwrap_or((LETTER_WIDTH_PT, LETTER_HEIGHT_PT));
                RawPage {
                    index,
                    text,
                    width,
                    height,
                }
            })
            .collect();

        Ok(pages)
    }

    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(load_document(pdf_bytes)?.get_pages().len())
    }
}

fn load_document(pdf_bytes: &[u8]) -> Result<Document, ExtractionError> {
    let document =
        Document::load_mem(pdf_bytes).map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;
    if document.trailer.get(b"Encrypt").is_ok() {
        return Err(ExtractionError::PdfEncrypted);
    }
    Ok(document)
}

/// Page size from the MediaBox, following inheritance up the page tree.
fn media_box(document: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let mut current = Some(page_id);
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let id = current?;
        let dict = document.get_dictionary(id).ok()?;
        if let Ok(obj) = dict.get(b"MediaBox") {
            let array = match obj {
                Object::Reference(r) => document.get_object(*r).ok()?.as_array().ok()?,
                other => other.as_array().ok()?,
            };
            if array.len() == 4 {
                let nums: Vec<f32> = array.iter().filter_map(number).collect();
                if nums.len() == 4 {
                    let width = (nums[2] - nums[0]).abs();
                    let height = (nums[3] - nums[1]).abs();
                    if width > 0.0 && height > 0.0 {
                        return Some((width, height));
                    }
                }
            }
            return None;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Build a small PDF with one text line per page, for tests.
#[cfg(test)]
pub(crate) fn make_test_pdf(pages: &[&str], media_box: (i64, i64)) -> Vec<u8> {
    use lopdf::dictionary;
    use lopdf::Stream;

    let mut doc = Document::with_version("1.4");

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for text in pages {
        let content = format!("BT /F1 12 Tf 72 700 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    // MediaBox lives on the Pages node so extraction has to follow inheritance.
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), media_box.0.into(), media_box.1.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_from_digital_pdf() {
        let extractor = PdfTextExtractor;
        let pdf_bytes = make_test_pdf(&["Hello World from Citeline"], (612, 792));
        let pages = extractor.extract_pages(&pdf_bytes).unwrap();

        assert_eq!(pages.len(), 1);
        assert!(
            pages[0].text.contains("Hello") || pages[0].text.contains("World"),
            "Expected text to contain 'Hello' or 'World', got: {}",
            pages[0].text
        );
    }

    #[test]
    fn page_count_matches_extraction() {
        let extractor = PdfTextExtractor;
        let pdf_bytes = make_test_pdf(&["One", "Two", "Three"], (612, 792));
        let count = extractor.page_count(&pdf_bytes).unwrap();
        let pages = extractor.extract_pages(&pdf_bytes).unwrap();
        assert_eq!(count, 3);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn inherited_media_box_is_read() {
        let extractor = PdfTextExtractor;
        let pdf_bytes = make_test_pdf(&["A4 page"], (595, 842));
        let pages = extractor.extract_pages(&pdf_bytes).unwrap();
        assert_eq!((pages[0].width, pages[0].height), (595.0, 842.0));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let extractor = PdfTextExtractor;
        let result = extractor.extract_pages(b"not a pdf");
        assert!(matches!(result, Err(ExtractionError::PdfParsing(_))));
    }
}
