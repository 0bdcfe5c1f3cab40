use super::ExtractionError;

/// One page as read from the PDF's embedded text layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    /// 0-based index within the PDF
    pub index: usize,
    pub text: String,
    /// MediaBox width in points
    pub width: f32,
    /// MediaBox height in points
    pub height: f32,
}

/// Text recognized on one rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPageResult {
    pub text: String,
    /// Mean engine confidence, 0.0-1.0
    pub confidence: f32,
}

/// OCR engine seam. Called from blocking worker threads.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, png: &[u8], lang: &str) -> Result<OcrPageResult, ExtractionError>;

    /// Name recorded in run provenance (e.g., "tesseract").
    fn engine_name(&self) -> &str;
}

/// PDF text-layer extraction abstraction
pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<RawPage>, ExtractionError>;

    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;
}

/// Rasterizes one PDF page for OCR.
pub trait PdfPageRenderer: Send + Sync {
    /// PNG bytes for the 0-based `page_index` at `dpi`.
    fn render_page(&self, pdf_bytes: &[u8], page_index: usize, dpi: u32) -> Result<Vec<u8>, ExtractionError>;
}
