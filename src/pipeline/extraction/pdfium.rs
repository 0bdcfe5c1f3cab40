//! Rasterizes scanned pages with PDFium so they can be OCR'd.
//!
//! `Pdfium` is `!Send`, so every call binds the library afresh. The dynamic
//! loader caches the handle after the first bind.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Longest rendered edge. Larger pages are scaled down keeping aspect ratio.
const MAX_EDGE_PX: u32 = 5000;

const POINTS_PER_INCH: f32 = 72.0;

/// Pixel size of a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RenderSize {
    pub width: u32,
    pub height: u32,
    /// True when the page was scaled down to fit `MAX_EDGE_PX`.
    pub capped: bool,
}

impl RenderSize {
    pub(crate) fn for_page(width_pt: f32, height_pt: f32, dpi: u32) -> Self {
        let w = (width_pt * dpi as f32 / POINTS_PER_INCH).max(1.0);
        let h = (height_pt * dpi as f32 / POINTS_PER_INCH).max(1.0);
        let max = MAX_EDGE_PX as f32;

        if w.max(h) <= max {
            return Self {
                width: w as u32,
                height: h as u32,
                capped: false,
            };
        }
        let (width, height) = if w >= h {
            (MAX_EDGE_PX, (h * max / w).round() as u32)
        } else {
            ((w * max / h).round() as u32, MAX_EDGE_PX)
        };
        Self {
            width: width.max(1),
            height: height.max(1),
            capped: true,
        }
    }
}

/// PDFium-backed page renderer.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Check that the PDFium library can be bound on this host.
    pub fn check_available() -> Result<(), ExtractionError> {
        bind_pdfium().map(|_| ())
    }
}

fn render_error(page: usize, reason: impl Into<String>) -> ExtractionError {
    ExtractionError::PdfRendering {
        page,
        reason: reason.into(),
    }
}

/// Bind PDFium from `PDFIUM_DYNAMIC_LIB_PATH`, then next to the executable
/// (or its `pdfium/lib`), then the system search path.
fn bind_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| render_error(0, format!("cannot load PDFium from {path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    let exe_dirs: Vec<PathBuf> = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| vec![d.to_path_buf(), d.join("pdfium").join("lib")]))
        .unwrap_or_default();
    for dir in &exe_dirs {
        let lib = Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
            debug!(dir = %dir.display(), "PDFium bound next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| render_error(0, format!("PDFium not found (set PDFIUM_DYNAMIC_LIB_PATH): {e}")))
}

fn encode_png(image: &image::DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(out.into_inner())
}

impl PdfPageRenderer for PdfiumRenderer {
    fn render_page(&self, pdf_bytes: &[u8], page_index: usize, dpi: u32) -> Result<Vec<u8>, ExtractionError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium.load_pdf_from_byte_slice(pdf_bytes, None).map_err(|e| {
            let msg = e.to_string().to_lowercase();
            if msg.contains("password") || msg.contains("encrypt") {
                ExtractionError::PdfEncrypted
            } else {
                render_error(page_index, format!("cannot open PDF: {e}"))
            }
        })?;

        let page = u16::try_from(page_index)
            .ok()
            .and_then(|i| document.pages().get(i).ok())
            .ok_or_else(|| render_error(page_index, "page index out of range"))?;

        let size = RenderSize::for_page(page.width().value, page.height().value, dpi);
        if size.capped {
            warn!(page = page_index, width = size.width, height = size.height, "Oversized page scaled down");
        }

        let config = PdfRenderConfig::new()
            .set_target_width(size.width as i32)
            .set_maximum_height(size.height as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| render_error(page_index, e.to_string()))?;
        let png = encode_png(&bitmap.as_image())?;

        debug!(page = page_index, width = size.width, height = size.height, bytes = png.len(), "Page rasterized");
        Ok(png)
    }
}

/// Renderer stand-in for tests. Returns a 1x1 PNG for pages below
/// `page_count` and counts calls.
pub struct MockPdfPageRenderer {
    page_count: usize,
    renders: AtomicUsize,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            renders: AtomicUsize::new(0),
        }
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn render_page(&self, _pdf_bytes: &[u8], page_index: usize, _dpi: u32) -> Result<Vec<u8>, ExtractionError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if page_index >= self.page_count {
            return Err(render_error(page_index, "page index out of range"));
        }
        encode_png(&image::DynamicImage::new_rgb8(1, 1))
    }
}
