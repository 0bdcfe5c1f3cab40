//! Text acquisition for pages without a usable text layer.
//!
//! OCR is the only parallel stage of the pipeline. Pages are rendered and
//! recognized on blocking worker threads behind a semaphore; each call is
//! bounded by a per-page timeout and by the shared OCR deadline. Results are
//! applied in page order, so output does not depend on completion order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::models::{Page, SourceDocument, TextSource, Warning, WarningCode};
use crate::pipeline::context::RunContext;
use crate::pipeline_config::OcrConfig;

use super::sanitize::sanitize_extracted_text;
use super::types::{OcrEngine, OcrPageResult, PdfPageRenderer};
use super::ExtractionError;

/// Outcome of OCR for one page.
#[derive(Debug, Clone, PartialEq)]
enum OcrOutcome {
    Text(String),
    Empty,
    Failed(String),
}

/// Engines used for OCR. `engine = None` means OCR is unavailable on this host.
#[derive(Clone)]
pub struct OcrBackend {
    pub renderer: Arc<dyn PdfPageRenderer>,
    pub engine: Option<Arc<dyn OcrEngine>>,
}

/// Summary of the acquisition stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AcquireReport {
    pub attempted: usize,
    pub recognized: usize,
    pub failed: usize,
}

/// OCR every page whose text source is still `none`.
///
/// Never fails the run: pages that cannot be recognized keep empty text,
/// are flagged, and produce a warning.
pub async fn acquire_text(
    pages: &mut [Page],
    sources: &[SourceDocument],
    backend: &OcrBackend,
    config: &OcrConfig,
    run_deadline: Instant,
    ctx: &mut RunContext,
) -> AcquireReport {
    let pending: Vec<usize> = pages
        .iter()
        .enumerate()
        .filter(|(_, p)| p.text_source == TextSource::None)
        .map(|(i, _)| i)
        .collect();

    let mut report = AcquireReport::default();
    if pending.is_empty() {
        return report;
    }

    let engine = match (&backend.engine, config.enabled) {
        (Some(engine), true) => Arc::clone(engine),
        _ => {
            for &idx in &pending {
                mark_failed(&mut pages[idx], "OCR engine not available", ctx);
            }
            report.failed = pending.len();
            return report;
        }
    };

    let bytes_by_source: HashMap<&str, Arc<Vec<u8>>> = sources
        .iter()
        .map(|s| (s.document_id.as_str(), Arc::clone(&s.bytes)))
        .collect();

    let ocr_deadline = (Instant::now() + Duration::from_secs(config.total_budget_secs)).min(run_deadline);
    let per_page = Duration::from_secs(config.per_page_timeout_secs);
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut tasks = JoinSet::new();

    for &idx in &pending {
        let page = &pages[idx];
        let Some(pdf_bytes) = bytes_by_source.get(page.source_document_id.as_str()).cloned() else {
            continue;
        };
        let page_index = page.source_page_index as usize;
        let renderer = Arc::clone(&backend.renderer);
        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        let lang = config.language.clone();
        let dpi = config.dpi;

        report.attempted += 1;
        tasks.spawn(async move {
            let outcome = recognize_page(semaphore, ocr_deadline, per_page, move || {
                let png = renderer.render_page(&pdf_bytes, page_index, dpi)?;
                let result = engine.recognize(&png, &lang)?;
                tracing::debug!(page = page_index, confidence = result.confidence, "Page recognized");
                Ok(result)
            })
            .await;
            (idx, outcome)
        });
    }

    let mut results = Vec::with_capacity(report.attempted);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!(error = %e, "OCR task aborted"),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);

    for (idx, outcome) in results {
        let page = &mut pages[idx];
        match outcome {
            OcrOutcome::Text(text) => {
                page.text = text;
                page.text_source = TextSource::Ocr;
                report.recognized += 1;
            }
            OcrOutcome::Empty => {
                page.flag(WarningCode::OcrNoText);
                ctx.warn(
                    Warning::new(WarningCode::OcrNoText, "OCR produced no text")
                        .on_page(page.page_number)
                        .in_document(&page.source_document_id),
                );
                report.failed += 1;
            }
            OcrOutcome::Failed(reason) => {
                mark_failed(page, &reason, ctx);
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        attempted = report.attempted,
        recognized = report.recognized,
        failed = report.failed,
        engine = engine.engine_name(),
        "Text acquisition complete"
    );

    report
}

/// Run one page's render and recognize on a blocking thread.
///
/// The worker permit moves into the blocking closure, so a page that times
/// out keeps its slot until the engine call really returns. Waiting for a
/// slot is bounded by the OCR deadline.
async fn recognize_page<F>(
    semaphore: Arc<Semaphore>,
    ocr_deadline: Instant,
    per_page: Duration,
    work: F,
) -> OcrOutcome
where
    F: FnOnce() -> Result<OcrPageResult, ExtractionError> + Send + 'static,
{
    let permit = match tokio::time::timeout_at(ocr_deadline, semaphore.acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) => return OcrOutcome::Failed("OCR pool closed".into()),
        Err(_) => return OcrOutcome::Failed("OCR budget exhausted".into()),
    };
    let now = Instant::now();
    if now >= ocr_deadline {
        return OcrOutcome::Failed("OCR budget exhausted".into());
    }

    let limit = per_page.min(ocr_deadline - now);
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        work()
    });
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(Ok(result))) => {
            let text = sanitize_extracted_text(&result.text);
            if text.is_empty() {
                OcrOutcome::Empty
            } else {
                OcrOutcome::Text(text)
            }
        }
        Ok(Ok(Err(e))) => OcrOutcome::Failed(e.to_string()),
        Ok(Err(join_err)) => OcrOutcome::Failed(format!("OCR worker panicked: {join_err}")),
        Err(_) => {
            tracing::warn!(timeout_s = limit.as_secs(), "OCR call still running after timeout; its worker stays busy");
            OcrOutcome::Failed(format!("OCR timed out after {}s", limit.as_secs()))
        }
    }
}

fn mark_failed(page: &mut Page, reason: &str, ctx: &mut RunContext) {
    page.text.clear();
    page.text_source = TextSource::None;
    page.flag(WarningCode::OcrUnavailable);
    ctx.warn(
        Warning::new(WarningCode::OcrUnavailable, reason)
            .on_page(page.page_number)
            .in_document(&page.source_document_id),
    );
}
