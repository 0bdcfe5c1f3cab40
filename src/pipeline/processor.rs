//! Run orchestrator.
//!
//! Drives one matter's sources through every stage in a fixed order:
//! import → paginate → OCR → classify → demographics → providers → segment →
//! extract → merge → score → billing → chronology → gaps → requests →
//! cross-checks → receipt.
//!
//! Engines are injected as traits so the runner is testable with mocks.
//! A `RunRecord` is always returned; fatal errors mark it `failed`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::time::Instant;

use crate::billing::{build_billing_ledger, specials_summary};
use crate::config::SCHEMA_VERSION;
use crate::crosscheck::apply_cross_checks;
use crate::db::{load_cached_graph, open_database, save_graph_cache, save_run, DatabaseError, GraphCacheKey};
use crate::export::{build_provider_directory, chronology_csv, ExportError};
use crate::models::{EvidenceGraph, RunMetrics, RunRecord, RunStatus, Warning, WarningCode};
use crate::pipeline::confidence::score_events;
use crate::pipeline::context::RunContext;
use crate::pipeline::dedup::merge_events;
use crate::pipeline::demographics::extract_demographics;
use crate::pipeline::events::{extract_events, ExtractionInput};
use crate::pipeline::extraction::pdfium::PdfiumRenderer;
use crate::pipeline::extraction::{
    acquire_text, paginate, ExtractionError, OcrBackend, OcrEngine, PdfExtractor, PdfTextExtractor,
};
use crate::pipeline::import::{compute_inputs_hash, import_sources, ImportError, SourceInput};
use crate::pipeline::receipt::{compute_metrics, outputs_hash, provenance};
use crate::pipeline::validate::validate_graph;
use crate::pipeline::{classify::classify_pages, providers, segment::segment_documents};
use crate::pipeline_config::{ConfigError, OcrConfig, RunConfig};
use crate::timeline::{assemble_chronology, build_record_requests, detect_gaps, missing_records};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that abort a run. Everything else degrades into warnings.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Run store error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// The run record, plus the graph unless the run failed.
#[derive(Debug)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub graph: Option<EvidenceGraph>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct PipelineRunner {
    config: RunConfig,
    extractor: Arc<dyn PdfExtractor>,
    ocr: OcrBackend,
    store: Option<PathBuf>,
}

impl PipelineRunner {
    pub fn new(config: RunConfig, extractor: Arc<dyn PdfExtractor>, ocr: OcrBackend) -> Self {
        Self {
            config,
            extractor,
            ocr,
            store: None,
        }
    }

    /// Persist runs and cache graphs in the SQLite store at `path`.
    pub fn with_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.store = Some(path.into());
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Process one matter's sources, in upload order.
    pub async fn run(&self, matter_id: &str, inputs: Vec<SourceInput>) -> RunOutcome {
        let started = Instant::now();
        let mut record = RunRecord::new(matter_id);
        record.start();
        tracing::info!(run_id = %record.run_id, matter_id, inputs = inputs.len(), "Run started");

        match self.execute(&mut record, inputs, started).await {
            Ok(graph) => {
                tracing::info!(
                    run_id = %record.run_id,
                    status = %record.status,
                    events = graph.events.len(),
                    exported = graph.chronology.len(),
                    warnings = record.warnings.len(),
                    elapsed_ms = record.metrics.processing_ms,
                    "Run finished"
                );
                RunOutcome {
                    record,
                    graph: Some(graph),
                }
            }
            Err(e) => {
                tracing::error!(run_id = %record.run_id, error = %e, "Run failed");
                record.fail(e.to_string());
                record.metrics.processing_ms = elapsed_ms(started);
                self.persist_failure(&record);
                RunOutcome { record, graph: None }
            }
        }
    }

    async fn execute(
        &self,
        record: &mut RunRecord,
        inputs: Vec<SourceInput>,
        started: Instant,
    ) -> Result<EvidenceGraph, PipelineError> {
        self.config.validate()?;
        let sources = import_sources(inputs)?;

        let inputs_hash = compute_inputs_hash(sources.iter().map(|s| s.sha256.as_str()));
        let config_hash = self.config.config_hash();
        record.provenance = provenance(&inputs_hash, &config_hash, self.ocr_engine_name());

        let store = self.store.as_deref().map(open_database).transpose()?;
        if let Some(conn) = &store {
            let cached = load_cached_graph(conn, &GraphCacheKey::for_run(record))?;
            if let Some((graph, cached_hash)) = cached {
                tracing::info!(run_id = %record.run_id, inputs_hash = %inputs_hash, "Reusing cached graph");
                let mut finished = record.clone();
                finished.warnings.push(Warning::new(
                    WarningCode::CachedGraphReused,
                    "Inputs and config unchanged since a previous run; graph reused",
                ));
                finished.metrics = RunMetrics {
                    processing_ms: elapsed_ms(started),
                    cache_hit: true,
                    ..compute_metrics(&graph)
                };
                finished.provenance.outputs_hash = Some(cached_hash);
                finished.finish();
                save_run(conn, &finished)?;
                *record = finished;
                return Ok(graph);
            }
        }

        let deadline = started + Duration::from_secs(self.config.run_budget_secs);
        let mut ctx = RunContext::new();
        let mut graph = EvidenceGraph {
            schema_version: SCHEMA_VERSION.to_string(),
            matter_id: record.matter_id.clone(),
            source_documents: sources,
            ..EvidenceGraph::default()
        };

        'stages: {
            let pagination = paginate(
                &mut graph.source_documents,
                self.extractor.as_ref(),
                self.config.max_pages,
                &mut ctx,
            )?;
            graph.pages = pagination.pages;
            if budget_exhausted(deadline, "text acquisition", &mut ctx) {
                break 'stages;
            }

            acquire_text(
                &mut graph.pages,
                &graph.source_documents,
                &self.ocr,
                &self.config.ocr,
                deadline,
                &mut ctx,
            )
            .await;
            if budget_exhausted(deadline, "page classification", &mut ctx) {
                break 'stages;
            }

            classify_pages(&mut graph.pages, &mut ctx);
            graph.extensions.patient = extract_demographics(&graph.pages, &mut ctx);
            let resolution = providers::resolve_providers(&graph.pages, &mut ctx);
            graph.providers = resolution.providers;
            graph.documents = segment_documents(&graph.pages, &resolution.page_providers, &mut ctx);
            if budget_exhausted(deadline, "event extraction", &mut ctx) {
                break 'stages;
            }

            let extracted = extract_events(
                &ExtractionInput::new(&graph.pages, &graph.documents, &resolution.page_providers, &self.config),
                &mut ctx,
            );
            graph.extensions.skipped_events = extracted.skipped;
            let mut events = merge_events(extracted.events);
            score_events(&mut events, &graph.pages, &self.config);
            graph.events = events;

            let ledger = build_billing_ledger(&graph.pages, &resolution.page_providers, &mut ctx);
            graph.extensions.specials_summary = Some(specials_summary(&ledger, &graph.providers));
            graph.extensions.billing_lines = Some(ledger);
            if budget_exhausted(deadline, "chronology assembly", &mut ctx) {
                break 'stages;
            }

            graph.chronology = assemble_chronology(&graph.events, &self.config);
            graph.gaps = detect_gaps(&graph.events, &graph.chronology, &self.config);
            graph.extensions.missing_records = Some(missing_records(&graph.gaps, &self.config));
            graph.extensions.record_requests = Some(build_record_requests(&graph.gaps, &graph.providers));
            if budget_exhausted(deadline, "cross-checks", &mut ctx) {
                break 'stages;
            }

            apply_cross_checks(&mut graph, &self.config);
        }

        graph.citations = std::mem::take(&mut ctx.citations).into_vec();
        providers::apply_event_stats(&mut graph.providers, &graph.events);
        graph.extensions.provider_directory = Some(build_provider_directory(&graph));

        let issues = validate_graph(&graph);
        if let Some(first) = issues.first() {
            ctx.warn(Warning::new(
                WarningCode::SchemaValidationFailed,
                format!("{} integrity issue(s); first: {first}", issues.len()),
            ));
        }

        let csv = chronology_csv(&graph)?;
        let digest = outputs_hash(&graph, &csv)?;

        let mut finished = record.clone();
        finished.warnings = ctx.warnings;
        finished.metrics = RunMetrics {
            processing_ms: elapsed_ms(started),
            ..compute_metrics(&graph)
        };
        finished.provenance.outputs_hash = Some(digest.clone());
        finished.finish();

        if let Some(conn) = &store {
            persist(conn, &finished, &graph, &digest)?;
        }
        *record = finished;
        Ok(graph)
    }

    fn ocr_engine_name(&self) -> Option<&str> {
        if !self.config.ocr.enabled {
            return None;
        }
        self.ocr.engine.as_ref().map(|e| e.engine_name())
    }

    /// Best effort: a failed run is recorded if the store is reachable.
    fn persist_failure(&self, record: &RunRecord) {
        let Some(path) = &self.store else {
            return;
        };
        if let Err(e) = open_database(path).and_then(|conn| save_run(&conn, record)) {
            tracing::warn!(run_id = %record.run_id, error = %e, "Could not record failed run");
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// True (and warned) once the run deadline has passed.
fn budget_exhausted(deadline: Instant, next_stage: &str, ctx: &mut RunContext) -> bool {
    if Instant::now() < deadline {
        return false;
    }
    ctx.warn(Warning::new(
        WarningCode::RunBudgetExceeded,
        format!("Run budget exhausted before {next_stage}; remaining stages skipped"),
    ));
    true
}

/// Save the run. Only successful runs populate the graph cache, and a run
/// that left scanned pages without OCR is never reused.
fn persist(conn: &Connection, record: &RunRecord, graph: &EvidenceGraph, digest: &str) -> Result<(), DatabaseError> {
    save_run(conn, record)?;
    if !is_cacheable(record) {
        tracing::debug!(run_id = %record.run_id, status = %record.status, "Graph not cached");
        return Ok(());
    }
    save_graph_cache(conn, &GraphCacheKey::for_run(record), &record.run_id, digest, graph)
}

fn is_cacheable(record: &RunRecord) -> bool {
    record.status == RunStatus::Success
        && !record
            .warnings
            .iter()
            .any(|w| w.code == WarningCode::OcrUnavailable)
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build a runner with production engines.
///
/// - Text: `PdfTextExtractor`
/// - Rendering: `PdfiumRenderer`
/// - OCR: `TesseractEngine` (feature `ocr`), otherwise none
pub fn build_runner(config: RunConfig, store: Option<&Path>) -> PipelineRunner {
    let ocr = build_ocr_backend(&config.ocr);
    let runner = PipelineRunner::new(config, Arc::new(PdfTextExtractor), ocr);
    match store {
        Some(path) => runner.with_store(path),
        None => runner,
    }
}

/// OCR needs both PDFium and an engine; missing either leaves OCR off and
/// scanned pages get `OCR_UNAVAILABLE`.
pub fn build_ocr_backend(config: &OcrConfig) -> OcrBackend {
    let renderer = Arc::new(PdfiumRenderer);
    if !config.enabled {
        return OcrBackend { renderer, engine: None };
    }
    if let Err(e) = PdfiumRenderer::check_available() {
        tracing::warn!(error = %e, "PDFium not available, scanned pages will not be OCR'd");
        return OcrBackend { renderer, engine: None };
    }
    OcrBackend {
        renderer,
        engine: build_ocr_engine(config),
    }
}

#[cfg(feature = "ocr")]
fn build_ocr_engine(_config: &OcrConfig) -> Option<Arc<dyn OcrEngine>> {
    match crate::pipeline::extraction::TesseractEngine::locate() {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            tracing::warn!(error = %e, "Tesseract data not found, scanned pages will not be OCR'd");
            None
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn build_ocr_engine(_config: &OcrConfig) -> Option<Arc<dyn OcrEngine>> {
    tracing::info!("Built without the `ocr` feature, scanned pages will not be OCR'd");
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
