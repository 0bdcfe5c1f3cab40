use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use citeline::config::default_store_path;
use citeline::export::{billing_lines_csv, chronology_csv, specials_csv};
use citeline::models::RunStatus;
use citeline::pipeline::import::SourceInput;
use citeline::{build_runner, RunConfig};

#[derive(Parser)]
#[command(name = "citeline")]
#[command(about = "Build a cited medical chronology from record PDFs")]
#[command(version)]
struct Cli {
    /// Directory for evidence_graph.json, the CSV exports and run_record.json
    out_dir: PathBuf,

    /// Source PDFs, in upload order
    #[arg(required = true)]
    pdfs: Vec<PathBuf>,

    /// Matter the records belong to
    #[arg(short, long, default_value = "default")]
    matter: String,

    /// Run config as JSON (missing fields take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run store path (defaults to the app data directory)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Do not persist the run or reuse cached graphs
    #[arg(long)]
    no_store: bool,
}

/// How long shutdown waits for OCR threads still running after a page timed out.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    citeline::init_tracing();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => RunConfig::from_json_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => RunConfig::default(),
    };
    let inputs = cli
        .pdfs
        .iter()
        .map(|p| SourceInput::from_path(p).with_context(|| format!("reading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let store = if cli.no_store {
        None
    } else {
        Some(cli.store.clone().unwrap_or_else(default_store_path))
    };

    let runner = build_runner(config, store.as_deref());
    let outcome = runner.run(&cli.matter, inputs).await;

    std::fs::create_dir_all(&cli.out_dir).with_context(|| format!("creating {}", cli.out_dir.display()))?;
    write_json(&cli.out_dir.join("run_record.json"), &outcome.record)?;
    if let Some(graph) = &outcome.graph {
        write_json(&cli.out_dir.join("evidence_graph.json"), graph)?;
        let csv_path = cli.out_dir.join("chronology.csv");
        std::fs::write(&csv_path, chronology_csv(graph)?).with_context(|| format!("writing {}", csv_path.display()))?;
        if let Some(ledger) = &graph.extensions.billing_lines {
            write_bytes(&cli.out_dir.join("billing_lines.csv"), &billing_lines_csv(ledger)?)?;
        }
        if let Some(specials) = &graph.extensions.specials_summary {
            write_bytes(&cli.out_dir.join("specials_summary.csv"), &specials_csv(specials)?)?;
        }
    }

    println!(
        "{} {} ({} events exported, {} warnings)",
        outcome.record.run_id,
        outcome.record.status,
        outcome.record.metrics.events_exported,
        outcome.record.warnings.len()
    );

    if outcome.record.status == RunStatus::Failed {
        anyhow::bail!(outcome.record.error.unwrap_or_else(|| "run failed".into()));
    }
    Ok(())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}
