use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{EvidenceGraph, RunRecord, RunStatus};

/// Insert or replace a run record. The full record is stored as JSON next to
/// the columns used for lookup.
pub fn save_run(conn: &Connection, run: &RunRecord) -> Result<(), DatabaseError> {
    let record_json = serde_json::to_string(run)?;
    conn.execute(
        "INSERT OR REPLACE INTO runs
            (run_id, matter_id, status, started_at, finished_at, inputs_hash, config_hash, outputs_hash, error, record_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.run_id.to_string(),
            run.matter_id,
            run.status.as_str(),
            run.started_at.map(|t| t.to_rfc3339()),
            run.finished_at.map(|t| t.to_rfc3339()),
            run.provenance.inputs_hash,
            run.provenance.config_hash,
            run.provenance.outputs_hash,
            run.error,
            record_json,
        ],
    )?;
    Ok(())
}

pub fn load_run(conn: &Connection, run_id: &Uuid) -> Result<RunRecord, DatabaseError> {
    let record_json: Option<String> = conn
        .query_row(
            "SELECT record_json FROM runs WHERE run_id = ?1",
            params![run_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    let record_json = record_json.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "run".into(),
        id: run_id.to_string(),
    })?;
    Ok(serde_json::from_str(&record_json)?)
}

/// Runs for one matter, oldest first, as `(run_id, status)`.
pub fn list_runs(conn: &Connection, matter_id: &str) -> Result<Vec<(String, RunStatus)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT run_id, status FROM runs
         WHERE matter_id = ?1
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt
        .query_map(params![matter_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(id, status)| status.parse::<RunStatus>().map(|s| (id, s)))
        .collect()
}

/// Identity of a reusable graph. Graphs never cross matters, and a graph
/// built without OCR (or with another engine) is not reused by a run that
/// has a different engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphCacheKey<'a> {
    pub matter_id: &'a str,
    pub inputs_hash: &'a str,
    pub config_hash: &'a str,
    pub ocr_engine: &'a str,
}

impl<'a> GraphCacheKey<'a> {
    /// Key taken from a run's matter and provenance. Runs without an OCR
    /// engine share the `none` slot.
    pub fn for_run(run: &'a RunRecord) -> Self {
        Self {
            matter_id: &run.matter_id,
            inputs_hash: &run.provenance.inputs_hash,
            config_hash: &run.provenance.config_hash,
            ocr_engine: run.provenance.ocr_engine.as_deref().unwrap_or("none"),
        }
    }
}

/// Cache a finished graph. The run row must already exist.
pub fn save_graph_cache(
    conn: &Connection,
    key: &GraphCacheKey<'_>,
    run_id: &Uuid,
    outputs_hash: &str,
    graph: &EvidenceGraph,
) -> Result<(), DatabaseError> {
    let graph_json = serde_json::to_string(graph)?;
    conn.execute(
        "INSERT OR REPLACE INTO graph_cache
            (matter_id, inputs_hash, config_hash, ocr_engine, run_id, outputs_hash, graph_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            key.matter_id,
            key.inputs_hash,
            key.config_hash,
            key.ocr_engine,
            run_id.to_string(),
            outputs_hash,
            graph_json
        ],
    )?;
    Ok(())
}

/// Cached graph and its outputs hash, if a run with this key finished before.
pub fn load_cached_graph(
    conn: &Connection,
    key: &GraphCacheKey<'_>,
) -> Result<Option<(EvidenceGraph, String)>, DatabaseError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT graph_json, outputs_hash FROM graph_cache
             WHERE matter_id = ?1 AND inputs_hash = ?2 AND config_hash = ?3 AND ocr_engine = ?4",
            params![key.matter_id, key.inputs_hash, key.config_hash, key.ocr_engine],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match row {
        Some((graph_json, outputs_hash)) => Ok(Some((serde_json::from_str(&graph_json)?, outputs_hash))),
        None => Ok(None),
    }
}
