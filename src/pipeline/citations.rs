//! Citation arena.
//!
//! Every fact, date and provider mention points into this store by id.
//! Captures are deduplicated on `(page, snippet hash)` so the same line cited
//! by two extractors yields one citation.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::ids::IdAllocator;
use crate::models::{BBox, BBoxSource, Citation, Page};

/// Longest snippet stored on a citation, in characters.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// Page margin assumed by the line estimator, in points.
const MARGIN_PT: f32 = 36.0;

/// Upper bound on estimated line height, in points.
const MAX_LINE_HEIGHT_PT: f32 = 14.0;

/// Outcome of a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub citation_id: String,
    /// True when this call created the citation (false on dedup hit)
    pub created: bool,
    pub bbox_source: BBoxSource,
}

#[derive(Debug)]
pub struct CitationStore {
    ids: IdAllocator,
    citations: Vec<Citation>,
    index: HashMap<(u32, String), usize>,
}

impl CitationStore {
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::new("cit", 6),
            citations: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Cite `snippet` on `page`. Returns `None` for blank snippets.
    pub fn capture(&mut self, page: &Page, snippet: &str) -> Option<Captured> {
        let snippet = truncate_chars(snippet.trim(), MAX_SNIPPET_CHARS);
        if snippet.is_empty() {
            return None;
        }

        let text_hash = snippet_hash(&snippet);
        let key = (page.page_number, text_hash.clone());
        if let Some(&existing) = self.index.get(&key) {
            let citation = &self.citations[existing];
            return Some(Captured {
                citation_id: citation.citation_id.clone(),
                created: false,
                bbox_source: citation.bbox_source,
            });
        }

        let (bbox, bbox_source) = estimate_bbox(page, &snippet);
        let citation = Citation {
            citation_id: self.ids.next_id(),
            source_document_id: page.source_document_id.clone(),
            page_number: page.page_number,
            snippet,
            bbox,
            bbox_source,
            text_hash,
        };
        let captured = Captured {
            citation_id: citation.citation_id.clone(),
            created: true,
            bbox_source,
        };
        self.index.insert(key, self.citations.len());
        self.citations.push(citation);
        Some(captured)
    }

    pub fn get(&self, citation_id: &str) -> Option<&Citation> {
        self.citations.iter().find(|c| c.citation_id == citation_id)
    }

    pub fn len(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    pub fn into_vec(self) -> Vec<Citation> {
        self.citations
    }

    pub fn as_slice(&self) -> &[Citation] {
        &self.citations
    }
}

impl Default for CitationStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn snippet_hash(snippet: &str) -> String {
    format!("{:x}", Sha256::digest(snippet.as_bytes()))
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Locate the snippet's first line in the page text and derive a box from its
/// line position. Falls back to the whole page when the line is not found.
fn estimate_bbox(page: &Page, snippet: &str) -> (BBox, BBoxSource) {
    let width = page.layout.width;
    let height = page.layout.height;
    let lines: Vec<&str> = page.text.lines().collect();
    let first = snippet.lines().next().unwrap_or("").trim();
    let span = snippet.lines().count().max(1);

    let position = if first.is_empty() {
        None
    } else {
        lines.iter().position(|l| l.contains(first))
    };

    match position {
        Some(line_idx) => {
            let usable = (height - 2.0 * MARGIN_PT).max(1.0);
            let line_h = (usable / lines.len().max(1) as f32).min(MAX_LINE_HEIGHT_PT);
            let y = (MARGIN_PT + line_idx as f32 * line_h).min(height - line_h);
            let h = (line_h * span as f32).min(height - y);
            (
                BBox {
                    x: MARGIN_PT,
                    y,
                    w: (width - 2.0 * MARGIN_PT).max(1.0),
                    h,
                },
                BBoxSource::LineEstimate,
            )
        }
        None => (
            BBox {
                x: 0.0,
                y: 0.0,
                w: width,
                h: height,
            },
            BBoxSource::PageFallback,
        ),
    }
}
