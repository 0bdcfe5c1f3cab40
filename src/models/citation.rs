use serde::{Deserialize, Serialize};

/// Rectangle on the page, in PDF points from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BBoxSource {
    /// Estimated from the snippet's line position in the page text.
    LineEstimate,
    /// Snippet could not be located; the whole page is cited.
    PageFallback,
}

/// A pointer to verifiable source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub citation_id: String,
    pub source_document_id: String,
    pub page_number: u32,
    pub snippet: String,
    pub bbox: BBox,
    pub bbox_source: BBoxSource,
    pub text_hash: String,
}
