use serde::{Deserialize, Serialize};

use super::enums::{DocumentType, PageType};

/// Contiguous run of pages sharing one page type inside a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub page_type: PageType,
    pub page_start: u32,
    pub page_end: u32,
}

/// A logical document segmented out of one source PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub source_document_id: String,
    pub page_start: u32,
    pub page_end: u32,
    pub page_types: Vec<PageSpan>,
    pub declared_type: DocumentType,
    pub dominant_page_type: PageType,
    pub provider_id: Option<String>,
}

impl Document {
    pub fn contains_page(&self, page_number: u32) -> bool {
        (self.page_start..=self.page_end).contains(&page_number)
    }
}
