use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::enums::{PageType, TextSource};
use super::warning::WarningCode;

/// An uploaded PDF. Immutable once imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub document_id: String,
    pub filename: String,
    pub mime_type: String,
    /// Lowercase hex SHA-256 of the raw bytes
    pub sha256: String,
    pub byte_size: u64,
    pub page_count: u32,
    #[serde(skip)]
    pub bytes: Arc<Vec<u8>>,
}

/// Page geometry in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub units: PageUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageUnits {
    Pt,
}

impl PageLayout {
    pub const LETTER: PageLayout = PageLayout {
        width: 612.0,
        height: 792.0,
        units: PageUnits::Pt,
    };

    pub fn points(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            units: PageUnits::Pt,
        }
    }
}

/// One physical page, numbered globally across the whole upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub source_document_id: String,
    /// 0-based index within the source PDF
    pub source_page_index: u32,
    pub text: String,
    pub text_source: TextSource,
    pub page_type: PageType,
    pub page_type_score: u32,
    pub layout: PageLayout,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<WarningCode>,
}

impl Page {
    pub fn has_flag(&self, code: WarningCode) -> bool {
        self.flags.contains(&code)
    }

    pub fn flag(&mut self, code: WarningCode) {
        if !self.flags.contains(&code) {
            self.flags.push(code);
        }
    }

    /// Page type assigned with a best guess rather than a rule match.
    pub fn type_uncertain(&self) -> bool {
        self.has_flag(WarningCode::PageTypeLowConf)
    }
}
