use serde::{Deserialize, Serialize};

/// Machine-readable warning codes recorded on the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    OcrUnavailable,
    OcrNoText,
    PageTypeLowConf,
    MissingDate,
    MaxPagesExceeded,
    BboxFallback,
    NoProvidersDetected,
    PtPerVisitFallback,
    RunBudgetExceeded,
    SchemaValidationFailed,
    CachedGraphReused,
    PdfOpenError,
}

impl WarningCode {
    /// Codes that demote an otherwise successful run to `partial`.
    pub fn degrades_run(&self) -> bool {
        matches!(
            self,
            Self::MaxPagesExceeded | Self::RunBudgetExceeded | Self::SchemaValidationFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            page: None,
            document_id: None,
        }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn in_document(mut self, document_id: &str) -> Self {
        self.document_id = Some(document_id.to_string());
        self
    }
}
