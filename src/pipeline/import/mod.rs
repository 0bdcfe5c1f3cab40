pub mod format;
pub mod hash;

pub use format::*;
pub use hash::*;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::models::SourceDocument;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format for {filename}: {detected}")]
    UnsupportedFormat { filename: String, detected: String },

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Empty file: {0}")]
    EmptyFile(String),

    #[error("No documents supplied")]
    NoInputs,
}

/// Raw upload as handed to the pipeline.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceInput {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a PDF from disk, keeping only the file name.
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }
}

/// Validate and hash one upload.
pub fn import_source(input: SourceInput) -> Result<SourceDocument, ImportError> {
    let detection = detect_format(&input.filename, &input.bytes)?;
    let sha256 = compute_content_hash(&input.bytes);

    tracing::debug!(
        filename = %input.filename,
        bytes = detection.file_size_bytes,
        sha256 = %sha256,
        "Imported source document"
    );

    Ok(SourceDocument {
        document_id: document_id_for(&sha256),
        filename: input.filename,
        mime_type: detection.mime_type,
        sha256,
        byte_size: detection.file_size_bytes,
        page_count: 0,
        bytes: Arc::new(input.bytes),
    })
}

/// Validate every upload, preserving upload order.
/// Any invalid input aborts the whole batch.
pub fn import_sources(inputs: Vec<SourceInput>) -> Result<Vec<SourceDocument>, ImportError> {
    if inputs.is_empty() {
        return Err(ImportError::NoInputs);
    }
    inputs.into_iter().map(import_source).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_bytes(tag: &str) -> Vec<u8> {
        format!("%PDF-1.4\n% {tag}\n%%EOF").into_bytes()
    }

    #[test]
    fn import_hashes_and_ids() {
        let doc = import_source(SourceInput::new("a.pdf", pdf_bytes("a"))).unwrap();
        assert_eq!(doc.sha256.len(), 64);
        assert_eq!(doc.document_id, doc.sha256[..16]);
        assert_eq!(doc.mime_type, "application/pdf");
        assert_eq!(doc.byte_size, doc.bytes.len() as u64);
    }

    #[test]
    fn import_rejects_non_pdf() {
        let result = import_source(SourceInput::new("notes.txt", b"hello world".to_vec()));
        assert!(matches!(result, Err(ImportError::UnsupportedFormat { .. })));
    }

    #[test]
    fn import_sources_preserves_order() {
        let docs = import_sources(vec![
            SourceInput::new("b.pdf", pdf_bytes("b")),
            SourceInput::new("a.pdf", pdf_bytes("a")),
        ])
        .unwrap();
        assert_eq!(docs[0].filename, "b.pdf");
        assert_eq!(docs[1].filename, "a.pdf");
    }

    #[test]
    fn empty_batch_rejected() {
        assert!(matches!(import_sources(vec![]), Err(ImportError::NoInputs)));
    }

    #[test]
    fn from_path_reads_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.pdf");
        std::fs::write(&path, pdf_bytes("x")).unwrap();
        let input = SourceInput::from_path(&path).unwrap();
        assert_eq!(input.filename, "records.pdf");
    }
}
