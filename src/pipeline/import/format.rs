use super::ImportError;

/// Result of format detection
#[derive(Debug, Clone, PartialEq)]
pub struct FormatDetection {
    pub mime_type: String,
    pub file_size_bytes: u64,
}

const MAX_FILE_SIZE: u64 = 500 * 1024 * 1024; // 500MB

/// Detect file format from magic bytes (NOT file extensions).
/// Only PDFs are accepted.
pub fn detect_format(filename: &str, bytes: &[u8]) -> Result<FormatDetection, ImportError> {
    let file_size = bytes.len() as u64;

    if file_size == 0 {
        return Err(ImportError::EmptyFile(filename.to_string()));
    }

    if file_size > MAX_FILE_SIZE {
        return Err(ImportError::FileTooLarge {
            size_mb: file_size as f64 / (1024.0 * 1024.0),
            max_mb: MAX_FILE_SIZE / (1024 * 1024),
        });
    }

    // Some producers prepend junk before the header; the PDF reference
    // allows the marker anywhere in the first 1024 bytes.
    let window = &bytes[..bytes.len().min(1024)];
    if find_subslice(window, b"%PDF-").is_some() {
        return Ok(FormatDetection {
            mime_type: "application/pdf".into(),
            file_size_bytes: file_size,
        });
    }

    let detected = match &bytes[..bytes.len().min(8)] {
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => "image/tiff",
        [0x50, 0x4B, 0x03, 0x04, ..] => "application/zip",
        _ => "unknown",
    };

    Err(ImportError::UnsupportedFormat {
        filename: filename.to_string(),
        detected: detected.to_string(),
    })
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
