use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::types::{OcrEngine, OcrPageResult};
use super::ExtractionError;

/// Language data every tessdata directory must carry.
#[cfg(feature = "ocr")]
const REQUIRED_TRAINEDDATA: &str = "eng.traineddata";

/// Tesseract via libtesseract. Built with the `ocr` feature only.
///
/// A fresh `Tesseract` handle is created per page; handles are not `Sync`.
#[cfg(feature = "ocr")]
pub struct TesseractEngine {
    tessdata: String,
}

#[cfg(feature = "ocr")]
impl TesseractEngine {
    pub fn with_tessdata(dir: &std::path::Path) -> Result<Self, ExtractionError> {
        if !dir.join(REQUIRED_TRAINEDDATA).is_file() {
            return Err(ExtractionError::TessdataNotFound(dir.to_path_buf()));
        }
        let tessdata = dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit(format!("non UTF-8 tessdata path {}", dir.display())))?
            .to_string();
        Ok(Self { tessdata })
    }

    /// `TESSDATA_PREFIX` first, then the usual distro and Homebrew locations.
    pub fn locate() -> Result<Self, ExtractionError> {
        let env_dir = std::env::var_os("TESSDATA_PREFIX").map(std::path::PathBuf::from);
        let known = [
            "/usr/share/tesseract-ocr/5/tessdata",
            "/usr/share/tesseract-ocr/4.00/tessdata",
            "/usr/share/tessdata",
            "/usr/local/share/tessdata",
            "/opt/homebrew/share/tessdata",
        ]
        .map(std::path::PathBuf::from);

        let found = env_dir
            .iter()
            .chain(known.iter())
            .find(|dir| dir.join(REQUIRED_TRAINEDDATA).is_file());
        match found {
            Some(dir) => {
                tracing::info!(tessdata = %dir.display(), "Tesseract data located");
                Self::with_tessdata(dir)
            }
            None => Err(ExtractionError::TessdataNotFound(
                env_dir.clone().unwrap_or_else(|| known[0].clone()),
            )),
        }
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractEngine {
    fn recognize(&self, png: &[u8], lang: &str) -> Result<OcrPageResult, ExtractionError> {
        let mut tess = tesseract::Tesseract::new(Some(self.tessdata.as_str()), Some(lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{lang}: {e:?}")))?
            .set_image_from_mem(png)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
        // mean_text_conf is 0-100, negative when nothing was recognized
        let confidence = tess.mean_text_conf().clamp(0, 100) as f32 / 100.0;

        Ok(OcrPageResult { text, confidence })
    }

    fn engine_name(&self) -> &str {
        "tesseract"
    }
}

/// Scripted engine for tests. Counts calls so tests can assert each page is
/// recognized at most once, and tracks how many calls overlapped.
pub struct MockOcrEngine {
    text: String,
    confidence: f32,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Every call returns an engine error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("", 0.0)
        }
    }

    /// Block before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls ever running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _png: &[u8], _lang: &str) -> Result<OcrPageResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExtractionError::OcrProcessing("mock engine failure".into()));
        }
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }

    fn engine_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_scripted_text() {
        let engine = MockOcrEngine::new("Date of Service: 01/02/2024", 0.92);
        let result = engine.recognize(b"png", "eng").unwrap();
        assert_eq!(result.text, "Date of Service: 01/02/2024");
        assert!((result.confidence - 0.92).abs() < f32::EPSILON);
    }

    #[test]
    fn mock_counts_every_call() {
        let engine = MockOcrEngine::new("text", 0.9);
        engine.recognize(b"a", "eng").unwrap();
        engine.recognize(b"b", "spa").unwrap();
        assert_eq!(engine.call_count(), 2);
    }

    #[test]
    fn mock_tracks_overlapping_calls() {
        let engine = std::sync::Arc::new(MockOcrEngine::new("text", 0.9).with_delay(Duration::from_millis(200)));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.recognize(b"a", "eng").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(engine.peak_concurrency(), 2);

        engine.recognize(b"b", "eng").unwrap();
        assert_eq!(engine.peak_concurrency(), 2);
    }

    #[test]
    fn failing_mock_still_counts() {
        let engine = MockOcrEngine::failing();
        assert!(matches!(
            engine.recognize(b"a", "eng"),
            Err(ExtractionError::OcrProcessing(_))
        ));
        assert_eq!(engine.call_count(), 1);
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn tessdata_without_english_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TesseractEngine::with_tessdata(dir.path()),
            Err(ExtractionError::TessdataNotFound(_))
        ));
    }
}
