//! Text recognition capability.
//!
//! The pipeline only needs word boxes with a confidence; where they come
//! from is behind [`TextRecognizer`]. Engines that need setup carry an
//! explicit [`EngineState`] instead of hidden global state.

use std::fmt;
use std::path::Path;

use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dimension::{BoundingBox, OcrWord};
use crate::error::PlanError;

/// Anything that can turn an image into word boxes.
pub trait TextRecognizer {
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<OcrWord>, PlanError>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<OcrWord>, PlanError> {
        (**self).recognize(image)
    }
}

/// Lifecycle of an engine that must be loaded before use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EngineState {
    #[default]
    NotLoaded,
    Loading,
    Ready,
    Failed(String),
}

impl EngineState {
    /// NotLoaded/Failed → Loading. Returns false if already loading or ready.
    pub fn begin_loading(&mut self) -> bool {
        match self {
            EngineState::NotLoaded | EngineState::Failed(_) => {
                *self = EngineState::Loading;
                true
            }
            EngineState::Loading | EngineState::Ready => false,
        }
    }

    /// Loading → Ready or Failed.
    pub fn finish_loading(&mut self, outcome: Result<(), String>) {
        if *self != EngineState::Loading {
            return;
        }
        *self = match outcome {
            Ok(()) => EngineState::Ready,
            Err(e) => EngineState::Failed(e),
        };
    }

    /// Any state → NotLoaded.
    pub fn reset(&mut self) {
        *self = EngineState::NotLoaded;
    }

    pub fn is_ready(&self) -> bool {
        *self == EngineState::Ready
    }

    /// Error to return when the engine is used before it is ready.
    pub fn ensure_ready(&self) -> Result<(), PlanError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(PlanError::EngineNotReady(self.to_string()))
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::NotLoaded => write!(f, "not loaded"),
            EngineState::Loading => write!(f, "loading"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Returns a fixed word list regardless of the image.
///
/// Used for pre-recognized input (a JSON sidecar next to the plan) and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRecognizer {
    words: Vec<OcrWord>,
}

impl StaticRecognizer {
    pub fn new(words: Vec<OcrWord>) -> Self {
        Self { words }
    }

    /// Load a JSON array of `{text, confidence, bbox: {x0, y0, x1, y1}}`.
    pub fn from_json_file(path: &Path) -> Result<Self, PlanError> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&json)?))
    }
}

impl TextRecognizer for StaticRecognizer {
    fn recognize(&mut self, _image: &DynamicImage) -> Result<Vec<OcrWord>, PlanError> {
        Ok(self.words.clone())
    }
}

static NUMERIC_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:[.,]\d+)*$").expect("invalid numeric pattern"));

static UNIT_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:m|meters?|metres?|ft|feet|foot|'|yds?|yards?)(?:²|\.)?$")
        .expect("invalid unit pattern")
});

/// Block, paragraph and line a recognized word belongs to.
pub(crate) type LineKey = (i32, i32, i32);

/// Re-join labels the engine split at whitespace: a number followed on the
/// same line by a unit-only word (`"20"`, `"m"`) becomes `"20 m"`.
///
/// Words are expected in reading order. The gap between the two boxes may
/// not exceed the number's height.
#[cfg_attr(not(feature = "tesseract"), allow(dead_code))]
pub(crate) fn join_split_labels(words: Vec<(OcrWord, LineKey)>) -> Vec<OcrWord> {
    let mut out: Vec<OcrWord> = Vec::with_capacity(words.len());
    let mut iter = words.into_iter().peekable();
    while let Some((word, line)) = iter.next() {
        let joinable = iter.peek().is_some_and(|(next, next_line)| {
            let gap = next.bbox.x0 - word.bbox.x1;
            *next_line == line
                && NUMERIC_WORD.is_match(&word.text)
                && UNIT_WORD.is_match(&next.text)
                && gap <= (word.bbox.y1 - word.bbox.y0).max(1.0)
        });
        if !joinable {
            out.push(word);
            continue;
        }
        let Some((unit, _)) = iter.next() else {
            out.push(word);
            continue;
        };
        out.push(OcrWord {
            text: format!("{} {}", word.text, unit.text),
            confidence: word.confidence.min(unit.confidence),
            bbox: BoundingBox::new(
                word.bbox.x0.min(unit.bbox.x0),
                word.bbox.y0.min(unit.bbox.y0),
                word.bbox.x1.max(unit.bbox.x1),
                word.bbox.y1.max(unit.bbox.y1),
            ),
        });
    }
    out
}

#[cfg(feature = "tesseract")]
pub use self::tesseract::TesseractEngine;

#[cfg(feature = "tesseract")]
mod tesseract {
    use std::collections::HashMap;

    use image::DynamicImage;
    use rusty_tesseract::{Args, Image};

    use super::{join_split_labels, EngineState, LineKey, TextRecognizer};
    use crate::dimension::{BoundingBox, OcrWord};
    use crate::error::PlanError;

    /// Tesseract via the system binary.
    #[derive(Debug)]
    pub struct TesseractEngine {
        state: EngineState,
        lang: String,
    }

    impl Default for TesseractEngine {
        fn default() -> Self {
            Self::new("eng")
        }
    }

    impl TesseractEngine {
        pub fn new(lang: &str) -> Self {
            Self {
                state: EngineState::NotLoaded,
                lang: lang.to_string(),
            }
        }

        pub fn state(&self) -> &EngineState {
            &self.state
        }

        /// Probe the tesseract binary. Safe to call again after a failure.
        pub fn initialize(&mut self) -> Result<(), PlanError> {
            if !self.state.begin_loading() {
                return self.state.ensure_ready();
            }
            let outcome = rusty_tesseract::get_tesseract_version()
                .map(|version| log::info!("tesseract {}", version.trim()))
                .map_err(|e| e.to_string());
            self.state.finish_loading(outcome);
            self.state
                .ensure_ready()
                .map_err(|_| PlanError::Ocr(self.state.to_string()))
        }

        pub fn terminate(&mut self) {
            self.state.reset();
        }

        fn args(&self, dpi: i32) -> Args {
            Args {
                lang: self.lang.clone(),
                config_variables: HashMap::new(),
                dpi: Some(dpi),
                psm: Some(11), // Sparse text: labels scattered around a drawing
                oem: Some(3),
            }
        }
    }

    impl TextRecognizer for TesseractEngine {
        fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<OcrWord>, PlanError> {
            self.state.ensure_ready()?;

            // Tesseract works best with text that's at least 10-12 pixels tall
            let min_dimension = image.width().min(image.height());
            let upscale = if min_dimension < 100 {
                4
            } else if min_dimension < 200 {
                2
            } else {
                1
            };
            let processed = if upscale > 1 {
                log::debug!("upscaling {}x for OCR", upscale);
                image.resize(
                    image.width() * upscale,
                    image.height() * upscale,
                    image::imageops::FilterType::Lanczos3,
                )
            } else {
                image.clone()
            };

            let tess_img = Image::from_dynamic_image(&processed)
                .map_err(|e| PlanError::Ocr(format!("failed to create tesseract image: {}", e)))?;
            let dpi = if min_dimension < 200 { 300 } else { 150 };
            let data = rusty_tesseract::image_to_data(&tess_img, &self.args(dpi))
                .map_err(|e| PlanError::Ocr(e.to_string()))?;

            // Tesseract coordinates are in upscaled image space.
            let f = upscale as f64;
            let rows: Vec<(OcrWord, LineKey)> = data
                .data
                .into_iter()
                .filter(|d| !d.text.trim().is_empty() && d.conf >= 0.0)
                .map(|d| {
                    let word = OcrWord {
                        text: d.text.trim().to_string(),
                        confidence: d.conf as f64,
                        bbox: BoundingBox::new(
                            d.left as f64 / f,
                            d.top as f64 / f,
                            (d.left + d.width) as f64 / f,
                            (d.top + d.height) as f64 / f,
                        ),
                    };
                    (word, (d.block_num, d.par_num, d.line_num))
                })
                .collect();
            let raw = rows.len();
            let words = join_split_labels(rows);
            log::info!("tesseract returned {} words ({} after joining labels)", raw, words.len());
            Ok(words)
        }
    }
}
