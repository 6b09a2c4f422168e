use std::fmt;

use thiserror::Error;

/// Why a single edge length was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthProblem {
    NotANumber,
    NotPositive,
    TooSmall,
    TooLarge,
}

impl fmt::Display for LengthProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthProblem::NotANumber => write!(f, "not a number"),
            LengthProblem::NotPositive => write!(f, "not positive"),
            LengthProblem::TooSmall => write!(f, "too small (minimum 0.1)"),
            LengthProblem::TooLarge => write!(f, "too large (maximum 9999)"),
        }
    }
}

/// Errors that can occur while importing a site plan or reconstructing a shape.
///
/// Everything here is fatal for the current run. Advisory conditions
/// (odd angles, inconsistent scale, area mismatch) travel as warnings
/// on the result instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PlanError {
    #[error("failed to load image: {0}")]
    ImageLoad(String),

    // -- Boundary detection --
    #[error("no contours detected in image")]
    NoContours,

    #[error("no valid contours above minimum area ({min_area} px²)")]
    NoValidContours { min_area: f64 },

    #[error("boundary has {0} vertices; a property boundary needs between 3 and 20")]
    VertexCount(usize),

    // -- Scale --
    #[error("found {found} matched dimensions, need at least {required} to estimate scale")]
    InsufficientMatches { found: usize, required: usize },

    #[error("no valid scale could be derived from the matched dimensions")]
    NoValidScale,

    // -- Manual entry --
    #[error("need at least 3 dimensions, got {0}")]
    TooFewDimensions(usize),

    #[error("dimension {position} ({value}) is {problem}")]
    InvalidDimension {
        /// 1-based position in the input list.
        position: usize,
        value: f64,
        problem: LengthProblem,
    },

    #[error("cannot form a valid triangle from {a}, {b}, {c}: triangle inequality violated")]
    TriangleInequality { a: f64, b: f64, c: f64 },

    // -- OCR --
    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("OCR engine is not ready (state: {0})")]
    EngineNotReady(String),

    // -- Templates --
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("built-in template '{0}' cannot be modified")]
    BuiltInTemplate(String),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlanError {
    /// True for errors that mean the image could not be used at all,
    /// so the caller should fall back to manual entry.
    pub fn suggests_manual_entry(&self) -> bool {
        matches!(
            self,
            PlanError::NoContours
                | PlanError::NoValidContours { .. }
                | PlanError::VertexCount(_)
                | PlanError::InsufficientMatches { .. }
                | PlanError::NoValidScale
                | PlanError::Ocr(_)
                | PlanError::EngineNotReady(_)
        )
    }
}
