use serde::{Deserialize, Serialize};

/// All import parameters in one struct.
/// Serializable so presets can be saved and loaded with `--config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    // -- Bitmap stage --
    /// How hard to clean up the scan before contour extraction.
    pub preprocessing: PreprocessingLevel,

    // -- OCR stage --
    /// Words recognized with lower confidence (0-100) are ignored.
    pub min_ocr_confidence: f64,

    // -- Matching --
    /// Maximum distance in pixels between a label and the edge it describes.
    pub max_dimension_distance: f64,

    // -- Scale --
    /// Minimum number of matched dimensions needed to estimate scale.
    pub min_scale_dimensions: usize,
    /// Scale spread (percent) above which a consistency warning is raised.
    pub max_scale_variance: f64,

    // -- Output --
    /// Shift world coordinates so the vertex centroid sits at the origin.
    pub center_at_origin: bool,

    /// Contour selection and polygon approximation.
    pub boundary: BoundaryConfig,
}

/// Preprocessing strength applied before contour extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessingLevel {
    /// Otsu threshold only. Clean digital plans.
    Light,
    /// Light blur, then threshold. Typical scans.
    #[default]
    Standard,
    /// Heavier blur, threshold, then morphological close. Phone photos.
    Aggressive,
}

/// Tunables for the boundary selector.
///
/// The multiplier list is a heuristic search schedule, not an exact
/// algorithmic constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Contours smaller than this (px²) are treated as noise.
    pub min_contour_area: f64,
    /// Base approximation tolerance as a fraction of the contour perimeter.
    pub epsilon_fraction: f64,
    /// Retry factors applied to the base epsilon, tried in order.
    pub epsilon_multipliers: Vec<f64>,
    /// Base vertex counts in this range trigger the retry schedule.
    pub refine_range: (usize, usize),
    /// Vertex count preferred by the retry schedule.
    pub target_vertices: usize,
    /// Final vertex counts outside this range are rejected.
    pub min_vertices: usize,
    pub max_vertices: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            min_contour_area: 1000.0,
            epsilon_fraction: 0.05,
            epsilon_multipliers: vec![1.5, 2.0, 2.5, 3.0, 4.0],
            refine_range: (5, 12),
            target_vertices: 4,
            min_vertices: 3,
            max_vertices: 20,
        }
    }
}

/// Tunables for the scale calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub min_matches: usize,
    /// Percent spread above which a warning is attached.
    pub max_variance: f64,
    /// Samples further than this many standard deviations are dropped.
    pub outlier_z: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            min_matches: 2,
            max_variance: 15.0,
            outlier_z: 2.0,
        }
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            preprocessing: PreprocessingLevel::Standard,
            min_ocr_confidence: 60.0,
            max_dimension_distance: 200.0,
            min_scale_dimensions: 2,
            max_scale_variance: 15.0,
            center_at_origin: true,
            boundary: BoundaryConfig::default(),
        }
    }
}

impl ImportOptions {
    /// Scale settings derived from the import options.
    pub fn scale_config(&self) -> ScaleConfig {
        ScaleConfig {
            min_matches: self.min_scale_dimensions,
            max_variance: self.max_scale_variance,
            ..ScaleConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let opts: ImportOptions =
            serde_json::from_str(r#"{"min_ocr_confidence": 75, "preprocessing": "light"}"#)
                .unwrap();
        assert_eq!(opts.min_ocr_confidence, 75.0);
        assert_eq!(opts.preprocessing, PreprocessingLevel::Light);
        assert_eq!(opts.max_dimension_distance, 200.0);
        assert_eq!(opts.boundary.epsilon_multipliers, vec![1.5, 2.0, 2.5, 3.0, 4.0]);
    }

    #[test]
    fn scale_config_follows_options() {
        let opts = ImportOptions {
            min_scale_dimensions: 3,
            max_scale_variance: 8.0,
            ..ImportOptions::default()
        };
        let sc = opts.scale_config();
        assert_eq!(sc.min_matches, 3);
        assert_eq!(sc.max_variance, 8.0);
        assert_eq!(sc.outlier_z, 2.0);
    }
}
