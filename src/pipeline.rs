//! Site-plan import: image → scaled world polygon.
//!
//! 1. Threshold the scan
//! 2. Extract contours and select the boundary polygon
//! 3. Recognize text and parse dimension labels
//! 4. Match labels to edges, report and resolve conflicts
//! 5. Derive pixels-per-metre from the matched edges
//! 6. Convert the pixel polygon to centred world coordinates
//!
//! Steps run strictly in order. Fatal problems end the run with an error
//! on the [`ImportResult`]; everything advisory lands in its warnings.

use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use kurbo::Point;
use serde::Serialize;

use crate::bitmap;
use crate::boundary::{select_boundary, BoundarySelection};
use crate::config::ImportOptions;
use crate::contour::{self, GeoPrimitives};
use crate::dimension::{parse_dimensions, ExtractedDimension};
use crate::error::PlanError;
use crate::geom::{edges, polygon_area, Point3D};
use crate::matcher::{
    detect_conflicts, match_dimensions, resolve_conflicts, unmatched_dimensions, unmatched_edges,
    DimensionConflict, DimensionMatch,
};
use crate::ocr::TextRecognizer;
use crate::reconstruct::{angle_warnings, interior_angles};
use crate::scale::{calculate_scale, to_world, ScaleInfo};

/// Boundary confidence (0-1) below which the result is flagged.
const LOW_BOUNDARY_CONFIDENCE: f64 = 0.5;

/// Where the importer currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Preprocessing,
    DetectingBoundary,
    RecognizingText,
    ParsingDimensions,
    MatchingDimensions,
    CalculatingScale,
    Converting,
    Done,
}

impl ImportStage {
    /// Short label for progress output.
    pub fn label(self) -> &'static str {
        match self {
            ImportStage::Preprocessing => "Threshold",
            ImportStage::DetectingBoundary => "Boundary",
            ImportStage::RecognizingText => "OCR",
            ImportStage::ParsingDimensions => "Parse",
            ImportStage::MatchingDimensions => "Match",
            ImportStage::CalculatingScale => "Scale",
            ImportStage::Converting => "Convert",
            ImportStage::Done => "Done",
        }
    }

    /// Rough completion percentage when the stage starts.
    pub fn percent(self) -> u8 {
        match self {
            ImportStage::Preprocessing => 5,
            ImportStage::DetectingBoundary => 20,
            ImportStage::RecognizingText => 40,
            ImportStage::ParsingDimensions => 60,
            ImportStage::MatchingDimensions => 70,
            ImportStage::CalculatingScale => 85,
            ImportStage::Converting => 95,
            ImportStage::Done => 100,
        }
    }
}

type ProgressFn = Box<dyn FnMut(ImportStage, u8)>;

/// One boundary edge with its real-world length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedEdge {
    pub index: usize,
    pub pixel_length: f64,
    /// Pixel length divided by the scale.
    pub length_m: f64,
    /// The label matched to this edge, in metres.
    pub labelled_m: Option<f64>,
}

/// A successfully imported boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ImportedShape {
    /// World coordinates in metres, z = 0.
    pub vertices: Vec<Point3D>,
    pub pixel_vertices: Vec<Point>,
    /// m².
    pub area: f64,
    /// m.
    pub perimeter: f64,
    pub edges: Vec<ImportedEdge>,
    /// Interior angle at each vertex, degrees.
    pub angles: Vec<f64>,
    pub scale: ScaleInfo,
    /// One label per edge after conflict resolution.
    pub matches: Vec<DimensionMatch>,
    pub conflicts: Vec<DimensionConflict>,
    pub unmatched_dimensions: Vec<ExtractedDimension>,
    /// Edges the user still has to measure.
    pub unmatched_edges: Vec<usize>,
    pub boundary: BoundarySelection,
}

/// Counters collected along the way, filled as far as the run got.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportMetadata {
    pub image_width: u32,
    pub image_height: u32,
    pub contours_found: usize,
    pub boundary_vertices: usize,
    pub boundary_confidence: f64,
    pub epsilon_multiplier: f64,
    pub ocr_words: usize,
    pub dimensions_parsed: usize,
    pub matches: usize,
    pub elapsed_ms: u128,
    pub imported_at: Option<DateTime<Utc>>,
}

/// Outcome of one import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub shape: Option<ImportedShape>,
    pub error: Option<String>,
    /// The failure means the image is unusable; ask for dimensions by hand.
    pub manual_entry_suggested: bool,
    pub warnings: Vec<String>,
    pub metadata: ImportMetadata,
}

impl ImportResult {
    fn failed(err: PlanError, metadata: ImportMetadata) -> Self {
        let manual_entry_suggested = err.suggests_manual_entry();
        let error = if manual_entry_suggested {
            format!("{}. Try manual entry instead.", err)
        } else {
            err.to_string()
        };
        log::warn!("import failed: {}", error);
        Self {
            success: false,
            shape: None,
            error: Some(error),
            manual_entry_suggested,
            warnings: Vec::new(),
            metadata,
        }
    }
}

/// Runs the import pipeline with a given text recognizer.
pub struct SitePlanImporter<R> {
    recognizer: R,
    options: ImportOptions,
    progress: Option<ProgressFn>,
}

impl<R: TextRecognizer> SitePlanImporter<R> {
    pub fn new(recognizer: R, options: ImportOptions) -> Self {
        Self {
            recognizer,
            options,
            progress: None,
        }
    }

    /// Called at the start of every stage with the stage and a percentage.
    pub fn with_progress(mut self, callback: impl FnMut(ImportStage, u8) + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn recognizer_mut(&mut self) -> &mut R {
        &mut self.recognizer
    }

    /// Load an image file and import it.
    pub fn import_path(&mut self, path: &Path) -> ImportResult {
        match bitmap::load(path) {
            Ok(image) => self.import_image(&image),
            Err(e) => ImportResult::failed(e, ImportMetadata::default()),
        }
    }

    pub fn import_image(&mut self, image: &DynamicImage) -> ImportResult {
        let t_start = Instant::now();
        let mut metadata = ImportMetadata {
            image_width: image.width(),
            image_height: image.height(),
            ..ImportMetadata::default()
        };

        let outcome = self.run(image, &mut metadata);
        metadata.elapsed_ms = t_start.elapsed().as_millis();

        match outcome {
            Ok((shape, warnings)) => {
                metadata.imported_at = Some(Utc::now());
                self.report(ImportStage::Done);
                ImportResult {
                    success: true,
                    shape: Some(shape),
                    error: None,
                    manual_entry_suggested: false,
                    warnings,
                    metadata,
                }
            }
            Err(e) => ImportResult::failed(e, metadata),
        }
    }

    fn report(&mut self, stage: ImportStage) {
        log::debug!("stage {:?}", stage);
        if let Some(cb) = self.progress.as_mut() {
            cb(stage, stage.percent());
        }
    }

    fn run(
        &mut self,
        image: &DynamicImage,
        meta: &mut ImportMetadata,
    ) -> Result<(ImportedShape, Vec<String>), PlanError> {
        let opts = self.options.clone();
        let mut warnings = Vec::new();

        // ── Threshold ─────────────────────────────────────────
        self.report(ImportStage::Preprocessing);
        let binary = bitmap::preprocess(image, opts.preprocessing);

        // ── Boundary ──────────────────────────────────────────
        self.report(ImportStage::DetectingBoundary);
        let contours = contour::extract(&binary);
        meta.contours_found = contours.len();
        let boundary = select_boundary(&contours, &GeoPrimitives, &opts.boundary)?;
        meta.boundary_vertices = boundary.vertices.len();
        meta.boundary_confidence = boundary.confidence;
        meta.epsilon_multiplier = boundary.epsilon_multiplier;
        if boundary.confidence < LOW_BOUNDARY_CONFIDENCE {
            warnings.push(format!(
                "Boundary detection confidence is low ({:.0}%); check the outline",
                boundary.confidence * 100.0
            ));
        }

        // ── Text ──────────────────────────────────────────────
        self.report(ImportStage::RecognizingText);
        let words = self.recognizer.recognize(image)?;
        meta.ocr_words = words.len();

        self.report(ImportStage::ParsingDimensions);
        let dims = parse_dimensions(&words, opts.min_ocr_confidence);
        meta.dimensions_parsed = dims.len();
        log::info!("{} words → {} dimensions", words.len(), dims.len());

        // ── Match ─────────────────────────────────────────────
        self.report(ImportStage::MatchingDimensions);
        let edge_list = edges(&boundary.vertices);
        let raw = match_dimensions(&edge_list, &dims, opts.max_dimension_distance);
        let conflicts = detect_conflicts(&raw);
        for c in &conflicts {
            warnings.push(format!(
                "Edge {} has conflicting labels ({:.1}% apart); the most confident was used",
                c.edge_index + 1,
                c.variance
            ));
        }
        let matches = resolve_conflicts(&raw);
        meta.matches = matches.len();
        let stray = unmatched_dimensions(&dims, &raw);
        if !stray.is_empty() {
            warnings.push(format!("{} dimension label(s) were not near any edge", stray.len()));
        }
        let missing = unmatched_edges(&edge_list, &matches);
        if !missing.is_empty() {
            let list: Vec<String> = missing.iter().map(|i| (i + 1).to_string()).collect();
            warnings.push(format!(
                "Edge(s) {} have no dimension; enter them manually",
                list.join(", ")
            ));
        }

        // ── Scale ─────────────────────────────────────────────
        self.report(ImportStage::CalculatingScale);
        let scale = calculate_scale(&matches, &edge_list, &opts.scale_config())?;
        warnings.extend(scale.warnings.iter().cloned());

        // ── Convert ───────────────────────────────────────────
        self.report(ImportStage::Converting);
        let ppm = scale.pixels_per_meter;
        let vertices = to_world(&boundary.vertices, ppm, opts.center_at_origin);
        let flat: Vec<Point> = vertices.iter().map(|p| p.xy()).collect();
        let area = polygon_area(&flat);

        let imported_edges: Vec<ImportedEdge> = edge_list
            .iter()
            .map(|e| ImportedEdge {
                index: e.index,
                pixel_length: e.length,
                length_m: e.length / ppm,
                labelled_m: matches
                    .iter()
                    .find(|m| m.edge_index == e.index)
                    .map(|m| m.dimension.meters()),
            })
            .collect();
        let perimeter = imported_edges.iter().map(|e| e.length_m).sum();

        let angles = interior_angles(&flat);
        warnings.extend(angle_warnings(&angles).into_iter().map(|w| w.message));

        log::info!(
            "imported {} vertices, {:.1} m², perimeter {:.1} m",
            vertices.len(),
            area,
            perimeter
        );

        let shape = ImportedShape {
            vertices,
            pixel_vertices: boundary.vertices.clone(),
            area,
            perimeter,
            edges: imported_edges,
            angles,
            scale,
            matches,
            conflicts,
            unmatched_dimensions: stray,
            unmatched_edges: missing,
            boundary,
        };
        Ok((shape, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::OcrWord;
    use crate::ocr::StaticRecognizer;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Broken;

    impl TextRecognizer for Broken {
        fn recognize(&mut self, _image: &DynamicImage) -> Result<Vec<OcrWord>, PlanError> {
            Err(PlanError::Ocr("engine crashed".into()))
        }
    }

    fn plan() -> DynamicImage {
        let mut img = GrayImage::from_pixel(300, 200, Luma([255]));
        draw_filled_rect_mut(&mut img, Rect::at(50, 50).of_size(200, 100), Luma([0]));
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn blank_image_suggests_manual_entry() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([255])));
        let mut importer = SitePlanImporter::new(StaticRecognizer::default(), ImportOptions::default());
        let result = importer.import_image(&blank);
        assert!(!result.success);
        assert!(result.manual_entry_suggested);
        assert!(result.error.unwrap().ends_with("Try manual entry instead."));
        assert_eq!(result.metadata.image_width, 100);
    }

    #[test]
    fn ocr_failure_is_reported() {
        let mut importer = SitePlanImporter::new(Broken, ImportOptions::default());
        let result = importer.import_image(&plan());
        assert!(!result.success);
        assert!(result.error.unwrap().contains("engine crashed"));
        assert_eq!(result.metadata.boundary_vertices, 4);
    }

    #[test]
    fn no_labels_means_insufficient_matches() {
        let mut importer = SitePlanImporter::new(StaticRecognizer::default(), ImportOptions::default());
        let result = importer.import_image(&plan());
        assert!(!result.success);
        assert!(result.manual_entry_suggested);
        assert!(result.error.unwrap().contains("found 0 matched dimensions"));
    }

    #[test]
    fn progress_is_reported_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut importer = SitePlanImporter::new(StaticRecognizer::default(), ImportOptions::default())
            .with_progress(move |stage, pct| sink.borrow_mut().push((stage, pct)));
        importer.import_image(&plan());

        let seen = seen.borrow();
        let stages: Vec<ImportStage> = seen.iter().map(|(s, _)| *s).collect();
        // Stops at the scale step: no labels.
        assert_eq!(
            stages,
            vec![
                ImportStage::Preprocessing,
                ImportStage::DetectingBoundary,
                ImportStage::RecognizingText,
                ImportStage::ParsingDimensions,
                ImportStage::MatchingDimensions,
                ImportStage::CalculatingScale,
            ]
        );
        assert!(seen.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn stage_labels_fit_progress_column() {
        for stage in [ImportStage::Preprocessing, ImportStage::DetectingBoundary, ImportStage::Done] {
            assert!(stage.label().len() <= 10);
        }
    }
}
