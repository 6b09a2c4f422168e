//! plan2poly: site-plan image → scaled property boundary polygon.
//!
//! Finds the outer boundary on a scanned or photographed site plan, reads
//! the dimension labels around it, derives the drawing scale from them
//! and returns the boundary in metres. When the image is unusable, the
//! same polygon can be built from a list of edge lengths.
//!
//! # Example
//!
//! ```no_run
//! use plan2poly::{ImportOptions, SitePlanImporter, StaticRecognizer};
//! use std::path::Path;
//!
//! let mut importer = SitePlanImporter::new(StaticRecognizer::default(), ImportOptions::default());
//! let result = importer.import_path(Path::new("plan.png"));
//! if let Some(shape) = result.shape {
//!     println!("{:.1} m²", shape.area);
//! }
//!
//! let lot = plan2poly::reconstruct(&[20.0, 30.0, 20.0, 30.0], Some(600.0))?;
//! assert_eq!(lot.vertices.len(), 4);
//! # Ok::<(), plan2poly::PlanError>(())
//! ```

#![forbid(unsafe_code)]

mod bitmap;
mod config;
mod geom;

pub mod boundary;
pub mod contour;
pub mod dimension;
pub mod error;
pub mod matcher;
pub mod ocr;
pub mod pipeline;
pub mod reconstruct;
pub mod scale;
pub mod template;

// Re-export kurbo so downstream users get the same Point type.
pub use kurbo;

pub use config::{BoundaryConfig, ImportOptions, PreprocessingLevel, ScaleConfig};
pub use dimension::{parse_dimension_text, ExtractedDimension, OcrWord, Unit};
pub use error::{LengthProblem, PlanError};
pub use geom::{Edge, Point3D};
pub use ocr::{EngineState, StaticRecognizer, TextRecognizer};
#[cfg(feature = "tesseract")]
pub use ocr::TesseractEngine;
pub use pipeline::{ImportResult, ImportStage, ImportedShape, SitePlanImporter};
pub use reconstruct::{reconstruct, validate_dimensions, ReconstructedShape};
pub use template::{FileStore, MemoryStore, ShapeTemplate, TemplateStore};
