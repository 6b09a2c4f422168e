use clap::{Parser, Subcommand};
use plan2poly::template::{NewTemplate, TemplateStore};
use plan2poly::{
    FileStore, ImportOptions, PreprocessingLevel, ReconstructedShape, SitePlanImporter,
    StaticRecognizer, TextRecognizer,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "plan2poly", about = "Site plan image or edge lengths to a scaled property polygon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the boundary on a site plan image and scale it from its labels
    Import {
        /// Input image path (PNG, JPEG, BMP)
        #[arg(short, long)]
        input: PathBuf,

        /// Write the result as JSON here (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pre-recognized words as JSON instead of running OCR
        #[arg(long)]
        words: Option<PathBuf>,

        /// Import options as JSON; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Preprocessing strength: light, standard or aggressive
        #[arg(long, value_parser = parse_level)]
        preprocessing: Option<PreprocessingLevel>,

        /// Minimum OCR confidence (0-100)
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Maximum label-to-edge distance in pixels
        #[arg(long)]
        max_distance: Option<f64>,

        /// Keep image-origin coordinates instead of centring on the polygon
        #[arg(long)]
        no_center: bool,

        /// Tesseract language
        #[arg(long, default_value = "eng")]
        lang: String,
    },

    /// Build a polygon from edge lengths in metres
    Manual {
        /// Comma-separated edge lengths, e.g. 20,30,20,30
        #[arg(long, value_delimiter = ',', required_unless_present = "template")]
        dims: Vec<f64>,

        /// Expected area in m² to check against
        #[arg(long)]
        area: Option<f64>,

        /// Use a stored template instead of --dims
        #[arg(long, conflicts_with = "dims")]
        template: Option<String>,

        /// Template store directory
        #[arg(long, default_value = ".plan2poly")]
        store: PathBuf,

        /// Write the shape as JSON here (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage shape templates
    Templates {
        /// Template store directory
        #[arg(long, default_value = ".plan2poly")]
        store: PathBuf,

        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List built-in and user templates
    List,
    /// Save a new user template
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, value_delimiter = ',', required = true)]
        dims: Vec<f64>,
        #[arg(long)]
        area: Option<f64>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Delete a user template
    Delete { id: String },
    /// Write user templates as JSON (stdout if no file)
    Export { file: Option<PathBuf> },
    /// Add templates from an exported JSON file
    Import { file: PathBuf },
}

fn parse_level(s: &str) -> Result<PreprocessingLevel, String> {
    match s.to_ascii_lowercase().as_str() {
        "light" => Ok(PreprocessingLevel::Light),
        "standard" => Ok(PreprocessingLevel::Standard),
        "aggressive" => Ok(PreprocessingLevel::Aggressive),
        other => Err(format!("unknown preprocessing level '{}'", other)),
    }
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!("  \u{2713} {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(feature = "tesseract")]
fn ocr_engine(lang: &str) -> Result<Box<dyn TextRecognizer>, Box<dyn std::error::Error>> {
    let mut engine = plan2poly::TesseractEngine::new(lang);
    engine.initialize()?;
    Ok(Box::new(engine))
}

#[cfg(not(feature = "tesseract"))]
fn ocr_engine(_lang: &str) -> Result<Box<dyn TextRecognizer>, Box<dyn std::error::Error>> {
    Err("built without OCR support; pass --words with pre-recognized text".into())
}

fn print_shape(shape: &ReconstructedShape) {
    eprintln!(
        "  Shape       {} vertices \u{00b7} {:.2} m\u{00b2} \u{00b7} perimeter {:.2} m \u{00b7} closure {:.3} m",
        shape.vertices.len(), shape.area, shape.perimeter, shape.closure_error,
    );
    let angles: Vec<String> = shape.angles.iter().map(|a| format!("{:.1}\u{00b0}", a)).collect();
    eprintln!("  Angles      {}", angles.join(" "));
    if let Some(v) = &shape.area_validation {
        eprintln!("  Area        {}", v.message);
    }
    for w in &shape.warnings {
        eprintln!("  Warning     {}", w.message());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    eprintln!();
    match cli.command {
        Command::Import {
            input, output, words, config, preprocessing,
            min_confidence, max_distance, no_center, lang,
        } => {
            let mut options = match &config {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => ImportOptions::default(),
            };
            if let Some(level) = preprocessing {
                options.preprocessing = level;
            }
            if let Some(c) = min_confidence {
                options.min_ocr_confidence = c;
            }
            if let Some(d) = max_distance {
                options.max_dimension_distance = d;
            }
            if no_center {
                options.center_at_origin = false;
            }

            let recognizer: Box<dyn TextRecognizer> = match &words {
                Some(path) => Box::new(StaticRecognizer::from_json_file(path)?),
                None => ocr_engine(&lang)?,
            };

            eprintln!("  plan2poly \u{00b7} {}", input.display());
            eprintln!();

            let mut importer = SitePlanImporter::new(recognizer, options)
                .with_progress(|stage, pct| eprintln!("  {:<11} {:>3}%", stage.label(), pct));
            let result = importer.import_path(&input);

            eprintln!();
            let meta = &result.metadata;
            eprintln!(
                "  Image       {}x{} px \u{00b7} {} contours \u{00b7} {} words \u{00b7} {} dimensions \u{00b7} {} matched  ({}ms)",
                meta.image_width, meta.image_height, meta.contours_found,
                meta.ocr_words, meta.dimensions_parsed, meta.matches, meta.elapsed_ms,
            );
            if let Some(shape) = &result.shape {
                eprintln!(
                    "  Result      {} vertices \u{00b7} {:.2} m\u{00b2} \u{00b7} perimeter {:.2} m \u{00b7} {:.3} px/m (confidence {:.0})",
                    shape.vertices.len(), shape.area, shape.perimeter,
                    shape.scale.pixels_per_meter, shape.scale.confidence,
                );
            }
            for w in &result.warnings {
                eprintln!("  Warning     {}", w);
            }

            write_json(&result, output.as_deref())?;
            eprintln!();
            if let Some(err) = result.error {
                return Err(err.into());
            }
        }

        Command::Manual { dims, area, template, store, output } => {
            let shape = match &template {
                Some(id) => {
                    let t = TemplateStore::new(FileStore::new(store)).get(id)?;
                    eprintln!("  Template    {} ({})", t.name, t.id);
                    match area {
                        Some(a) => plan2poly::reconstruct(&t.dimensions, Some(a))?,
                        None => t.reconstruct()?,
                    }
                }
                None => plan2poly::reconstruct(&dims, area)?,
            };
            print_shape(&shape);
            write_json(&shape, output.as_deref())?;
            eprintln!();
        }

        Command::Templates { store, action } => {
            let mut templates = TemplateStore::new(FileStore::new(store));
            match action {
                TemplateAction::List => {
                    for t in templates.list()? {
                        let dims: Vec<String> = t.dimensions.iter().map(|d| d.to_string()).collect();
                        println!("{:<28} {:<16} [{}]", t.id, t.name, dims.join(", "));
                    }
                }
                TemplateAction::Add { name, dims, area, description } => {
                    let t = templates.create(NewTemplate { name, description, dimensions: dims, area })?;
                    eprintln!("  \u{2713} {} ({})", t.name, t.id);
                }
                TemplateAction::Delete { id } => {
                    templates.delete(&id)?;
                    eprintln!("  \u{2713} deleted {}", id);
                }
                TemplateAction::Export { file } => {
                    let json = templates.export_json()?;
                    match file {
                        Some(path) => {
                            std::fs::write(&path, json)?;
                            eprintln!("  \u{2713} {}", path.display());
                        }
                        None => println!("{}", json),
                    }
                }
                TemplateAction::Import { file } => {
                    let count = templates.import_json(&std::fs::read_to_string(&file)?)?;
                    eprintln!("  \u{2713} imported {} template(s)", count);
                }
            }
        }
    }

    Ok(())
}
