use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use plan2poly::dimension::BoundingBox;
use plan2poly::{ImportOptions, OcrWord, SitePlanImporter, StaticRecognizer};

/// 400 × 300 plan with a 3 px outline whose outer border spans
/// x 100..=299, y 100..=199.
fn plan() -> DynamicImage {
    let mut img = GrayImage::from_pixel(400, 300, Luma([255]));
    for k in 0..3 {
        let rect = Rect::at(100 + k, 100 + k).of_size(200 - 2 * k as u32, 100 - 2 * k as u32);
        draw_hollow_rect_mut(&mut img, rect, Luma([20]));
    }
    DynamicImage::ImageLuma8(img)
}

fn word(text: &str, x: f64, y: f64, confidence: f64) -> OcrWord {
    OcrWord {
        text: text.to_string(),
        confidence,
        bbox: BoundingBox::new(x - 15.0, y - 6.0, x + 15.0, y + 6.0),
    }
}

fn labels() -> Vec<OcrWord> {
    vec![
        word("20 m", 200.0, 85.0, 92.0),
        word("10m", 320.0, 150.0, 92.0),
        word("20m", 200.0, 215.0, 90.0),
        word("10 m", 80.0, 150.0, 88.0),
    ]
}

fn assert_close(actual: f64, expected: f64, rel: f64) {
    assert!(
        ((actual - expected) / expected).abs() < rel,
        "{} not within {}% of {}",
        actual,
        rel * 100.0,
        expected
    );
}

#[test]
fn labelled_rectangle_imports_to_scale() {
    let mut importer = SitePlanImporter::new(StaticRecognizer::new(labels()), ImportOptions::default());
    let result = importer.import_image(&plan());
    assert!(result.success, "{:?}", result.error);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);

    let shape = result.shape.unwrap();
    assert_eq!(shape.vertices.len(), 4);
    assert_close(shape.area, 200.0, 0.03);
    assert_close(shape.perimeter, 60.0, 0.03);
    assert_close(shape.scale.pixels_per_meter, 10.0, 0.03);
    assert!(shape.scale.confidence > 90.0);
    assert!(shape.unmatched_edges.is_empty());
    assert!(shape.conflicts.is_empty());
    assert!(shape.angles.iter().all(|a| (a - 90.0).abs() < 2.0));

    // Centred on the origin, flat.
    let cx: f64 = shape.vertices.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy: f64 = shape.vertices.iter().map(|p| p.y).sum::<f64>() / 4.0;
    assert!(cx.abs() < 1e-9 && cy.abs() < 1e-9);
    assert!(shape.vertices.iter().all(|p| p.z == 0.0));

    assert_eq!(result.metadata.dimensions_parsed, 4);
    assert_eq!(result.metadata.matches, 4);
    assert!(result.metadata.imported_at.is_some());
}

#[test]
fn feet_labels_are_converted() {
    let words = vec![
        word("65.62 ft", 200.0, 85.0, 92.0),
        word("32.81'", 320.0, 150.0, 92.0),
        word("65.62ft", 200.0, 215.0, 92.0),
    ];
    let mut importer = SitePlanImporter::new(StaticRecognizer::new(words), ImportOptions::default());
    let shape = importer.import_image(&plan()).shape.unwrap();
    assert_close(shape.area, 200.0, 0.03);
}

#[test]
fn missing_label_is_reported_not_guessed() {
    let mut words = labels();
    words.pop();
    let mut importer = SitePlanImporter::new(StaticRecognizer::new(words), ImportOptions::default());
    let result = importer.import_image(&plan());
    assert!(result.success);
    let shape = result.shape.as_ref().unwrap();
    assert_eq!(shape.unmatched_edges.len(), 1);
    let edge = &shape.edges[shape.unmatched_edges[0]];
    assert!(edge.labelled_m.is_none());
    assert_close(edge.length_m, 10.0, 0.03);
    assert!(result.warnings.iter().any(|w| w.contains("no dimension")));
}

#[test]
fn conflicting_labels_are_resolved() {
    let mut words = labels();
    words.push(word("14m", 330.0, 160.0, 70.0));
    let mut importer = SitePlanImporter::new(StaticRecognizer::new(words), ImportOptions::default());
    let result = importer.import_image(&plan());
    assert!(result.success);
    let shape = result.shape.as_ref().unwrap();
    assert_eq!(shape.conflicts.len(), 1);
    assert_eq!(shape.matches.len(), 4);
    assert_close(shape.area, 200.0, 0.03);
    assert!(result.warnings.iter().any(|w| w.contains("conflicting labels")));
}

#[test]
fn lot_area_label_is_not_matched_to_an_edge() {
    let mut words = labels();
    words.push(word("200m²", 200.0, 150.0, 95.0));
    let mut importer = SitePlanImporter::new(StaticRecognizer::new(words), ImportOptions::default());
    let result = importer.import_image(&plan());
    assert!(result.success);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(result.metadata.ocr_words, 5);
    assert_eq!(result.metadata.dimensions_parsed, 4);
    let shape = result.shape.unwrap();
    assert!(shape.conflicts.is_empty());
    assert_close(shape.area, 200.0, 0.03);
}

#[test]
fn low_confidence_words_are_ignored() {
    let words: Vec<OcrWord> = labels()
        .into_iter()
        .map(|mut w| {
            w.confidence = 40.0;
            w
        })
        .collect();
    let mut importer = SitePlanImporter::new(StaticRecognizer::new(words), ImportOptions::default());
    let result = importer.import_image(&plan());
    assert!(!result.success);
    assert!(result.manual_entry_suggested);
    assert_eq!(result.metadata.ocr_words, 4);
    assert_eq!(result.metadata.dimensions_parsed, 0);
}

#[test]
fn import_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.png");
    plan().save(&path).unwrap();

    let mut importer = SitePlanImporter::new(StaticRecognizer::new(labels()), ImportOptions::default());
    let result = importer.import_path(&path);
    assert!(result.success);
    assert_eq!(result.metadata.image_width, 400);

    let missing = importer.import_path(&dir.path().join("nope.png"));
    assert!(!missing.success);
    assert!(!missing.manual_entry_suggested);
    assert!(missing.error.unwrap().starts_with("failed to load image"));
}

#[test]
fn manual_entry_matches_imported_rectangle() {
    let shape = plan2poly::reconstruct(&[20.0, 10.0, 20.0, 10.0], Some(200.0)).unwrap();
    assert!((shape.area - 200.0).abs() < 1e-9);
    assert_eq!(
        shape.area_validation.unwrap().status,
        plan2poly::reconstruct::AreaStatus::Valid
    );
}
