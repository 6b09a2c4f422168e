use std::path::Path;

use image::{DynamicImage, GrayImage, ImageReader};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;

use crate::config::PreprocessingLevel;
use crate::error::PlanError;

/// Decode an image file from disk.
pub fn load(path: &Path) -> Result<DynamicImage, PlanError> {
    ImageReader::open(path)
        .map_err(|e| PlanError::ImageLoad(e.to_string()))?
        .decode()
        .map_err(|e| PlanError::ImageLoad(e.to_string()))
}

/// Convert a plan image to a binary (black/white) GrayImage.
///
/// Plan linework (dark ink on light paper) becomes 255, paper becomes 0.
pub fn preprocess(image: &DynamicImage, level: PreprocessingLevel) -> GrayImage {
    let gray = image.to_luma8();

    let smoothed = match level {
        PreprocessingLevel::Light => gray,
        PreprocessingLevel::Standard => gaussian_blur_f32(&gray, 1.0),
        PreprocessingLevel::Aggressive => gaussian_blur_f32(&gray, 2.0),
    };

    let level_value = otsu_level(&smoothed);
    log::debug!("Otsu threshold = {}", level_value);
    let binary = threshold(&smoothed, level_value, ThresholdType::BinaryInverted);

    let binary = if level == PreprocessingLevel::Aggressive {
        // Bridge small gaps in broken boundary lines.
        close(&binary, Norm::LInf, 2)
    } else {
        binary
    };

    // Debug: save thresholded bitmap
    if std::env::var("PLAN2POLY_DEBUG_BITMAP").is_ok() {
        binary.save("debug_threshold.png").ok();
        log::info!("saved debug_threshold.png");
    }

    binary
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn dark_ink_becomes_foreground() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([240]));
        for x in 10..30 {
            img.put_pixel(x, 20, Luma([10]));
        }
        let binary = preprocess(&DynamicImage::ImageLuma8(img), PreprocessingLevel::Light);
        assert_eq!(binary.get_pixel(15, 20).0[0], 255);
        assert_eq!(binary.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn missing_file_is_an_image_error() {
        let err = load(Path::new("/nonexistent/plan.png")).unwrap_err();
        assert!(matches!(err, PlanError::ImageLoad(_)));
    }
}
