//! Scale estimation and pixel → world conversion.
//!
//! Every matched edge gives one pixels-per-metre sample. Outliers are
//! dropped by z-score, the survivors are averaged, and the spread of the
//! full sample set is reported so inconsistent labels stay visible.

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::config::ScaleConfig;
use crate::error::PlanError;
use crate::geom::{vertex_centroid, Edge, Point3D};
use crate::matcher::DimensionMatch;

/// Per-sample scales above this are treated as nonsense.
const MAX_SCALE: f64 = 10_000.0;

/// Leave-one-out deviation floor, as a fraction of the remaining mean.
/// With z = 2 this means a sample must sit more than 10% away from
/// otherwise identical samples to be dropped.
const MIN_RELATIVE_DEVIATION: f64 = 0.05;

/// One pixels-per-metre estimate from a single matched edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSample {
    pub edge_index: usize,
    pub pixel_length: f64,
    pub real_length_m: f64,
    pub scale: f64,
    /// Dropped by outlier filtering.
    pub outlier: bool,
}

/// The derived scale and its supporting statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleInfo {
    pub pixels_per_meter: f64,
    /// 0-100.
    pub confidence: f64,
    /// `(max - min) / min` over all valid samples, in percent.
    pub variance: f64,
    /// Samples that survived outlier filtering.
    pub match_count: usize,
    pub samples: Vec<ScaleSample>,
    pub warnings: Vec<String>,
}

/// Estimate pixels per metre from matched edges.
pub fn calculate_scale(
    matches: &[DimensionMatch],
    edges: &[Edge],
    config: &ScaleConfig,
) -> Result<ScaleInfo, PlanError> {
    let required = config.min_matches.max(2);
    if matches.len() < required {
        return Err(PlanError::InsufficientMatches {
            found: matches.len(),
            required,
        });
    }

    let mut samples: Vec<ScaleSample> = matches
        .iter()
        .filter_map(|m| {
            let edge = edges.iter().find(|e| e.index == m.edge_index)?;
            let real = m.dimension.meters();
            let scale = edge.length / real;
            if !scale.is_finite() || scale <= 0.0 || scale > MAX_SCALE {
                log::warn!("edge {}: invalid scale {} discarded", m.edge_index, scale);
                return None;
            }
            Some(ScaleSample {
                edge_index: m.edge_index,
                pixel_length: edge.length,
                real_length_m: real,
                scale,
                outlier: false,
            })
        })
        .collect();

    if samples.len() < 2 {
        return Err(PlanError::NoValidScale);
    }

    let values: Vec<f64> = samples.iter().map(|s| s.scale).collect();
    let outliers = find_outliers(&values, config.outlier_z);
    for (s, out) in samples.iter_mut().zip(&outliers) {
        if *out {
            log::warn!(
                "edge {}: scale {:.3} px/m rejected as outlier",
                s.edge_index,
                s.scale
            );
            s.outlier = true;
        }
    }

    let kept: Vec<f64> = samples.iter().filter(|s| !s.outlier).map(|s| s.scale).collect();
    let pixels_per_meter = mean(&kept);
    let variance = spread_pct(&values);
    let confidence = confidence(variance, kept.len());

    let mut warnings = Vec::new();
    if variance > config.max_variance {
        warnings.push(format!(
            "Scale varies by {:.1}% between edges; dimensions may be inconsistent",
            variance
        ));
    }

    log::info!(
        "scale {:.3} px/m from {} of {} samples (variance {:.1}%, confidence {:.0})",
        pixels_per_meter,
        kept.len(),
        samples.len(),
        variance,
        confidence
    );

    Ok(ScaleInfo {
        pixels_per_meter,
        confidence,
        variance,
        match_count: kept.len(),
        samples,
        warnings,
    })
}

/// Flag samples whose z-score against the *other* samples exceeds `z_max`.
///
/// With a handful of samples a plain z-score is bounded by (n-1)/√n, so a
/// gross outlier among four samples could never pass 2.0; measuring each
/// sample against the rest does not have that ceiling.
fn find_outliers(values: &[f64], z_max: f64) -> Vec<bool> {
    let n = values.len();
    if n <= 2 {
        return vec![false; n];
    }
    let flags: Vec<bool> = (0..n)
        .map(|i| {
            let rest: Vec<f64> = values
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, v)| *v)
                .collect();
            let m = mean(&rest);
            let sd = std_dev(&rest, m).max(m.abs() * MIN_RELATIVE_DEVIATION);
            (values[i] - m).abs() / sd > z_max
        })
        .collect();

    if flags.iter().all(|f| *f) {
        vec![false; n]
    } else {
        flags
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

fn spread_pct(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::MAX, f64::min);
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    (max - min) / min * 100.0
}

/// 70% consistency, 30% sample size.
fn confidence(variance: f64, sample_count: usize) -> f64 {
    let variance_score = (100.0 - variance * 2.0).max(0.0);
    let sample_score = (50.0 + sample_count as f64 * 10.0).min(100.0);
    0.7 * variance_score + 0.3 * sample_score
}

/// Divide pixel coordinates by the scale.
pub fn pixels_to_meters(points: &[Point], pixels_per_meter: f64) -> Vec<Point> {
    points
        .iter()
        .map(|p| Point::new(p.x / pixels_per_meter, p.y / pixels_per_meter))
        .collect()
}

/// Pixel polygon → ground-plane world coordinates in metres.
///
/// Optionally centred on the vertex centroid; Y is negated because image
/// rows grow downward while world Y points north.
pub fn to_world(points: &[Point], pixels_per_meter: f64, center_at_origin: bool) -> Vec<Point3D> {
    let meters = pixels_to_meters(points, pixels_per_meter);
    let offset = if center_at_origin {
        vertex_centroid(&meters)
    } else {
        Point::ZERO
    };
    meters
        .iter()
        .map(|p| Point3D::flat(p.x - offset.x, -(p.y - offset.y)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{BoundingBox, ExtractedDimension, Unit};
    use crate::geom::{edges, polygon_area};

    /// Edges whose pixel lengths are `scales[i] * 10` for a 10 m label.
    fn fixture(scales: &[f64]) -> (Vec<Edge>, Vec<DimensionMatch>) {
        let edges: Vec<Edge> = scales
            .iter()
            .enumerate()
            .map(|(i, s)| Edge {
                index: i,
                start: Point::ZERO,
                end: Point::new(s * 10.0, 0.0),
                midpoint: Point::new(s * 5.0, 0.0),
                length: s * 10.0,
                angle: 0.0,
            })
            .collect();
        let matches = (0..scales.len())
            .map(|i| m(i, 10.0, Unit::Meters))
            .collect();
        (edges, matches)
    }

    fn m(edge_index: usize, value: f64, unit: Unit) -> DimensionMatch {
        DimensionMatch {
            edge_index,
            dimension: ExtractedDimension {
                value,
                unit,
                position: Point::ZERO,
                bbox: BoundingBox::default(),
                confidence: 95.0,
                text: String::new(),
            },
            distance: 0.0,
            match_confidence: 95.0,
        }
    }

    #[test]
    fn needs_two_matches() {
        let (edges, matches) = fixture(&[10.0]);
        let err = calculate_scale(&matches, &edges, &ScaleConfig::default()).unwrap_err();
        assert!(matches!(err, PlanError::InsufficientMatches { found: 1, required: 2 }));
    }

    #[test]
    fn consistent_samples_score_high() {
        let (edges, matches) = fixture(&[10.0, 10.0, 10.5]);
        let info = calculate_scale(&matches, &edges, &ScaleConfig::default()).unwrap();
        assert!((info.variance - 5.0).abs() < 1e-9);
        assert_eq!(info.match_count, 3);
        assert!(info.confidence > 80.0, "confidence {}", info.confidence);
        assert!(info.warnings.is_empty());
    }

    #[test]
    fn gross_outlier_is_dropped() {
        let (edges, matches) = fixture(&[10.0, 10.0, 10.5, 50.0]);
        let info = calculate_scale(&matches, &edges, &ScaleConfig::default()).unwrap();
        assert!(info.samples[3].outlier);
        assert_eq!(info.match_count, 3);
        let expected = (10.0 + 10.0 + 10.5) / 3.0;
        assert!((info.pixels_per_meter - expected).abs() < 1e-9);
        assert!(info.pixels_per_meter - 10.0 <= 0.5);
        // Pre-filter spread stays visible.
        assert!((info.variance - 400.0).abs() < 1e-9);
        assert_eq!(info.warnings.len(), 1);
    }

    #[test]
    fn step_beyond_deviation_floor_is_dropped_quietly() {
        // 11.1 sits 2.2 floors away from three identical samples: dropped,
        // while the 11% spread stays under the warning threshold.
        let (edges, matches) = fixture(&[10.0, 10.0, 10.0, 11.1]);
        let info = calculate_scale(&matches, &edges, &ScaleConfig::default()).unwrap();
        assert!(info.samples[3].outlier);
        assert_eq!(info.match_count, 3);
        assert!((info.pixels_per_meter - 10.0).abs() < 1e-9);
        assert!((info.variance - 11.0).abs() < 1e-6);
        assert!(info.warnings.is_empty());

        // 1.8 floors away is kept.
        let (edges, matches) = fixture(&[10.0, 10.0, 10.0, 10.9]);
        let info = calculate_scale(&matches, &edges, &ScaleConfig::default()).unwrap();
        assert!(info.samples.iter().all(|s| !s.outlier));
        assert_eq!(info.match_count, 4);
    }

    #[test]
    fn two_samples_are_not_filtered() {
        let (edges, matches) = fixture(&[10.0, 30.0]);
        let info = calculate_scale(&matches, &edges, &ScaleConfig::default()).unwrap();
        assert_eq!(info.match_count, 2);
        assert!((info.pixels_per_meter - 20.0).abs() < 1e-9);
    }

    #[test]
    fn units_are_converted_to_meters() {
        let (edges, _) = fixture(&[10.0, 10.0]);
        // 100 px edge labelled in feet and yards.
        let matches = vec![m(0, 10.0 / 0.3048, Unit::Feet), m(1, 10.0 / 0.9144, Unit::Yards)];
        let info = calculate_scale(&matches, &edges, &ScaleConfig::default()).unwrap();
        assert!((info.pixels_per_meter - 10.0).abs() < 1e-9);
        assert!(info.variance < 1e-6);
    }

    #[test]
    fn world_coordinates_are_centred_and_flipped() {
        let px = vec![
            Point::new(100.0, 100.0),
            Point::new(300.0, 100.0),
            Point::new(300.0, 200.0),
            Point::new(100.0, 200.0),
        ];
        let world = to_world(&px, 10.0, true);
        assert_eq!(world[0], Point3D::flat(-10.0, 5.0));
        assert_eq!(world[2], Point3D::flat(10.0, -5.0));
        assert!(world.iter().all(|p| p.z == 0.0));
        let flat: Vec<Point> = world.iter().map(|p| p.xy()).collect();
        assert!((polygon_area(&flat) - 200.0).abs() < 1e-9);

        let raw = to_world(&px, 10.0, false);
        assert_eq!(raw[1], Point3D::flat(30.0, -10.0));
    }

    #[test]
    fn rectangle_end_to_end() {
        // 200 × 100 px rectangle labelled 20 m × 10 m at edge midpoints.
        let px = vec![
            Point::new(0.0, 0.0),
            Point::new(200.0, 0.0),
            Point::new(200.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        let edges = edges(&px);
        let matches: Vec<DimensionMatch> = [20.0, 10.0, 20.0, 10.0]
            .iter()
            .enumerate()
            .map(|(i, v)| m(i, *v, Unit::Meters))
            .collect();
        let info = calculate_scale(&matches, &edges, &ScaleConfig::default()).unwrap();
        assert!(info.confidence > 90.0);
        assert!(info.variance < 1e-9);
        let world = to_world(&px, info.pixels_per_meter, true);
        let flat: Vec<Point> = world.iter().map(|p| p.xy()).collect();
        assert!((polygon_area(&flat) - 200.0).abs() < 1e-6);
    }
}
