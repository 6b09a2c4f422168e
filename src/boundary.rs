//! Boundary selection: candidate contours → one property polygon.
//!
//! 1. Drop noise contours below the minimum area
//! 2. Take the largest survivor
//! 3. Approximate it at a perimeter-relative epsilon
//! 4. If the result looks like a noisy quadrilateral, retry at coarser
//!    epsilons and accept the first exact quadrilateral
//! 5. Score the result by area preservation, solidity and vertex count

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::config::BoundaryConfig;
use crate::contour::{Contour, ContourPrimitives};
use crate::error::PlanError;
use crate::geom::{closed_perimeter, polygon_area};

/// The chosen boundary polygon and how it was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundarySelection {
    /// Polygon vertices in pixel coordinates.
    pub vertices: Vec<Point>,
    /// Area of the source contour (px²).
    pub contour_area: f64,
    /// Area of the approximated polygon (px²).
    pub approx_area: f64,
    /// Contour area divided by its convex hull area.
    pub solidity: f64,
    /// Weighted quality score, 0-1.
    pub confidence: f64,
    /// Epsilon actually used, in pixels.
    pub epsilon: f64,
    /// Factor applied to the base epsilon (1.0 when no retry was accepted).
    pub epsilon_multiplier: f64,
    /// Vertex count at the base epsilon.
    pub original_vertex_count: usize,
}

/// Pick the property boundary out of a set of candidate contours.
pub fn select_boundary<P>(
    contours: &[Contour],
    primitives: &P,
    config: &BoundaryConfig,
) -> Result<BoundarySelection, PlanError>
where
    P: ContourPrimitives + ?Sized,
{
    if contours.is_empty() {
        return Err(PlanError::NoContours);
    }

    let best = contours
        .iter()
        .filter(|c| c.area >= config.min_contour_area)
        .max_by(|a, b| a.area.total_cmp(&b.area))
        .ok_or(PlanError::NoValidContours {
            min_area: config.min_contour_area,
        })?;
    log::debug!(
        "largest of {} contours: {} points, area {:.0} px²",
        contours.len(),
        best.points.len(),
        best.area
    );

    let base_epsilon = config.epsilon_fraction * closed_perimeter(&best.points);
    let base = primitives.approximate(&best.points, base_epsilon);
    let original_vertex_count = base.len();

    let (vertices, multiplier) = refine(&best.points, base, base_epsilon, primitives, config);
    let n = vertices.len();
    if n < config.min_vertices || n > config.max_vertices {
        return Err(PlanError::VertexCount(n));
    }

    let approx_area = polygon_area(&vertices);
    let hull_area = polygon_area(&primitives.convex_hull(&best.points));
    let solidity = if hull_area > 0.0 {
        (best.area / hull_area).min(1.0)
    } else {
        0.0
    };
    let confidence = score(best.area, approx_area, solidity, n);

    log::info!(
        "boundary: {} vertices (base {}), epsilon ×{:.1}, confidence {:.2}",
        n,
        original_vertex_count,
        multiplier,
        confidence
    );

    Ok(BoundarySelection {
        vertices,
        contour_area: best.area,
        approx_area,
        solidity,
        confidence,
        epsilon: base_epsilon * multiplier,
        epsilon_multiplier: multiplier,
        original_vertex_count,
    })
}

/// Retry at coarser epsilons when the base result is "a quadrilateral
/// with noise". Only an exact hit on the target count replaces the base.
fn refine<P>(
    points: &[Point],
    base: Vec<Point>,
    base_epsilon: f64,
    primitives: &P,
    config: &BoundaryConfig,
) -> (Vec<Point>, f64)
where
    P: ContourPrimitives + ?Sized,
{
    let (lo, hi) = config.refine_range;
    if !(lo..=hi).contains(&base.len()) {
        return (base, 1.0);
    }

    for &m in &config.epsilon_multipliers {
        let candidate = primitives.approximate(points, base_epsilon * m);
        log::debug!("epsilon ×{:.1} → {} vertices", m, candidate.len());
        if candidate.len() == config.target_vertices {
            return (candidate, m);
        }
    }
    (base, 1.0)
}

/// 50% area preservation, 30% solidity, 20% vertex-count preference.
fn score(contour_area: f64, approx_area: f64, solidity: f64, vertices: usize) -> f64 {
    let lo = contour_area.min(approx_area);
    let hi = contour_area.max(approx_area);
    let area_ratio = if hi > 0.0 { lo / hi } else { 0.0 };
    0.5 * area_ratio + 0.3 * solidity + 0.2 * vertex_score(vertices)
}

/// Peaks at 4 (rectangular lots are the common case).
fn vertex_score(n: usize) -> f64 {
    match n {
        4 => 1.0,
        3 | 5 | 6 => 0.8,
        7..=10 => 0.5,
        n if n > 10 => 0.2,
        _ => 0.0,
    }
}
