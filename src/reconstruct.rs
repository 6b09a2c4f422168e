//! Manual-entry reconstruction: ordered edge lengths → closed polygon.
//!
//! ## Construction
//!
//! - **Triangle**: law of cosines, vertex 0 at the origin and edge 0 on +x.
//! - **Rectangle** (`[w, h, w, h]`): axis-aligned, exact right angles.
//! - **General**: a closing walk. Each edge is laid down at a heading and
//!   the heading turns at every corner. When the polygon inequality holds
//!   (longest side shorter than the rest combined) the turns come from the
//!   cyclic polygon through the given sides, so the walk closes exactly and
//!   the result is convex. Otherwise the walk turns by the regular-polygon
//!   exterior angle and the leftover gap is reported as a warning.
//!
//! Vertices are finally re-centred on their centroid. Perimeter is the sum
//! of the user's lengths, not of the constructed sides.

use std::f64::consts::{PI, TAU};

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

use crate::error::{LengthProblem, PlanError};
use crate::geom::{polygon_area, signed_area, vertex_centroid, Point3D};

pub const MIN_LENGTH: f64 = 0.1;
pub const MAX_LENGTH: f64 = 9999.0;

/// Relative difference under which two lengths count as equal.
const RECTANGLE_TOLERANCE: f64 = 1e-9;

/// Corners sharper/blunter than these (degrees) get a warning.
const ACUTE_LIMIT: f64 = 45.0;
const OBTUSE_LIMIT: f64 = 135.0;

/// Closure gap, as a fraction of the perimeter, above which the shape is
/// reported as open.
const CLOSURE_TOLERANCE: f64 = 0.01;

/// Relative area difference accepted by [`validate_area`].
const AREA_TOLERANCE: f64 = 0.05;

/// Bisection steps for the circumradius search.
const RADIUS_ITERATIONS: usize = 200;

/// Doublings allowed while bracketing the circumradius.
const RADIUS_BRACKET_LIMIT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
}

/// Advisory note about one corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleWarning {
    /// 0-based vertex index.
    pub corner: usize,
    /// Interior angle in degrees.
    pub angle: f64,
    pub severity: Severity,
    pub message: String,
}

/// Something odd about a reconstructed shape. Never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeWarning {
    Angle(AngleWarning),
    /// The walk did not return to its start.
    OpenPolygon { gap: f64, message: String },
}

impl ShapeWarning {
    pub fn message(&self) -> &str {
        match self {
            ShapeWarning::Angle(w) => &w.message,
            ShapeWarning::OpenPolygon { message, .. } => message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaStatus {
    Valid,
    Mismatch,
    NotProvided,
}

/// Comparison of the constructed area with the area the user expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaValidation {
    pub status: AreaStatus,
    pub calculated_area: f64,
    pub provided_area: Option<f64>,
    /// `|calculated - provided|`.
    pub difference: f64,
    /// `difference / max(calculated, provided)`, as a fraction.
    pub percent_diff: f64,
    pub message: String,
}

/// A polygon built from edge lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedShape {
    /// One vertex per input edge, centred on the centroid, z = 0.
    pub vertices: Vec<Point3D>,
    /// Interior angle at each vertex, degrees.
    pub angles: Vec<f64>,
    pub area: f64,
    /// Sum of the input lengths.
    pub perimeter: f64,
    /// Distance between the end of the walk and its start.
    pub closure_error: f64,
    pub warnings: Vec<ShapeWarning>,
    pub area_validation: Option<AreaValidation>,
}

/// Check that `dimensions` can describe a polygon at all.
pub fn validate_dimensions(dimensions: &[f64]) -> Result<(), PlanError> {
    if dimensions.len() < 3 {
        return Err(PlanError::TooFewDimensions(dimensions.len()));
    }
    for (i, &value) in dimensions.iter().enumerate() {
        let problem = if value.is_nan() {
            Some(LengthProblem::NotANumber)
        } else if value <= 0.0 {
            Some(LengthProblem::NotPositive)
        } else if value < MIN_LENGTH {
            Some(LengthProblem::TooSmall)
        } else if value > MAX_LENGTH {
            Some(LengthProblem::TooLarge)
        } else {
            None
        };
        if let Some(problem) = problem {
            return Err(PlanError::InvalidDimension {
                position: i + 1,
                value,
                problem,
            });
        }
    }
    Ok(())
}

/// Build a closed polygon from ordered edge lengths.
///
/// `expected_area`, when given, is compared against the constructed area.
pub fn reconstruct(
    dimensions: &[f64],
    expected_area: Option<f64>,
) -> Result<ReconstructedShape, PlanError> {
    validate_dimensions(dimensions)?;
    let n = dimensions.len();
    let perimeter: f64 = dimensions.iter().sum();

    let (raw, closure_error, exact) = match n {
        3 => (triangle(dimensions[0], dimensions[1], dimensions[2])?, 0.0, None),
        4 if is_rectangle(dimensions) => {
            let (w, h) = (dimensions[0], dimensions[1]);
            (rectangle(w, h), 0.0, Some(w * h))
        }
        _ => {
            let (points, gap) = closing_walk(dimensions);
            (points, gap, None)
        }
    };

    let center = vertex_centroid(&raw);
    let centered: Vec<Point> = raw.iter().map(|p| *p - center.to_vec2()).collect();

    let angles = match exact {
        Some(_) => vec![90.0; 4],
        None => interior_angles(&centered),
    };
    let area = exact.unwrap_or_else(|| polygon_area(&centered));

    let mut warnings: Vec<ShapeWarning> = angle_warnings(&angles)
        .into_iter()
        .map(ShapeWarning::Angle)
        .collect();
    if closure_error > CLOSURE_TOLERANCE * perimeter {
        log::warn!("walk left a {:.3} gap", closure_error);
        warnings.push(ShapeWarning::OpenPolygon {
            gap: closure_error,
            message: format!(
                "Shape doesn't close: {:.2} gap between the last and first vertex; check the dimensions",
                closure_error
            ),
        });
    }

    let area_validation = expected_area.map(|a| validate_area(area, Some(a)));

    log::debug!(
        "reconstructed {} sides: area {:.3}, perimeter {:.3}, {} warnings",
        n,
        area,
        perimeter,
        warnings.len()
    );

    Ok(ReconstructedShape {
        vertices: centered.iter().map(|p| Point3D::flat(p.x, p.y)).collect(),
        angles,
        area,
        perimeter,
        closure_error,
        warnings,
        area_validation,
    })
}

// ── Construction ─────────────────────────────────────────

fn triangle(a: f64, b: f64, c: f64) -> Result<Vec<Point>, PlanError> {
    // Equality is a degenerate (collinear) triangle and is rejected too.
    if a + b <= c || a + c <= b || b + c <= a {
        return Err(PlanError::TriangleInequality { a, b, c });
    }
    // Angle at vertex 0, between edge 0 (length a) and edge 2 (length c).
    let cos_angle = ((a * a + c * c - b * b) / (2.0 * a * c)).clamp(-1.0, 1.0);
    let angle = cos_angle.acos();
    Ok(vec![
        Point::ZERO,
        Point::new(a, 0.0),
        Point::new(c * angle.cos(), c * angle.sin()),
    ])
}

fn near_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= RECTANGLE_TOLERANCE * a.max(b)
}

fn is_rectangle(d: &[f64]) -> bool {
    d.len() == 4 && near_equal(d[0], d[2]) && near_equal(d[1], d[3])
}

fn rectangle(w: f64, h: f64) -> Vec<Point> {
    vec![
        Point::ZERO,
        Point::new(w, 0.0),
        Point::new(w, h),
        Point::new(0.0, h),
    ]
}

/// Walk the edges and return the vertices plus the closure gap.
fn closing_walk(lengths: &[f64]) -> (Vec<Point>, f64) {
    let n = lengths.len();
    let turns = match cyclic_turns(lengths) {
        Some(turns) => turns,
        None => {
            log::debug!("sides cannot close; walking with regular turns");
            vec![TAU / n as f64; n]
        }
    };

    let mut points = Vec::with_capacity(n + 1);
    let mut pos = Point::ZERO;
    let mut heading = 0.0_f64;
    points.push(pos);
    for (i, &len) in lengths.iter().enumerate() {
        pos += Vec2::from_angle(heading) * len;
        points.push(pos);
        heading += turns[i];
    }

    let end = points.pop().unwrap_or(Point::ZERO);
    let gap = end.distance(points[0]);
    (points, gap)
}

/// Exterior turn after each edge for the cyclic polygon with these sides.
///
/// Edge `i` subtends central angle `θᵢ`; the turn between edge `i` and edge
/// `i + 1` is `(θᵢ + θᵢ₊₁) / 2`. Returns `None` when the sides cannot close.
fn cyclic_turns(lengths: &[f64]) -> Option<Vec<f64>> {
    let n = lengths.len();
    let (longest, lmax) = lengths
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    let rest: f64 = lengths.iter().sum::<f64>() - lmax;
    if lmax >= rest {
        return None;
    }

    let half_angle = |l: f64, r: f64| 2.0 * (l / (2.0 * r)).clamp(-1.0, 1.0).asin();
    let r_min = lmax / 2.0;
    let total = |r: f64| lengths.iter().map(|&l| half_angle(l, r)).sum::<f64>();

    // Circle centre inside the polygon: Σθ = 2π, decreasing in R.
    // Otherwise the longest side spans the long way round: θ_max = 2π - θ.
    let centre_inside = total(r_min) >= TAU;
    let residual = |r: f64| {
        if centre_inside {
            total(r) - TAU
        } else {
            let others = total(r) - half_angle(lmax, r);
            // Sign flipped so both cases are positive near r_min.
            half_angle(lmax, r) - others
        }
    };

    // Start the bracket from the regular-polygon circumradius.
    let mean_len = (lmax + rest) / n as f64;
    let mut hi = (mean_len / (2.0 * (PI / n as f64).sin())).max(r_min * 2.0);
    let mut doublings = 0;
    while residual(hi) > 0.0 {
        hi *= 2.0;
        doublings += 1;
        if doublings > RADIUS_BRACKET_LIMIT {
            return None;
        }
    }
    let mut lo = r_min;
    for _ in 0..RADIUS_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if residual(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let r = 0.5 * (lo + hi);

    let thetas: Vec<f64> = lengths
        .iter()
        .enumerate()
        .map(|(i, &l)| {
            let t = half_angle(l, r);
            if !centre_inside && i == longest {
                TAU - t
            } else {
                t
            }
        })
        .collect();

    Some(
        (0..n)
            .map(|i| 0.5 * (thetas[i] + thetas[(i + 1) % n]))
            .collect(),
    )
}

// ── Measurement ──────────────────────────────────────────

/// Interior angle at each vertex, in degrees.
///
/// Unsigned angle between the two adjacent edges from the normalised dot
/// product; corners turning against the polygon's winding are reflex.
pub fn interior_angles(vertices: &[Point]) -> Vec<f64> {
    let n = vertices.len();
    if n < 3 {
        return Vec::new();
    }
    let winding = signed_area(vertices).signum();
    (0..n)
        .map(|i| {
            let prev = vertices[(i + n - 1) % n];
            let curr = vertices[i];
            let next = vertices[(i + 1) % n];
            let a = prev - curr;
            let b = next - curr;
            let denom = a.hypot() * b.hypot();
            if denom == 0.0 {
                return 180.0;
            }
            let angle = (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees();
            let turn = (curr - prev).cross(next - curr);
            if turn * winding < 0.0 {
                360.0 - angle
            } else {
                angle
            }
        })
        .collect()
}

/// Acute (< 45°) and obtuse (> 135°) corner warnings.
pub fn angle_warnings(angles: &[f64]) -> Vec<AngleWarning> {
    angles
        .iter()
        .enumerate()
        .filter_map(|(corner, &angle)| {
            let message = if angle < ACUTE_LIMIT {
                format!("Corner {} is very acute ({:.1}°)", corner + 1, angle)
            } else if angle > OBTUSE_LIMIT {
                format!("Corner {} is very obtuse ({:.1}°)", corner + 1, angle)
            } else {
                return None;
            };
            Some(AngleWarning {
                corner,
                angle,
                severity: Severity::Warning,
                message,
            })
        })
        .collect()
}

/// Compare a constructed area with the area the user expected.
pub fn validate_area(calculated: f64, provided: Option<f64>) -> AreaValidation {
    let Some(provided) = provided.filter(|p| p.is_finite() && *p > 0.0) else {
        return AreaValidation {
            status: AreaStatus::NotProvided,
            calculated_area: calculated,
            provided_area: None,
            difference: 0.0,
            percent_diff: 0.0,
            message: "No expected area provided".to_string(),
        };
    };

    let difference = (calculated - provided).abs();
    let percent_diff = difference / calculated.max(provided);
    let (status, message) = if percent_diff <= AREA_TOLERANCE {
        (
            AreaStatus::Valid,
            format!("Area matches expected value (within {:.1}%)", percent_diff * 100.0),
        )
    } else {
        (
            AreaStatus::Mismatch,
            format!(
                "Calculated area {:.2} differs from expected {:.2} by {:.1}%",
                calculated,
                provided,
                percent_diff * 100.0
            ),
        )
    };

    AreaValidation {
        status,
        calculated_area: calculated,
        provided_area: Some(provided),
        difference,
        percent_diff,
        message,
    }
}
