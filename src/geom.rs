//! Shared geometry utilities.
//!
//! Pixel-space points are `kurbo::Point`s; world-space points are
//! [`Point3D`] in metres on the ground plane.

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// A world-space point in metres. `z` is 0 for flat ground shapes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub fn flat(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One side of a polygon. Edge `index` runs from vertex `index`
/// to vertex `(index + 1) % n`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub index: usize,
    pub start: Point,
    pub end: Point,
    pub midpoint: Point,
    pub length: f64,
    /// Direction in degrees, `atan2(dy, dx)`.
    pub angle: f64,
}

/// Derive the wrapping edge list of a closed polygon.
pub fn edges(vertices: &[Point]) -> Vec<Edge> {
    let n = vertices.len();
    if n < 2 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let start = vertices[i];
            let end = vertices[(i + 1) % n];
            let d = end - start;
            Edge {
                index: i,
                start,
                end,
                midpoint: start.midpoint(end),
                length: d.hypot(),
                angle: d.atan2().to_degrees(),
            }
        })
        .collect()
}

/// Signed area via shoelace formula. Positive = CCW (y up), negative = CW.
pub fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            points[i].x * points[j].y - points[j].x * points[i].y
        })
        .sum::<f64>()
        / 2.0
}

/// Unsigned shoelace area.
pub fn polygon_area(points: &[Point]) -> f64 {
    signed_area(points).abs()
}

/// Length of the closed loop through `points`.
pub fn closed_perimeter(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| points[i].distance(points[(i + 1) % n])).sum()
}

/// Vertex centroid (mean of the vertices, not the area centroid).
pub fn vertex_centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::ZERO;
    }
    let sum = points
        .iter()
        .fold(Vec2::ZERO, |acc, p| acc + p.to_vec2());
    (sum / points.len() as f64).to_point()
}

/// Distance from `p` to the segment `a`–`b`.
///
/// The projection parameter is clamped to [0, 1], so a point beyond an
/// endpoint measures to that endpoint, not to the infinite line.
pub fn point_to_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.hypot2();
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(s: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(s, 0.0),
            Point::new(s, s),
            Point::new(0.0, s),
        ]
    }

    #[test]
    fn edges_wrap_to_first_vertex() {
        let e = edges(&square(10.0));
        assert_eq!(e.len(), 4);
        assert_eq!(e[3].index, 3);
        assert_eq!(e[3].end, Point::new(0.0, 0.0));
        assert_eq!(e[1].midpoint, Point::new(10.0, 5.0));
        assert!((e[1].angle - 90.0).abs() < 1e-9);
        assert!(e.iter().all(|edge| (edge.length - 10.0).abs() < 1e-9));
    }

    #[test]
    fn shoelace_sign_follows_winding() {
        let mut sq = square(4.0);
        assert!((signed_area(&sq) - 16.0).abs() < 1e-9);
        sq.reverse();
        assert!((signed_area(&sq) + 16.0).abs() < 1e-9);
        assert!((polygon_area(&sq) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn segment_distance_on_segment_is_zero() {
        let d = point_to_segment_distance(
            Point::new(5.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
        );
        assert_eq!(d, 0.0);
    }

    #[test]
    fn segment_distance_beyond_endpoint_uses_endpoint() {
        // Perpendicular distance to the infinite line would be 0 here.
        let d = point_to_segment_distance(
            Point::new(13.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
        );
        assert!((d - 3.0).abs() < 1e-12);

        let d = point_to_segment_distance(
            Point::new(-3.0, 4.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
        );
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_segment_measures_to_point() {
        let a = Point::new(1.0, 1.0);
        let d = point_to_segment_distance(Point::new(4.0, 5.0), a, a);
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn centroid_and_perimeter() {
        let sq = square(2.0);
        assert_eq!(vertex_centroid(&sq), Point::new(1.0, 1.0));
        assert!((closed_perimeter(&sq) - 8.0).abs() < 1e-12);
    }
}
