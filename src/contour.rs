//! Contour extraction and the polygon primitives the boundary selector
//! builds on.

use geo::{ConvexHull, Coord, LineString, Polygon, Simplify};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use kurbo::Point;

use crate::geom::polygon_area;

/// Fraction of image dimensions a contour's bounding box must span to be
/// classified as an image-frame artifact and discarded.
const FRAME_CONTOUR_THRESHOLD: f64 = 0.98;

/// A closed pixel polyline and its enclosed area.
#[derive(Debug, Clone)]
pub struct Contour {
    /// Points in pixel coordinates (y=0 is top of image).
    pub points: Vec<Point>,
    /// Absolute shoelace area in px².
    pub area: f64,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        let area = polygon_area(&points);
        Self { points, area }
    }
}

/// Extract outer contours from a binary image.
pub fn extract(binary: &GrayImage) -> Vec<Contour> {
    let (w, h) = binary.dimensions();
    let ip_contours = find_contours::<i32>(binary);

    let mut result: Vec<Contour> = ip_contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 3)
        .map(|c| {
            let points = c
                .points
                .iter()
                .map(|p| Point::new(p.x as f64, p.y as f64))
                .collect();
            Contour::new(points)
        })
        .collect();

    let before = result.len();
    result.retain(|c| !is_frame_contour(c, w, h));
    if result.len() < before {
        log::debug!("discarded {} image-frame contours", before - result.len());
    }

    result
}

/// Check if a contour is the image frame (bounding box covers nearly all of the image).
fn is_frame_contour(contour: &Contour, img_w: u32, img_h: u32) -> bool {
    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    // Pixel extent, so a border along the full image edge spans the full size.
    (max_x - min_x + 1.0) > img_w as f64 * FRAME_CONTOUR_THRESHOLD
        && (max_y - min_y + 1.0) > img_h as f64 * FRAME_CONTOUR_THRESHOLD
}

/// Polygon operations the boundary selector needs from a geometry backend.
///
/// Kept behind a trait so selection logic can be tested against fakes.
pub trait ContourPrimitives {
    /// Reduce a closed contour to a polygon within `epsilon` pixels.
    ///
    /// The returned ring does not repeat its first point.
    fn approximate(&self, points: &[Point], epsilon: f64) -> Vec<Point>;

    /// Convex hull of a point set, as an open ring.
    fn convex_hull(&self, points: &[Point]) -> Vec<Point>;
}

/// `geo`-backed primitives: Ramer–Douglas–Peucker and convex hull.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPrimitives;

impl ContourPrimitives for GeoPrimitives {
    fn approximate(&self, points: &[Point], epsilon: f64) -> Vec<Point> {
        if points.len() <= 3 || epsilon <= 0.0 {
            return points.to_vec();
        }
        let simplified = to_polygon(points).simplify(&epsilon);
        open_ring(simplified.exterior())
    }

    fn convex_hull(&self, points: &[Point]) -> Vec<Point> {
        if points.len() < 3 {
            return points.to_vec();
        }
        let hull = to_polygon(points).convex_hull();
        open_ring(hull.exterior())
    }
}

fn to_polygon(points: &[Point]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    Polygon::new(LineString::new(coords), vec![])
}

/// Drop the closing coordinate geo appends to rings.
fn open_ring(ring: &LineString<f64>) -> Vec<Point> {
    let mut pts: Vec<Point> = ring.coords().map(|c| Point::new(c.x, c.y)).collect();
    if pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    pts
}
