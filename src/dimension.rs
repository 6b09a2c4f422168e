//! Dimension parsing: OCR words → structured measurements.
//!
//! Each word is matched against unit patterns in a fixed order
//! (metres, feet, yards); the first pattern that yields a number wins.
//! Near-identical detections of the same label are then collapsed.

use std::fmt;

use kurbo::Point;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Values above this are treated as OCR garbage.
const MAX_DIMENSION_VALUE: f64 = 10_000.0;

/// Two labels closer than this (px) may be the same measurement.
const DUPLICATE_DISTANCE: f64 = 20.0;

/// Two labels whose metre values differ by at most this fraction may be
/// the same measurement.
const DUPLICATE_VALUE_TOLERANCE: f64 = 0.10;

/// Length unit recognised on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "ft")]
    Feet,
    #[serde(rename = "yd")]
    Yards,
}

impl Unit {
    /// Metres per one of this unit.
    pub fn to_meters_factor(self) -> f64 {
        match self {
            Unit::Meters => 1.0,
            Unit::Feet => 0.3048,
            Unit::Yards => 0.9144,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Meters => "m",
            Unit::Feet => "ft",
            Unit::Yards => "yd",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }
}

/// A word as returned by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    /// Recognition confidence, 0-100.
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// A measurement read off the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDimension {
    pub value: f64,
    pub unit: Unit,
    /// Centre of the label's bounding box.
    pub position: Point,
    pub bbox: BoundingBox,
    /// OCR confidence, 0-100.
    pub confidence: f64,
    pub text: String,
}

impl ExtractedDimension {
    pub fn meters(&self) -> f64 {
        self.value * self.unit.to_meters_factor()
    }
}

static UNIT_PATTERNS: Lazy<Vec<(Unit, Regex)>> = Lazy::new(|| {
    // Comma followed by exactly three digits groups thousands; any other
    // comma is a decimal separator.
    const NUMBER: &str =
        r"(?:(?P<thousands>\d{1,3}(?:,\d{3})+(?:\.\d+)?)|(?P<plain>\d+(?:[.,]\d+)?))";
    // Area labels ("450m²", "120 ft sq") are not edge lengths.
    const AREA: &str = r"(?P<area>²|\s*sq\b)?";
    [
        (Unit::Meters, r"\s*(?:meters?|metres?|m)\b"),
        (Unit::Feet, r"\s*(?:(?:feet|foot|ft)\b|')"),
        (Unit::Yards, r"\s*(?:yards?|yds?)\b"),
    ]
    .into_iter()
    .map(|(unit, suffix)| {
        let pattern = format!("(?i){NUMBER}{suffix}{AREA}");
        (unit, Regex::new(&pattern).expect("invalid unit pattern"))
    })
    .collect()
});

/// Parse a single label like `"12.5m"`, `"40 ft"` or `"3,2 metres"`.
///
/// `"1,250 m"` reads as 1250; `"3,25 m"` as 3.25. Returns `None` when no
/// unit pattern matches, the label is an area, or the number is out of
/// the plausible range.
pub fn parse_dimension_text(text: &str) -> Option<(f64, Unit)> {
    for (unit, re) in UNIT_PATTERNS.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        if caps.name("area").is_some() {
            log::trace!("'{}' is an area, not a length", text);
            return None;
        }
        let raw = match (caps.name("thousands"), caps.name("plain")) {
            (Some(t), _) => t.as_str().replace(',', ""),
            (None, Some(p)) => p.as_str().replace(',', "."),
            (None, None) => return None,
        };
        // First pattern with a numeric capture decides the word.
        return raw
            .parse::<f64>()
            .ok()
            .filter(|v| is_plausible(*v))
            .map(|v| (v, *unit));
    }
    None
}

fn is_plausible(value: f64) -> bool {
    !value.is_nan() && value > 0.0 && value <= MAX_DIMENSION_VALUE
}

/// Turn OCR words into deduplicated measurements.
///
/// Words below `min_confidence` are ignored.
pub fn parse_dimensions(words: &[OcrWord], min_confidence: f64) -> Vec<ExtractedDimension> {
    let mut found = Vec::new();
    for word in words {
        if word.confidence < min_confidence {
            continue;
        }
        match parse_dimension_text(&word.text) {
            Some((value, unit)) => {
                log::debug!(
                    "dimension {}{} from '{}' (conf {:.0})",
                    value,
                    unit,
                    word.text,
                    word.confidence
                );
                found.push(ExtractedDimension {
                    value,
                    unit,
                    position: word.bbox.center(),
                    bbox: word.bbox,
                    confidence: word.confidence,
                    text: word.text.clone(),
                });
            }
            None => log::trace!("no dimension in '{}'", word.text),
        }
    }

    let before = found.len();
    let dims = deduplicate(found);
    if dims.len() < before {
        log::debug!("dropped {} duplicate dimension labels", before - dims.len());
    }
    dims
}

/// Collapse labels that describe the same physical measurement.
///
/// The higher-confidence detection survives; survivors keep their
/// original order.
pub fn deduplicate(dims: Vec<ExtractedDimension>) -> Vec<ExtractedDimension> {
    let mut order: Vec<usize> = (0..dims.len()).collect();
    order.sort_by(|&a, &b| dims[b].confidence.total_cmp(&dims[a].confidence));

    let mut kept: Vec<usize> = Vec::with_capacity(dims.len());
    for i in order {
        if !kept.iter().any(|&k| is_duplicate(&dims[k], &dims[i])) {
            kept.push(i);
        }
    }
    kept.sort_unstable();

    let mut slots: Vec<Option<ExtractedDimension>> = dims.into_iter().map(Some).collect();
    kept.into_iter().filter_map(|i| slots[i].take()).collect()
}

fn is_duplicate(a: &ExtractedDimension, b: &ExtractedDimension) -> bool {
    if a.position.distance(b.position) > DUPLICATE_DISTANCE {
        return false;
    }
    let (ma, mb) = (a.meters(), b.meters());
    (ma - mb).abs() / ma.max(mb) <= DUPLICATE_VALUE_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, confidence: f64, x: f64, y: f64) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            confidence,
            bbox: BoundingBox::new(x - 10.0, y - 5.0, x + 10.0, y + 5.0),
        }
    }

    #[test]
    fn parses_abbreviated_and_spelled_units() {
        assert_eq!(parse_dimension_text("12.5m"), Some((12.5, Unit::Meters)));
        assert_eq!(parse_dimension_text("30 Metres"), Some((30.0, Unit::Meters)));
        assert_eq!(parse_dimension_text("40 FT"), Some((40.0, Unit::Feet)));
        assert_eq!(parse_dimension_text("40'"), Some((40.0, Unit::Feet)));
        assert_eq!(parse_dimension_text("15 yards"), Some((15.0, Unit::Yards)));
        assert_eq!(parse_dimension_text("7yd"), Some((7.0, Unit::Yards)));
        assert_eq!(parse_dimension_text("3,2 m"), Some((3.2, Unit::Meters)));
    }

    #[test]
    fn rejects_non_dimensions() {
        assert_eq!(parse_dimension_text("LOT 12"), None);
        assert_eq!(parse_dimension_text("12mm"), None);
        assert_eq!(parse_dimension_text("0m"), None);
        assert_eq!(parse_dimension_text("20000 m"), None);
        assert_eq!(parse_dimension_text("450m²"), None);
        assert_eq!(parse_dimension_text("Area:450m²"), None);
        assert_eq!(parse_dimension_text("Area: 450 m2"), None);
        assert_eq!(parse_dimension_text("1200 ft²"), None);
        assert_eq!(parse_dimension_text("300 m sq"), None);
    }

    #[test]
    fn comma_groups_thousands_only_before_three_digits() {
        assert_eq!(parse_dimension_text("1,250m"), Some((1250.0, Unit::Meters)));
        assert_eq!(parse_dimension_text("2,500.5 ft"), Some((2500.5, Unit::Feet)));
        assert_eq!(parse_dimension_text("1,25m"), Some((1.25, Unit::Meters)));
        assert_eq!(parse_dimension_text("12,5 m"), Some((12.5, Unit::Meters)));
    }

    #[test]
    fn area_label_inside_lot_is_not_a_length() {
        let words = vec![word("20m", 90.0, 100.0, -10.0), word("200m²", 95.0, 100.0, 50.0)];
        let dims = parse_dimensions(&words, 60.0);
        assert_eq!(dims.len(), 1);
        assert_eq!(dims[0].value, 20.0);
    }

    #[test]
    fn low_confidence_words_are_ignored() {
        let words = vec![word("10m", 40.0, 0.0, 0.0), word("20m", 90.0, 100.0, 0.0)];
        let dims = parse_dimensions(&words, 60.0);
        assert_eq!(dims.len(), 1);
        assert_eq!(dims[0].value, 20.0);
        assert_eq!(dims[0].position, Point::new(100.0, 0.0));
    }

    #[test]
    fn duplicates_keep_higher_confidence() {
        let words = vec![
            word("10m", 70.0, 50.0, 50.0),
            word("10.4m", 95.0, 55.0, 52.0),
            word("10m", 80.0, 300.0, 50.0),
        ];
        let dims = parse_dimensions(&words, 0.0);
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[0].value, 10.4);
        assert_eq!(dims[0].confidence, 95.0);
        assert_eq!(dims[1].position, Point::new(300.0, 50.0));
    }

    #[test]
    fn nearby_labels_with_different_values_survive() {
        let words = vec![word("10m", 90.0, 50.0, 50.0), word("15m", 90.0, 55.0, 50.0)];
        assert_eq!(parse_dimensions(&words, 0.0).len(), 2);
    }

    #[test]
    fn duplicates_compare_in_meters() {
        // 33 ft ≈ 10.06 m: same measurement in a different unit.
        let words = vec![word("10m", 90.0, 50.0, 50.0), word("33ft", 60.0, 52.0, 50.0)];
        let dims = parse_dimensions(&words, 0.0);
        assert_eq!(dims.len(), 1);
        assert_eq!(dims[0].unit, Unit::Meters);
    }
}
