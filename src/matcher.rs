//! Dimension-to-edge matching.
//!
//! Each label is assigned to the closest polygon edge (clamped
//! point-to-segment distance). Several labels may land on one edge;
//! [`detect_conflicts`] reports edges whose labels disagree and
//! [`resolve_conflicts`] keeps one label per edge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dimension::ExtractedDimension;
use crate::geom::{point_to_segment_distance, Edge};

/// Labels on one edge disagreeing by more than this (percent) conflict.
pub const CONFLICT_THRESHOLD_PCT: f64 = 10.0;

/// Confidence difference (points) within which candidates count as tied.
const CONFIDENCE_TIE: f64 = 5.0;

/// Absorbs float noise at the conflict boundary: exactly 10% is not a conflict.
const THRESHOLD_EPS: f64 = 1e-9;

/// A label assigned to an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionMatch {
    pub edge_index: usize,
    pub dimension: ExtractedDimension,
    /// Clamped point-to-segment distance, in pixels.
    pub distance: f64,
    /// 0-100.
    pub match_confidence: f64,
}

/// Several disagreeing labels on the same edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConflict {
    pub edge_index: usize,
    pub dimensions: Vec<ExtractedDimension>,
    /// `(max - min) / min` of the metre values, in percent.
    pub variance: f64,
}

/// Assign every dimension to its closest edge within `max_distance` pixels.
///
/// Dimensions further than `max_distance` from every edge are left out.
pub fn match_dimensions(
    edges: &[Edge],
    dims: &[ExtractedDimension],
    max_distance: f64,
) -> Vec<DimensionMatch> {
    let mut matches = Vec::new();
    for dim in dims {
        let closest = edges
            .iter()
            .map(|e| (e.index, point_to_segment_distance(dim.position, e.start, e.end)))
            .filter(|&(_, d)| d <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match closest {
            Some((edge_index, distance)) => {
                let closeness = if max_distance > 0.0 {
                    1.0 - distance / max_distance
                } else {
                    1.0
                };
                let match_confidence = 40.0 * closeness + 0.6 * dim.confidence;
                log::debug!(
                    "'{}' → edge {} ({:.1} px, conf {:.0})",
                    dim.text,
                    edge_index,
                    distance,
                    match_confidence
                );
                matches.push(DimensionMatch {
                    edge_index,
                    dimension: dim.clone(),
                    distance,
                    match_confidence,
                });
            }
            None => log::debug!("'{}' is not near any edge", dim.text),
        }
    }
    matches
}

fn group_by_edge(matches: &[DimensionMatch]) -> BTreeMap<usize, Vec<&DimensionMatch>> {
    let mut groups: BTreeMap<usize, Vec<&DimensionMatch>> = BTreeMap::new();
    for m in matches {
        groups.entry(m.edge_index).or_default().push(m);
    }
    groups
}

/// Spread of metre values as `(max - min) / min`, in percent.
fn spread_pct(group: &[&DimensionMatch]) -> f64 {
    let (min, max) = group
        .iter()
        .map(|m| m.dimension.meters())
        .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min <= 0.0 {
        return f64::INFINITY;
    }
    (max - min) / min * 100.0
}

/// Edges carrying several labels whose values differ by more than 10%.
pub fn detect_conflicts(matches: &[DimensionMatch]) -> Vec<DimensionConflict> {
    group_by_edge(matches)
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .filter_map(|(edge_index, group)| {
            let variance = spread_pct(&group);
            (variance > CONFLICT_THRESHOLD_PCT + THRESHOLD_EPS).then(|| DimensionConflict {
                edge_index,
                dimensions: group.iter().map(|m| m.dimension.clone()).collect(),
                variance,
            })
        })
        .collect()
}

/// Keep one label per edge.
///
/// Candidates within 5 confidence points of the best are treated as tied;
/// the closest of those wins. Output is ordered by edge index.
pub fn resolve_conflicts(matches: &[DimensionMatch]) -> Vec<DimensionMatch> {
    group_by_edge(matches)
        .into_values()
        .filter_map(|group| {
            if group.len() > 1 {
                log::debug!(
                    "edge {}: choosing between {} labels",
                    group[0].edge_index,
                    group.len()
                );
            }
            pick_best(&group).cloned()
        })
        .collect()
}

fn pick_best<'a>(group: &[&'a DimensionMatch]) -> Option<&'a DimensionMatch> {
    let top = group
        .iter()
        .map(|m| m.match_confidence)
        .fold(f64::MIN, f64::max);
    group
        .iter()
        .filter(|m| top - m.match_confidence <= CONFIDENCE_TIE)
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
        .copied()
}

/// Dimensions that did not end up on any edge.
pub fn unmatched_dimensions(
    dims: &[ExtractedDimension],
    matches: &[DimensionMatch],
) -> Vec<ExtractedDimension> {
    dims.iter()
        .filter(|d| !matches.iter().any(|m| &m.dimension == *d))
        .cloned()
        .collect()
}

/// Indices of edges without a dimension. The caller must ask the user
/// for these; they are never guessed.
pub fn unmatched_edges(edges: &[Edge], matches: &[DimensionMatch]) -> Vec<usize> {
    edges
        .iter()
        .map(|e| e.index)
        .filter(|i| !matches.iter().any(|m| m.edge_index == *i))
        .collect()
}
