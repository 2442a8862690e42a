//! Per-track nearest-neighbour matching
//!
//! Scores every candidate object of the new frame against a track's tail
//! object and picks the cheapest one below the rejection threshold. Costs are
//! evaluated in parallel but the selection runs over candidates in ascending
//! `obj_idx` order, so equal costs always resolve to the lowest index.
use crate::object::{ObjIdx, Object};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which leftover pool objects found new tracks after matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectSelection {
    /// Every unmatched object becomes a new track
    Auto,
    /// Leftover objects stay in the pool
    #[default]
    None,
}

/// Configuration for the linear floc linker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Discard candidates farther than `gate_base + area^gate_exponent`
    pub gate_enabled: bool,
    pub gate_base: f64,
    pub gate_exponent: f64,
    /// Weight of the centroid distance term
    pub dist_weight: f64,
    /// Square the distance term instead of using it linearly
    pub dist_squared: bool,
    /// Weight of the area difference term
    pub area_weight: f64,
    pub area_squared: bool,
    /// Matches with a cost at or above this are rejected
    pub error_threshold: f64,
    pub auto_select: ObjectSelection,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            gate_enabled: true,
            gate_base: 200.0,
            gate_exponent: 1.25,
            dist_weight: 1.0,
            dist_squared: true,
            area_weight: 1.0,
            area_squared: true,
            error_threshold: 1e3,
            auto_select: ObjectSelection::None,
        }
    }
}

impl LinkerConfig {
    /// Maximum centroid distance a candidate may have from `prev`
    pub fn gate_radius(&self, prev: &Object) -> f64 {
        self.gate_base + (prev.area as f64).powf(self.gate_exponent)
    }

    /// Whether the gating filter keeps `cand`
    pub fn passes_gate(&self, prev: &Object, cand: &Object) -> bool {
        !self.gate_enabled || prev.distance_to(cand) <= self.gate_radius(prev)
    }

    /// `dist_weight * d^p + area_weight * |Δarea|^p`
    pub fn cost(&self, prev: &Object, cand: &Object) -> f64 {
        let d = prev.distance_to(cand);
        let da = (prev.area as f64 - cand.area as f64).abs();
        let dist_term = if self.dist_squared { d * d } else { d };
        let area_term = if self.area_squared { da * da } else { da };
        self.dist_weight * dist_term + self.area_weight * area_term
    }
}

/// Accepted candidate for one track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub obj_idx: ObjIdx,
    pub cost: f64,
}

/// Find the best candidate for `prev` among `candidates`.
///
/// Candidates are sorted by `obj_idx` before the argmin so ties go to the
/// lowest index regardless of input order. Returns `None` when gating removes
/// every candidate, when the minimum cost reaches `error_threshold`, or when
/// no finite cost exists.
pub fn match_in_frame<'a, I>(prev: &Object, candidates: I, config: &LinkerConfig) -> Option<Match>
where
    I: IntoIterator<Item = &'a Object>,
{
    let mut gated: Vec<&Object> = candidates
        .into_iter()
        .filter(|cand| config.passes_gate(prev, cand))
        .collect();
    if gated.is_empty() {
        return None;
    }
    gated.sort_by_key(|cand| cand.obj_idx);

    // indexed parallel collect keeps candidate order
    let costs: Vec<f64> = gated
        .par_iter()
        .map(|cand| config.cost(prev, cand))
        .collect();

    let mut best: Option<Match> = None;
    for (cand, cost) in gated.iter().zip(costs) {
        if !cost.is_finite() {
            continue;
        }
        if best.map_or(true, |b| cost < b.cost) {
            best = Some(Match {
                obj_idx: cand.obj_idx,
                cost,
            });
        }
    }

    best.filter(|m| m.cost < config.error_threshold)
}
