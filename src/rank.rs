//! Top-K Selection Module
//!
//! Streams all scored candidates through a bounded heap keeping the best
//! `M = max(20, K)` by ranking metric, then applies a greedy minimum-
//! spacing pass so the final ranking is spatially spread instead of a
//! cluster of near-duplicates around one hotspot.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::bias::ScoredCandidate;
use crate::geo::{Coordinate, haversine_km};

// ===================== CONSTANTS =====================

/// Minimum pairwise distance between selected results, in kilometers
pub const MIN_SPACING_KM: f64 = 0.5;

/// Lower bound on the streaming heap size
const HEAP_FLOOR: usize = 20;

// ===================== METRIC =====================

/// Ranking metric for one candidate: energy per dollar when ranking by
/// cost (and a price is attached), otherwise the Relative Potential Score.
fn ranking_metric(candidate: &ScoredCandidate, by_cost: bool) -> f64 {
    if by_cost
        && let Some(ppc) = candidate.power_per_cost
    {
        return ppc;
    }
    candidate.rps
}

// ===================== BOUNDED HEAP =====================

#[derive(Debug, PartialEq)]
struct HeapEntry {
    metric: f64,
    index: usize,
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.metric.total_cmp(&other.metric).then_with(|| other.index.cmp(&self.index))
    }
}

// ===================== SELECTION =====================

/// Select up to `k` spatially spread results, best metric first.
///
/// Ties in the descending sort break by higher RPS, then shorter distance
/// to the request center, then lower latitude, then lower longitude, so
/// the output is fully deterministic.
pub fn select_top_k(
    candidates: Vec<ScoredCandidate>,
    k: usize,
    rank_by_cost: bool,
    center: Coordinate,
) -> Vec<ScoredCandidate> {
    if k == 0 || candidates.is_empty() {
        return Vec::new();
    }

    // Streaming top-M pass: a min-heap of the best M seen so far
    let m = k.max(HEAP_FLOOR);
    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(m + 1);
    for (index, candidate) in candidates.iter().enumerate() {
        let metric = ranking_metric(candidate, rank_by_cost);
        if heap.len() < m {
            heap.push(Reverse(HeapEntry { metric, index }));
        } else {
            let beats_floor = heap.peek().is_some_and(|Reverse(smallest)| metric > smallest.metric);
            if beats_floor {
                heap.pop();
                heap.push(Reverse(HeapEntry { metric, index }));
            }
        }
    }

    // Deterministic descending order with the full tie-break chain
    let mut shortlist: Vec<(f64, usize)> =
        heap.into_iter().map(|Reverse(e)| (e.metric, e.index)).collect();
    shortlist.sort_by(|&(ma, ia), &(mb, ib)| {
        let a = &candidates[ia];
        let b = &candidates[ib];
        mb.total_cmp(&ma)
            .then_with(|| b.rps.total_cmp(&a.rps))
            .then_with(|| {
                haversine_km(center, a.loc).total_cmp(&haversine_km(center, b.loc))
            })
            .then_with(|| a.loc.lat.total_cmp(&b.loc.lat))
            .then_with(|| a.loc.lng.total_cmp(&b.loc.lng))
    });

    // Greedy spacing pass
    let mut selected: Vec<ScoredCandidate> = Vec::with_capacity(k);
    for (_, index) in shortlist {
        let candidate = &candidates[index];
        let spaced = selected.iter().all(|s| haversine_km(s.loc, candidate.loc) >= MIN_SPACING_KM);
        if spaced {
            selected.push(candidate.clone());
            if selected.len() == k {
                break;
            }
        }
    }

    selected
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(lat: f64, lng: f64, rps: f64, power_per_cost: Option<f64>) -> ScoredCandidate {
        ScoredCandidate {
            loc: Coordinate::new(lat, lng),
            raw_poa: 30_000.0,
            corrected_poa: 500.0,
            baseline_poa: 500.0,
            csi: 1.0,
            local_percentile: 50.0,
            kwh_per_day: 2.5,
            rps,
            land_price: None,
            power_per_cost,
        }
    }

    #[test]
    fn test_selects_best_by_rps() {
        let center = Coordinate::new(30.0, -97.0);
        let candidates = vec![
            candidate(30.00, -97.00, 0.5, None),
            candidate(30.02, -97.00, 0.9, None),
            candidate(30.04, -97.00, 0.7, None),
        ];

        let top = select_top_k(candidates, 2, false, center);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].rps, 0.9);
        assert_eq!(top[1].rps, 0.7);
    }

    #[test]
    fn test_spacing_pass_drops_near_duplicates() {
        let center = Coordinate::new(30.0, -97.0);
        // Second-best sits ~110 m from the best and must be skipped
        let candidates = vec![
            candidate(30.000, -97.000, 1.0, None),
            candidate(30.001, -97.000, 0.9, None),
            candidate(30.010, -97.000, 0.8, None),
        ];

        let top = select_top_k(candidates, 3, false, center);
        assert_eq!(top.len(), 2, "the 110 m neighbour must be dropped");
        for i in 0..top.len() {
            for j in (i + 1)..top.len() {
                let d = haversine_km(top[i].loc, top[j].loc);
                assert!(d >= MIN_SPACING_KM, "results only {} km apart", d);
            }
        }
    }

    #[test]
    fn test_rank_by_cost_uses_power_per_cost() {
        let center = Coordinate::new(30.0, -97.0);
        // Higher RPS but worse energy-per-dollar loses under cost ranking
        let candidates = vec![
            candidate(30.00, -97.00, 0.9, Some(0.001)),
            candidate(30.02, -97.00, 0.5, Some(0.050)),
        ];

        let by_cost = select_top_k(candidates.clone(), 1, true, center);
        assert_eq!(by_cost[0].rps, 0.5);

        let by_rps = select_top_k(candidates, 1, false, center);
        assert_eq!(by_rps[0].rps, 0.9);
    }

    #[test]
    fn test_bounded_heap_keeps_global_best() {
        let center = Coordinate::new(30.0, -97.0);
        // 200 mediocre candidates followed by one excellent outlier;
        // the streaming heap must not have evicted it.
        let mut candidates: Vec<ScoredCandidate> = (0..200)
            .map(|i| candidate(30.0 + 0.01 * f64::from(i), -97.0, 0.3, None))
            .collect();
        candidates.push(candidate(29.0, -97.0, 1.5, None));

        let top = select_top_k(candidates, 1, false, center);
        assert_eq!(top[0].rps, 1.5);
    }

    #[test]
    fn test_tie_break_prefers_closer_to_center() {
        let center = Coordinate::new(30.0, -97.0);
        let far = candidate(30.10, -97.00, 0.8, None);
        let near = candidate(30.01, -97.00, 0.8, None);

        let top = select_top_k(vec![far, near], 1, false, center);
        assert_eq!(top[0].loc.lat, 30.01);
    }

    #[test]
    fn test_empty_and_zero_k() {
        let center = Coordinate::new(30.0, -97.0);
        assert!(select_top_k(Vec::new(), 5, false, center).is_empty());
        assert!(select_top_k(vec![candidate(30.0, -97.0, 1.0, None)], 0, false, center).is_empty());
    }

    #[test]
    fn test_fewer_results_than_k_after_spacing() {
        let center = Coordinate::new(30.0, -97.0);
        // All candidates inside one 300 m cluster: only one survives
        let candidates: Vec<ScoredCandidate> = (0..10)
            .map(|i| candidate(30.0 + 0.0002 * f64::from(i), -97.0, 0.5 + 0.01 * f64::from(i), None))
            .collect();

        let top = select_top_k(candidates, 5, false, center);
        assert_eq!(top.len(), 1);
    }
}
