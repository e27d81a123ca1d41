//! Candidate Sampling Module
//!
//! Generates the reproducible set of candidate points inside the search
//! disk. Density scales with disk area and is clamped so small requests
//! still get meaningful coverage and large ones stay bounded.

use std::f64::consts::TAU;

use crate::geo::{self, Coordinate};
use crate::rng::SeededRng;

// ===================== CONSTANTS =====================

/// Target candidates per square kilometer before clamping
const DENSITY_PER_KM2: f64 = 30.0;

/// Lower bound on the candidate count
const MIN_CANDIDATES: usize = 200;

/// Upper bound on the candidate count
const MAX_CANDIDATES: usize = 2000;

// ===================== SAMPLING =====================

/// Number of candidates for a disk of the given radius:
/// `clamp(round(radius_km² · 30), 200, 2000)`.
pub fn candidate_count(radius_km: f64) -> usize {
    let target = (radius_km * radius_km * DENSITY_PER_KM2).round() as i64;
    target.clamp(MIN_CANDIDATES as i64, MAX_CANDIDATES as i64) as usize
}

/// Sample candidate points uniformly over the disk.
///
/// Uses the polar transform `r = R·√u, θ = 2π·v`; the square root keeps
/// the radial density uniform per unit area instead of crowding the
/// center. Points are placed with the local projection around `center`.
pub fn sample_disk(center: Coordinate, radius_km: f64, rng: &mut SeededRng) -> Vec<Coordinate> {
    let n = candidate_count(radius_km);
    let mut points = Vec::with_capacity(n);

    for _ in 0..n {
        let u = rng.next_f64();
        let v = rng.next_f64();
        let r = radius_km * u.sqrt();
        let theta = TAU * v;
        points.push(geo::offset_km(center, r * theta.cos(), r * theta.sin()));
    }

    points
}

// ===================== TESTS =====================
