//! Bias Correction Module
//!
//! The raw daily integral systematically favors low latitudes. To rank
//! sites by local quality instead, the model output is normalised against
//! a climatology baseline built from the same geometry: an affine fit on a
//! small reference ring maps model scale to baseline scale, and the
//! corrected value feeds a clear-sky index and a local percentile that
//! combine into the Relative Potential Score.

use std::f64::consts::TAU;

use chrono::{Datelike, NaiveDate};
use log::warn;

use crate::geo::{self, Coordinate};
use crate::integrate::PanelOrientation;
use crate::irradiance;
use crate::landprice::LandPrice;
use crate::rng::SeededRng;
use crate::solar;

// ===================== CONSTANTS =====================

/// Points on the reference ring
pub const REFERENCE_POINT_COUNT: usize = 12;

/// Reference ring radius in kilometers, independent of the request radius
pub const REFERENCE_RING_KM: f64 = 2.0;

/// Below this |Pearson correlation| the affine fit degrades to identity
pub const MIN_FIT_CORRELATION: f64 = 0.3;

/// Minimum finite reference pairs required for a trustworthy fit
const MIN_FIT_POINTS: usize = 8;

/// Radial jitter applied to ring points, as a fraction of the ring radius
const RING_JITTER_FRACTION: f64 = 0.1;

/// Converts the 5-minute POA sum (W/m²·steps) to kWh/m² per day
const KWH_PER_POA_SUM: f64 = 1.0 / 12.0 / 1000.0;

// ===================== CLIMATOLOGY =====================

/// Static month-indexed climatology used by the baseline.
#[derive(Debug, Clone)]
pub struct MonthlyClimate {
    /// Broadband attenuation per month, each in [0.55, 0.72]
    pub attenuation: [f64; 12],
    /// Mean ambient temperature per month in °C
    pub ambient_temp_c: [f64; 12],
}

impl Default for MonthlyClimate {
    fn default() -> Self {
        Self {
            attenuation: [0.58, 0.60, 0.63, 0.66, 0.69, 0.72, 0.71, 0.70, 0.67, 0.63, 0.59, 0.56],
            ambient_temp_c: [5.0, 7.0, 11.0, 16.0, 21.0, 26.0, 29.0, 28.0, 24.0, 18.0, 11.0, 6.0],
        }
    }
}

impl MonthlyClimate {
    /// Temperature derate for a month: `max(0.5, 1 - 0.004·(T - 25))`.
    ///
    /// This is the only place temperature derating is applied; the daily
    /// integrator must not repeat it.
    pub fn temperature_derate(&self, month_index: usize) -> f64 {
        (1.0 - 0.004 * (self.ambient_temp_c[month_index] - 25.0)).max(0.5)
    }
}

/// Zero-based month index for a day of year (leap-tolerant).
fn month_index(day_of_year: u32) -> usize {
    let date = NaiveDate::from_yo_opt(2024, day_of_year.clamp(1, 366))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(2024, 12, 31).expect("valid date"));
    date.month0() as usize
}

// ===================== BASELINE =====================

/// Climatology baseline POA for a location and day: the solar-noon POA of
/// the same panel geometry, attenuated by the month table and the monthly
/// temperature derate. Positive whenever the clear-sky noon POA is.
pub fn baseline_poa(loc: Coordinate, day_of_year: u32, climate: &MonthlyClimate) -> f64 {
    let noon = solar::solar_noon_utc_hour(loc.lng, day_of_year);
    let pos = solar::solar_position(loc.lat, loc.lng, day_of_year, noon);
    let panel = PanelOrientation::for_latitude(loc.lat);
    let poa = irradiance::plane_of_array(&pos, panel.tilt_deg, panel.azimuth_deg).total;

    let month = month_index(day_of_year);
    poa * climate.attenuation[month] * climate.temperature_derate(month)
}

/// Reference points on a ring around the request center: evenly spaced
/// angles with a small seeded radial jitter.
pub fn reference_ring(center: Coordinate, rng: &mut SeededRng) -> Vec<Coordinate> {
    (0..REFERENCE_POINT_COUNT)
        .map(|i| {
            let angle = TAU * i as f64 / REFERENCE_POINT_COUNT as f64;
            let jitter = (rng.next_f64() * 2.0 - 1.0) * RING_JITTER_FRACTION;
            let radius = REFERENCE_RING_KM * (1.0 + jitter);
            geo::offset_km(center, radius * angle.cos(), radius * angle.sin())
        })
        .collect()
}

// ===================== AFFINE FIT =====================

/// Result of the baseline-vs-model least-squares fit.
#[derive(Debug, Clone, Copy)]
pub struct BiasFit {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation of the reference pairs, in [-1, 1]
    pub correlation: f64,
}

impl BiasFit {
    pub const IDENTITY: Self = Self { slope: 1.0, intercept: 0.0, correlation: 0.0 };

    /// Corrected POA for a raw model value, floored at zero.
    pub fn apply(&self, raw_poa: f64) -> f64 {
        (self.slope * raw_poa + self.intercept).max(0.0)
    }
}

/// Least-squares fit `baseline ≈ slope·model + intercept` over the
/// reference pairs.
///
/// Degrades to the identity when fewer than 8 finite pairs remain, when
/// either series is constant, or when |correlation| < 0.3 — a weak fit is
/// worse than none.
pub fn fit_affine(model: &[f64], baseline: &[f64]) -> BiasFit {
    let pairs: Vec<(f64, f64)> = model
        .iter()
        .zip(baseline)
        .filter(|(m, b)| m.is_finite() && b.is_finite())
        .map(|(&m, &b)| (m, b))
        .collect();

    if pairs.len() < MIN_FIT_POINTS {
        warn!("bias fit degraded to identity: only {} usable reference points", pairs.len());
        return BiasFit::IDENTITY;
    }

    let n = pairs.len() as f64;
    let mean_m = pairs.iter().map(|(m, _)| m).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_m = 0.0;
    let mut var_b = 0.0;
    for (m, b) in &pairs {
        let dm = m - mean_m;
        let db = b - mean_b;
        cov += dm * db;
        var_m += dm * dm;
        var_b += db * db;
    }

    if var_m <= f64::EPSILON || var_b <= f64::EPSILON {
        warn!("bias fit degraded to identity: constant reference series");
        return BiasFit::IDENTITY;
    }

    let correlation = (cov / (var_m.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0);
    if correlation.abs() < MIN_FIT_CORRELATION {
        warn!("bias fit degraded to identity: correlation {:.3} too weak", correlation);
        return BiasFit { correlation, ..BiasFit::IDENTITY };
    }

    BiasFit { slope: cov / var_m, intercept: mean_b - (cov / var_m) * mean_m, correlation }
}

// ===================== SCORING =====================

/// A candidate with every derived score attached.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub loc: Coordinate,
    /// Daily POA integral from the model (W/m² summed over the grid)
    pub raw_poa: f64,
    /// Model value mapped into baseline scale by the affine fit
    pub corrected_poa: f64,
    /// Climatology baseline at this location
    pub baseline_poa: f64,
    /// Clear-sky index, clamped to [0, 2]; 0 when the baseline is degenerate
    pub csi: f64,
    /// Percentile of `corrected_poa` among all candidates, 0-100
    pub local_percentile: f64,
    /// Physical daily yield, kWh/m² per day, from the raw integral
    pub kwh_per_day: f64,
    /// Relative Potential Score
    pub rps: f64,
    pub land_price: Option<LandPrice>,
    pub power_per_cost: Option<f64>,
}

/// Score all candidates: apply the fit, compute CSI against per-location
/// baselines, rank into local percentiles, and blend into RPS with the
/// configured weights (default 0.6 CSI / 0.4 percentile).
pub fn score_candidates(
    candidates: &[(Coordinate, f64)],
    day_of_year: u32,
    climate: &MonthlyClimate,
    fit: &BiasFit,
    rps_weights: (f64, f64),
) -> Vec<ScoredCandidate> {
    let n = candidates.len();
    let corrected: Vec<f64> = candidates.iter().map(|&(_, raw)| fit.apply(raw)).collect();

    // Percentiles from ascending rank of corrected POA; ties resolve by
    // candidate index so the ordering is deterministic.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| corrected[a].total_cmp(&corrected[b]).then(a.cmp(&b)));
    let mut percentile = vec![100.0; n];
    if n > 1 {
        for (rank, &idx) in order.iter().enumerate() {
            percentile[idx] = 100.0 * rank as f64 / (n - 1) as f64;
        }
    }

    candidates
        .iter()
        .enumerate()
        .map(|(i, &(loc, raw))| {
            let baseline = baseline_poa(loc, day_of_year, climate);
            let csi = if baseline > 0.0 { (corrected[i] / baseline).clamp(0.0, 2.0) } else { 0.0 };
            let rps = rps_weights.0 * csi + rps_weights.1 * (percentile[i] / 100.0);

            ScoredCandidate {
                loc,
                raw_poa: raw,
                corrected_poa: corrected[i],
                baseline_poa: baseline,
                csi,
                local_percentile: percentile[i],
                kwh_per_day: raw * KWH_PER_POA_SUM,
                rps,
                land_price: None,
                power_per_cost: None,
            }
        })
        .collect()
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;

    const JUNE_21: u32 = 172;

    #[test]
    fn test_baseline_positive_in_summer_midlatitude() {
        let climate = MonthlyClimate::default();
        let b = baseline_poa(Coordinate::new(40.0, -74.0), JUNE_21, &climate);
        assert!(b > 100.0 && b < 1000.0, "baseline was {}", b);
    }

    #[test]
    fn test_baseline_zero_in_polar_night() {
        let climate = MonthlyClimate::default();
        let b = baseline_poa(Coordinate::new(-80.0, 0.0), JUNE_21, &climate);
        assert_eq!(b, 0.0);
    }

    #[test]
    fn test_baseline_higher_where_noon_geometry_is_better() {
        // June noon at 15° is near-overhead; at 75° it is low and heavily
        // attenuated even with the steeper panel.
        let climate = MonthlyClimate::default();
        let low = baseline_poa(Coordinate::new(15.0, 0.0), JUNE_21, &climate);
        let high = baseline_poa(Coordinate::new(75.0, 0.0), JUNE_21, &climate);
        assert!(low > high, "baseline 15° ({}) should exceed 75° ({})", low, high);
    }

    #[test]
    fn test_temperature_derate_bounds() {
        let climate = MonthlyClimate::default();
        for month in 0..12 {
            let d = climate.temperature_derate(month);
            assert!((0.5..=1.2).contains(&d), "derate {} in month {}", d, month);
        }
        // July (29°C) derates below January (5°C boosts above 1)
        assert!(climate.temperature_derate(6) < climate.temperature_derate(0));
    }

    #[test]
    fn test_reference_ring_geometry() {
        let center = Coordinate::new(30.2672, -97.7431);
        let mut rng = SeededRng::from_seed(7);
        let ring = reference_ring(center, &mut rng);

        assert_eq!(ring.len(), REFERENCE_POINT_COUNT);
        for p in &ring {
            let d = geo::haversine_km(center, *p);
            assert!(
                (REFERENCE_RING_KM * 0.89..=REFERENCE_RING_KM * 1.11).contains(&d),
                "ring point at {} km",
                d
            );
        }
    }

    #[test]
    fn test_fit_recovers_linear_relation() {
        let model: Vec<f64> = (0..12).map(|i| 1000.0 + 50.0 * f64::from(i)).collect();
        let baseline: Vec<f64> = model.iter().map(|m| 0.02 * m + 3.0).collect();

        let fit = fit_affine(&model, &baseline);
        assert!((fit.slope - 0.02).abs() < 1e-9, "slope was {}", fit.slope);
        assert!((fit.intercept - 3.0).abs() < 1e-6, "intercept was {}", fit.intercept);
        assert!(fit.correlation > 0.999);
    }

    #[test]
    fn test_fit_identity_for_constant_series() {
        let model = vec![500.0; 12];
        let baseline: Vec<f64> = (0..12).map(|i| 10.0 + f64::from(i)).collect();

        let fit = fit_affine(&model, &baseline);
        assert_eq!(fit.slope, 1.0);
        assert_eq!(fit.intercept, 0.0);
    }

    #[test]
    fn test_fit_identity_for_weak_correlation() {
        // Alternating anti-pattern keeps |corr| far below the threshold
        let model = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let baseline = vec![5.0, 1.0, 9.0, 2.0, 7.0, 3.0, 8.0, 1.0, 6.0, 2.0, 9.0, 4.0];

        let fit = fit_affine(&model, &baseline);
        assert_eq!(fit.slope, 1.0, "weak fit must fall back to identity");
        assert_eq!(fit.intercept, 0.0);
    }

    #[test]
    fn test_fit_identity_below_minimum_points() {
        let model = vec![1.0, 2.0, 3.0];
        let baseline = vec![2.0, 4.0, 6.0];
        let fit = fit_affine(&model, &baseline);
        assert_eq!(fit.slope, 1.0);
    }

    #[test]
    fn test_percentile_endpoints_and_clamps() {
        let cands: Vec<(Coordinate, f64)> =
            (0..5).map(|i| (Coordinate::new(30.0 + 0.001 * f64::from(i), -97.0), 1000.0 * f64::from(i + 1))).collect();

        let scored = score_candidates(
            &cands,
            JUNE_21,
            &MonthlyClimate::default(),
            &BiasFit { slope: 0.01, intercept: 0.0, correlation: 1.0 },
            (0.6, 0.4),
        );

        let mut pcts: Vec<f64> = scored.iter().map(|s| s.local_percentile).collect();
        pcts.sort_by(f64::total_cmp);
        assert_eq!(pcts[0], 0.0);
        assert_eq!(pcts[4], 100.0);

        for s in &scored {
            assert!((0.0..=2.0).contains(&s.csi), "CSI {} out of clamp", s.csi);
            assert!(s.rps.is_finite() && s.rps >= 0.0);
            assert!(s.kwh_per_day > 0.0);
        }
    }

    #[test]
    fn test_single_candidate_gets_top_percentile() {
        let cands = vec![(Coordinate::new(30.0, -97.0), 30_000.0)];
        let scored =
            score_candidates(&cands, JUNE_21, &MonthlyClimate::default(), &BiasFit::IDENTITY, (0.6, 0.4));
        assert_eq!(scored[0].local_percentile, 100.0);
    }

    #[test]
    fn test_csi_zero_when_baseline_degenerate() {
        // Antarctic winter: baseline is 0, CSI must be defined as 0
        let cands = vec![(Coordinate::new(-80.0, 0.0), 1000.0)];
        let scored =
            score_candidates(&cands, JUNE_21, &MonthlyClimate::default(), &BiasFit::IDENTITY, (0.6, 0.4));
        assert_eq!(scored[0].csi, 0.0);
    }

    #[test]
    fn test_correction_does_not_favor_low_latitude() {
        // Identical raw POA at three latitudes: after normalisation the
        // low-latitude site must not win automatically, because its
        // climatology expected more of it.
        let climate = MonthlyClimate::default();
        let raw = baseline_poa(Coordinate::new(40.0, 0.0), JUNE_21, &climate);
        let cands = vec![
            (Coordinate::new(20.0, 0.0), raw),
            (Coordinate::new(40.0, 0.0), raw),
            (Coordinate::new(60.0, 0.0), raw),
        ];

        let scored = score_candidates(&cands, JUNE_21, &climate, &BiasFit::IDENTITY, (0.6, 0.4));
        let rps: Vec<f64> = scored.iter().map(|s| s.rps).collect();

        assert!(
            !(rps[0] > rps[1] && rps[1] > rps[2]),
            "RPS still monotone decreasing in latitude: {:?}",
            rps
        );
    }
}
