//! Daily Integration Module
//!
//! Integrates plane-of-array irradiance over a fixed daily grid for the
//! representative date (June 21, in the civil timezone of the request
//! center) and applies the latitude-based site factors.
//!
//! The raw integral is a plain sum of per-step POA values in W/m²; the
//! conversion to kWh happens once, at scoring time.

use chrono::{Datelike, Duration, Utc};

use crate::geo::Coordinate;
use crate::irradiance;
use crate::solar;
use crate::time;

// ===================== CONSTANTS =====================

/// Samples per day (24 h at 5-minute steps)
pub const SAMPLES_PER_DAY: usize = 288;

/// Minutes between grid samples
pub const STEP_MINUTES: i64 = 5;

/// Panel tilt per degree of latitude
const TILT_PER_LATITUDE_DEG: f64 = 0.76;

// ===================== PANEL ORIENTATION =====================

/// Fixed panel orientation derived from site latitude.
#[derive(Debug, Clone, Copy)]
pub struct PanelOrientation {
    /// Tilt from horizontal in degrees
    pub tilt_deg: f64,
    /// Surface azimuth in degrees (0 = North, clockwise)
    pub azimuth_deg: f64,
}

impl PanelOrientation {
    /// Equator-facing panel tilted at `|lat|·0.76`: azimuth 180° in the
    /// northern hemisphere, 0° in the southern.
    pub fn for_latitude(lat_deg: f64) -> Self {
        Self {
            tilt_deg: lat_deg.abs() * TILT_PER_LATITUDE_DEG,
            azimuth_deg: if lat_deg >= 0.0 { 180.0 } else { 0.0 },
        }
    }
}

// ===================== DAILY GRID =====================

/// One integration sample, pre-resolved to UTC.
#[derive(Debug, Clone, Copy)]
pub struct TimeStep {
    /// Fractional UTC hour in [0, 24)
    pub utc_hour: f64,
    /// UTC day of year the sample falls on
    pub day_of_year: u32,
}

/// The shared 288-sample grid for one analysis.
///
/// Built once per request from the center coordinate; every candidate in
/// the disk integrates over the same instants.
#[derive(Debug, Clone)]
pub struct DayGrid {
    pub steps: Vec<TimeStep>,
}

/// Build the daily grid for the representative date in the civil timezone
/// of the request center.
pub fn day_grid(center: Coordinate, year: i32) -> DayGrid {
    let tz = time::timezone_at(center);
    let start = time::local_midnight(tz, time::representative_date(year));

    let steps = (0..SAMPLES_PER_DAY)
        .map(|i| {
            let instant = (start + Duration::minutes(STEP_MINUTES * i as i64)).with_timezone(&Utc);
            TimeStep {
                utc_hour: time::utc_fractional_hour(&instant),
                day_of_year: instant.ordinal(),
            }
        })
        .collect();

    DayGrid { steps }
}

// ===================== INTEGRATION =====================

/// Sum of plane-of-array irradiance over the daily grid, before site
/// factors. Night samples contribute zero, so polar-winter sites return
/// 0.0 cleanly.
pub fn integrate_daily_poa(loc: Coordinate, grid: &DayGrid) -> f64 {
    let panel = PanelOrientation::for_latitude(loc.lat);
    let mut sum = 0.0;

    for step in &grid.steps {
        let pos = solar::solar_position(loc.lat, loc.lng, step.day_of_year, step.utc_hour);
        if pos.is_night() {
            continue;
        }
        sum += irradiance::plane_of_array(&pos, panel.tilt_deg, panel.azimuth_deg).total;
    }

    sum
}

/// Multiplicative site factors applied to the raw integral.
///
/// Sky-view `max(0.8, 1 - |lat|/90·0.2)` always; urban penalty
/// `max(0.7, 1 - |lat|/90·0.3)` only when requested.
pub fn site_factor(lat_deg: f64, urban_penalty: bool) -> f64 {
    let lat_frac = lat_deg.abs() / 90.0;
    let sky_view = (1.0 - lat_frac * 0.2).max(0.8);
    let urban = if urban_penalty { (1.0 - lat_frac * 0.3).max(0.7) } else { 1.0 };
    sky_view * urban
}

/// Raw daily POA for a candidate: grid integral times site factors.
pub fn daily_raw_poa(loc: Coordinate, grid: &DayGrid, urban_penalty: bool) -> f64 {
    integrate_daily_poa(loc, grid) * site_factor(loc.lat, urban_penalty)
}

// ===================== TESTS =====================
