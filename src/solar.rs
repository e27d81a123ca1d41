//! Solar Geometry Module
//!
//! First-principles solar position: declination, equation of time, hour
//! angle, elevation, and azimuth. Angles are radians internally and
//! degrees at the API boundary, converted exactly once per stage.
//!
//! Azimuth convention, project-wide: 0 = North, increasing clockwise,
//! wrapped to (-pi, pi]. Solar noon in the northern mid-latitudes comes
//! out at pi (due South).

use std::f64::consts::{PI, TAU};

// ===================== TYPES =====================

/// Sun position for one (location, instant) pair.
#[derive(Debug, Clone, Copy)]
pub struct SolarPosition {
    /// Elevation above the horizon in radians, [-pi/2, pi/2]
    pub elevation: f64,
    /// Azimuth in radians, (-pi, pi], 0 = North, clockwise
    pub azimuth: f64,
}

impl SolarPosition {
    /// Night if the sun is at or below the horizon.
    pub fn is_night(&self) -> bool {
        self.elevation <= 0.0
    }
}

// ===================== EPHEMERIS APPROXIMATIONS =====================

/// Solar declination in radians for a day of year (1-366).
///
/// Cooper's formula: `23.45° · sin((360/365)·(284 + N))`.
pub fn declination(day_of_year: u32) -> f64 {
    let arg = (360.0 / 365.0) * (284.0 + f64::from(day_of_year));
    (23.45 * arg.to_radians().sin()).to_radians()
}

/// Equation of time in minutes for a day of year.
///
/// `B = (360/365)·(N - 81)`; `EoT = 9.87·sin 2B - 7.53·cos B - 1.5·sin B`.
pub fn equation_of_time_minutes(day_of_year: u32) -> f64 {
    let b = ((360.0 / 365.0) * (f64::from(day_of_year) - 81.0)).to_radians();
    9.87 * (2.0 * b).sin() - 7.53 * b.cos() - 1.5 * b.sin()
}

/// Local apparent solar time in hours at a longitude, from a UTC hour.
pub fn apparent_solar_time(utc_hour: f64, lng_deg: f64, day_of_year: u32) -> f64 {
    utc_hour + lng_deg / 15.0 + equation_of_time_minutes(day_of_year) / 60.0
}

/// Hour angle in radians for a local apparent solar time.
pub fn hour_angle(last_hours: f64) -> f64 {
    ((last_hours - 12.0) * 15.0).to_radians()
}

/// UTC hour of solar noon at a longitude on the given day.
pub fn solar_noon_utc_hour(lng_deg: f64, day_of_year: u32) -> f64 {
    12.0 - lng_deg / 15.0 - equation_of_time_minutes(day_of_year) / 60.0
}

// ===================== POSITION =====================

/// Sun elevation and azimuth for a location, day of year, and UTC hour.
pub fn solar_position(lat_deg: f64, lng_deg: f64, day_of_year: u32, utc_hour: f64) -> SolarPosition {
    let phi = lat_deg.to_radians();
    let delta = declination(day_of_year);
    let h = hour_angle(apparent_solar_time(utc_hour, lng_deg, day_of_year));

    let elevation = (delta.sin() * phi.sin() + delta.cos() * phi.cos() * h.cos()).clamp(-1.0, 1.0).asin();

    // The atan2 form measures from South; rotating by pi puts 0 at North
    // with clockwise positive, then wrap into (-pi, pi].
    let azimuth = wrap_angle(h.sin().atan2(h.cos() * phi.sin() - delta.tan() * phi.cos()) + PI);

    debug_assert!((-PI / 2.0..=PI / 2.0).contains(&elevation));
    debug_assert!(azimuth > -PI && azimuth <= PI);

    SolarPosition { elevation, azimuth }
}

/// Wrap an angle in radians into (-pi, pi].
pub fn wrap_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    if a > PI { a - TAU } else { a }
}

// ===================== TESTS =====================
