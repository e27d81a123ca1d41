//! Clear-Sky Irradiance Module
//!
//! Implements the clear-sky irradiance model and the plane-of-array
//! decomposition used by the daily integrator.
//!
//! References:
//! - Kasten, F. and Young, A. T. (1989). "Revised optical air mass tables
//!   and approximation formula"
//! - Liu, B. and Jordan, R. (1963), isotropic sky diffuse transposition

use crate::solar::SolarPosition;

// ===================== CONSTANTS =====================

/// Solar constant in W/m²
pub const SOLAR_CONSTANT: f64 = 1367.0;

/// Broadband clear-sky attenuation applied on top of the air-mass transmittance
pub const CLEAR_SKY_FACTOR: f64 = 0.75;

/// Diffuse fraction of the horizontal beam component
pub const DIFFUSE_FRACTION: f64 = 0.15;

/// Ground albedo (typical grass/soil)
pub const GROUND_ALBEDO: f64 = 0.2;

/// Tolerance for the GHI closure self-check in W/m²
pub const GHI_CLOSURE_TOLERANCE: f64 = 10.0;

// ===================== TYPES =====================

/// Clear-sky irradiance components on and normal to the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrradianceTriple {
    /// Direct Normal Irradiance (W/m²), beam perpendicular to the sun ray
    pub dni: f64,
    /// Diffuse Horizontal Irradiance (W/m²)
    pub dhi: f64,
    /// Global Horizontal Irradiance (W/m²)
    pub ghi: f64,
}

impl IrradianceTriple {
    pub const NIGHT: Self = Self { dni: 0.0, dhi: 0.0, ghi: 0.0 };

    /// Residual of the closure `GHI = DNI·sin(elev) + DHI`, in W/m².
    ///
    /// Holds by construction; a large residual means a broken model and is
    /// reported as a diagnostic, never a panic.
    pub fn closure_residual(&self, elevation: f64) -> f64 {
        self.ghi - (self.dni * elevation.sin() + self.dhi)
    }
}

/// Irradiance decomposition on a tilted panel plane.
#[derive(Debug, Clone, Copy)]
pub struct PoaBreakdown {
    /// Beam component (W/m²), zero whenever the sun is behind the plane
    pub beam: f64,
    /// Isotropic sky diffuse component (W/m²)
    pub sky_diffuse: f64,
    /// Ground-reflected component (W/m²)
    pub ground: f64,
    /// Sum of the three components (W/m²)
    pub total: f64,
}

impl PoaBreakdown {
    pub const NIGHT: Self = Self { beam: 0.0, sky_diffuse: 0.0, ground: 0.0, total: 0.0 };
}

// ===================== ATMOSPHERE =====================

/// Relative air mass for a solar elevation (radians).
///
/// Kasten-Young (1989) in its elevation form:
/// `m = 1 / (sin e + 0.50572·(e_deg + 6.07995)^-1.6364)`.
/// Infinite at and below the horizon.
pub fn air_mass(elevation: f64) -> f64 {
    if elevation <= 0.0 {
        return f64::INFINITY;
    }
    let e_deg = elevation.to_degrees();
    1.0 / (elevation.sin() + 0.50572 * (e_deg + 6.07995).powf(-1.6364))
}

/// Clear-sky DNI/DHI/GHI for a solar elevation (radians).
///
/// DNI is beam-normal by definition: no incidence cosine here. The only
/// place `cos(AOI)` may appear is the beam term of [`plane_of_array`].
pub fn clear_sky(elevation: f64) -> IrradianceTriple {
    if elevation <= 0.0 {
        return IrradianceTriple::NIGHT;
    }

    let m = air_mass(elevation);
    if !m.is_finite() {
        return IrradianceTriple::NIGHT;
    }

    let transmittance = 0.7f64.powf(m.powf(0.678));
    let dni = SOLAR_CONSTANT * transmittance * CLEAR_SKY_FACTOR;
    let dhi = dni * elevation.sin() * DIFFUSE_FRACTION;
    let ghi = dni * elevation.sin() + dhi;

    IrradianceTriple { dni, dhi, ghi }
}

// ===================== PLANE OF ARRAY =====================

/// Cosine of the angle of incidence between the sun ray and the panel
/// normal.
///
/// `cos(AOI) = sin e·cos β + cos e·sin β·cos(ψ_s - γ)` where `ψ_s` is the
/// solar azimuth and `γ` the surface azimuth, both in the project-wide
/// North-origin clockwise convention.
pub fn cos_incidence(sun: &SolarPosition, tilt_deg: f64, surface_azimuth_deg: f64) -> f64 {
    let tilt = tilt_deg.to_radians();
    let gamma = surface_azimuth_deg.to_radians();
    sun.elevation.sin() * tilt.cos()
        + sun.elevation.cos() * tilt.sin() * (sun.azimuth - gamma).cos()
}

/// Plane-of-array decomposition for a fixed panel.
///
/// Beam uses `max(0, cos AOI)`; sky diffuse is isotropic with the
/// `(1 + cos β)/2` view factor; ground-reflected uses the complementary
/// view factor and [`GROUND_ALBEDO`].
pub fn plane_of_array(sun: &SolarPosition, tilt_deg: f64, surface_azimuth_deg: f64) -> PoaBreakdown {
    if sun.is_night() {
        return PoaBreakdown::NIGHT;
    }

    let sky = clear_sky(sun.elevation);
    let tilt = tilt_deg.to_radians();

    let beam = sky.dni * cos_incidence(sun, tilt_deg, surface_azimuth_deg).max(0.0);
    let sky_diffuse = sky.dhi * (1.0 + tilt.cos()) / 2.0;
    let ground = sky.ghi * GROUND_ALBEDO * (1.0 - tilt.cos()) / 2.0;

    PoaBreakdown { beam, sky_diffuse, ground, total: beam + sky_diffuse + ground }
}

// ===================== TESTS =====================
