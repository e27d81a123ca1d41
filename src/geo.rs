//! Geographic and Geometry Module
//!
//! Provides WGS-84 coordinates, great-circle distances, and the local
//! equirectangular projection used for candidate sampling and result
//! spacing. Astronomy never goes through the projection.

use serde::{Deserialize, Serialize};

// ===================== CONSTANTS =====================

/// Mean Earth radius in kilometers (spherical model)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude (and of longitude at the equator)
pub const KM_PER_DEGREE: f64 = 111.0;

// ===================== COORDINATE =====================

/// A WGS-84 coordinate in decimal degrees.
///
/// Degrees at every API boundary; modules convert to radians internally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, -90 to 90
    pub lat: f64,
    /// Longitude in degrees, (-180, 180]
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite and inside the WGS-84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && self.lng > -180.0
            && self.lng <= 180.0
    }
}

// ===================== DISTANCE =====================

/// Great-circle distance between two coordinates in kilometers.
///
/// Haversine formula on a sphere of radius [`EARTH_RADIUS_KM`].
/// Strictly non-negative and symmetric; zero iff the inputs agree to
/// at least four decimal places.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().clamp(-1.0, 1.0).asin()
}

// ===================== LOCAL PROJECTION =====================

/// Offset a coordinate by east/north kilometers using the equirectangular
/// approximation anchored at `origin`.
///
/// Good to well under 1% inside the 100 km radii this engine accepts.
/// Longitude wraps back into (-180, 180] near the antimeridian.
pub fn offset_km(origin: Coordinate, east_km: f64, north_km: f64) -> Coordinate {
    let lat = origin.lat + north_km / KM_PER_DEGREE;
    let cos_lat = origin.lat.to_radians().cos().max(1e-9);
    let lng = wrap_longitude(origin.lng + east_km / (KM_PER_DEGREE * cos_lat));
    Coordinate::new(lat, lng)
}

/// Wrap a longitude into (-180, 180].
pub fn wrap_longitude(lng: f64) -> f64 {
    let mut l = lng % 360.0;
    if l <= -180.0 {
        l += 360.0;
    } else if l > 180.0 {
        l -= 360.0;
    }
    l
}

// ===================== TESTS =====================
