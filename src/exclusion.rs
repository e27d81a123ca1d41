//! Exclusion Zone Module
//!
//! Point-in-polygon masking over zones fetched from an external polygon
//! provider. The provider owns buffering; this module only tests
//! membership. Provider failures fail open: no exclusion, logged warning.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::geo::Coordinate;

// ===================== ZONE MODEL =====================

/// What a zone protects; drives which zones a request opts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Residential,
    Water,
    Sensitive,
    Commercial,
}

/// GeoJSON-shaped zone geometry in WGS-84 `[lng, lat]` order.
///
/// A `Polygon` is an outer ring followed by optional hole rings; a point
/// inside a hole is outside the polygon. A point is inside a
/// `MultiPolygon` when any constituent polygon contains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum ZoneGeometry {
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
}

/// One exclusion zone as returned by a polygon provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionZone {
    #[serde(rename = "type")]
    pub kind: ZoneKind,
    pub geometry: ZoneGeometry,
    /// Buffer already applied by the provider, in meters
    #[serde(default)]
    pub buffer_m: f64,
}

/// Options forwarded to the polygon provider.
#[derive(Debug, Clone, Copy)]
pub struct ExclusionOptions {
    pub include_water: bool,
    pub include_sensitive: bool,
    /// Requested buffer distance in meters; applied provider-side
    pub buffer_m: f64,
}

// ===================== PROVIDER CONTRACT =====================

/// Source of exclusion polygons for a search disk.
///
/// Implementations are expected to honor `opts.buffer_m` themselves and to
/// return only zone kinds the options opt into.
pub trait PolygonProvider: Send + Sync {
    fn fetch(
        &self,
        center: Coordinate,
        radius_km: f64,
        opts: &ExclusionOptions,
    ) -> Result<Vec<ExclusionZone>, ProviderError>;
}

/// Provider backed by a fixed zone list. Used by tests and by the CLI
/// when exclusion is enabled without an external fetcher.
#[derive(Debug, Default)]
pub struct StaticPolygonProvider {
    zones: Vec<ExclusionZone>,
}

impl StaticPolygonProvider {
    pub fn new(zones: Vec<ExclusionZone>) -> Self {
        Self { zones }
    }
}

impl PolygonProvider for StaticPolygonProvider {
    fn fetch(
        &self,
        _center: Coordinate,
        _radius_km: f64,
        opts: &ExclusionOptions,
    ) -> Result<Vec<ExclusionZone>, ProviderError> {
        Ok(self
            .zones
            .iter()
            .filter(|z| match z.kind {
                ZoneKind::Water => opts.include_water,
                ZoneKind::Sensitive => opts.include_sensitive,
                ZoneKind::Residential | ZoneKind::Commercial => true,
            })
            .cloned()
            .collect())
    }
}

// ===================== POINT-IN-POLYGON =====================

/// Even-odd ray casting in the (lng, lat) plane.
fn ring_contains(ring: &[[f64; 2]], lng: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i][0], ring[i][1]);
        let (xj, yj) = (ring[j][0], ring[j][1]);

        if (yi > lat) != (yj > lat) && lng < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn polygon_contains(rings: &[Vec<[f64; 2]>], lng: f64, lat: f64) -> bool {
    let Some(outer) = rings.first() else {
        return false;
    };
    if !ring_contains(outer, lng, lat) {
        return false;
    }
    // Holes carve the point back out
    !rings[1..].iter().any(|hole| ring_contains(hole, lng, lat))
}

/// Whether a coordinate falls inside a zone geometry.
pub fn geometry_contains(geometry: &ZoneGeometry, coord: Coordinate) -> bool {
    match geometry {
        ZoneGeometry::Polygon(rings) => polygon_contains(rings, coord.lng, coord.lat),
        ZoneGeometry::MultiPolygon(polys) => {
            polys.iter().any(|rings| polygon_contains(rings, coord.lng, coord.lat))
        }
    }
}

/// Whether any zone excludes the coordinate.
pub fn is_excluded(coord: Coordinate, zones: &[ExclusionZone]) -> bool {
    zones.iter().any(|z| geometry_contains(&z.geometry, coord))
}

/// Drop candidates that fall inside any zone.
pub fn filter_candidates(candidates: Vec<Coordinate>, zones: &[ExclusionZone]) -> Vec<Coordinate> {
    if zones.is_empty() {
        return candidates;
    }
    candidates.into_iter().filter(|&c| !is_excluded(c, zones)).collect()
}

// ===================== TESTS =====================
