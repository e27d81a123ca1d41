//! Land Price Module
//!
//! Attaches a USD/m² estimate to candidate sites. The default surface is
//! synthetic and fully deterministic: distance-to-urban-center decay,
//! mild latitude/longitude premiums, and a pseudo-random factor derived
//! from the coordinate itself so batch ordering can never change a price.
//! An optional external source overrides it; failures fall back to the
//! synthetic surface at reduced confidence.

use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

use crate::error::ProviderError;
use crate::geo::{Coordinate, haversine_km};
use crate::rng::SeededRng;

// ===================== CONSTANTS =====================

/// Hard price floor in USD/m²
pub const PRICE_FLOOR_USD: f64 = 50.0;

/// Confidence assigned to synthetic prices
pub const SYNTHETIC_CONFIDENCE: f64 = 0.6;

/// Confidence ceiling when falling back after an external-source failure
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Recommended maximum chunk size for batched external lookups
pub const BATCH_CHUNK: usize = 10;

const BASE_PRICE_USD: f64 = 450.0;
const URBAN_GRADIENT_PER_KM: f64 = 0.0025;
const MAX_URBAN_DISCOUNT: f64 = 0.8;
const LAT_PREMIUM_PER_DEG: f64 = 0.004;
const LNG_PREMIUM_PER_DEG: f64 = 0.0012;

/// Built-in urban centers for the distance term: (name, lat, lng)
const URBAN_CENTERS: &[(&str, f64, f64)] = &[
    ("new-york", 40.7128, -74.0060),
    ("los-angeles", 34.0522, -118.2437),
    ("chicago", 41.8781, -87.6298),
    ("houston", 29.7604, -95.3698),
    ("austin", 30.2672, -97.7431),
    ("mexico-city", 19.4326, -99.1332),
    ("sao-paulo", -23.5505, -46.6333),
    ("buenos-aires", -34.6037, -58.3816),
    ("london", 51.5074, -0.1278),
    ("paris", 48.8566, 2.3522),
    ("berlin", 52.5200, 13.4050),
    ("madrid", 40.4168, -3.7038),
    ("rome", 41.9028, 12.4964),
    ("istanbul", 41.0082, 28.9784),
    ("cairo", 30.0444, 31.2357),
    ("lagos", 6.5244, 3.3792),
    ("johannesburg", -26.2041, 28.0473),
    ("dubai", 25.2048, 55.2708),
    ("mumbai", 19.0760, 72.8777),
    ("delhi", 28.7041, 77.1025),
    ("singapore", 1.3521, 103.8198),
    ("beijing", 39.9042, 116.4074),
    ("shanghai", 31.2304, 121.4737),
    ("tokyo", 35.6762, 139.6503),
    ("seoul", 37.5665, 126.9780),
    ("sydney", -33.8688, 151.2093),
    ("toronto", 43.6532, -79.3832),
];

// ===================== TYPES =====================

/// Provenance of a price estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Api,
    Synthetic,
    Cached,
}

/// A land price estimate for one coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandPrice {
    pub usd_per_m2: f64,
    pub source: PriceSource,
    /// Estimate confidence in [0, 1]
    pub confidence: f64,
    /// Free-form provenance detail (nearest urban center for synthetic)
    pub metadata: Option<String>,
}

/// External price source. Individual failures in a batch fall back to the
/// synthetic surface without aborting the rest.
pub trait LandPriceApi: Send + Sync {
    fn price(&self, loc: Coordinate) -> Result<LandPrice, ProviderError>;

    /// Batched lookup; the default chunks requests at [`BATCH_CHUNK`].
    fn prices(&self, locs: &[Coordinate]) -> Vec<Result<LandPrice, ProviderError>> {
        let mut out = Vec::with_capacity(locs.len());
        for chunk in locs.chunks(BATCH_CHUNK) {
            out.extend(chunk.iter().map(|&loc| self.price(loc)));
        }
        out
    }
}

// ===================== SYNTHETIC SURFACE =====================

/// Nearest built-in urban center and its distance in km.
pub fn nearest_urban_center(loc: Coordinate) -> (&'static str, f64) {
    URBAN_CENTERS
        .iter()
        .map(|&(name, lat, lng)| (name, haversine_km(loc, Coordinate::new(lat, lng))))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .expect("urban center table is non-empty")
}

/// Coordinate-addressable factor in [0.8, 1.2].
///
/// Derived from the coordinate rounded to 4 decimals, never from the
/// request RNG, so evaluation order cannot change any price.
fn coordinate_jitter(loc: Coordinate) -> f64 {
    let lat4 = (loc.lat * 1e4).round() / 1e4;
    let lng4 = (loc.lng * 1e4).round() / 1e4;
    let mut rng = SeededRng::from_request(lat4, lng4, 0.0, 0x11);
    0.8 + 0.4 * rng.next_f64()
}

/// Deterministic synthetic price for a coordinate.
pub fn synthetic_price(loc: Coordinate) -> LandPrice {
    let (city, d_urban) = nearest_urban_center(loc);

    let urban_term = 1.0 - (d_urban * URBAN_GRADIENT_PER_KM).min(MAX_URBAN_DISCOUNT);
    let lat_term = 1.0 + (loc.lat - 40.0).abs() * LAT_PREMIUM_PER_DEG;
    let lng_term = 1.0 + loc.lng.abs() * LNG_PREMIUM_PER_DEG;

    let price =
        (BASE_PRICE_USD * urban_term * lat_term * lng_term * coordinate_jitter(loc)).max(PRICE_FLOOR_USD);

    LandPrice {
        usd_per_m2: price,
        source: PriceSource::Synthetic,
        confidence: SYNTHETIC_CONFIDENCE,
        metadata: Some(format!("nearest:{city}")),
    }
}

// ===================== CACHE =====================

/// Cache key: coordinate rounded to 4 decimal places (~11 m).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceKey {
    lat_e4: i32,
    lng_e4: i32,
}

impl PriceKey {
    pub fn from_coordinate(loc: Coordinate) -> Self {
        Self { lat_e4: (loc.lat * 1e4).round() as i32, lng_e4: (loc.lng * 1e4).round() as i32 }
    }
}

/// LRU price cache with time-based expiry and hit/miss counters.
pub struct PriceCache {
    inner: LruCache<PriceKey, (LandPrice, Instant)>,
    expiry: Duration,
    hits: u64,
    misses: u64,
}

impl PriceCache {
    pub fn new(capacity: usize, expiry: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity floored at 1");
        Self { inner: LruCache::new(cap), expiry, hits: 0, misses: 0 }
    }

    /// Cached price for a coordinate, re-tagged as [`PriceSource::Cached`].
    pub fn get(&mut self, loc: Coordinate) -> Option<LandPrice> {
        let key = PriceKey::from_coordinate(loc);
        let fresh = match self.inner.peek(&key) {
            Some((_, at)) => at.elapsed() <= self.expiry,
            None => false,
        };

        if !fresh {
            self.inner.pop(&key);
            self.misses += 1;
            return None;
        }

        self.hits += 1;
        self.inner
            .get(&key)
            .map(|(price, _)| LandPrice { source: PriceSource::Cached, ..price.clone() })
    }

    pub fn insert(&mut self, loc: Coordinate, price: LandPrice) {
        self.inner.put(PriceKey::from_coordinate(loc), (price, Instant::now()));
    }

    /// (hits, misses) since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

// ===================== TESTS =====================
