//! Analysis Engine Module
//!
//! The orchestrator that drives sampling, exclusion, per-point daily
//! integration, bias correction, land pricing, and top-K selection. The
//! [`Engine`] owns the two long-lived caches so analyses stay reentrant
//! and tests stay isolated.
//!
//! Stage order and the degradation ladder:
//!
//! ```text
//! idle → grid-generation → [exclusion] → irradiance-computation
//!      → bias-correction → [land-prices] → ranking → complete
//! ```
//!
//! Provider failures degrade (logged, pipeline continues); only request
//! validation and cancellation surface as errors.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use log::{debug, info, warn};
use lru::LruCache;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bias::{self, MonthlyClimate, ScoredCandidate};
use crate::error::AnalysisError;
use crate::exclusion::{ExclusionOptions, ExclusionZone, PolygonProvider, filter_candidates};
use crate::geo::Coordinate;
use crate::integrate;
use crate::irradiance;
use crate::landprice::{self, FALLBACK_CONFIDENCE, LandPrice, LandPriceApi, PriceCache};
use crate::rank;
use crate::rng::SeededRng;
use crate::sample;
use crate::solar;
use crate::time as solar_time;

// ===================== REQUEST =====================

/// Exclusion options carried by a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionConfig {
    pub enabled: bool,
    /// Buffer in meters, applied by the polygon provider
    #[serde(default)]
    pub buffer_m: u32,
    #[serde(default)]
    pub include_water: bool,
    #[serde(default)]
    pub include_sensitive: bool,
}

fn default_top_k() -> usize {
    5
}

/// One analysis request. The seed of every random draw is a pure function
/// of `(center, radius_km, seed_salt)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub center: Coordinate,
    pub radius_km: f64,
    #[serde(default)]
    pub urban_penalty: bool,
    #[serde(default)]
    pub include_land_prices: bool,
    #[serde(default)]
    pub rank_by_cost: bool,
    #[serde(default)]
    pub exclusion: Option<ExclusionConfig>,
    #[serde(default)]
    pub seed_salt: Option<u32>,
    /// How many ranked sites to return
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl SearchRequest {
    pub fn new(center: Coordinate, radius_km: f64) -> Self {
        Self {
            center,
            radius_km,
            urban_penalty: false,
            include_land_prices: false,
            rank_by_cost: false,
            exclusion: None,
            seed_salt: None,
            top_k: default_top_k(),
        }
    }
}

// ===================== RESULT =====================

/// One ranked site in the response, sorted by ascending rank.
#[derive(Debug, Clone, Serialize)]
pub struct SiteResult {
    pub rank: usize,
    pub lat: f64,
    pub lng: f64,
    /// Relative Potential Score of the site
    pub score: f64,
    /// Physical daily yield in kWh/m² per day
    pub kwh_per_day: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_price_usd_per_m2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_per_cost: Option<f64>,
    /// Clear-sky index (verbose output only, not part of the wire shape)
    #[serde(skip)]
    pub csi: f64,
    /// Local percentile (verbose output only)
    #[serde(skip)]
    pub local_percentile: f64,
}

// ===================== PROGRESS =====================

/// Pipeline stages, in the order progress events are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Idle,
    GridGeneration,
    IrradianceComputation,
    BiasCorrection,
    LandPrices,
    Ranking,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::GridGeneration => "grid-generation",
            Self::IrradianceComputation => "irradiance-computation",
            Self::BiasCorrection => "bias-correction",
            Self::LandPrices => "land-prices",
            Self::Ranking => "ranking",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// A progress report. Within a stage, `percent` is monotonically
/// non-decreasing.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub stage: Stage,
    pub message: String,
}

/// Progress callback type accepted by [`Engine::analyze`].
pub type ProgressFn<'a> = &'a mut dyn FnMut(ProgressEvent);

// ===================== CANCELLATION =====================

/// Cooperative cancellation signal, honoured between integration chunks
/// and between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ===================== CONFIGURATION =====================

/// Engine tunables. The defaults reproduce the documented behavior; tests
/// may build custom configurations.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Weights of (CSI, percentile) in the Relative Potential Score
    pub rps_weights: (f64, f64),
    /// Month-indexed climatology for the baseline
    pub climate: MonthlyClimate,
    /// Land-price cache capacity (entries)
    pub price_cache_capacity: usize,
    /// Land-price cache expiry
    pub price_cache_expiry: Duration,
    /// Exclusion polygon cache capacity (requests)
    pub zone_cache_capacity: usize,
    /// Time budget for one polygon fetch
    pub polygon_timeout: Duration,
    /// Time budget for one land-price batch
    pub price_timeout: Duration,
    /// Candidates integrated between cancellation/progress checkpoints
    pub integration_chunk: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rps_weights: (0.6, 0.4),
            climate: MonthlyClimate::default(),
            price_cache_capacity: 4096,
            price_cache_expiry: Duration::from_secs(24 * 3600),
            zone_cache_capacity: 64,
            polygon_timeout: Duration::from_secs(10),
            price_timeout: Duration::from_secs(5),
            integration_chunk: 64,
        }
    }
}

/// Cache occupancy and hit counters, logged after each analysis.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub price_hits: u64,
    pub price_misses: u64,
    pub price_entries: usize,
    pub zone_entries: usize,
}

// ===================== ZONE CACHE KEY =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ZoneKey {
    lat_e4: i32,
    lng_e4: i32,
    radius_e3: i64,
    include_water: bool,
    include_sensitive: bool,
    buffer_m: u32,
}

impl ZoneKey {
    fn new(center: Coordinate, radius_km: f64, cfg: &ExclusionConfig) -> Self {
        Self {
            lat_e4: (center.lat * 1e4).round() as i32,
            lng_e4: (center.lng * 1e4).round() as i32,
            radius_e3: (radius_km * 1e3).round() as i64,
            include_water: cfg.include_water,
            include_sensitive: cfg.include_sensitive,
            buffer_m: cfg.buffer_m,
        }
    }
}

// ===================== ENGINE =====================

/// The analysis engine. Owns the polygon and land-price caches plus the
/// optional external providers; analyses borrow it immutably.
pub struct Engine {
    config: EngineConfig,
    polygon_provider: Option<Box<dyn PolygonProvider>>,
    price_api: Option<Box<dyn LandPriceApi>>,
    price_cache: Mutex<PriceCache>,
    zone_cache: Mutex<LruCache<ZoneKey, Vec<ExclusionZone>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let price_cache = PriceCache::new(config.price_cache_capacity, config.price_cache_expiry);
        let zone_cap = NonZeroUsize::new(config.zone_cache_capacity.max(1))
            .expect("capacity floored at 1");
        Self {
            config,
            polygon_provider: None,
            price_api: None,
            price_cache: Mutex::new(price_cache),
            zone_cache: Mutex::new(LruCache::new(zone_cap)),
        }
    }

    pub fn with_polygon_provider(mut self, provider: Box<dyn PolygonProvider>) -> Self {
        self.polygon_provider = Some(provider);
        self
    }

    pub fn with_price_api(mut self, api: Box<dyn LandPriceApi>) -> Self {
        self.price_api = Some(api);
        self
    }

    /// Current cache occupancy and counters.
    pub fn cache_stats(&self) -> CacheStats {
        let price = self.price_cache.lock().expect("price cache mutex poisoned");
        let (price_hits, price_misses) = price.stats();
        CacheStats {
            price_hits,
            price_misses,
            price_entries: price.len(),
            zone_entries: self.zone_cache.lock().expect("zone cache mutex poisoned").len(),
        }
    }

    /// Run one analysis without progress reporting or cancellation.
    pub fn run(&self, request: &SearchRequest) -> Result<Vec<SiteResult>, AnalysisError> {
        self.analyze(request, None, &CancelToken::new())
    }

    /// Run one analysis.
    ///
    /// Deterministic for a fixed `(request, providers)` tuple. Returns
    /// either the ranked sites (possibly empty), `InvalidRequest`, or
    /// `Cancelled`; provider failures degrade internally.
    #[allow(clippy::too_many_lines)]
    pub fn analyze(
        &self,
        request: &SearchRequest,
        mut on_progress: Option<ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Result<Vec<SiteResult>, AnalysisError> {
        validate(request)?;

        let mut emit = |stage: Stage, percent: u8, message: String| {
            debug!("[{percent:3}%] {stage}: {message}");
            if let Some(cb) = on_progress.as_mut() {
                cb(ProgressEvent { percent, stage, message });
            }
        };

        let salt = request.seed_salt.unwrap_or(0);
        let base_rng =
            SeededRng::from_request(request.center.lat, request.center.lng, request.radius_km, salt);

        // --- grid generation ---
        emit(Stage::GridGeneration, 2, format!("sampling a {} km disk", request.radius_km));
        let mut sample_rng = base_rng.derive(0);
        let mut points = sample::sample_disk(request.center, request.radius_km, &mut sample_rng);
        emit(Stage::GridGeneration, 8, format!("{} candidate sites", points.len()));

        if cancel.is_cancelled() {
            emit(Stage::Idle, 8, "analysis cancelled".into());
            return Err(AnalysisError::Cancelled);
        }

        // --- exclusion (optional, fails open) ---
        if let Some(excl) = request.exclusion.as_ref().filter(|e| e.enabled) {
            let zones = self.fetch_zones(request.center, request.radius_km, excl);
            if !zones.is_empty() {
                let before = points.len();
                points = filter_candidates(points, &zones);
                emit(
                    Stage::GridGeneration,
                    14,
                    format!("{} of {} sites remain after exclusion", points.len(), before),
                );
            }
        }

        if cancel.is_cancelled() {
            emit(Stage::Idle, 14, "analysis cancelled".into());
            return Err(AnalysisError::Cancelled);
        }

        // --- irradiance integration ---
        let year = Utc::now().year();
        let day_of_year = solar_time::representative_date(year).ordinal();
        let grid = integrate::day_grid(request.center, year);
        self.closure_self_check(request.center, day_of_year);

        let total = points.len().max(1);
        let mut pairs: Vec<(Coordinate, f64)> = Vec::with_capacity(points.len());
        for chunk in points.chunks(self.config.integration_chunk) {
            if cancel.is_cancelled() {
                emit(Stage::Idle, 20, "analysis cancelled".into());
                return Err(AnalysisError::Cancelled);
            }

            // Parallel map over the chunk; collection preserves candidate
            // order, so downstream reductions see a stable sequence.
            let integrated: Vec<(Coordinate, f64)> = chunk
                .par_iter()
                .map(|&loc| (loc, integrate::daily_raw_poa(loc, &grid, request.urban_penalty)))
                .collect();
            pairs.extend(integrated);

            let percent = 20 + (40 * pairs.len() / total) as u8;
            emit(
                Stage::IrradianceComputation,
                percent.min(60),
                format!("integrated {}/{} sites", pairs.len(), total),
            );
        }

        if cancel.is_cancelled() {
            emit(Stage::Idle, 60, "analysis cancelled".into());
            return Err(AnalysisError::Cancelled);
        }

        // --- bias correction ---
        emit(Stage::BiasCorrection, 62, "building climatology reference ring".into());
        let mut ring_rng = base_rng.derive(1);
        let ring = bias::reference_ring(request.center, &mut ring_rng);

        let ring_model: Vec<f64> = ring
            .iter()
            .map(|&p| integrate::daily_raw_poa(p, &grid, request.urban_penalty))
            .collect();
        let ring_baseline: Vec<f64> =
            ring.iter().map(|&p| bias::baseline_poa(p, day_of_year, &self.config.climate)).collect();

        let fit = bias::fit_affine(&ring_model, &ring_baseline);
        debug!(
            "bias fit: slope {:.6}, intercept {:.3}, correlation {:.3}",
            fit.slope, fit.intercept, fit.correlation
        );

        let mut scored = bias::score_candidates(
            &pairs,
            day_of_year,
            &self.config.climate,
            &fit,
            self.config.rps_weights,
        );
        emit(Stage::BiasCorrection, 75, format!("scored {} sites", scored.len()));

        if cancel.is_cancelled() {
            emit(Stage::Idle, 75, "analysis cancelled".into());
            return Err(AnalysisError::Cancelled);
        }

        // --- land prices (optional, degrades per entry) ---
        if request.include_land_prices {
            emit(Stage::LandPrices, 78, format!("pricing {} sites", scored.len()));
            self.attach_prices(&mut scored);
            emit(Stage::LandPrices, 88, "land prices attached".into());
        }

        if cancel.is_cancelled() {
            emit(Stage::Idle, 88, "analysis cancelled".into());
            return Err(AnalysisError::Cancelled);
        }

        // --- ranking ---
        emit(Stage::Ranking, 95, "selecting spatially spread top sites".into());
        let use_cost = request.rank_by_cost
            && request.include_land_prices
            && scored.iter().all(|s| s.power_per_cost.is_some());
        if request.rank_by_cost && !use_cost {
            warn!("rank-by-cost requested without land prices; ranking by RPS instead");
        }

        let top = rank::select_top_k(scored, request.top_k, use_cost, request.center);
        let results: Vec<SiteResult> = top
            .into_iter()
            .enumerate()
            .map(|(i, c)| SiteResult {
                rank: i + 1,
                lat: c.loc.lat,
                lng: c.loc.lng,
                score: c.rps,
                kwh_per_day: c.kwh_per_day,
                land_price_usd_per_m2: c.land_price.as_ref().map(|p| p.usd_per_m2),
                power_per_cost: c.power_per_cost,
                csi: c.csi,
                local_percentile: c.local_percentile,
            })
            .collect();

        emit(Stage::Complete, 100, format!("{} sites ranked", results.len()));

        let stats = self.cache_stats();
        info!(
            "analysis complete: {} results; price cache {}/{} hits, {} entries; zone cache {} entries",
            results.len(),
            stats.price_hits,
            stats.price_hits + stats.price_misses,
            stats.price_entries,
            stats.zone_entries
        );

        Ok(results)
    }

    // ===================== STAGE HELPERS =====================

    /// Fetch exclusion zones through the cache, failing open on provider
    /// errors or a blown time budget.
    fn fetch_zones(
        &self,
        center: Coordinate,
        radius_km: f64,
        cfg: &ExclusionConfig,
    ) -> Vec<ExclusionZone> {
        let Some(provider) = self.polygon_provider.as_ref() else {
            return Vec::new();
        };

        let key = ZoneKey::new(center, radius_km, cfg);
        {
            let mut cache = self.zone_cache.lock().expect("zone cache mutex poisoned");
            if let Some(zones) = cache.get(&key) {
                return zones.clone();
            }
        }

        let opts = ExclusionOptions {
            include_water: cfg.include_water,
            include_sensitive: cfg.include_sensitive,
            buffer_m: f64::from(cfg.buffer_m),
        };

        let started = Instant::now();
        match provider.fetch(center, radius_km, &opts) {
            Ok(zones) if started.elapsed() <= self.config.polygon_timeout => {
                self.zone_cache
                    .lock()
                    .expect("zone cache mutex poisoned")
                    .put(key, zones.clone());
                zones
            }
            Ok(_) => {
                warn!(
                    "polygon provider exceeded its {:?} budget; continuing without exclusion",
                    self.config.polygon_timeout
                );
                Vec::new()
            }
            Err(e) => {
                warn!("polygon provider failed ({e}); continuing without exclusion");
                Vec::new()
            }
        }
    }

    /// Attach a land price to every candidate: cache first, then the
    /// external source in ≤10-point batches, then the synthetic surface.
    fn attach_prices(&self, scored: &mut [ScoredCandidate]) {
        let mut cache = self.price_cache.lock().expect("price cache mutex poisoned");

        let mut missing: Vec<usize> = Vec::new();
        for (i, candidate) in scored.iter_mut().enumerate() {
            match cache.get(candidate.loc) {
                Some(price) => candidate.land_price = Some(price),
                None => missing.push(i),
            }
        }

        if !missing.is_empty() {
            let locs: Vec<Coordinate> = missing.iter().map(|&i| scored[i].loc).collect();
            let fetched = self.fetch_prices(&locs);
            for (&i, price) in missing.iter().zip(fetched) {
                cache.insert(scored[i].loc, price.clone());
                scored[i].land_price = Some(price);
            }
        }

        for candidate in scored.iter_mut() {
            if let Some(price) = candidate.land_price.as_ref() {
                candidate.power_per_cost =
                    Some(candidate.kwh_per_day / price.usd_per_m2.max(1.0));
            }
        }
    }

    /// Resolve prices for uncached coordinates. Individual external
    /// failures fall back to the synthetic surface at reduced confidence.
    fn fetch_prices(&self, locs: &[Coordinate]) -> Vec<LandPrice> {
        let Some(api) = self.price_api.as_ref() else {
            return locs.iter().map(|&loc| landprice::synthetic_price(loc)).collect();
        };

        let started = Instant::now();
        let results = api.prices(locs);
        if started.elapsed() > self.config.price_timeout {
            warn!(
                "land-price source exceeded its {:?} budget; using synthetic prices",
                self.config.price_timeout
            );
            return locs
                .iter()
                .map(|&loc| LandPrice {
                    confidence: FALLBACK_CONFIDENCE,
                    ..landprice::synthetic_price(loc)
                })
                .collect();
        }

        locs.iter()
            .zip(results)
            .map(|(&loc, result)| match result {
                Ok(price) => price,
                Err(e) => {
                    warn!("land-price lookup failed for {loc:?} ({e}); synthetic fallback");
                    LandPrice { confidence: FALLBACK_CONFIDENCE, ..landprice::synthetic_price(loc) }
                }
            })
            .collect()
    }

    /// One-shot numeric self-check per analysis: the clear-sky closure at
    /// the center's solar noon. A violation indicates a broken model and
    /// is reported as a diagnostic, never a panic.
    fn closure_self_check(&self, center: Coordinate, day_of_year: u32) {
        let noon = solar::solar_noon_utc_hour(center.lng, day_of_year);
        let pos = solar::solar_position(center.lat, center.lng, day_of_year, noon);
        let triple = irradiance::clear_sky(pos.elevation);
        let residual = triple.closure_residual(pos.elevation).abs();
        if residual >= irradiance::GHI_CLOSURE_TOLERANCE {
            warn!("GHI closure violated at analysis center: residual {residual:.2} W/m²");
        }
    }
}

// ===================== VALIDATION =====================

fn validate(request: &SearchRequest) -> Result<(), AnalysisError> {
    if !request.center.lat.is_finite() || !(-90.0..=90.0).contains(&request.center.lat) {
        return Err(AnalysisError::InvalidRequest(format!(
            "latitude {} outside [-90, 90]",
            request.center.lat
        )));
    }
    if !request.center.lng.is_finite()
        || request.center.lng <= -180.0
        || request.center.lng > 180.0
    {
        return Err(AnalysisError::InvalidRequest(format!(
            "longitude {} outside (-180, 180]",
            request.center.lng
        )));
    }
    if !request.radius_km.is_finite() || request.radius_km <= 0.0 || request.radius_km > 100.0 {
        return Err(AnalysisError::InvalidRequest(format!(
            "radius {} km outside (0, 100]",
            request.radius_km
        )));
    }
    if request.top_k == 0 {
        return Err(AnalysisError::InvalidRequest("top_k must be at least 1".into()));
    }
    Ok(())
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::exclusion::{StaticPolygonProvider, ZoneGeometry, ZoneKind};
    use crate::geo::haversine_km;
    use std::sync::atomic::AtomicUsize;

    fn austin_request() -> SearchRequest {
        let mut request = SearchRequest::new(Coordinate::new(30.2672, -97.7431), 2.0);
        request.include_land_prices = true;
        request.rank_by_cost = true;
        request.seed_salt = Some(0);
        request
    }

    #[test]
    fn test_e2e_austin_cost_ranked() {
        let engine = Engine::default();
        let results = engine.run(&austin_request()).expect("analysis succeeds");

        assert_eq!(results.len(), 5);
        let center = Coordinate::new(30.2672, -97.7431);

        for (i, site) in results.iter().enumerate() {
            assert_eq!(site.rank, i + 1);
            assert!(site.score.is_finite() && site.score >= 0.0);
            assert!(site.kwh_per_day.is_finite() && site.kwh_per_day > 0.0);
            assert!(site.land_price_usd_per_m2.expect("price attached") >= 50.0);
            assert!(site.power_per_cost.expect("power per cost attached") > 0.0);

            let d = haversine_km(center, Coordinate::new(site.lat, site.lng));
            assert!(d <= 2.02, "site {} is {} km from center", site.rank, d);
        }

        // Pairwise spacing of at least 500 m
        for i in 0..results.len() {
            for j in (i + 1)..results.len() {
                let d = haversine_km(
                    Coordinate::new(results[i].lat, results[i].lng),
                    Coordinate::new(results[j].lat, results[j].lng),
                );
                assert!(d >= 0.4999, "sites {} and {} only {} km apart", i + 1, j + 1, d);
            }
        }
    }

    #[test]
    fn test_e2e_small_disk_allows_fewer_results() {
        let engine = Engine::default();
        let mut request = austin_request();
        request.radius_km = 0.5;

        let results = engine.run(&request).expect("analysis succeeds");
        assert!(
            (1..=5).contains(&results.len()),
            "expected 1-5 results after spacing, got {}",
            results.len()
        );

        let center = Coordinate::new(30.2672, -97.7431);
        for site in &results {
            let d = haversine_km(center, Coordinate::new(site.lat, site.lng));
            assert!(d <= 0.51, "site at {} km exceeds the 0.5 km disk", d);
        }
    }

    #[test]
    fn test_e2e_rps_ranking_without_prices() {
        let engine = Engine::default();
        let mut request = SearchRequest::new(Coordinate::new(40.0, -74.0), 1.0);
        request.seed_salt = Some(0);

        let results = engine.run(&request).expect("analysis succeeds");
        assert!(!results.is_empty());

        for site in &results {
            assert!(site.land_price_usd_per_m2.is_none(), "no price was requested");
            assert!(site.power_per_cost.is_none());
        }

        // Ranked by RPS alone, non-increasing
        for pair in results.windows(2) {
            assert!(
                pair[0].score >= pair[1].score,
                "rank {} score {} below rank {} score {}",
                pair[0].rank,
                pair[0].score,
                pair[1].rank,
                pair[1].score
            );
        }
    }

    #[test]
    fn test_e2e_bitwise_determinism() {
        let engine = Engine::default();
        let request = austin_request();

        let first = engine.run(&request).expect("first run");
        let second = engine.run(&request).expect("second run");

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.rank, b.rank);
            assert_eq!(a.lat.to_bits(), b.lat.to_bits());
            assert_eq!(a.lng.to_bits(), b.lng.to_bits());
            assert_eq!(a.score.to_bits(), b.score.to_bits());
            assert_eq!(a.kwh_per_day.to_bits(), b.kwh_per_day.to_bits());
            assert_eq!(
                a.land_price_usd_per_m2.map(f64::to_bits),
                b.land_price_usd_per_m2.map(f64::to_bits)
            );
            assert_eq!(a.power_per_cost.map(f64::to_bits), b.power_per_cost.map(f64::to_bits));
        }
    }

    #[test]
    fn test_e2e_latitude_band_bias_removed() {
        let engine = Engine::default();

        let mut best_rps = Vec::new();
        for lat in [20.0, 40.0, 60.0] {
            let mut request = SearchRequest::new(Coordinate::new(lat, 0.0), 1.0);
            request.seed_salt = Some(0);

            let results = engine.run(&request).expect("analysis succeeds");
            best_rps.push(results.first().expect("non-empty").score);
        }

        // Normalisation makes the best scores comparable across bands...
        let max = best_rps.iter().cloned().fold(f64::MIN, f64::max);
        let min = best_rps.iter().cloned().fold(f64::MAX, f64::min);
        assert!(min > 0.0 && max / min < 2.0, "best RPS spread too wide: {:?}", best_rps);

        // ...and never decisively ordered by latitude alone.
        let eps = 0.005;
        assert!(
            !(best_rps[0] > best_rps[1] + eps && best_rps[1] > best_rps[2] + eps),
            "RPS still follows the latitude gradient: {:?}",
            best_rps
        );
    }

    #[test]
    fn test_e2e_cancellation_returns_no_partial_results() {
        let engine = Engine::default();
        let request = austin_request();

        let token = CancelToken::new();
        let trigger = token.clone();
        let mut cancel_after_grid = move |event: ProgressEvent| {
            if event.stage == Stage::GridGeneration {
                trigger.cancel();
            }
        };

        let outcome = engine.analyze(&request, Some(&mut cancel_after_grid), &token);
        assert!(matches!(outcome, Err(AnalysisError::Cancelled)), "got {outcome:?}");
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let engine = Engine::default();

        let mut bad_radius = austin_request();
        bad_radius.radius_km = 0.0;
        assert!(matches!(engine.run(&bad_radius), Err(AnalysisError::InvalidRequest(_))));

        bad_radius.radius_km = 100.5;
        assert!(matches!(engine.run(&bad_radius), Err(AnalysisError::InvalidRequest(_))));

        let mut bad_lat = austin_request();
        bad_lat.center.lat = 91.0;
        assert!(matches!(engine.run(&bad_lat), Err(AnalysisError::InvalidRequest(_))));

        let mut bad_lng = austin_request();
        bad_lng.center.lng = -180.0;
        assert!(matches!(engine.run(&bad_lng), Err(AnalysisError::InvalidRequest(_))));
    }

    #[test]
    fn test_progress_monotone_and_terminal() {
        let engine = Engine::default();
        let request = austin_request();

        let mut events: Vec<ProgressEvent> = Vec::new();
        let mut collect = |event: ProgressEvent| events.push(event);
        engine
            .analyze(&request, Some(&mut collect), &CancelToken::new())
            .expect("analysis succeeds");

        assert!(!events.is_empty());
        for pair in events.windows(2) {
            assert!(
                pair[1].percent >= pair[0].percent,
                "percent regressed from {} to {}",
                pair[0].percent,
                pair[1].percent
            );
        }

        let last = events.last().expect("at least one event");
        assert_eq!(last.stage, Stage::Complete);
        assert_eq!(last.percent, 100);
    }

    #[test]
    fn test_failing_polygon_provider_fails_open() {
        struct Failing;
        impl PolygonProvider for Failing {
            fn fetch(
                &self,
                _center: Coordinate,
                _radius_km: f64,
                _opts: &ExclusionOptions,
            ) -> Result<Vec<ExclusionZone>, ProviderError> {
                Err(ProviderError::Unavailable("overpass is down".into()))
            }
        }

        let engine = Engine::default().with_polygon_provider(Box::new(Failing));
        let mut request = austin_request();
        request.exclusion = Some(ExclusionConfig {
            enabled: true,
            buffer_m: 0,
            include_water: true,
            include_sensitive: false,
        });

        let results = engine.run(&request).expect("fails open");
        assert_eq!(results.len(), 5, "exclusion failure must not shrink the response");
    }

    #[test]
    fn test_exclusion_filters_and_caches() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        struct Counting(StaticPolygonProvider);
        impl PolygonProvider for Counting {
            fn fetch(
                &self,
                center: Coordinate,
                radius_km: f64,
                opts: &ExclusionOptions,
            ) -> Result<Vec<ExclusionZone>, ProviderError> {
                CALLS.fetch_add(1, Ordering::SeqCst);
                self.0.fetch(center, radius_km, opts)
            }
        }

        // A water body covering the eastern half of the Austin disk
        let zone = ExclusionZone {
            kind: ZoneKind::Water,
            geometry: ZoneGeometry::Polygon(vec![vec![
                [-97.7431, 30.2],
                [-97.70, 30.2],
                [-97.70, 30.33],
                [-97.7431, 30.33],
                [-97.7431, 30.2],
            ]]),
            buffer_m: 0.0,
        };

        let engine = Engine::default()
            .with_polygon_provider(Box::new(Counting(StaticPolygonProvider::new(vec![zone]))));
        let mut request = austin_request();
        request.exclusion = Some(ExclusionConfig {
            enabled: true,
            buffer_m: 0,
            include_water: true,
            include_sensitive: false,
        });

        let results = engine.run(&request).expect("analysis succeeds");
        for site in &results {
            assert!(site.lng < -97.7431, "site at lng {} is inside the water zone", site.lng);
        }

        // Second identical request must be served from the zone cache
        engine.run(&request).expect("second analysis succeeds");
        assert_eq!(CALLS.load(Ordering::SeqCst), 1, "provider called more than once");
    }

    #[test]
    fn test_response_serializes_to_wire_shape() {
        let engine = Engine::default();
        let mut request = SearchRequest::new(Coordinate::new(40.0, -74.0), 1.0);
        request.top_k = 2;

        let results = engine.run(&request).expect("analysis succeeds");
        let json = serde_json::to_value(&results).expect("serializes");

        let first = &json[0];
        assert!(first.get("rank").is_some());
        assert!(first.get("lat").is_some());
        assert!(first.get("lng").is_some());
        assert!(first.get("score").is_some());
        assert!(first.get("kwh_per_day").is_some());
        // Absent enrichments stay off the wire entirely
        assert!(first.get("land_price_usd_per_m2").is_none());
        assert!(first.get("power_per_cost").is_none());
        assert!(first.get("csi").is_none());
    }

    #[test]
    fn test_progress_event_serializes_kebab_stage() {
        let event = ProgressEvent {
            percent: 50,
            stage: Stage::IrradianceComputation,
            message: "integrated 100/200 sites".into(),
        };
        let json = serde_json::to_value(&event).expect("serializes");
        assert_eq!(json["stage"], "irradiance-computation");
        assert_eq!(json["percent"], 50);
    }

    #[test]
    fn test_request_parses_wire_shape() {
        let json = r#"{
            "center": {"lat": 30.2672, "lng": -97.7431},
            "radius_km": 2.0,
            "urban_penalty": false,
            "include_land_prices": true,
            "rank_by_cost": true,
            "exclusion": {"enabled": true, "buffer_m": 50, "include_water": true, "include_sensitive": false},
            "seed_salt": 7
        }"#;

        let request: SearchRequest = serde_json::from_str(json).expect("parses");
        assert_eq!(request.seed_salt, Some(7));
        assert_eq!(request.top_k, 5, "top_k defaults when absent");
        let excl = request.exclusion.expect("exclusion parsed");
        assert!(excl.enabled && excl.include_water && !excl.include_sensitive);
        assert_eq!(excl.buffer_m, 50);
    }
}
