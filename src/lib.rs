//! Solar Potential Analysis Engine
//!
//! Estimates, for a geographic disk, the ground locations whose
//! photovoltaic yield per unit land cost is highest. The pipeline:
//!
//! 1. Sample a reproducible candidate grid inside the disk ([`sample`]).
//! 2. Optionally mask candidates with exclusion polygons ([`exclusion`]).
//! 3. Integrate a clear-sky plane-of-array irradiance over a fixed daily
//!    grid at each candidate ([`solar`], [`irradiance`], [`integrate`]).
//! 4. Normalise against a local climatology baseline so rankings measure
//!    local quality rather than latitude ([`bias`]).
//! 5. Attach land prices and energy-per-dollar ([`landprice`]).
//! 6. Select a spatially spread top-K ([`rank`]).
//!
//! The [`engine::Engine`] drives the stages, owns the caches, emits
//! progress events, and honours cooperative cancellation. Everything is
//! deterministic for a fixed request: random draws come from a seeded
//! stream that is a pure function of `(center, radius, salt)`.

pub mod bias;
pub mod cli;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod geo;
pub mod integrate;
pub mod irradiance;
pub mod landprice;
pub mod output;
pub mod rank;
pub mod rng;
pub mod sample;
pub mod solar;
pub mod time;

pub use engine::{CancelToken, Engine, EngineConfig, ProgressEvent, SearchRequest, SiteResult, Stage};
pub use error::{AnalysisError, ProviderError};
pub use geo::Coordinate;
