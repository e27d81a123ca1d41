//! Command-Line Interface Module
//!
//! Handles argument parsing and validation for the sunscout binary.
//! Value parsers enforce the same ranges the engine validates, so bad
//! input fails fast with a readable message.

use std::path::PathBuf;

use clap::Parser;

use crate::engine::{ExclusionConfig, SearchRequest};
use crate::geo::Coordinate;

// ===================== CLI =====================

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Search center latitude in decimal degrees (-90 to 90)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_latitude, env = "SUNSCOUT_LATITUDE")]
    pub latitude: f64,

    /// Search center longitude in decimal degrees (-180 to 180]
    #[arg(long, allow_hyphen_values = true, value_parser = parse_longitude, env = "SUNSCOUT_LONGITUDE")]
    pub longitude: f64,

    /// Search radius in kilometers (up to 100)
    #[arg(long, default_value_t = 2.0, value_parser = parse_radius, env = "SUNSCOUT_RADIUS_KM")]
    pub radius_km: f64,

    /// Number of ranked sites to return
    #[arg(long, default_value_t = 5, value_parser = parse_top_k)]
    pub top_k: usize,

    /// Penalize dense urban latitude bands in the daily integral
    #[arg(long)]
    pub urban_penalty: bool,

    /// Attach land-price estimates to every site
    #[arg(long)]
    pub land_prices: bool,

    /// Rank by energy per dollar instead of Relative Potential Score
    /// (implies --land-prices)
    #[arg(long)]
    pub rank_by_cost: bool,

    /// Salt folded into the sampling seed; same salt, same sites
    #[arg(long, default_value_t = 0, env = "SUNSCOUT_SEED_SALT")]
    pub seed_salt: u32,

    // ===================== EXCLUSION OPTIONS =====================
    /// Enable exclusion zones (requires --zones-file)
    #[arg(long)]
    pub exclude: bool,

    /// Buffer distance in meters applied by the polygon provider
    #[arg(long, default_value_t = 0)]
    pub buffer_m: u32,

    /// Also exclude water bodies
    #[arg(long)]
    pub include_water: bool,

    /// Also exclude sensitive areas (parks, reserves)
    #[arg(long)]
    pub include_sensitive: bool,

    /// JSON file holding exclusion zones in the provider wire shape
    #[arg(long, env = "SUNSCOUT_ZONES_FILE")]
    pub zones_file: Option<PathBuf>,

    // ===================== OUTPUT OPTIONS =====================
    /// Emit the response as a JSON array instead of a table
    #[arg(long)]
    pub json: bool,

    /// Add CSI and local-percentile columns to the table
    #[arg(long)]
    pub verbose: bool,

    /// Suppress the progress line on stderr
    #[arg(long)]
    pub quiet: bool,
}

impl Args {
    /// Build the engine request from the parsed flags.
    pub fn to_request(&self) -> SearchRequest {
        let mut request = SearchRequest::new(Coordinate::new(self.latitude, self.longitude), self.radius_km);
        request.urban_penalty = self.urban_penalty;
        request.include_land_prices = self.land_prices || self.rank_by_cost;
        request.rank_by_cost = self.rank_by_cost;
        request.seed_salt = Some(self.seed_salt);
        request.top_k = self.top_k;

        if self.exclude {
            request.exclusion = Some(ExclusionConfig {
                enabled: true,
                buffer_m: self.buffer_m,
                include_water: self.include_water,
                include_sensitive: self.include_sensitive,
            });
        }

        request
    }
}

// ===================== CLI VALUE PARSERS =====================

fn parse_latitude(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(-90.0..=90.0).contains(&v) {
        return Err(format!("Latitude must be between -90 and 90, got {}", v));
    }
    Ok(v)
}

fn parse_longitude(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(-180.0..=180.0).contains(&v) {
        return Err(format!("Longitude must be between -180 and 180, got {}", v));
    }
    Ok(v)
}

fn parse_radius(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if v <= 0.0 || v > 100.0 {
        return Err(format!("Radius must be in (0, 100] kilometers, got {}", v));
    }
    Ok(v)
}

fn parse_top_k(s: &str) -> Result<usize, String> {
    let v: usize = s.parse().map_err(|_| format!("Invalid integer: {}", s))?;
    if v == 0 || v > 100 {
        return Err(format!("top-k must be between 1 and 100, got {}", v));
    }
    Ok(v)
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsers_accept_valid_ranges() {
        assert!(parse_latitude("30.2672").is_ok());
        assert!(parse_longitude("-97.7431").is_ok());
        assert!(parse_radius("2").is_ok());
        assert!(parse_top_k("5").is_ok());
    }

    #[test]
    fn test_parsers_reject_out_of_range() {
        assert!(parse_latitude("90.5").is_err());
        assert!(parse_longitude("181").is_err());
        assert!(parse_radius("0").is_err());
        assert!(parse_radius("101").is_err());
        assert!(parse_top_k("0").is_err());
    }

    #[test]
    fn test_rank_by_cost_implies_land_prices() {
        let args = Args::parse_from([
            "sunscout",
            "--latitude",
            "30.2672",
            "--longitude",
            "-97.7431",
            "--rank-by-cost",
        ]);
        let request = args.to_request();
        assert!(request.include_land_prices);
        assert!(request.rank_by_cost);
    }

    #[test]
    fn test_exclusion_flags_build_config() {
        let args = Args::parse_from([
            "sunscout",
            "--latitude",
            "40",
            "--longitude",
            "-74",
            "--exclude",
            "--include-water",
            "--buffer-m",
            "25",
        ]);
        let request = args.to_request();
        let excl = request.exclusion.expect("exclusion enabled");
        assert!(excl.enabled && excl.include_water && !excl.include_sensitive);
        assert_eq!(excl.buffer_m, 25);
    }
}
