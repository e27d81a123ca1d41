//! Output Formatting Module
//!
//! Terminal rendering of ranked results and the stderr progress line.

use std::io::Write;

use crate::engine::{ProgressEvent, SearchRequest, SiteResult, Stage};

// ===================== PROGRESS =====================

/// Render one progress event as a single updating stderr line.
pub fn print_progress(event: &ProgressEvent) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r[{:3}%] {:<24} {:<48}", event.percent, event.stage, event.message);
    if event.stage == Stage::Complete || event.stage == Stage::Idle {
        let _ = writeln!(stderr);
    }
    let _ = stderr.flush();
}

// ===================== RESULT TABLE =====================

/// Print the ranked sites as a table.
pub fn print_results(request: &SearchRequest, results: &[SiteResult], verbose: bool) {
    println!(
        "Center  : lat={:.6}, lng={:.6}",
        request.center.lat, request.center.lng
    );
    println!("Radius  : {} km", request.radius_km);
    println!(
        "Ranking : {}",
        if request.rank_by_cost { "energy per dollar" } else { "relative potential score" }
    );
    println!();

    if results.is_empty() {
        println!("No viable sites found in the search disk.");
        return;
    }

    let with_prices = results.iter().any(|r| r.land_price_usd_per_m2.is_some());

    print!("{:>4}  {:>11}  {:>12}  {:>7}  {:>10}", "Rank", "Latitude", "Longitude", "Score", "kWh/m²/d");
    if with_prices {
        print!("  {:>9}  {:>9}", "$/m²", "kWh/$");
    }
    if verbose {
        print!("  {:>6}  {:>5}", "CSI", "Pct");
    }
    println!();

    for site in results {
        print!(
            "{:>4}  {:>11.6}  {:>12.6}  {:>7.3}  {:>10.3}",
            site.rank, site.lat, site.lng, site.score, site.kwh_per_day
        );
        if with_prices {
            match (site.land_price_usd_per_m2, site.power_per_cost) {
                (Some(price), Some(ppc)) => print!("  {:>9.2}  {:>9.5}", price, ppc),
                _ => print!("  {:>9}  {:>9}", "-", "-"),
            }
        }
        if verbose {
            print!("  {:>6.3}  {:>5.1}", site.csi, site.local_percentile);
        }
        println!();
    }
}

// ===================== TESTS =====================
