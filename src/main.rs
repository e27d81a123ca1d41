use clap::Parser;

use sunscout::cli::Args;
use sunscout::engine::{CancelToken, Engine, ProgressEvent};
use sunscout::exclusion::{ExclusionZone, StaticPolygonProvider};
use sunscout::output;

// ===================== MAIN =====================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let args = Args::parse();
    let request = args.to_request();

    let mut engine = Engine::default();
    if let Some(path) = &args.zones_file {
        let raw = std::fs::read_to_string(path)?;
        let zones: Vec<ExclusionZone> = serde_json::from_str(&raw)?;
        log::info!("loaded {} exclusion zones from {}", zones.len(), path.display());
        engine = engine.with_polygon_provider(Box::new(StaticPolygonProvider::new(zones)));
    }

    let cancel = CancelToken::new();
    let mut progress = |event: ProgressEvent| output::print_progress(&event);
    let on_progress = if args.quiet {
        None
    } else {
        Some(&mut progress as &mut dyn FnMut(ProgressEvent))
    };

    let results = engine.analyze(&request, on_progress, &cancel)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        output::print_results(&request, &results, args.verbose);
    }

    Ok(())
}
