//! sim-runner: headless patrol dispatch simulation runner.
//!
//! Usage:
//!   sim-runner --seed 7 --rate 600 --duration 43200 --db run.db
//!   sim-runner --config sim.json --map city.json
//!   sim-runner --grid 16 --spacing 200

use anyhow::{Context, Result};
use chrono::Local;
use patrolsim_core::{
    config::SimConfig,
    engine::SimEngine,
    exporter::{new_run_id, Exporter},
    import::{load_city, synthetic_grid},
    snapshot::SimulationSummary,
    store::ExportStore,
    types::Coordinate,
    world::{Statistics, World},
};
use serde::Serialize;
use std::{env, sync::Arc, thread, time::Duration};

/// Synthetic grid anchor when no map file is given.
const GRID_ORIGIN: Coordinate = Coordinate::new(50.0614, 19.9366);

#[derive(Serialize)]
struct RunReport<'a> {
    run_id: &'a str,
    seed: u64,
    sim_time: f64,
    statistics: Statistics,
    summary: SimulationSummary,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match arg_value(&args, "--config") {
        Some(path) => SimConfig::load(path).with_context(|| format!("loading config {path}"))?,
        None => SimConfig::default(),
    };
    config.seed = parse_arg(&args, "--seed", config.seed);
    config.time_rate = parse_arg(&args, "--rate", config.time_rate);
    config.simulation_duration_secs = parse_arg(&args, "--duration", config.simulation_duration_secs);
    config.number_of_patrols = parse_arg(&args, "--patrols", config.number_of_patrols);
    config.validate().context("invalid configuration")?;

    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let map = match arg_value(&args, "--map") {
        Some(path) => load_city(path).with_context(|| format!("loading map {path}"))?,
        None => {
            let size = parse_arg(&args, "--grid", 12usize);
            let spacing = parse_arg(&args, "--spacing", 250.0f64);
            synthetic_grid(size, size, spacing, GRID_ORIGIN).into_city()?
        }
    };

    let run_id = new_run_id(config.seed);
    println!("patrolsim: sim-runner");
    println!("  run:       {run_id}");
    println!("  seed:      {}", config.seed);
    println!("  patrols:   {}", config.number_of_patrols);
    println!("  rate:      x{}", config.time_rate);
    println!("  duration:  {:.0}s simulated", config.simulation_duration_secs);
    println!("  db:        {db}");
    println!();

    let store = ExportStore::open(db)?;
    let exporter = Exporter::new(store, run_id.clone(), &config)?;
    let seed = config.seed;
    let world = Arc::new(World::with_system_time(config, Arc::new(map))?);
    let mut engine = SimEngine::build(Arc::clone(&world), Some(exporter));
    engine.start()?;

    let mut last_hour = 0;
    while !engine.is_finished() {
        thread::sleep(Duration::from_millis(500));
        let hour = (world.now() / 3600.0).floor() as u64;
        if hour > last_hour {
            last_hour = hour;
            let summary = SimulationSummary::from_snapshot(&world.snapshot(), world.map());
            println!(
                "[{}] hour {hour:>3}: {} patrols, {} interventions ({} worked), {} firings ({} worked)",
                Local::now().format("%H:%M:%S"),
                summary.patrols,
                summary.interventions,
                summary.interventions_being_solved,
                summary.firings,
                summary.firings_being_solved,
            );
        }
    }
    engine.wait();

    let snapshot = world.snapshot();
    let report = RunReport {
        run_id: &run_id,
        seed,
        sim_time: snapshot.sim_time,
        statistics: snapshot.stats,
        summary: SimulationSummary::from_snapshot(&snapshot, world.map()),
    };
    println!();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    arg_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
