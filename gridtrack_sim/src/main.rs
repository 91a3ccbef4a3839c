//! GridTrack simulator CLI
//!
//! Replays synthetic scenes through the voxel tracker and reports how well
//! the tracked obstacles match ground truth.

use clap::Parser;
use gridtrack_core::TrackerConfig;
use gridtrack_sim::{ScenarioId, ScenarioResult, ScenarioRunner, SimError, SimExport};
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// GridTrack synthetic-scene driver
#[derive(Parser, Debug)]
#[command(name = "gridtrack-sim")]
#[command(about = "Run the GridTrack obstacle tracker on synthetic scenes", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (static_box, crossing, convoy, sensor_dropout, ego_motion, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Frames per scenario run
    #[arg(short, long, default_value = "40")]
    frames: usize,

    /// Tracker configuration (JSON); defaults when absent
    #[arg(short, long)]
    config: Option<String>,

    /// Per-frame deadline in milliseconds; overruns drop the next frame
    #[arg(long)]
    deadline_ms: Option<f64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-frame obstacles and ground truth to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

/// Runs every requested scenario/seed pair. Returns whether all passed.
fn run(args: &Args) -> Result<bool, SimError> {
    let config = match &args.config {
        Some(path) => TrackerConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => TrackerConfig::default(),
    };

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args
            .scenario
            .parse()
            .map_err(|_| SimError::UnknownScenario(args.scenario.clone()))?]
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if !args.json {
        info!("GridTrack simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    // Export mode: one scenario, one seed
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            return Err(SimError::Usage(
                "--export needs a single scenario, not 'all'".to_string(),
            ));
        }
        let runner = ScenarioRunner::new(base_seed, config)
            .with_frames(args.frames)
            .with_deadline(args.deadline_ms);
        let mut export = SimExport::new(scenarios[0].name(), base_seed);
        let result = runner.run_with_export(scenarios[0], &mut export)?;
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);
        report(&[result], args.json);
        return Ok(export.passed.unwrap_or(false));
    }

    let mut results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed, config.clone())
            .with_frames(args.frames)
            .with_deadline(args.deadline_ms);
        for scenario in &scenarios {
            results.push(runner.run(*scenario)?);
        }
    }

    report(&results, args.json);
    Ok(results.iter().all(|r| r.passed))
}

fn report(results: &[ScenarioResult], json: bool) {
    let failed = results.iter().filter(|r| !r.passed).count();

    if json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "processed": r.metrics.processed,
                    "pose_skips": r.metrics.pose_skips,
                    "deadline_skips": r.metrics.deadline_skips,
                    "obstacles": r.metrics.final_obstacles,
                    "mean_velocity_error": r.metrics.mean_velocity_error,
                    "max_elapsed_ms": r.metrics.max_elapsed_ms,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
        return;
    }

    for r in results {
        if r.passed {
            info!("PASS {} (seed={}) obstacles={}", r.scenario.name(), r.seed, r.metrics.final_obstacles);
        } else {
            error!(
                "FAIL {} (seed={}): {}",
                r.scenario.name(),
                r.seed,
                r.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }
    if failed == 0 {
        info!("All {} scenario runs passed", results.len());
    } else {
        error!("{}/{} scenario runs failed", failed, results.len());
    }
}
