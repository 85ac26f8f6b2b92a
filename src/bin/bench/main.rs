// Survival Benchmark Runner — balance sweeps over prebuilt layouts
// Monte Carlo over seeds, survival rules, seedable ChaCha8 PRNG, optional per-frame audit trail
//
// Usage:
//   cargo run --release --bin bench                     # Run all scenarios (30 runs each)
//   cargo run --release --bin bench -- --runs 5         # Quick mode (5 runs each)
//   cargo run --release --bin bench -- FORTRESS         # Filter by name, label or category
//   cargo run --release --bin bench -- --time-series    # Enable JSONL output
//   cargo run --release --bin bench -- --seed 42        # Custom base seed
//   cargo run --release --bin bench -- --seconds 900    # Longer horizon

mod monte_carlo;
mod report;
mod scenarios;
mod time_series;

use clap::Parser;
use log::{error, info};
use report::*;
use scenarios::*;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const RESULTS_DIR: &str = "bench-results";

// ─── CLI Parsing ────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "bench", version)]
#[command(about = "Monte Carlo balance benchmark for the survival engine")]
struct Cli {
    /// Runs per scenario
    #[arg(long, default_value_t = 30)]
    runs: usize,

    /// Base seed; run i uses seed + i
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Simulated seconds per run
    #[arg(long, default_value_t = 600.0)]
    seconds: f64,

    /// Write per-run JSONL time series under bench-results/time-series
    #[arg(long)]
    time_series: bool,

    /// Only run scenarios whose name, label or category contains this
    filter: Option<String>,
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let all_scenarios = all_scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => all_scenarios.iter().filter(|s| s.matches(f)).collect(),
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    let ts_dir = cli
        .time_series
        .then(|| Path::new(RESULTS_DIR).join("time-series"));

    println!("\n  Survival Benchmark Runner v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {} | Horizon: {:.0}s",
        cli.runs, cli.seed, cli.seconds
    );
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!(
        "  {:<40} {:>6} {:>14} {:>14} {:>14} {:>12} {:>7}",
        "Scenario", "Surv%", "Time(s)", "Score", "Completed", "Failed", "Wall"
    );
    println!("  {}", "-".repeat(114));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        info!("running {} ({} runs)", scenario.name, cli.runs);
        let report = match monte_carlo::run_monte_carlo(
            scenario,
            cli.runs,
            cli.seed,
            cli.seconds,
            ts_dir.as_deref(),
        ) {
            Ok(report) => report,
            Err(e) => {
                error!("{} layout rejected: {}", scenario.name, e);
                eprintln!("  {:<40} layout rejected: {}", scenario.label, e);
                continue;
            }
        };

        println!(
            "  {:<40} {:>5.0}% {:>7.1}±{:<6.1} {:>7.0}±{:<6.0} {:>7.0}±{:<6.0} {:>5.0}±{:<6.0} {:>5.0}ms",
            report.label,
            report.survival_rate * 100.0,
            report.survival_time.mean,
            report.survival_time.half_width(),
            report.score.mean,
            report.score.half_width(),
            report.completions.mean,
            report.completions.half_width(),
            report.failures.mean,
            report.failures.half_width(),
            report.elapsed_ms.mean,
        );

        mc_reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let unbeaten = mc_reports.iter().filter(|r| r.survival_rate >= 1.0).count();
    let mean_survival_rate = if total == 0 {
        0.0
    } else {
        mc_reports.iter().map(|r| r.survival_rate).sum::<f64>() / total as f64
    };

    println!("  {}", "-".repeat(114));
    println!(
        "  Total: {}  Unbeaten: {}  Mean survival: {:.1}%  Suite time: {:.1}s\n",
        total,
        unbeaten,
        mean_survival_rate * 100.0,
        suite_elapsed.as_secs_f64()
    );

    for report in mc_reports.iter().filter(|r| r.bankruptcies + r.reputation_losses > 0) {
        println!(
            "    {:<38} bankrupt: {:>3}  reputation: {:>3}",
            report.scenario_name, report.bankruptcies, report.reputation_losses
        );
    }

    // ─── Write JSON Report ──────────────────────────────────────────────

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let timestamp = format!("{}", ts);

    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        n_runs_per_scenario: cli.runs,
        horizon_seconds: cli.seconds,
        summary: Summary { total, unbeaten, mean_survival_rate },
        scenarios: mc_reports,
    };

    match write_report(&report, &timestamp) {
        Ok(path) => println!("\n  Results saved to: {}\n", path.display()),
        Err(e) => {
            error!("failed to write report: {}", e);
            std::process::exit(1);
        }
    }
}

fn write_report(report: &BenchReport, timestamp: &str) -> std::io::Result<PathBuf> {
    let dir = Path::new(RESULTS_DIR);
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("bench-{}.json", timestamp));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
