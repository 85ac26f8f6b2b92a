// Monte Carlo Infrastructure — N runs per scenario with statistical aggregation
// Each scenario runs N times with seeds base..base+N, computing mean ± 95% CI

use log::{debug, warn};
use survival_engine::events::GameOverReason;
use survival_engine::*;

use crate::report::*;
use crate::scenarios::Scenario;
use crate::time_series::TimeSeriesRecorder;

use std::path::Path;
use std::time::Instant;

/// Fixed frame length; matches the engine's frame clamp.
pub const FRAME_DT: f64 = 0.1;

/// Time series keeps one sample per simulated second.
const SAMPLE_STRIDE: u64 = 10;

/// Run a single scenario iteration with a specific seed.
pub fn run_single(
    scenario: &Scenario,
    seed: u64,
    horizon: f64,
    time_series_dir: Option<&Path>,
) -> Result<BenchResult, CommandError> {
    let start = Instant::now();
    let mut config = SimConfig::default();
    if let Some(tune) = scenario.tune {
        tune(&mut config);
    }
    let mut sim = Simulation::with_config(config, GameMode::Survival, seed);
    if let Some(capital) = scenario.capital {
        sim.ledger_mut().set_money(capital);
    }
    (scenario.build)(&mut sim)?;

    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new(SAMPLE_STRIDE));
    let mut completions = 0u64;
    let mut malicious_blocked = 0u64;
    let mut malicious_passed = 0u64;
    let mut peak_rps = 0.0_f64;
    let mut game_over = None;
    let mut frames = 0u64;

    while sim.elapsed() < horizon {
        let result = sim.tick_core(FRAME_DT);
        frames += 1;
        peak_rps = peak_rps.max(result.snapshot.current_rps);

        for event in &result.events {
            match event {
                SimEvent::RequestFinished { outcome, .. } => match outcome {
                    Outcome::Completed => completions += 1,
                    Outcome::MaliciousBlocked => malicious_blocked += 1,
                    Outcome::MaliciousPassed => malicious_passed += 1,
                    Outcome::Failed => {}
                },
                SimEvent::GameOver { reason } => game_over = Some(*reason),
                _ => {}
            }
        }

        if let Some(ts) = time_series.as_mut() {
            ts.record(frames, &result.snapshot);
        }
        if !sim.is_running() {
            break;
        }
    }

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("seed-{}.jsonl", seed));
        match ts.write_jsonl(&path) {
            Ok(()) => debug!("wrote {} samples to {}", ts.len(), path.display()),
            Err(e) => warn!("failed to write time series {}: {}", path.display(), e),
        }
    }

    let ledger = sim.ledger();
    Ok(BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        seed,
        survived: game_over.is_none(),
        game_over,
        survival_time: sim.elapsed(),
        score: ledger.score.total,
        completions,
        failures: ledger.failures.total(),
        malicious_blocked,
        malicious_passed,
        final_money: ledger.money(),
        final_reputation: ledger.reputation,
        peak_rps,
        frames,
        elapsed_ms: start.elapsed().as_millis(),
    })
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(
    scenario: &Scenario,
    n_runs: usize,
    base_seed: u64,
    horizon: f64,
    time_series_base: Option<&Path>,
) -> Result<MonteCarloReport, CommandError> {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));

    let mut results = Vec::with_capacity(n_runs);
    for i in 0..n_runs {
        let seed = base_seed + i as u64;
        let result = run_single(scenario, seed, horizon, ts_dir.as_deref())?;
        debug!(
            "{} seed {}: survived={} t={:.1}s score={:.0}",
            scenario.name, seed, result.survived, result.survival_time, result.score
        );
        results.push(result);
    }

    Ok(aggregate(scenario, results))
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let survived = results.iter().filter(|r| r.survived).count();
    let count_reason = |reason| results.iter().filter(|r| r.game_over == Some(reason)).count();

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        survival_rate: if n == 0 { 0.0 } else { survived as f64 / n as f64 },
        bankruptcies: count_reason(GameOverReason::Bankrupt),
        reputation_losses: count_reason(GameOverReason::Reputation),
        survival_time: Stats::collect(&results, |r| r.survival_time),
        score: Stats::collect(&results, |r| r.score),
        completions: Stats::collect(&results, |r| r.completions as f64),
        failures: Stats::collect(&results, |r| f64::from(r.failures)),
        final_money: Stats::collect(&results, |r| r.final_money),
        peak_rps: Stats::collect(&results, |r| r.peak_rps),
        elapsed_ms: Stats::collect(&results, |r| r.elapsed_ms as f64),
        individual_runs: results,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
