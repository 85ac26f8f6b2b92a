// Benchmark Report Types
// Structured output for offline balance analysis

use serde::Serialize;
use survival_engine::events::GameOverReason;

// ─── Statistics (per-metric Monte Carlo aggregation) ────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let stderr = std_dev / (n as f64).sqrt();
        let z = 1.96; // 95% CI
        Self {
            mean,
            std_dev,
            ci_lower: mean - z * stderr,
            ci_upper: mean + z * stderr,
            min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
            max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }

    pub fn half_width(&self) -> f64 {
        (self.ci_upper - self.ci_lower) / 2.0
    }

    pub fn collect<T>(items: &[T], metric: impl Fn(&T) -> f64) -> Self {
        Self::from_samples(&items.iter().map(metric).collect::<Vec<_>>())
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub scenario: String,
    pub name: String,
    pub seed: u64,
    /// Reached the horizon without a game over.
    pub survived: bool,
    pub game_over: Option<GameOverReason>,
    pub survival_time: f64,
    pub score: f64,
    pub completions: u64,
    pub failures: u32,
    pub malicious_blocked: u64,
    pub malicious_passed: u64,
    pub final_money: f64,
    pub final_reputation: f64,
    pub peak_rps: f64,
    pub frames: u64,
    pub elapsed_ms: u128,
}

// ─── Monte Carlo Report (per-scenario aggregation) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub n_runs: usize,
    pub survival_rate: f64,
    pub bankruptcies: usize,
    pub reputation_losses: usize,
    pub survival_time: Stats,
    pub score: Stats,
    pub completions: Stats,
    pub failures: Stats,
    pub final_money: Stats,
    pub peak_rps: Stats,
    pub elapsed_ms: Stats,
    pub individual_runs: Vec<BenchResult>,
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_runs_per_scenario: usize,
    pub horizon_seconds: f64,
    pub summary: Summary,
    pub scenarios: Vec<MonteCarloReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    /// Scenarios where every run survived the horizon.
    pub unbeaten: usize,
    pub mean_survival_rate: f64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_constant_samples_have_zero_width() {
        let stats = Stats::from_samples(&[4.0, 4.0, 4.0]);
        assert_eq!(stats.mean, 4.0);
        assert_eq!(stats.half_width(), 0.0);
        assert_eq!(stats.n, 3);
    }

    #[test]
    fn stats_interval_brackets_the_mean() {
        let stats = Stats::from_samples(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.mean, 2.5);
        assert!(stats.ci_lower < 2.5 && stats.ci_upper > 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
    }

    #[test]
    fn empty_samples_are_all_zero() {
        let stats = Stats::from_samples(&[]);
        assert_eq!(stats.n, 0);
        assert_eq!(stats.mean, 0.0);
    }
}
