// Per-Frame JSONL Time Series Recorder
// Outputs one JSON line per sampled frame for independent analysis

use serde::Serialize;
use std::io::Write;
use survival_engine::UiSnapshot;

#[derive(Debug, Serialize)]
pub struct FrameSnapshot {
    pub frame: u64,
    pub elapsed_time: f64,
    pub money: f64,
    pub reputation: f64,
    pub score: f64,
    pub requests_processed: u64,
    pub failures: u32,
    pub current_rps: f64,
    pub target_rps: f64,
    pub upkeep_per_second: f64,
    pub malicious_spike: bool,
    pub traffic_shift: Option<String>,
    pub random_event: Option<String>,
    pub backlog: usize,
    pub in_flight: usize,
    pub min_health: f64,
    pub disabled_nodes: usize,
}

impl FrameSnapshot {
    pub fn from_snapshot(frame: u64, snapshot: &UiSnapshot) -> Self {
        let min_health = snapshot
            .nodes
            .iter()
            .map(|n| n.health)
            .fold(100.0_f64, f64::min);

        Self {
            frame,
            elapsed_time: snapshot.elapsed_time,
            money: snapshot.money,
            reputation: snapshot.reputation,
            score: snapshot.score.total,
            requests_processed: snapshot.requests_processed,
            failures: snapshot.failures.total(),
            current_rps: snapshot.current_rps,
            target_rps: snapshot.target_rps,
            upkeep_per_second: snapshot.upkeep_per_second,
            malicious_spike: snapshot.interventions.malicious_spike,
            traffic_shift: snapshot.interventions.traffic_shift.clone(),
            random_event: snapshot.interventions.random_event.clone(),
            backlog: snapshot.nodes.iter().map(|n| n.backlog).sum(),
            in_flight: snapshot.nodes.iter().map(|n| n.in_flight).sum(),
            min_health,
            disabled_nodes: snapshot.nodes.iter().filter(|n| n.disabled).count(),
        }
    }
}

/// Time series recorder that keeps one snapshot every `stride` frames.
pub struct TimeSeriesRecorder {
    stride: u64,
    snapshots: Vec<FrameSnapshot>,
}

impl TimeSeriesRecorder {
    pub fn new(stride: u64) -> Self {
        Self { stride: stride.max(1), snapshots: Vec::new() }
    }

    pub fn record(&mut self, frame: u64, snapshot: &UiSnapshot) {
        if frame % self.stride == 0 {
            self.snapshots.push(FrameSnapshot::from_snapshot(frame, snapshot));
        }
    }

    /// Write all snapshots to a JSONL file
    pub fn write_jsonl(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot).map_err(std::io::Error::other)?;
            writeln!(file, "{}", line)?;
        }
        file.flush()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }
}
