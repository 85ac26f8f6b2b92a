// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Save Files

//! Versioned JSON saves.
//!
//! A blob is parsed into a loose JSON tree first, migrated to the current
//! schema, and only then decoded into a `SaveFile`. Nothing here touches a
//! live simulation; the caller swaps state in once decoding has succeeded.

use std::collections::{BTreeMap, HashMap};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::events::GameOverReason;
use crate::intervention::InterventionState;
use crate::mix::MixOverlay;
use crate::types::{FailureCounts, GameMode, NodeKind, Score, TrafficType};

pub const SAVE_VERSION: &str = "2.0";

/// Ingress id used by saved connections.
pub const INGRESS_ID: &str = "internet";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("corrupt save: {0}")]
    CorruptSave(String),
    #[error("unsupported save version {0}")]
    UnsupportedVersion(String),
    #[error("failed to serialize save: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedService {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub position: [f64; 3],
    #[serde(default = "first_tier")]
    pub tier: u8,
    #[serde(default = "full_health")]
    pub health: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedConnection {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveFile {
    pub version: String,
    #[serde(default)]
    pub game_mode: GameMode,
    pub money: f64,
    #[serde(default = "full_health")]
    pub reputation: f64,
    #[serde(default)]
    pub requests_processed: u64,
    #[serde(default)]
    pub score: Score,
    #[serde(default)]
    pub failures: BTreeMap<String, u32>,
    /// Player-set distribution, keyed by traffic type name.
    pub traffic_distribution: BTreeMap<String, f64>,
    /// Interventions reshaping the distribution at save time.
    #[serde(default)]
    pub mix_overlays: Vec<MixOverlay>,
    #[serde(default = "initial_rps", rename = "currentRPS")]
    pub current_rps: f64,
    #[serde(default)]
    pub spawn_timer: f64,
    #[serde(default)]
    pub elapsed_game_time: f64,
    #[serde(default)]
    pub time_scale: f64,
    /// Saves that predate this flag were always written mid-game.
    #[serde(default = "enabled")]
    pub is_running: bool,
    #[serde(default = "enabled")]
    pub upkeep_enabled: bool,
    #[serde(default)]
    pub sandbox_budget: Option<f64>,
    #[serde(default = "burst_count")]
    pub burst_count: u32,
    #[serde(default)]
    pub next_request_id: u64,
    #[serde(default)]
    pub game_over: Option<GameOverReason>,
    #[serde(default)]
    pub interventions: InterventionState,
    #[serde(default)]
    pub services: Vec<SavedService>,
    #[serde(default)]
    pub connections: Vec<SavedConnection>,
}

fn first_tier() -> u8 {
    1
}

fn full_health() -> f64 {
    100.0
}

fn initial_rps() -> f64 {
    0.5
}

fn enabled() -> bool {
    true
}

fn burst_count() -> u32 {
    10
}

impl SaveFile {
    /// Distribution weights in `TrafficType::ALL` order. Unknown names are
    /// ignored, missing ones count as zero.
    pub fn mix_weights(&self) -> [f64; 6] {
        let mut weights = [0.0; 6];
        for (name, share) in &self.traffic_distribution {
            match TrafficType::from_name(name) {
                Some(t) if share.is_finite() => weights[t.index()] = share.max(0.0),
                _ => warn!("save: ignoring traffic share {name}={share}"),
            }
        }
        weights
    }

    pub fn failure_counts(&self) -> FailureCounts {
        let mut counts = FailureCounts::default();
        for (name, n) in &self.failures {
            if let Some(t) = TrafficType::from_name(name) {
                counts.0[t.index()] = *n;
            }
        }
        counts
    }
}

/// Name-keyed map for the six traffic types.
pub fn keyed<T: Copy>(values: &[T; 6]) -> BTreeMap<String, T> {
    TrafficType::ALL.iter().map(|t| (t.name().to_string(), values[t.index()])).collect()
}

// ─── Encode / decode ─────────────────────────────────────────────────────────

pub fn encode(save: &SaveFile) -> Result<String, PersistenceError> {
    serde_json::to_string(save).map_err(PersistenceError::Serialize)
}

/// Parse, migrate and decode a save blob.
pub fn decode(blob: &str) -> Result<SaveFile, PersistenceError> {
    let raw: Value =
        serde_json::from_str(blob).map_err(|e| PersistenceError::CorruptSave(e.to_string()))?;
    let Value::Object(mut root) = raw else {
        return Err(PersistenceError::CorruptSave("save is not a JSON object".into()));
    };

    let version = match root.get("version") {
        None | Some(Value::Null) => "1.0".to_string(),
        Some(Value::String(v)) => v.clone(),
        Some(other) => return Err(PersistenceError::UnsupportedVersion(other.to_string())),
    };
    match version.as_str() {
        "1.0" => {
            info!("migrating save from version {version}");
            migrate_v1(&mut root);
        }
        SAVE_VERSION => {}
        _ => return Err(PersistenceError::UnsupportedVersion(version)),
    }
    normalize_layout(&mut root);
    root.insert("version".into(), Value::String(SAVE_VERSION.into()));

    serde_json::from_value(Value::Object(root))
        .map_err(|e| PersistenceError::CorruptSave(e.to_string()))
}

// ─── Migration ───────────────────────────────────────────────────────────────

/// Version 1 saves used three traffic types (WEB, API, FRAUD) and matching
/// score and failure buckets.
fn migrate_v1(root: &mut Map<String, Value>) {
    if let Some(Value::Object(old)) = root.get("trafficDistribution") {
        if ["WEB", "API", "FRAUD"].iter().any(|k| old.contains_key(*k)) {
            let web = number(old, "WEB");
            let api = number(old, "API");
            let fraud = number(old, "FRAUD");
            let mut shares = [web, api * 0.5, api * 0.3, 0.05, api * 0.2, fraud];
            let sum: f64 = shares.iter().sum();
            if sum > 0.0 {
                shares.iter_mut().for_each(|s| *s /= sum);
            }
            root.insert("trafficDistribution".into(), json!(keyed(&shares)));
        }
    }

    if let Some(Value::Object(old)) = root.get("score") {
        if ["web", "api", "fraudBlocked"].iter().any(|k| old.contains_key(*k)) {
            let score = Score {
                total: number(old, "total"),
                storage: number(old, "web"),
                database: number(old, "api"),
                malicious_blocked: number(old, "fraudBlocked"),
            };
            root.insert("score".into(), json!(score));
        }
    }

    if let Some(Value::Object(old)) = root.get("failures") {
        if ["WEB", "API", "FRAUD"].iter().any(|k| old.contains_key(*k)) {
            let count = |k: &str| old.get(k).and_then(Value::as_u64).unwrap_or(0) as u32;
            let api = count("API");
            let write = api * 3 / 10;
            let search = api / 5;
            let counts = [count("WEB"), api - write - search, write, 0, search, count("FRAUD")];
            root.insert("failures".into(), json!(keyed(&counts)));
        }
    }

    for (old, new) in [
        ("fraudSpikeTimer", "maliciousSpikeTimer"),
        ("fraudSpikeActive", "maliciousSpikeActive"),
    ] {
        if let Some(value) = root.remove(old) {
            root.insert(new.into(), value);
        }
    }
    // The pre-spike distribution was never written, so a spike in progress
    // cannot be unwound. Resume with the saved distribution as the base.
    if root.get("maliciousSpikeActive").and_then(Value::as_bool) == Some(true) {
        warn!("save: dropping malicious spike that was active in a version 1 save");
        root.insert("maliciousSpikeActive".into(), Value::Bool(false));
    }
}

/// Fold the flat layout older front ends wrote into the current one.
fn normalize_layout(root: &mut Map<String, Value>) {
    if !root.contains_key("interventions") {
        let mut state = Map::new();
        for (flat, nested) in [
            ("maliciousSpikeTimer", "malicious_spike_timer"),
            ("maliciousSpikeActive", "malicious_spike_active"),
        ] {
            if let Some(value) = root.remove(flat) {
                state.insert(nested.into(), value);
            }
        }
        if !state.is_empty() {
            root.insert("interventions".into(), Value::Object(state));
        }
    }

    // `internetConnections` was a bare list of entry ids.
    if let Some(Value::Array(entries)) = root.remove("internetConnections") {
        let mut connections: Vec<Value> = entries
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .map(|to| json!({ "from": INGRESS_ID, "to": to }))
            .collect();
        if let Some(Value::Array(rest)) = root.remove("connections") {
            for conn in rest {
                let duplicate = connections.iter().any(|c| c == &conn);
                if !duplicate {
                    connections.push(conn);
                }
            }
        }
        root.insert("connections".into(), Value::Array(connections));
    }

    if let Some(Value::Array(services)) = root.get_mut("services") {
        for service in services.iter_mut() {
            let point = match service.get("position") {
                Some(Value::Object(pos)) => [number(pos, "x"), number(pos, "y"), number(pos, "z")],
                _ => continue,
            };
            service["position"] = json!(point);
        }
    }
}

fn number(map: &Map<String, Value>, key: &str) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

// ─── Storage ─────────────────────────────────────────────────────────────────

/// Where save blobs live: browser local storage, a file, or memory.
pub trait PersistenceAdapter {
    fn write_save(&mut self, slot: &str, blob: &str) -> Result<(), PersistenceError>;

    fn read_save(&self, slot: &str) -> Result<Option<String>, PersistenceError>;

    fn delete_save(&mut self, slot: &str) -> Result<(), PersistenceError>;
}

/// In-memory slots, for headless runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    slots: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceAdapter for MemoryStorage {
    fn write_save(&mut self, slot: &str, blob: &str) -> Result<(), PersistenceError> {
        self.slots.insert(slot.to_string(), blob.to_string());
        Ok(())
    }

    fn read_save(&self, slot: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.slots.get(slot).cloned())
    }

    fn delete_save(&mut self, slot: &str) -> Result<(), PersistenceError> {
        self.slots.remove(slot);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const V1_SAVE: &str = r#"{
        "money": 512.5,
        "reputation": 80,
        "trafficDistribution": { "WEB": 0.5, "API": 0.4, "FRAUD": 0.1 },
        "score": { "total": 120, "web": 70, "api": 40, "fraudBlocked": 10 },
        "failures": { "WEB": 3, "API": 7, "FRAUD": 2 },
        "fraudSpikeTimer": 42.0,
        "fraudSpikeActive": false,
        "services": [
            { "id": "svc_ab12", "type": "waf", "position": [0, 0, 0] },
            { "id": "svc_cd34", "type": "alb", "position": [4, 0, 0], "tier": 1 }
        ],
        "connections": [ { "from": "svc_ab12", "to": "svc_cd34" } ],
        "internetConnections": [ "svc_ab12" ]
    }"#;

    #[test]
    fn test_v1_distribution_is_remapped_and_renormalized() {
        let save = decode(V1_SAVE).unwrap();
        assert_eq!(save.version, SAVE_VERSION);
        let w = save.mix_weights();
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        // 0.5 / 0.4 / 0.1 plus the seeded 0.05 UPLOAD, over 1.05.
        assert!((w[TrafficType::Static.index()] - 0.5 / 1.05).abs() < 1e-9);
        assert!((w[TrafficType::Read.index()] - 0.2 / 1.05).abs() < 1e-9);
        assert!((w[TrafficType::Write.index()] - 0.12 / 1.05).abs() < 1e-9);
        assert!((w[TrafficType::Search.index()] - 0.08 / 1.05).abs() < 1e-9);
        assert!((w[TrafficType::Upload.index()] - 0.05 / 1.05).abs() < 1e-9);
        assert!((w[TrafficType::Malicious.index()] - 0.1 / 1.05).abs() < 1e-9);
    }

    #[test]
    fn test_v1_score_failures_and_timers() {
        let save = decode(V1_SAVE).unwrap();
        assert_eq!(save.score.storage, 70.0);
        assert_eq!(save.score.database, 40.0);
        assert_eq!(save.score.malicious_blocked, 10.0);
        let f = save.failure_counts();
        assert_eq!(f.get(TrafficType::Static), 3);
        // 7 split 50/30/20: WRITE 2, SEARCH 1, remainder 4 to READ.
        assert_eq!(f.get(TrafficType::Read), 4);
        assert_eq!(f.get(TrafficType::Write), 2);
        assert_eq!(f.get(TrafficType::Search), 1);
        assert_eq!(f.get(TrafficType::Malicious), 2);
        assert_eq!(f.total(), 12);
        assert_eq!(save.interventions.malicious_spike_timer, 42.0);
        assert!(!save.interventions.malicious_spike_active);
        assert!(save.is_running);
        assert_eq!(save.game_over, None);
    }

    #[test]
    fn test_internet_connections_fold_into_connections() {
        let save = decode(V1_SAVE).unwrap();
        assert_eq!(save.connections.len(), 2);
        assert_eq!(save.connections[0].from, INGRESS_ID);
        assert_eq!(save.connections[0].to, "svc_ab12");
        assert_eq!(save.services[1].kind, NodeKind::LoadBalancer);
        assert_eq!(save.services[0].health, 100.0);
    }

    #[test]
    fn test_active_v1_spike_is_dropped() {
        let blob = V1_SAVE.replace(r#""fraudSpikeActive": false"#, r#""fraudSpikeActive": true"#);
        let save = decode(&blob).unwrap();
        assert!(!save.interventions.malicious_spike_active);
    }

    #[test]
    fn test_bad_blobs_are_rejected() {
        assert!(matches!(decode("not json"), Err(PersistenceError::CorruptSave(_))));
        assert!(matches!(decode("[1, 2]"), Err(PersistenceError::CorruptSave(_))));
        assert!(matches!(
            decode(r#"{ "version": "9.9", "money": 1 }"#),
            Err(PersistenceError::UnsupportedVersion(v)) if v == "9.9"
        ));
        // Right version, wrong shape.
        assert!(matches!(
            decode(r#"{ "version": "2.0", "money": "lots", "trafficDistribution": {} }"#),
            Err(PersistenceError::CorruptSave(_))
        ));
    }

    #[test]
    fn test_current_version_round_trips() {
        let save = decode(V1_SAVE).unwrap();
        let again = decode(&encode(&save).unwrap()).unwrap();
        assert_eq!(again.services, save.services);
        assert_eq!(again.connections, save.connections);
        assert_eq!(again.failures, save.failures);
        assert_eq!(again.interventions, save.interventions);
        for (a, b) in again.mix_weights().iter().zip(save.mix_weights().iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_memory_storage() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.read_save("slot").unwrap(), None);
        storage.write_save("slot", "{}").unwrap();
        assert_eq!(storage.read_save("slot").unwrap().as_deref(), Some("{}"));
        storage.delete_save("slot").unwrap();
        assert_eq!(storage.read_save("slot").unwrap(), None);
    }
}
