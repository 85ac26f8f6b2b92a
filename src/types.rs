// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Traffic Type ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrafficType {
    Static = 0,
    Read = 1,
    Write = 2,
    Upload = 3,
    Search = 4,
    Malicious = 5,
}

impl TrafficType {
    /// Fixed enumeration order used for cumulative sampling and indexing.
    pub const ALL: [TrafficType; 6] = [
        TrafficType::Static,
        TrafficType::Read,
        TrafficType::Write,
        TrafficType::Upload,
        TrafficType::Search,
        TrafficType::Malicious,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Static => "STATIC",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Upload => "UPLOAD",
            Self::Search => "SEARCH",
            Self::Malicious => "MALICIOUS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for TrafficType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Destination ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    #[serde(alias = "s3")]
    Storage,
    #[serde(alias = "db")]
    Database,
    Blocked,
}

impl Destination {
    /// The terminal node kind that serves this destination, if any.
    pub fn terminal_kind(self) -> Option<NodeKind> {
        match self {
            Self::Storage => Some(NodeKind::ObjectStore),
            Self::Database => Some(NodeKind::Database),
            Self::Blocked => None,
        }
    }
}

// ─── Node Kind ───────────────────────────────────────────────────────────────

/// Per-service kind. Serialized with the short names used by the front end
/// and by saved games.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    #[serde(rename = "waf")]
    Waf,
    #[serde(rename = "alb")]
    LoadBalancer,
    #[serde(rename = "compute", alias = "lambda")]
    Compute,
    #[serde(rename = "cache")]
    Cache,
    #[serde(rename = "db")]
    Database,
    #[serde(rename = "s3")]
    ObjectStore,
    #[serde(rename = "sqs")]
    Queue,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Waf,
        NodeKind::LoadBalancer,
        NodeKind::Compute,
        NodeKind::Cache,
        NodeKind::Database,
        NodeKind::ObjectStore,
        NodeKind::Queue,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            Self::Waf => "waf",
            Self::LoadBalancer => "alb",
            Self::Compute => "compute",
            Self::Cache => "cache",
            Self::Database => "db",
            Self::ObjectStore => "s3",
            Self::Queue => "sqs",
        }
    }

    pub fn from_short_name(name: &str) -> Option<Self> {
        match name {
            "lambda" => Some(Self::Compute),
            other => Self::ALL.iter().copied().find(|k| k.short_name() == other),
        }
    }

    /// The destination this kind terminates, for DATABASE / OBJECT_STORE.
    pub fn served_destination(self) -> Option<Destination> {
        match self {
            Self::Database => Some(Destination::Database),
            Self::ObjectStore => Some(Destination::Storage),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Opaque handle into the node arena. Never reused within a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svc_{}", self.0)
    }
}

pub type RequestId = u64;

/// Either side of a topology edge. The ingress ("internet") is not a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Ingress,
    Node(NodeId),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => f.write_str("internet"),
            Self::Node(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

// ─── Game Mode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Survival,
    Sandbox,
}

// ─── TrafficRequest ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficRequest {
    pub id: RequestId,
    pub traffic_type: TrafficType,
    pub destination: Destination,
    pub cacheable: bool,
    pub cache_hit_rate: f64,
    pub reward_weight: f64,
    pub score_weight: f64,
    /// Multiplier on a COMPUTE node's base processing duration.
    pub processing_weight: f64,
    /// Set on a cache hit; grants the cache bonus at completion.
    #[serde(default)]
    pub cached: bool,
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Terminal result of a request. Scored by the ledger, never raised as an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Completed,
    Failed,
    MaliciousBlocked,
    MaliciousPassed,
}

impl Outcome {
    /// Failure outcome for a request: malicious traffic that fails anywhere
    /// other than a firewall has slipped through.
    pub fn failure_for(request: &TrafficRequest) -> Self {
        if request.traffic_type == TrafficType::Malicious {
            Self::MaliciousPassed
        } else {
            Self::Failed
        }
    }
}

// ─── Score / Failures ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub total: f64,
    pub storage: f64,
    pub database: f64,
    pub malicious_blocked: f64,
}

/// Failure counters per traffic type, indexed in `TrafficType::ALL` order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureCounts(pub [u32; 6]);

impl FailureCounts {
    pub fn get(&self, t: TrafficType) -> u32 {
        self.0[t.index()]
    }

    pub fn increment(&mut self, t: TrafficType) {
        self.0[t.index()] += 1;
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Position,
    pub tier: u8,
    pub health: f64,
    pub backlog: usize,
    pub in_flight: usize,
    pub effective_capacity: u32,
    pub load: f64,
    pub disabled: bool,
    pub out_edges: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActiveInterventions {
    pub malicious_spike: bool,
    pub traffic_shift: Option<String>,
    pub random_event: Option<String>,
    pub milestone_index: usize,
    pub rps_multiplier: f64,
}

/// Read-only view handed to the UI every tick.
#[derive(Debug, Clone, Serialize)]
pub struct UiSnapshot {
    pub mode: GameMode,
    pub money: f64,
    pub reputation: f64,
    pub score: Score,
    pub failures: FailureCounts,
    pub requests_processed: u64,
    pub current_rps: f64,
    pub target_rps: f64,
    pub elapsed_time: f64,
    pub time_scale: f64,
    pub is_running: bool,
    pub upkeep_per_second: f64,
    pub upkeep_multiplier: f64,
    pub traffic_mix: Vec<(TrafficType, f64)>,
    pub interventions: ActiveInterventions,
    pub nodes: Vec<NodeSnapshot>,
    pub ingress: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickResult {
    pub snapshot: UiSnapshot,
    pub events: Vec<crate::events::SimEvent>,
}
