// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Configuration

//! Tunables for the simulation: the service catalog, per-type traffic
//! profiles, and survival / sandbox balance. Every value has a default and the
//! whole tree can be overridden from JSON.

use crate::types::{Destination, NodeKind, TrafficType};
use serde::{Deserialize, Serialize};

/// Backlog limit used for backpressure when a kind does not set its own.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierSpec {
    pub capacity: u32,
    /// Upgrade price to reach this tier (0 for tier 1).
    pub cost: f64,
    #[serde(default)]
    pub cache_hit_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    pub cost: f64,
    pub processing_time_ms: f64,
    pub capacity: u32,
    /// Upkeep per minute of simulated time.
    pub upkeep: f64,
    #[serde(default)]
    pub max_queue_size: Option<usize>,
    #[serde(default)]
    pub tiers: Vec<TierSpec>,
}

impl ServiceSpec {
    fn new(name: &str, cost: f64, processing_time_ms: f64, capacity: u32, upkeep: f64) -> Self {
        Self {
            name: name.to_string(),
            cost,
            processing_time_ms,
            capacity,
            upkeep,
            max_queue_size: None,
            tiers: Vec::new(),
        }
    }

    fn with_tiers(mut self, tiers: Vec<TierSpec>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Highest reachable tier (1 when the kind has no tier table).
    pub fn max_tier(&self) -> u8 {
        self.tiers.len().max(1) as u8
    }

    /// Capacity at the given tier, falling back to the base capacity.
    pub fn capacity_at(&self, tier: u8) -> u32 {
        self.tier(tier).map(|t| t.capacity).unwrap_or(self.capacity)
    }

    pub fn tier(&self, tier: u8) -> Option<&TierSpec> {
        (tier as usize).checked_sub(1).and_then(|i| self.tiers.get(i))
    }

    pub fn max_queue(&self) -> usize {
        self.max_queue_size.unwrap_or(DEFAULT_MAX_QUEUE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceCatalog {
    pub waf: ServiceSpec,
    pub alb: ServiceSpec,
    pub compute: ServiceSpec,
    pub cache: ServiceSpec,
    pub db: ServiceSpec,
    pub s3: ServiceSpec,
    pub sqs: ServiceSpec,
}

impl ServiceCatalog {
    pub fn spec(&self, kind: NodeKind) -> &ServiceSpec {
        match kind {
            NodeKind::Waf => &self.waf,
            NodeKind::LoadBalancer => &self.alb,
            NodeKind::Compute => &self.compute,
            NodeKind::Cache => &self.cache,
            NodeKind::Database => &self.db,
            NodeKind::ObjectStore => &self.s3,
            NodeKind::Queue => &self.sqs,
        }
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        let tier = |capacity, cost| TierSpec { capacity, cost, cache_hit_rate: None };
        let cache_tier = |capacity, cost, rate| TierSpec {
            capacity,
            cost,
            cache_hit_rate: Some(rate),
        };
        let mut sqs = ServiceSpec::new("Message Queue", 35.0, 100.0, 10, 2.0);
        sqs.max_queue_size = Some(200);
        Self {
            waf: ServiceSpec::new("Firewall", 40.0, 20.0, 100, 4.0),
            alb: ServiceSpec::new("Load Balancer", 50.0, 50.0, 50, 6.0),
            compute: ServiceSpec::new("Compute", 60.0, 600.0, 4, 12.0).with_tiers(vec![
                tier(4, 0.0),
                tier(10, 100.0),
                tier(18, 160.0),
            ]),
            cache: ServiceSpec::new("Memory Cache", 60.0, 50.0, 30, 8.0).with_tiers(vec![
                cache_tier(30, 0.0, 0.35),
                cache_tier(50, 120.0, 0.50),
                cache_tier(80, 180.0, 0.65),
            ]),
            db: ServiceSpec::new("Relational DB", 150.0, 300.0, 8, 24.0).with_tiers(vec![
                tier(8, 0.0),
                tier(20, 200.0),
                tier(35, 350.0),
            ]),
            s3: ServiceSpec::new("File Storage", 25.0, 200.0, 100, 5.0),
            sqs,
        }
    }
}

// ---------------------------------------------------------------------------
// Traffic profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrafficProfile {
    pub reward: f64,
    pub score: f64,
    pub cacheable: bool,
    pub cache_hit_rate: f64,
    pub destination: Destination,
    pub processing_weight: f64,
}

/// Profiles indexed in `TrafficType::ALL` order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficProfiles(pub [TrafficProfile; 6]);

impl TrafficProfiles {
    pub fn get(&self, t: TrafficType) -> &TrafficProfile {
        &self.0[t.index()]
    }
}

impl Default for TrafficProfiles {
    fn default() -> Self {
        let p = |reward, score, cacheable, cache_hit_rate, destination, processing_weight| {
            TrafficProfile { reward, score, cacheable, cache_hit_rate, destination, processing_weight }
        };
        Self([
            p(0.80, 3.0, true, 0.90, Destination::Storage, 0.5),
            p(1.20, 5.0, true, 0.40, Destination::Database, 1.0),
            p(1.80, 8.0, false, 0.0, Destination::Database, 1.5),
            p(2.00, 10.0, false, 0.0, Destination::Storage, 2.0),
            p(1.20, 5.0, true, 0.15, Destination::Database, 2.5),
            p(0.0, 0.0, false, 0.0, Destination::Blocked, 1.0),
        ])
    }
}

// ---------------------------------------------------------------------------
// Survival balance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScorePoints {
    pub fail_reputation: f64,
    pub malicious_passed_reputation: f64,
    pub malicious_blocked_score: f64,
    pub cache_hit_bonus: f64,
}

impl Default for ScorePoints {
    fn default() -> Self {
        Self {
            fail_reputation: -2.0,
            malicious_passed_reputation: -8.0,
            malicious_blocked_score: 10.0,
            cache_hit_bonus: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpkeepScaling {
    pub enabled: bool,
    pub base_multiplier: f64,
    pub max_multiplier: f64,
    /// Seconds of simulated time to ramp from base to max.
    pub scale_time: f64,
}

impl Default for UpkeepScaling {
    fn default() -> Self {
        Self { enabled: true, base_multiplier: 1.0, max_multiplier: 2.0, scale_time: 600.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaliciousSpikeConfig {
    pub enabled: bool,
    pub interval: f64,
    pub duration: f64,
    pub malicious_percent: f64,
    pub warning_time: f64,
}

impl Default for MaliciousSpikeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 90.0,
            duration: 15.0,
            malicious_percent: 0.40,
            warning_time: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DegradationConfig {
    pub enabled: bool,
    /// Health points lost per second at nominal load.
    pub health_decay_rate: f64,
    pub critical_health: f64,
    /// Price per missing health point when repairing.
    pub repair_cost: f64,
    /// Health recovered per second while idle (0 = manual repair only).
    pub auto_repair_rate: f64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            health_decay_rate: 0.5,
            critical_health: 30.0,
            repair_cost: 10.0,
            auto_repair_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShiftPattern {
    pub name: String,
    pub boost: TrafficType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficShiftConfig {
    pub enabled: bool,
    pub interval: f64,
    pub duration: f64,
    pub warning_time: f64,
    pub boost_amount: f64,
    pub boost_cap: f64,
    pub patterns: Vec<ShiftPattern>,
}

impl Default for TrafficShiftConfig {
    fn default() -> Self {
        let pattern = |name: &str, boost| ShiftPattern { name: name.to_string(), boost };
        Self {
            enabled: true,
            interval: 120.0,
            duration: 45.0,
            warning_time: 10.0,
            boost_amount: 0.25,
            boost_cap: 0.6,
            patterns: vec![
                pattern("API Heavy", TrafficType::Read),
                pattern("Storage Surge", TrafficType::Static),
                pattern("Search Storm", TrafficType::Search),
                pattern("Write Flood", TrafficType::Write),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RandomEventKind {
    CostSpike,
    CapacityDrop,
    TrafficBurst,
    ServiceOutage,
}

impl RandomEventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::CostSpike => "Cloud Price Surge",
            Self::CapacityDrop => "Service Degradation",
            Self::TrafficBurst => "Viral Traffic",
            Self::ServiceOutage => "Forced Maintenance",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomEventSpec {
    pub kind: RandomEventKind,
    pub duration: f64,
    /// Effect strength; ignored by outages.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomEventsConfig {
    pub enabled: bool,
    pub check_interval: f64,
    pub probability: f64,
    pub events: Vec<RandomEventSpec>,
}

impl Default for RandomEventsConfig {
    fn default() -> Self {
        let ev = |kind, duration, multiplier| RandomEventSpec { kind, duration, multiplier };
        Self {
            enabled: true,
            check_interval: 60.0,
            probability: 0.3,
            events: vec![
                ev(RandomEventKind::CostSpike, 30.0, 2.0),
                ev(RandomEventKind::CapacityDrop, 20.0, 0.5),
                ev(RandomEventKind::TrafficBurst, 15.0, 3.0),
                ev(RandomEventKind::ServiceOutage, 10.0, 1.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RpsMilestone {
    /// Simulated seconds since session start.
    pub time: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpsAcceleration {
    pub enabled: bool,
    pub milestones: Vec<RpsMilestone>,
}

impl Default for RpsAcceleration {
    fn default() -> Self {
        Self {
            enabled: true,
            milestones: vec![
                RpsMilestone { time: 300.0, multiplier: 1.5 },
                RpsMilestone { time: 600.0, multiplier: 2.0 },
                RpsMilestone { time: 900.0, multiplier: 2.5 },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurvivalConfig {
    pub start_budget: f64,
    pub base_rps: f64,
    pub initial_rps: f64,
    /// `None` = unbounded.
    #[serde(default)]
    pub max_rps: Option<f64>,
    /// Shares in `TrafficType::ALL` order.
    pub traffic_distribution: [f64; 6],
    pub money_floor: f64,
    pub score_points: ScorePoints,
    pub upkeep_scaling: UpkeepScaling,
    pub malicious_spike: MaliciousSpikeConfig,
    pub degradation: DegradationConfig,
    pub traffic_shifts: TrafficShiftConfig,
    pub random_events: RandomEventsConfig,
    pub rps_acceleration: RpsAcceleration,
}

impl Default for SurvivalConfig {
    fn default() -> Self {
        Self {
            start_budget: 340.0,
            base_rps: 0.6,
            initial_rps: 0.5,
            max_rps: None,
            traffic_distribution: [0.30, 0.20, 0.15, 0.05, 0.10, 0.20],
            money_floor: -1000.0,
            score_points: ScorePoints::default(),
            upkeep_scaling: UpkeepScaling::default(),
            malicious_spike: MaliciousSpikeConfig::default(),
            degradation: DegradationConfig::default(),
            traffic_shifts: TrafficShiftConfig::default(),
            random_events: RandomEventsConfig::default(),
            rps_acceleration: RpsAcceleration::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    pub default_budget: f64,
    pub default_rps: f64,
    pub default_burst_count: u32,
    pub upkeep_enabled: bool,
    pub traffic_distribution: [f64; 6],
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_budget: 2000.0,
            default_rps: 1.0,
            default_burst_count: 10,
            upkeep_enabled: false,
            traffic_distribution: [0.30, 0.20, 0.15, 0.05, 0.10, 0.20],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClockConfig {
    /// Largest frame delta accepted before time scaling, in seconds.
    pub max_frame_dt: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { max_frame_dt: 0.1 }
    }
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub services: ServiceCatalog,
    pub traffic: TrafficProfiles,
    pub survival: SurvivalConfig,
    pub sandbox: SandboxConfig,
    pub clock: ClockConfig,
}

impl SimConfig {
    /// Parse and validate a JSON config. Missing top-level sections fall back
    /// to their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in NodeKind::ALL {
            let spec = self.services.spec(kind);
            if spec.capacity == 0 || spec.tiers.iter().any(|t| t.capacity == 0) {
                return Err(ConfigError::Invalid(format!("{kind}: capacity must be positive")));
            }
            if spec.processing_time_ms <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{kind}: processing time must be positive"
                )));
            }
        }
        for (name, dist) in [
            ("survival", &self.survival.traffic_distribution),
            ("sandbox", &self.sandbox.traffic_distribution),
        ] {
            if dist.iter().any(|w| *w < 0.0 || !w.is_finite()) {
                return Err(ConfigError::Invalid(format!("{name} distribution has a bad weight")));
            }
        }
        let milestones = &self.survival.rps_acceleration.milestones;
        if milestones.windows(2).any(|w| w[0].time > w[1].time) {
            return Err(ConfigError::Invalid("rps milestones must be sorted by time".into()));
        }
        let spike = &self.survival.malicious_spike;
        if spike.interval <= 0.0 || !(0.0..=1.0).contains(&spike.malicious_percent) {
            return Err(ConfigError::Invalid("malicious spike interval/percent".into()));
        }
        if self.survival.degradation.critical_health <= 0.0 {
            return Err(ConfigError::Invalid("critical health must be positive".into()));
        }
        let shifts = &self.survival.traffic_shifts;
        if shifts.interval <= 0.0 || shifts.duration <= 0.0 {
            return Err(ConfigError::Invalid("traffic shift interval and duration must be positive".into()));
        }
        let random = &self.survival.random_events;
        if random.check_interval <= 0.0 {
            return Err(ConfigError::Invalid("random event check interval must be positive".into()));
        }
        if let Some(event) = random.events.iter().find(|e| e.duration <= 0.0 || !e.duration.is_finite()) {
            return Err(ConfigError::Invalid(format!("{} duration must be positive", event.kind.label())));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
