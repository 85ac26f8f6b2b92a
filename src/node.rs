// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Service Node State Machine

//! One placed service. Requests wait in a FIFO backlog, are admitted into a
//! bounded in-flight set, and on completion either terminate here or move to
//! the backlog of the next hop.
//!
//! A node is updated while taken out of the arena, so forwarding writes
//! straight into the target's backlog. A target later in creation order can
//! pick the request up in the same tick; an earlier one waits for the next.

use std::collections::VecDeque;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::arena::NodeArena;
use crate::config::{DegradationConfig, ServiceCatalog};
use crate::routing::{self, QueueDispatch};
use crate::types::{NodeId, NodeKind, NodeSnapshot, Outcome, Position, TrafficRequest, TrafficType};

/// Load above which health starts to decay.
const IDLE_LOAD: f64 = 0.05;

/// A request and how long this node has worked on it so far. Items pushed
/// back under backpressure keep their progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    pub request: TrafficRequest,
    pub elapsed_ms: f64,
}

impl WorkItem {
    pub fn new(request: TrafficRequest) -> Self {
        Self { request, elapsed_ms: 0.0 }
    }
}

/// What happened to one completed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Finished(Outcome),
    Forwarded(NodeId),
    /// Backpressure: the item goes back to the head of this node's backlog
    /// with its progress kept.
    Retained,
}

/// Per-update output consumed by the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEffect {
    Finished { node: NodeId, request: TrafficRequest, outcome: Outcome },
    Forwarded { from: NodeId, to: NodeId, request: u64, traffic_type: TrafficType },
}

/// Inputs shared by every node during one tick.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub critical_health: f64,
    /// `Some` when health degradation applies (survival mode).
    pub degradation: Option<&'a DegradationConfig>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Position,
    pub tier: u8,
    /// Tier-adjusted capacity before health and event scaling.
    pub base_capacity: u32,
    pub health: f64,
    pub backlog: VecDeque<WorkItem>,
    pub in_flight: Vec<WorkItem>,
    pub out_edges: Vec<NodeId>,
    pub rr_cursor: usize,
    pub temp_capacity_factor: f64,
    pub disabled: bool,
    pub processing_time_ms: f64,
    pub upkeep_per_minute: f64,
    pub cost: f64,
    pub max_queue: usize,
    /// Added to a request's own hit rate (caches above tier 1).
    pub cache_rate_bonus: f64,
    /// Load at the last update, for display.
    pub last_load: f64,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, position: Position, catalog: &ServiceCatalog) -> Self {
        let spec = catalog.spec(kind);
        let mut node = Self {
            id,
            kind,
            position,
            tier: 1,
            base_capacity: spec.capacity,
            health: 100.0,
            backlog: VecDeque::new(),
            in_flight: Vec::new(),
            out_edges: Vec::new(),
            rr_cursor: 0,
            temp_capacity_factor: 1.0,
            disabled: false,
            processing_time_ms: spec.processing_time_ms,
            upkeep_per_minute: spec.upkeep,
            cost: spec.cost,
            max_queue: spec.max_queue(),
            cache_rate_bonus: 0.0,
            last_load: 0.0,
        };
        node.set_tier(1, catalog);
        node
    }

    /// Apply a tier's capacity and cache hit rate.
    pub fn set_tier(&mut self, tier: u8, catalog: &ServiceCatalog) {
        let spec = catalog.spec(self.kind);
        let tier = tier.clamp(1, spec.max_tier());
        self.tier = tier;
        self.base_capacity = spec.capacity_at(tier);
        let rate_at = |t: u8| spec.tier(t).and_then(|s| s.cache_hit_rate);
        self.cache_rate_bonus = match (rate_at(tier), rate_at(1)) {
            (Some(now), Some(first)) => now - first,
            _ => 0.0,
        };
    }

    pub fn upkeep_per_second(&self) -> f64 {
        self.upkeep_per_minute / 60.0
    }

    /// Whether a queue may hand this node another item.
    pub fn can_accept(&self) -> bool {
        self.backlog.len() < self.max_queue
    }

    pub fn accept(&mut self, request: TrafficRequest) {
        self.backlog.push_back(WorkItem::new(request));
    }

    pub fn remove_edge(&mut self, to: NodeId) -> bool {
        match self.out_edges.iter().position(|e| *e == to) {
            Some(pos) => {
                self.out_edges.remove(pos);
                if self.out_edges.is_empty() {
                    self.rr_cursor = 0;
                } else {
                    self.rr_cursor %= self.out_edges.len();
                }
                true
            }
            None => false,
        }
    }

    /// `(in_flight + backlog) / (base_capacity * 2)`.
    pub fn load(&self) -> f64 {
        let queued = (self.in_flight.len() + self.backlog.len()) as f64;
        queued / (self.base_capacity.max(1) as f64 * 2.0)
    }

    /// Capacity after health and event scaling; 0 when disabled, else >= 1.
    pub fn effective_capacity(&self, critical_health: f64) -> u32 {
        if self.disabled {
            return 0;
        }
        let mut capacity = self.base_capacity as f64;
        if critical_health > 0.0 && self.health < critical_health {
            capacity *= 0.3 + 0.7 * (self.health / critical_health);
            capacity = capacity.floor().max(1.0);
        }
        (capacity * self.temp_capacity_factor).floor().max(1.0) as u32
    }

    pub fn fail_chance(&self, load: f64, critical_health: f64) -> f64 {
        let mut chance = (2.0 * (load - 0.5)).max(0.0);
        if self.health < critical_health {
            chance += (1.0 - self.health / 100.0) * 0.5;
        }
        chance.min(1.0)
    }

    fn duration_ms(&self, request: &TrafficRequest) -> f64 {
        match self.kind {
            NodeKind::Compute => self.processing_time_ms * request.processing_weight,
            _ => self.processing_time_ms,
        }
    }

    fn degrade(&mut self, dt: f64, cfg: &DegradationConfig) {
        let load = self.load();
        if load > IDLE_LOAD {
            self.health -= cfg.health_decay_rate * (0.5 + 1.5 * load) * dt;
        } else if cfg.auto_repair_rate > 0.0 {
            self.health += cfg.auto_repair_rate * dt;
        }
        self.health = self.health.clamp(0.0, 100.0);
    }

    fn admit(&mut self, critical_health: f64) {
        let capacity = self.effective_capacity(critical_health) as usize;
        while self.in_flight.len() < capacity {
            let Some(item) = self.backlog.pop_front() else { break };
            self.in_flight.push(item);
        }
    }

    /// One tick of this node. Upkeep is charged by the caller.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        ctx: &NodeContext<'_>,
        arena: &mut NodeArena,
        rng: &mut R,
        effects: &mut Vec<NodeEffect>,
    ) {
        // A disabled node admits nothing but still finishes what it holds.
        if let Some(cfg) = ctx.degradation {
            self.degrade(dt, cfg);
        }
        self.admit(ctx.critical_health);

        // Admission moves items between the two sets, so the load used for
        // failure sampling is the same before and after it.
        let load = self.load();
        self.last_load = load;

        let step_ms = dt * 1000.0;
        let mut done = Vec::new();
        let mut still_running = Vec::new();
        for mut item in std::mem::take(&mut self.in_flight) {
            item.elapsed_ms += step_ms;
            if item.elapsed_ms >= self.duration_ms(&item.request) {
                done.push(item);
            } else {
                still_running.push(item);
            }
        }
        self.in_flight = still_running;

        let mut retained = Vec::new();
        for mut item in done {
            // Downstream backlogs only grow during this loop, so once one item
            // is refused the rest would be too.
            if !retained.is_empty() {
                retained.push(item);
                continue;
            }
            let request = &mut item.request;
            match self.resolve(request, load, ctx.critical_health, arena, rng) {
                Resolution::Finished(outcome) => {
                    if outcome != Outcome::Completed {
                        debug!("{} {} request {}: {:?}", self.id, self.kind, request.id, outcome);
                    }
                    effects.push(NodeEffect::Finished { node: self.id, request: item.request, outcome });
                }
                Resolution::Forwarded(to) => {
                    effects.push(NodeEffect::Forwarded {
                        from: self.id,
                        to,
                        request: request.id,
                        traffic_type: request.traffic_type,
                    });
                    if let Some(target) = arena.get_mut(to) {
                        target.accept(item.request);
                    }
                }
                Resolution::Retained => retained.push(item),
            }
        }
        for item in retained.into_iter().rev() {
            self.backlog.push_front(item);
        }
    }

    /// Decide what happens to a request that just finished processing here.
    /// `load` is the node's load for this tick.
    pub fn resolve<R: Rng + ?Sized>(
        &mut self,
        request: &mut TrafficRequest,
        load: f64,
        critical_health: f64,
        arena: &NodeArena,
        rng: &mut R,
    ) -> Resolution {
        let failure = Resolution::Finished(Outcome::failure_for(request));

        // A firewall stops malicious traffic no matter how it is doing.
        if self.kind == NodeKind::Waf && request.traffic_type == TrafficType::Malicious {
            return Resolution::Finished(Outcome::MaliciousBlocked);
        }

        if rng.gen::<f64>() < self.fail_chance(load, critical_health) {
            return failure;
        }

        let forward = |target: Option<NodeId>| target.map_or(failure, Resolution::Forwarded);

        match self.kind {
            NodeKind::Database | NodeKind::ObjectStore => {
                if self.kind.served_destination() == Some(request.destination) {
                    Resolution::Finished(Outcome::Completed)
                } else {
                    failure
                }
            }
            NodeKind::Cache => {
                let hit_chance = (request.cache_hit_rate + self.cache_rate_bonus).clamp(0.0, 1.0);
                if request.cacheable && rng.gen::<f64>() < hit_chance {
                    request.cached = true;
                    Resolution::Finished(Outcome::Completed)
                } else {
                    forward(routing::destination_target(&self.out_edges, arena, request.destination))
                }
            }
            NodeKind::Queue => {
                match routing::queue_dispatch(&self.out_edges, &mut self.rr_cursor, arena) {
                    QueueDispatch::Sent(to) => Resolution::Forwarded(to),
                    QueueDispatch::Backpressure => Resolution::Retained,
                    QueueDispatch::NoCandidates => failure,
                }
            }
            NodeKind::Compute => {
                forward(routing::compute_next_hop(&self.out_edges, arena, request.destination))
            }
            NodeKind::Waf | NodeKind::LoadBalancer => {
                forward(routing::round_robin(&self.out_edges, &mut self.rr_cursor))
            }
        }
    }

    pub fn snapshot(&self, critical_health: f64) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            kind: self.kind,
            position: self.position,
            tier: self.tier,
            health: self.health,
            backlog: self.backlog.len(),
            in_flight: self.in_flight.len(),
            effective_capacity: self.effective_capacity(critical_health),
            load: self.load(),
            disabled: self.disabled,
            out_edges: self.out_edges.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const CRITICAL: f64 = 30.0;

    fn config() -> SimConfig {
        SimConfig::default()
    }

    fn ctx() -> NodeContext<'static> {
        NodeContext { critical_health: CRITICAL, degradation: None }
    }

    fn request(t: TrafficType) -> TrafficRequest {
        let cfg = config();
        let p = cfg.traffic.get(t);
        TrafficRequest {
            id: 1,
            traffic_type: t,
            destination: p.destination,
            cacheable: p.cacheable,
            cache_hit_rate: p.cache_hit_rate,
            reward_weight: p.reward,
            score_weight: p.score,
            processing_weight: p.processing_weight,
            cached: false,
        }
    }

    fn standalone(kind: NodeKind) -> Node {
        Node::new(NodeId(0), kind, Position::default(), &config().services)
    }

    #[test]
    fn test_effective_capacity_health_scaling() {
        let mut node = standalone(NodeKind::Compute);
        assert_eq!(node.effective_capacity(CRITICAL), 4);
        node.health = 15.0;
        // 4 * (0.3 + 0.7 * 0.5) = 2.6
        assert_eq!(node.effective_capacity(CRITICAL), 2);
        node.health = 0.0;
        assert_eq!(node.effective_capacity(CRITICAL), 1);
        node.disabled = true;
        assert_eq!(node.effective_capacity(CRITICAL), 0);
    }

    #[test]
    fn test_effective_capacity_temp_factor() {
        let mut node = standalone(NodeKind::Cache);
        node.temp_capacity_factor = 0.5;
        assert_eq!(node.effective_capacity(CRITICAL), 15);
    }

    #[test]
    fn test_full_node_fails_every_completion() {
        let cfg = config();
        let mut arena = NodeArena::new();
        let db = arena.insert_with(|id| Node::new(id, NodeKind::Database, Position::default(), &cfg.services));
        let mut node = arena.take(db).unwrap();
        node.base_capacity = 4;
        for _ in 0..8 {
            node.accept(request(TrafficType::Read));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut effects = Vec::new();
        // First update admits 4 and starts their timers.
        node.update(0.1, &ctx(), &mut arena, &mut rng, &mut effects);
        assert_eq!(node.in_flight.len(), 4);
        assert_eq!(node.backlog.len(), 4);
        assert_eq!(node.load(), 1.0);
        assert_eq!(node.fail_chance(node.load(), CRITICAL), 1.0);
        node.update(0.25, &ctx(), &mut arena, &mut rng, &mut effects);
        let outcomes: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                NodeEffect::Finished { outcome, .. } => Some(*outcome),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes, vec![Outcome::Failed; 4]);
    }

    #[test]
    fn test_waf_always_blocks_malicious() {
        let cfg = config();
        let arena = NodeArena::new();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut waf = standalone(NodeKind::Waf);
        waf.health = 0.0;
        for _ in 0..200 {
            let mut req = request(TrafficType::Malicious);
            assert_eq!(
                waf.resolve(&mut req, 5.0, cfg.survival.degradation.critical_health, &arena, &mut rng),
                Resolution::Finished(Outcome::MaliciousBlocked)
            );
        }
    }

    #[test]
    fn test_terminal_checks_destination() {
        let arena = NodeArena::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut s3 = standalone(NodeKind::ObjectStore);
        let mut ok = request(TrafficType::Upload);
        let mut wrong = request(TrafficType::Write);
        assert_eq!(s3.resolve(&mut ok, 0.0, CRITICAL, &arena, &mut rng), Resolution::Finished(Outcome::Completed));
        assert_eq!(s3.resolve(&mut wrong, 0.0, CRITICAL, &arena, &mut rng), Resolution::Finished(Outcome::Failed));
        let mut bad = request(TrafficType::Malicious);
        assert_eq!(
            s3.resolve(&mut bad, 0.0, CRITICAL, &arena, &mut rng),
            Resolution::Finished(Outcome::MaliciousPassed)
        );
    }

    #[test]
    fn test_cache_hits_near_rate() {
        let cfg = config();
        let mut arena = NodeArena::new();
        let db = arena.insert_with(|id| Node::new(id, NodeKind::Database, Position::default(), &cfg.services));
        let mut cache = Node::new(NodeId(99), NodeKind::Cache, Position::default(), &cfg.services);
        cache.out_edges.push(db);
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let mut hits = 0;
        for _ in 0..1000 {
            let mut req = request(TrafficType::Read);
            req.cache_hit_rate = 0.9;
            match cache.resolve(&mut req, 0.0, CRITICAL, &arena, &mut rng) {
                Resolution::Finished(Outcome::Completed) => {
                    assert!(req.cached);
                    hits += 1;
                }
                Resolution::Forwarded(to) => assert_eq!(to, db),
                other => panic!("unexpected {other:?}"),
            }
        }
        // 3 sigma around 900 is roughly +/- 28.
        assert!((860..=940).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn test_cache_tier_raises_hit_rate() {
        let cfg = config();
        let mut cache = standalone(NodeKind::Cache);
        cache.set_tier(3, &cfg.services);
        assert_eq!(cache.base_capacity, 80);
        assert!((cache.cache_rate_bonus - 0.30).abs() < 1e-9);
    }

    #[test]
    fn test_compute_duration_scales_with_weight() {
        let compute = standalone(NodeKind::Compute);
        let lb = standalone(NodeKind::LoadBalancer);
        let search = request(TrafficType::Search);
        assert_eq!(compute.duration_ms(&search), 1500.0);
        assert_eq!(lb.duration_ms(&search), 50.0);
    }

    #[test]
    fn test_queue_retains_under_backpressure() {
        let cfg = config();
        let mut arena = NodeArena::new();
        let queue = arena.insert_with(|id| Node::new(id, NodeKind::Queue, Position::default(), &cfg.services));
        let lb = arena.insert_with(|id| Node::new(id, NodeKind::LoadBalancer, Position::default(), &cfg.services));
        arena.get_mut(queue).unwrap().out_edges.push(lb);
        {
            let target = arena.get_mut(lb).unwrap();
            target.disabled = true;
            for _ in 0..target.max_queue {
                target.accept(request(TrafficType::Read));
            }
        }
        let mut node = arena.take(queue).unwrap();
        for id in 0..3 {
            let mut r = request(TrafficType::Read);
            r.id = id;
            node.accept(r);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut effects = Vec::new();
        node.update(0.2, &ctx(), &mut arena, &mut rng, &mut effects);
        let order: Vec<_> = node.backlog.iter().map(|item| item.request.id).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(node.backlog.iter().all(|item| item.elapsed_ms >= 200.0));
        assert!(node.in_flight.is_empty());
        assert!(effects.is_empty());

        // Room downstream: the retained items go out on the next short tick
        // without being processed again.
        arena.get_mut(lb).unwrap().backlog.clear();
        node.update(0.01, &ctx(), &mut arena, &mut rng, &mut effects);
        let sent: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                NodeEffect::Forwarded { to, request, .. } if *to == lb => Some(*request),
                _ => None,
            })
            .collect();
        assert_eq!(sent, vec![0, 1, 2]);
        assert!(node.backlog.is_empty());
    }

    #[test]
    fn test_load_balancer_without_edges_fails() {
        let arena = NodeArena::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut lb = standalone(NodeKind::LoadBalancer);
        let mut req = request(TrafficType::Static);
        assert_eq!(lb.resolve(&mut req, 0.0, CRITICAL, &arena, &mut rng), Resolution::Finished(Outcome::Failed));
    }

    #[test]
    fn test_degradation_and_clamp() {
        let cfg = config();
        let deg = cfg.survival.degradation.clone();
        let mut arena = NodeArena::new();
        let mut node = standalone(NodeKind::Compute);
        for _ in 0..8 {
            node.accept(request(TrafficType::Static));
        }
        let context = NodeContext { critical_health: CRITICAL, degradation: Some(&deg) };
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut effects = Vec::new();
        node.update(1.0, &context, &mut arena, &mut rng, &mut effects);
        // load 1.0 -> 0.5 * 2.0 * 1s
        assert!((node.health - 99.0).abs() < 1e-9);
        node.health = 0.1;
        node.update(1.0, &context, &mut arena, &mut rng, &mut effects);
        assert_eq!(node.health, 0.0);
    }

    #[test]
    fn test_disabled_node_finishes_in_flight_work() {
        let mut arena = NodeArena::new();
        let mut s3 = standalone(NodeKind::ObjectStore);
        s3.accept(request(TrafficType::Upload));
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut effects = Vec::new();
        s3.update(0.1, &ctx(), &mut arena, &mut rng, &mut effects);
        assert_eq!(s3.in_flight.len(), 1);

        s3.disabled = true;
        s3.accept(request(TrafficType::Upload));
        s3.update(0.2, &ctx(), &mut arena, &mut rng, &mut effects);
        assert!(s3.in_flight.is_empty());
        // Nothing new is admitted while disabled.
        assert_eq!(s3.backlog.len(), 1);
        assert!(matches!(
            effects.as_slice(),
            [NodeEffect::Finished { outcome: Outcome::Completed, .. }]
        ));
    }

    proptest! {
        #[test]
        fn prop_capacity_non_increasing_as_health_drops(
            capacity in 1u32..100,
            high in 0.0f64..=100.0,
            drop in 0.0f64..=100.0,
            factor in 0.05f64..=1.0,
        ) {
            let mut node = standalone(NodeKind::Compute);
            node.base_capacity = capacity;
            node.temp_capacity_factor = factor;
            node.health = high;
            let before = node.effective_capacity(CRITICAL);
            node.health = (high - drop).max(0.0);
            let after = node.effective_capacity(CRITICAL);
            prop_assert!(after <= before);
            prop_assert!(after >= 1);
        }
    }
}
