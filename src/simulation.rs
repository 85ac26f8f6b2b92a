// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Simulation Aggregate

//! The whole game session lives in one `Simulation`. `tick_core` is the only
//! place time moves forward; every player command either applies completely
//! or returns an error and leaves state alone.

use std::collections::HashMap;

use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wasm_bindgen::prelude::*;

use crate::adapter::{from_decimal, half_refund, repair_price, to_decimal};
use crate::arena::NodeArena;
use crate::clock::SimulationClock;
use crate::config::{RandomEventKind, SimConfig};
use crate::events::SimEvent;
use crate::intervention::{InterventionController, InterventionTargets};
use crate::ledger::{self, EconomyLedger, InsufficientFunds, MAX_REPUTATION};
use crate::mix::TrafficMix;
use crate::node::{Node, NodeContext, NodeEffect};
use crate::persistence::{
    self, keyed, PersistenceAdapter, PersistenceError, SaveFile, SavedConnection, SavedService,
    INGRESS_ID, SAVE_VERSION,
};
use crate::topology::{Topology, TopologyError};
use crate::traffic::{self, TrafficGenerator};
use crate::types::{
    Endpoint, GameMode, NodeId, NodeKind, Outcome, Position, TickResult, TrafficRequest,
    TrafficType, UiSnapshot,
};

/// Minimum distance between two placed services.
pub const MIN_NODE_SPACING: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("service is already at its highest tier")]
    MaxTier,
    #[error("service is already at full health")]
    AlreadyHealthy,
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("another service already occupies that position")]
    PositionOccupied,
}

impl From<InsufficientFunds> for CommandError {
    fn from(err: InsufficientFunds) -> Self {
        CommandError::InsufficientFunds { needed: err.needed, available: err.available }
    }
}

#[wasm_bindgen]
pub struct Simulation {
    config: SimConfig,
    mode: GameMode,
    seed: u64,
    arena: NodeArena,
    topology: Topology,
    generator: TrafficGenerator,
    interventions: InterventionController,
    ledger: EconomyLedger,
    clock: SimulationClock,
    rng: ChaCha8Rng,
    upkeep_enabled: bool,
    sandbox_budget: f64,
    is_running: bool,
    /// Events raised by commands between ticks, flushed by the next tick.
    pending: Vec<SimEvent>,
}

impl Simulation {
    pub fn with_config(config: SimConfig, mode: GameMode, seed: u64) -> Self {
        let survival = mode == GameMode::Survival;
        let (budget, mix, rps, upkeep_enabled) = match mode {
            GameMode::Survival => (
                config.survival.start_budget,
                TrafficMix::new(config.survival.traffic_distribution),
                config.survival.initial_rps,
                true,
            ),
            GameMode::Sandbox => (
                config.sandbox.default_budget,
                TrafficMix::new(config.sandbox.traffic_distribution),
                config.sandbox.default_rps,
                config.sandbox.upkeep_enabled,
            ),
        };
        let mut generator = TrafficGenerator::new(mix, rps, config.survival.base_rps, survival);
        generator.burst_count = config.sandbox.default_burst_count;
        if survival {
            generator.max_rps = config.survival.max_rps;
        }

        Self {
            mode,
            seed,
            arena: NodeArena::new(),
            topology: Topology::new(),
            generator,
            interventions: InterventionController::new(),
            ledger: EconomyLedger::new(budget),
            clock: SimulationClock::new(config.clock.max_frame_dt),
            rng: ChaCha8Rng::seed_from_u64(seed),
            upkeep_enabled,
            sandbox_budget: config.sandbox.default_budget,
            is_running: true,
            pending: Vec::new(),
            config,
        }
    }

    // ─── Tick ────────────────────────────────────────────────────────────────

    /// Advance one frame of `raw_dt` wall-clock seconds.
    pub fn tick_core(&mut self, raw_dt: f64) -> TickResult {
        let mut events = std::mem::take(&mut self.pending);
        if !self.is_running {
            return TickResult { snapshot: self.snapshot(), events };
        }
        let dt = self.clock.advance(raw_dt);
        if dt <= 0.0 {
            return TickResult { snapshot: self.snapshot(), events };
        }
        let survival = self.mode == GameMode::Survival;
        let elapsed = self.clock.elapsed;

        // 1. Spawn
        if self.generator.advance(dt, elapsed, self.interventions.rps_multiplier()) {
            let traffic_type = self.generator.sample_type(&mut self.rng);
            self.spawn_request(traffic_type, &mut events);
        }

        // 2. Nodes, in creation order
        let upkeep_multiplier = self.upkeep_multiplier();
        let degradation = &self.config.survival.degradation;
        let ctx = NodeContext {
            critical_health: degradation.critical_health,
            degradation: (survival && degradation.enabled).then_some(degradation),
        };
        let mut effects = Vec::new();
        for id in self.arena.ids() {
            let Some(mut node) = self.arena.take(id) else { continue };
            if self.upkeep_enabled {
                self.ledger.charge_upkeep(node.upkeep_per_second(), dt, upkeep_multiplier);
            }
            node.update(dt, &ctx, &mut self.arena, &mut self.rng, &mut effects);
            self.arena.restore(node);
        }

        // 3. Ledger
        for effect in effects {
            match effect {
                NodeEffect::Finished { node, request, outcome } => {
                    self.finish(Some(node), request, outcome, &mut events)
                }
                NodeEffect::Forwarded { from, to, request, traffic_type } => {
                    events.push(SimEvent::RequestForwarded { request, traffic_type, from, to })
                }
            }
        }

        // 4. Interventions. A running random event counts down in every mode.
        self.interventions.expire_event(dt, &mut self.generator, &mut self.arena, &mut events);
        if survival {
            self.interventions.advance(
                dt,
                elapsed,
                &self.config.survival,
                InterventionTargets { generator: &mut self.generator, arena: &mut self.arena },
                &mut self.rng,
                &mut events,
            );
        }

        // 5. Termination
        if survival {
            if let Some(reason) = self.ledger.check_termination(self.config.survival.money_floor) {
                self.is_running = false;
                events.push(SimEvent::GameOver { reason });
            }
        }

        TickResult { snapshot: self.snapshot(), events }
    }

    /// Run `frames` ticks of `dt` seconds, discarding results.
    pub fn run_frames(&mut self, frames: u32, dt: f64) {
        for _ in 0..frames {
            self.tick_core(dt);
        }
    }

    fn upkeep_multiplier(&self) -> f64 {
        match self.mode {
            GameMode::Survival => ledger::upkeep_multiplier(
                self.clock.elapsed,
                &self.config.survival.upkeep_scaling,
                self.interventions.cost_multiplier(),
            ),
            GameMode::Sandbox => 1.0,
        }
    }

    /// Entry node for a new request: a connected firewall if there is one,
    /// otherwise any connected entry at random.
    fn pick_entry(&mut self) -> Option<NodeId> {
        let entries: Vec<NodeId> =
            self.topology.ingress().iter().copied().filter(|id| self.arena.contains(*id)).collect();
        if let Some(waf) = entries
            .iter()
            .copied()
            .find(|id| self.arena.get(*id).is_some_and(|n| n.kind == NodeKind::Waf))
        {
            return Some(waf);
        }
        if entries.is_empty() {
            return None;
        }
        Some(entries[self.rng.gen_range(0..entries.len())])
    }

    fn spawn_request(&mut self, traffic_type: TrafficType, events: &mut Vec<SimEvent>) {
        let request = self.generator.make_request(traffic_type, &self.config.traffic);
        let entry = self.pick_entry();
        events.push(SimEvent::RequestSpawned { request: request.id, traffic_type, entry });
        match entry.and_then(|id| self.arena.get_mut(id)) {
            Some(node) => node.accept(request),
            None => {
                let outcome = Outcome::failure_for(&request);
                self.finish(None, request, outcome, events);
            }
        }
    }

    fn finish(
        &mut self,
        node: Option<NodeId>,
        request: TrafficRequest,
        outcome: Outcome,
        events: &mut Vec<SimEvent>,
    ) {
        self.ledger.record(&request, outcome, &self.config.survival.score_points);
        events.push(SimEvent::RequestFinished {
            request: request.id,
            traffic_type: request.traffic_type,
            node,
            outcome,
            cached: request.cached,
        });
    }

    // ─── Snapshot ────────────────────────────────────────────────────────────

    pub fn target_rps(&self) -> f64 {
        match self.mode {
            GameMode::Survival => {
                let target = traffic::target_rps(
                    self.config.survival.base_rps,
                    self.clock.elapsed,
                    self.interventions.rps_multiplier(),
                );
                self.config.survival.max_rps.map_or(target, |max| target.min(max))
            }
            GameMode::Sandbox => self.generator.current_rps,
        }
    }

    /// Current upkeep drain in money per second.
    pub fn upkeep_per_second(&self) -> f64 {
        if !self.upkeep_enabled {
            return 0.0;
        }
        let base: f64 = self.arena.iter().map(Node::upkeep_per_second).sum();
        base * self.upkeep_multiplier()
    }

    pub fn snapshot(&self) -> UiSnapshot {
        let critical = self.config.survival.degradation.critical_health;
        UiSnapshot {
            mode: self.mode,
            money: self.ledger.money(),
            reputation: self.ledger.reputation,
            score: self.ledger.score,
            failures: self.ledger.failures,
            requests_processed: self.ledger.requests_processed,
            current_rps: self.generator.current_rps,
            target_rps: self.target_rps(),
            elapsed_time: self.clock.elapsed,
            time_scale: self.clock.time_scale(),
            is_running: self.is_running,
            upkeep_per_second: self.upkeep_per_second(),
            upkeep_multiplier: self.upkeep_multiplier(),
            traffic_mix: self.generator.mix.entries(),
            interventions: self.interventions.summary(),
            nodes: self.arena.iter().map(|n| n.snapshot(critical)).collect(),
            ingress: self.topology.ingress().to_vec(),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.arena.iter()
    }

    pub fn ledger(&self) -> &EconomyLedger {
        &self.ledger
    }

    /// Direct ledger access for scripted scenarios.
    pub fn ledger_mut(&mut self) -> &mut EconomyLedger {
        &mut self.ledger
    }

    pub fn generator(&self) -> &TrafficGenerator {
        &self.generator
    }

    pub fn interventions(&self) -> &InterventionController {
        &self.interventions
    }

    pub fn edges(&self) -> Vec<crate::topology::Edge> {
        self.topology.edges(&self.arena)
    }

    /// Events raised by commands since the last tick.
    pub fn pending_events(&self) -> &[SimEvent] {
        &self.pending
    }

    // ─── Commands ────────────────────────────────────────────────────────────

    pub fn place_node(&mut self, kind: NodeKind, position: Position) -> Result<NodeId, CommandError> {
        if self.is_occupied(&position, None) {
            return Err(CommandError::PositionOccupied);
        }
        let cost = self.config.services.spec(kind).cost;
        self.ledger.try_spend(to_decimal(cost))?;

        let services = &self.config.services;
        let id = self.arena.insert_with(|id| Node::new(id, kind, position, services));
        if let Some(node) = self.arena.get_mut(id) {
            node.temp_capacity_factor = self.interventions.capacity_factor();
        }
        info!("placed {kind} as {id} for {cost}");
        self.pending.push(SimEvent::NodePlaced { id, kind, position });
        Ok(id)
    }

    fn is_occupied(&self, position: &Position, except: Option<NodeId>) -> bool {
        self.arena
            .iter()
            .filter(|n| Some(n.id) != except)
            .any(|n| n.position.distance_to(position) < MIN_NODE_SPACING)
    }

    pub fn connect(&mut self, from: Endpoint, to: Endpoint) -> Result<NodeId, CommandError> {
        match self.topology.connect(&mut self.arena, from, to) {
            Ok(to_id) => {
                self.pending.push(SimEvent::Connected { from, to: to_id });
                Ok(to_id)
            }
            Err(err) => {
                self.pending.push(SimEvent::ConnectionRejected { from, to, reason: err.to_string() });
                Err(err.into())
            }
        }
    }

    /// Remove a service and refund half its placement cost. Anything queued
    /// or processing on it is discarded.
    pub fn delete_node(&mut self, id: NodeId) -> Result<f64, CommandError> {
        if !self.arena.contains(id) {
            return Err(CommandError::UnknownNode(id));
        }
        self.topology.detach(&mut self.arena, id);
        let Some(node) = self.arena.remove(id) else {
            return Err(CommandError::UnknownNode(id));
        };
        let refund = half_refund(node.cost);
        self.ledger.credit(refund);
        let dropped = node.backlog.len() + node.in_flight.len();
        if dropped > 0 {
            warn!("{id} removed with {dropped} requests in progress");
        }
        let refund = from_decimal(refund);
        self.pending.push(SimEvent::NodeRemoved { id, refund });
        Ok(refund)
    }

    pub fn delete_connection(&mut self, from: Endpoint, to: NodeId) -> Result<(), CommandError> {
        self.topology.disconnect(&mut self.arena, from, to)?;
        self.pending.push(SimEvent::Disconnected { from, to });
        Ok(())
    }

    pub fn upgrade_node(&mut self, id: NodeId) -> Result<u8, CommandError> {
        let node = self.arena.get(id).ok_or(CommandError::UnknownNode(id))?;
        let spec = self.config.services.spec(node.kind);
        if node.tier >= spec.max_tier() {
            return Err(CommandError::MaxTier);
        }
        let next = node.tier + 1;
        let cost = spec.tier(next).map_or(0.0, |t| t.cost);
        self.ledger.try_spend(to_decimal(cost))?;
        if let Some(node) = self.arena.get_mut(id) {
            node.set_tier(next, &self.config.services);
        }
        info!("{id} upgraded to tier {next} for {cost}");
        self.pending.push(SimEvent::NodeUpgraded { id, tier: next });
        Ok(next)
    }

    pub fn repair_node(&mut self, id: NodeId) -> Result<f64, CommandError> {
        let node = self.arena.get(id).ok_or(CommandError::UnknownNode(id))?;
        if node.health >= 100.0 {
            return Err(CommandError::AlreadyHealthy);
        }
        let price = repair_price(node.health, self.config.survival.degradation.repair_cost);
        self.ledger.try_spend(price)?;
        if let Some(node) = self.arena.get_mut(id) {
            node.health = 100.0;
        }
        let cost = from_decimal(price);
        self.pending.push(SimEvent::NodeRepaired { id, cost });
        Ok(cost)
    }

    pub fn move_node(&mut self, id: NodeId, position: Position) -> Result<(), CommandError> {
        if !self.arena.contains(id) {
            return Err(CommandError::UnknownNode(id));
        }
        if self.is_occupied(&position, Some(id)) {
            return Err(CommandError::PositionOccupied);
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.position = position;
        }
        self.pending.push(SimEvent::NodeMoved { id, position });
        Ok(())
    }

    /// Set one type's share of the player distribution; the others rescale.
    pub fn set_traffic_mix(&mut self, traffic_type: TrafficType, fraction: f64) {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        self.generator.mix.set_share(traffic_type, fraction);
    }

    pub fn set_traffic_distribution(&mut self, weights: [f64; 6]) {
        self.generator.mix.set_base(weights.map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 }));
    }

    pub fn set_target_rps(&mut self, rps: f64) {
        self.generator.set_rps(rps);
    }

    /// Spawn `count` requests of one type right now. Ignored once the game
    /// is over.
    pub fn spawn_burst(&mut self, traffic_type: TrafficType, count: u32) {
        if !self.is_running {
            return;
        }
        let mut events = std::mem::take(&mut self.pending);
        for _ in 0..count {
            self.spawn_request(traffic_type, &mut events);
        }
        self.pending = events;
    }

    pub fn burst_count(&self) -> u32 {
        self.generator.burst_count
    }

    pub fn set_burst_count(&mut self, count: u32) {
        self.generator.burst_count = count;
    }

    pub fn set_time_scale(&mut self, scale: f64) {
        self.clock.set_time_scale(scale);
    }

    pub fn time_scale(&self) -> f64 {
        self.clock.time_scale()
    }

    pub fn upkeep_enabled(&self) -> bool {
        self.upkeep_enabled
    }

    pub fn set_upkeep_enabled(&mut self, enabled: bool) {
        self.upkeep_enabled = enabled;
    }

    /// Sandbox only: reset money to a new budget.
    pub fn set_sandbox_budget(&mut self, amount: f64) {
        if !amount.is_finite() {
            return;
        }
        self.sandbox_budget = amount;
        if self.mode == GameMode::Sandbox {
            self.ledger.set_money(amount);
        }
    }

    /// Start a configured random event now. Returns false when another event
    /// is running or the kind is not configured.
    pub fn trigger_event(&mut self, kind: RandomEventKind) -> bool {
        let Some(spec) = self.config.survival.random_events.events.iter().find(|e| e.kind == kind).cloned()
        else {
            return false;
        };
        let mut events = std::mem::take(&mut self.pending);
        let started = self.interventions.start_event(
            &spec,
            &mut self.generator,
            &mut self.arena,
            &mut self.rng,
            &mut events,
        );
        self.pending = events;
        started
    }

    /// Start a fresh session in `mode`, keeping config and seed.
    pub fn reset(&mut self, mode: GameMode) {
        info!("reset to {mode:?}");
        let mut fresh = Self::with_config(self.config.clone(), mode, self.seed);
        if mode == GameMode::Sandbox {
            fresh.sandbox_budget = self.sandbox_budget;
            fresh.ledger.set_money(self.sandbox_budget);
        }
        *self = fresh;
    }

    // ─── Persistence ─────────────────────────────────────────────────────────

    pub fn to_save(&self) -> SaveFile {
        SaveFile {
            version: SAVE_VERSION.to_string(),
            game_mode: self.mode,
            money: self.ledger.money(),
            reputation: self.ledger.reputation,
            requests_processed: self.ledger.requests_processed,
            score: self.ledger.score,
            failures: keyed(&self.ledger.failures.0),
            traffic_distribution: keyed(self.generator.mix.base()),
            mix_overlays: self.generator.mix.overlays().to_vec(),
            current_rps: self.generator.current_rps,
            spawn_timer: self.generator.spawn_timer,
            elapsed_game_time: self.clock.elapsed,
            time_scale: self.clock.time_scale(),
            is_running: self.is_running,
            upkeep_enabled: self.upkeep_enabled,
            sandbox_budget: Some(self.sandbox_budget),
            burst_count: self.generator.burst_count,
            next_request_id: self.generator.next_request_id(),
            game_over: self.ledger.game_over_reason(),
            interventions: self.interventions.state.clone(),
            services: self
                .arena
                .iter()
                .map(|n| SavedService {
                    id: n.id.to_string(),
                    kind: n.kind,
                    position: [n.position.x, n.position.y, n.position.z],
                    tier: n.tier,
                    health: n.health,
                })
                .collect(),
            connections: self
                .edges()
                .into_iter()
                .map(|e| SavedConnection { from: e.from.to_string(), to: e.to.to_string() })
                .collect(),
        }
    }

    pub fn save_json(&self) -> Result<String, PersistenceError> {
        let blob = persistence::encode(&self.to_save())?;
        info!("saved game: {} services, {:.0}s elapsed", self.arena.len(), self.clock.elapsed);
        Ok(blob)
    }

    /// Replace this session with a saved one. On error nothing changes.
    pub fn load_json(&mut self, blob: &str) -> Result<(), PersistenceError> {
        let save = persistence::decode(blob)?;
        let restored = Self::from_save(self.config.clone(), self.seed, save);
        *self = restored;
        info!("loaded game: {} services, {:.0}s elapsed", self.arena.len(), self.clock.elapsed);
        Ok(())
    }

    pub fn save_to(&self, storage: &mut dyn PersistenceAdapter, slot: &str) -> Result<(), PersistenceError> {
        storage.write_save(slot, &self.save_json()?)
    }

    /// Returns `Ok(false)` when the slot is empty.
    pub fn load_from(&mut self, storage: &dyn PersistenceAdapter, slot: &str) -> Result<bool, PersistenceError> {
        match storage.read_save(slot)? {
            Some(blob) => self.load_json(&blob).map(|()| true),
            None => Ok(false),
        }
    }

    /// Build a session from a decoded save. Services are renumbered in saved
    /// order; connections go back through topology validation and invalid
    /// ones are dropped.
    fn from_save(config: SimConfig, seed: u64, save: SaveFile) -> Self {
        let mut sim = Self::with_config(config, save.game_mode, seed);

        sim.ledger.set_money(save.money);
        sim.ledger.reputation = save.reputation.min(MAX_REPUTATION);
        sim.ledger.score = save.score;
        sim.ledger.failures = save.failure_counts();
        sim.ledger.requests_processed = save.requests_processed;
        sim.ledger.restore_game_over(save.game_over);

        sim.generator.mix = TrafficMix::from_parts(save.mix_weights(), save.mix_overlays.clone());
        sim.generator.set_rps(save.current_rps);
        sim.generator.spawn_timer = save.spawn_timer.max(0.0);
        sim.generator.burst_count = save.burst_count;
        sim.generator.set_next_request_id(save.next_request_id);

        sim.clock.elapsed = save.elapsed_game_time.max(0.0);
        sim.clock.set_time_scale(save.time_scale);
        sim.is_running = save.is_running && save.game_over.is_none();
        sim.upkeep_enabled = save.upkeep_enabled;
        if let Some(budget) = save.sandbox_budget {
            sim.sandbox_budget = budget;
        }
        sim.interventions = InterventionController::from_state(save.interventions);

        let capacity_factor = sim.interventions.capacity_factor();
        let mut ids: HashMap<String, NodeId> = HashMap::new();
        for saved in &save.services {
            if ids.contains_key(&saved.id) {
                warn!("save: duplicate service id {}, skipped", saved.id);
                continue;
            }
            let [x, y, z] = saved.position;
            let services = &sim.config.services;
            let id = sim.arena.insert_with(|id| {
                let mut node = Node::new(id, saved.kind, Position::new(x, y, z), services);
                node.set_tier(saved.tier, services);
                node.health = if saved.health.is_finite() { saved.health.clamp(0.0, 100.0) } else { 100.0 };
                node.temp_capacity_factor = capacity_factor;
                node
            });
            ids.insert(saved.id.clone(), id);
            sim.pending.push(SimEvent::NodePlaced { id, kind: saved.kind, position: Position::new(x, y, z) });
        }

        for conn in &save.connections {
            let from = if conn.from == INGRESS_ID {
                Some(Endpoint::Ingress)
            } else {
                ids.get(&conn.from).copied().map(Endpoint::Node)
            };
            let (Some(from), Some(to)) = (from, ids.get(&conn.to).copied()) else {
                warn!("save: dropping connection {} -> {} to a missing service", conn.from, conn.to);
                continue;
            };
            if sim.topology.connect(&mut sim.arena, from, Endpoint::Node(to)).is_ok() {
                sim.pending.push(SimEvent::Connected { from, to });
            }
        }

        sim.restore_event_effects(&ids);
        sim
    }

    /// Re-apply the node and generator side of a random event that was
    /// running when the game was saved.
    fn restore_event_effects(&mut self, ids: &HashMap<String, NodeId>) {
        let Some(active) = self.interventions.state.active_event.as_mut() else { return };
        match active.kind {
            RandomEventKind::ServiceOutage => {
                let target = active.target.and_then(|old| ids.get(&old.to_string()).copied());
                active.target = target;
                if let Some(node) = target.and_then(|id| self.arena.get_mut(id)) {
                    node.disabled = true;
                }
            }
            RandomEventKind::TrafficBurst => {
                let multiplier = self
                    .config
                    .survival
                    .random_events
                    .events
                    .iter()
                    .find(|e| e.kind == RandomEventKind::TrafficBurst)
                    .map_or(1.0, |e| e.multiplier);
                self.generator.burst_multiplier = multiplier;
            }
            RandomEventKind::CostSpike | RandomEventKind::CapacityDrop => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> Simulation {
        Simulation::with_config(SimConfig::default(), GameMode::Sandbox, 7)
    }

    fn at(x: f64) -> Position {
        Position::new(x, 0.0, 0.0)
    }

    #[test]
    fn test_place_deducts_cost() {
        let mut sim = Simulation::with_config(SimConfig::default(), GameMode::Survival, 1);
        let id = sim.place_node(NodeKind::Waf, at(0.0)).unwrap();
        assert_eq!(sim.ledger().money(), 300.0);
        assert_eq!(sim.node(id).map(|n| n.kind), Some(NodeKind::Waf));
        assert!(matches!(sim.pending_events(), [SimEvent::NodePlaced { .. }]));
    }

    #[test]
    fn test_place_rejects_overlap_and_debt() {
        let mut sim = Simulation::with_config(SimConfig::default(), GameMode::Survival, 1);
        sim.place_node(NodeKind::Waf, at(0.0)).unwrap();
        assert_eq!(sim.place_node(NodeKind::Waf, at(0.5)), Err(CommandError::PositionOccupied));
        sim.ledger_mut().set_money(10.0);
        let err = sim.place_node(NodeKind::Database, at(5.0)).unwrap_err();
        assert_eq!(err, CommandError::InsufficientFunds { needed: 150.0, available: 10.0 });
        assert_eq!(sim.ledger().money(), 10.0);
        assert_eq!(sim.nodes().count(), 1);
    }

    #[test]
    fn test_delete_refunds_half_floor() {
        let mut sim = sandbox();
        let waf = sim.place_node(NodeKind::Waf, at(0.0)).unwrap();
        let sqs = sim.place_node(NodeKind::Queue, at(3.0)).unwrap();
        sim.connect(Endpoint::Ingress, Endpoint::Node(waf)).unwrap();
        sim.connect(Endpoint::Node(waf), Endpoint::Node(sqs)).unwrap();
        let before = sim.ledger().money();
        // Queue costs 35: refund floor(17.5) = 17.
        assert_eq!(sim.delete_node(sqs).unwrap(), 17.0);
        assert_eq!(sim.ledger().money(), before + 17.0);
        assert!(sim.node(waf).is_some_and(|n| n.out_edges.is_empty()));
        assert_eq!(sim.delete_node(sqs), Err(CommandError::UnknownNode(sqs)));
    }

    #[test]
    fn test_upgrade_until_max_tier() {
        let mut sim = sandbox();
        let compute = sim.place_node(NodeKind::Compute, at(0.0)).unwrap();
        assert_eq!(sim.upgrade_node(compute), Ok(2));
        assert_eq!(sim.node(compute).map(|n| n.base_capacity), Some(10));
        assert_eq!(sim.upgrade_node(compute), Ok(3));
        assert_eq!(sim.upgrade_node(compute), Err(CommandError::MaxTier));
        let waf = sim.place_node(NodeKind::Waf, at(5.0)).unwrap();
        assert_eq!(sim.upgrade_node(waf), Err(CommandError::MaxTier));
    }

    #[test]
    fn test_repair_prices_missing_health() {
        let mut sim = sandbox();
        let db = sim.place_node(NodeKind::Database, at(0.0)).unwrap();
        assert_eq!(sim.repair_node(db), Err(CommandError::AlreadyHealthy));
        sim.arena.get_mut(db).unwrap().health = 87.5;
        let before = sim.ledger().money();
        // ceil(12.5) = 13 points at 10 each.
        assert_eq!(sim.repair_node(db), Ok(130.0));
        assert_eq!(sim.ledger().money(), before - 130.0);
        assert_eq!(sim.node(db).unwrap().health, 100.0);
    }

    #[test]
    fn test_move_node_checks_spacing() {
        let mut sim = sandbox();
        let a = sim.place_node(NodeKind::Waf, at(0.0)).unwrap();
        let b = sim.place_node(NodeKind::LoadBalancer, at(5.0)).unwrap();
        assert_eq!(sim.move_node(b, at(0.2)), Err(CommandError::PositionOccupied));
        // Moving a node onto itself is fine.
        assert_eq!(sim.move_node(a, at(0.3)), Ok(()));
        assert_eq!(sim.node(a).unwrap().position, at(0.3));
    }

    #[test]
    fn test_pending_events_flush_on_tick() {
        let mut sim = sandbox();
        sim.place_node(NodeKind::Waf, at(0.0)).unwrap();
        let result = sim.tick_core(0.016);
        assert!(result.events.iter().any(|e| matches!(e, SimEvent::NodePlaced { .. })));
        assert!(sim.pending_events().is_empty());
    }

    #[test]
    fn test_no_entry_fails_immediately() {
        let mut sim = sandbox();
        sim.spawn_burst(TrafficType::Static, 3);
        assert_eq!(sim.ledger().failures.get(TrafficType::Static), 3);
        assert_eq!(sim.generator().next_request_id(), 3);
    }

    #[test]
    fn test_burst_ignored_after_game_over() {
        let mut sim = Simulation::with_config(SimConfig::default(), GameMode::Survival, 3);
        sim.set_target_rps(0.0);
        sim.ledger_mut().set_money(-2000.0);
        sim.tick_core(0.1);
        assert!(!sim.is_running());
        sim.spawn_burst(TrafficType::Static, 3);
        assert_eq!(sim.ledger().failures.total(), 0);
        assert_eq!(sim.generator().next_request_id(), 0);
        assert!(sim.pending_events().is_empty());
    }

    #[test]
    fn test_entry_prefers_firewall() {
        let mut sim = sandbox();
        let alb = sim.place_node(NodeKind::LoadBalancer, at(0.0)).unwrap();
        let waf = sim.place_node(NodeKind::Waf, at(3.0)).unwrap();
        sim.connect(Endpoint::Ingress, Endpoint::Node(alb)).unwrap();
        sim.connect(Endpoint::Ingress, Endpoint::Node(waf)).unwrap();
        sim.spawn_burst(TrafficType::Read, 5);
        assert_eq!(sim.node(waf).unwrap().backlog.len(), 5);
        assert!(sim.node(alb).unwrap().backlog.is_empty());
    }

    #[test]
    fn test_sandbox_budget_resets_money() {
        let mut sim = sandbox();
        sim.set_sandbox_budget(5000.0);
        assert_eq!(sim.ledger().money(), 5000.0);
        sim.reset(GameMode::Sandbox);
        assert_eq!(sim.ledger().money(), 5000.0);
        sim.reset(GameMode::Survival);
        assert_eq!(sim.ledger().money(), 340.0);
    }
}
