// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Intervention Controller

//! Time-driven pressure on the player: RPS milestones, malicious spikes,
//! traffic shifts and random events. All four run side by side off the
//! simulated clock.
//!
//! Distribution overrides go through `TrafficMix` overlays, so a spike and a
//! shift may overlap and end in any order. Node and cost effects are stored as
//! factors here and reverted to exactly 1 (or re-enabled) on expiry.

use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::arena::NodeArena;
use crate::config::{RandomEventKind, RandomEventSpec, SurvivalConfig};
use crate::events::{InterventionKind, SimEvent, WarningKind};
use crate::mix::MixOverlay;
use crate::traffic::TrafficGenerator;
use crate::types::{ActiveInterventions, NodeId, NodeKind};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveEvent {
    pub kind: RandomEventKind,
    pub remaining: f64,
    /// Node taken offline by an outage.
    #[serde(default)]
    pub target: Option<NodeId>,
}

/// Everything the controller needs to resume after a reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterventionState {
    pub milestone_index: usize,
    pub rps_multiplier: f64,
    pub malicious_spike_timer: f64,
    pub malicious_spike_active: bool,
    spike_warned_cycle: Option<u64>,
    pub traffic_shift_timer: f64,
    pub traffic_shift: Option<String>,
    shift_warned: bool,
    pub random_event_timer: f64,
    pub active_event: Option<ActiveEvent>,
    pub cost_multiplier: f64,
    pub capacity_factor: f64,
}

impl Default for InterventionState {
    fn default() -> Self {
        Self {
            milestone_index: 0,
            rps_multiplier: 1.0,
            malicious_spike_timer: 0.0,
            malicious_spike_active: false,
            spike_warned_cycle: None,
            traffic_shift_timer: 0.0,
            traffic_shift: None,
            shift_warned: false,
            random_event_timer: 0.0,
            active_event: None,
            cost_multiplier: 1.0,
            capacity_factor: 1.0,
        }
    }
}

/// Mutable world handed to the controller for one step.
pub struct InterventionTargets<'a> {
    pub generator: &'a mut TrafficGenerator,
    pub arena: &'a mut NodeArena,
}

#[derive(Debug, Clone, Default)]
pub struct InterventionController {
    pub state: InterventionState,
}

impl InterventionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: InterventionState) -> Self {
        Self { state }
    }

    pub fn rps_multiplier(&self) -> f64 {
        self.state.rps_multiplier
    }

    pub fn cost_multiplier(&self) -> f64 {
        self.state.cost_multiplier
    }

    /// Factor new nodes start with while a capacity drop is active.
    pub fn capacity_factor(&self) -> f64 {
        self.state.capacity_factor
    }

    pub fn summary(&self) -> ActiveInterventions {
        ActiveInterventions {
            malicious_spike: self.state.malicious_spike_active,
            traffic_shift: self.state.traffic_shift.clone(),
            random_event: self.state.active_event.as_ref().map(|e| e.kind.label().to_string()),
            milestone_index: self.state.milestone_index,
            rps_multiplier: self.state.rps_multiplier,
        }
    }

    /// Count down the running random event and revert it once it expires.
    /// Runs every tick in every mode, so an event started by hand always ends.
    pub fn expire_event(
        &mut self,
        dt: f64,
        generator: &mut TrafficGenerator,
        arena: &mut NodeArena,
        events: &mut Vec<SimEvent>,
    ) {
        let expired = match self.state.active_event.as_mut() {
            Some(active) => {
                active.remaining -= dt;
                active.remaining <= 0.0
            }
            None => false,
        };
        if expired {
            self.end_event(generator, arena, events);
        }
    }

    /// Advance the four scheduled mechanisms by `dt` simulated seconds. A
    /// running random event is counted down by `expire_event`.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        elapsed: f64,
        cfg: &SurvivalConfig,
        targets: InterventionTargets<'_>,
        rng: &mut R,
        events: &mut Vec<SimEvent>,
    ) {
        self.update_milestones(elapsed, cfg, events);
        self.update_malicious_spike(dt, cfg, targets.generator, events);
        self.update_traffic_shift(dt, cfg, targets.generator, rng, events);
        self.update_random_events(dt, cfg, targets.generator, targets.arena, rng, events);
    }

    // ─── RPS milestones ──────────────────────────────────────────────────────

    /// Latch forward past every milestone whose time has been reached. The
    /// index and multiplier never move backwards.
    pub fn update_milestones(&mut self, elapsed: f64, cfg: &SurvivalConfig, events: &mut Vec<SimEvent>) {
        if !cfg.rps_acceleration.enabled {
            return;
        }
        let milestones = &cfg.rps_acceleration.milestones;
        while let Some(m) = milestones.get(self.state.milestone_index) {
            if elapsed < m.time {
                break;
            }
            self.state.milestone_index += 1;
            self.state.rps_multiplier = self.state.rps_multiplier.max(m.multiplier);
            info!("rps milestone {} reached at {:.0}s: x{:.1}", self.state.milestone_index, elapsed, m.multiplier);
            events.push(SimEvent::Warning {
                kind: WarningKind::MilestoneSurge,
                message: format!("RPS SURGE! Traffic increased x{:.1}", m.multiplier),
            });
        }
    }

    // ─── Malicious spike ─────────────────────────────────────────────────────

    fn update_malicious_spike(
        &mut self,
        dt: f64,
        cfg: &SurvivalConfig,
        generator: &mut TrafficGenerator,
        events: &mut Vec<SimEvent>,
    ) {
        let spike = &cfg.malicious_spike;
        if !spike.enabled {
            return;
        }
        let st = &mut self.state;
        st.malicious_spike_timer += dt;
        let cycle_index = (st.malicious_spike_timer / spike.interval).floor() as u64;
        let cycle_time = st.malicious_spike_timer % spike.interval;

        if !st.malicious_spike_active
            && cycle_time >= spike.interval - spike.warning_time
            && st.spike_warned_cycle != Some(cycle_index)
        {
            st.spike_warned_cycle = Some(cycle_index);
            events.push(SimEvent::Warning {
                kind: WarningKind::MaliciousIncoming,
                message: format!("DDoS INCOMING: attack spike in {:.0} seconds", spike.warning_time),
            });
        }

        if cycle_time < dt && st.malicious_spike_timer > spike.warning_time && !st.malicious_spike_active {
            st.malicious_spike_active = true;
            generator.mix.push_overlay(MixOverlay::Spike { percent: spike.malicious_percent });
            info!("malicious spike started ({:.0}%)", spike.malicious_percent * 100.0);
            events.push(SimEvent::InterventionStarted {
                kind: InterventionKind::MaliciousSpike,
                label: "DDoS ATTACK ACTIVE".to_string(),
            });
        } else if st.malicious_spike_active && cycle_time >= spike.duration {
            st.malicious_spike_active = false;
            generator.mix.end_spike();
            info!("malicious spike ended");
            events.push(SimEvent::InterventionEnded { kind: InterventionKind::MaliciousSpike });
        }
    }

    // ─── Traffic shift ───────────────────────────────────────────────────────

    fn update_traffic_shift<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        cfg: &SurvivalConfig,
        generator: &mut TrafficGenerator,
        rng: &mut R,
        events: &mut Vec<SimEvent>,
    ) {
        let shift = &cfg.traffic_shifts;
        if !shift.enabled || shift.patterns.is_empty() {
            return;
        }
        let st = &mut self.state;
        st.traffic_shift_timer += dt;

        if st.traffic_shift.is_none() {
            if !st.shift_warned && st.traffic_shift_timer >= shift.interval - shift.warning_time {
                st.shift_warned = true;
                events.push(SimEvent::Warning {
                    kind: WarningKind::ShiftIncoming,
                    message: "Traffic pattern shift incoming".to_string(),
                });
            }
            if st.traffic_shift_timer >= shift.interval {
                let pattern = &shift.patterns[rng.gen_range(0..shift.patterns.len())];
                generator.mix.push_overlay(MixOverlay::Shift {
                    boost: pattern.boost,
                    amount: shift.boost_amount,
                    cap: shift.boost_cap,
                });
                st.traffic_shift = Some(pattern.name.clone());
                info!("traffic shift started: {} ({})", pattern.name, pattern.boost);
                events.push(SimEvent::InterventionStarted {
                    kind: InterventionKind::TrafficShift,
                    label: format!("{} - {} traffic surging!", pattern.name, pattern.boost),
                });
            }
        } else if st.traffic_shift_timer >= shift.interval + shift.duration {
            generator.mix.end_shift();
            st.traffic_shift = None;
            st.traffic_shift_timer = 0.0;
            st.shift_warned = false;
            info!("traffic shift ended");
            events.push(SimEvent::InterventionEnded { kind: InterventionKind::TrafficShift });
        }
    }

    // ─── Random events ───────────────────────────────────────────────────────

    fn update_random_events<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        cfg: &SurvivalConfig,
        generator: &mut TrafficGenerator,
        arena: &mut NodeArena,
        rng: &mut R,
        events: &mut Vec<SimEvent>,
    ) {
        let random = &cfg.random_events;
        if !random.enabled {
            return;
        }
        self.state.random_event_timer += dt;
        if self.state.random_event_timer >= random.check_interval {
            self.state.random_event_timer = 0.0;
            if self.state.active_event.is_none()
                && !random.events.is_empty()
                && rng.gen::<f64>() < random.probability
            {
                let spec = random.events[rng.gen_range(0..random.events.len())].clone();
                self.start_event(&spec, generator, arena, rng, events);
            }
        }
    }

    /// Start a random event immediately, unless one is already running.
    pub fn start_event<R: Rng + ?Sized>(
        &mut self,
        spec: &RandomEventSpec,
        generator: &mut TrafficGenerator,
        arena: &mut NodeArena,
        rng: &mut R,
        events: &mut Vec<SimEvent>,
    ) -> bool {
        if self.state.active_event.is_some() {
            return false;
        }
        let mut target = None;
        let label = match spec.kind {
            RandomEventKind::CostSpike => {
                self.state.cost_multiplier = spec.multiplier;
                format!("CLOUD COST SPIKE! Upkeep x{:.1} for {:.0}s", spec.multiplier, spec.duration)
            }
            RandomEventKind::CapacityDrop => {
                self.state.capacity_factor = spec.multiplier;
                for node in arena.iter_mut() {
                    node.temp_capacity_factor = spec.multiplier;
                }
                format!("RESOURCE THROTTLING! Capacity reduced for {:.0}s", spec.duration)
            }
            RandomEventKind::TrafficBurst => {
                generator.burst_multiplier = spec.multiplier;
                format!("TRAFFIC BURST! x{:.0} requests for {:.0}s", spec.multiplier, spec.duration)
            }
            RandomEventKind::ServiceOutage => {
                let candidates: Vec<NodeId> =
                    arena.iter().filter(|n| n.kind != NodeKind::Waf).map(|n| n.id).collect();
                if !candidates.is_empty() {
                    let id = candidates[rng.gen_range(0..candidates.len())];
                    if let Some(node) = arena.get_mut(id) {
                        node.disabled = true;
                        target = Some(id);
                    }
                }
                match target.and_then(|id| arena.get(id)) {
                    Some(node) => format!(
                        "{} OUTAGE! Service offline for {:.0}s",
                        node.kind.short_name().to_uppercase(),
                        spec.duration
                    ),
                    None => "OUTAGE! No service affected".to_string(),
                }
            }
        };
        info!("random event started: {} ({label})", spec.kind.label());
        self.state.active_event = Some(ActiveEvent { kind: spec.kind, remaining: spec.duration, target });
        events.push(SimEvent::InterventionStarted { kind: InterventionKind::RandomEvent(spec.kind), label });
        true
    }

    fn end_event(&mut self, generator: &mut TrafficGenerator, arena: &mut NodeArena, events: &mut Vec<SimEvent>) {
        let Some(active) = self.state.active_event.take() else { return };
        match active.kind {
            RandomEventKind::CostSpike => self.state.cost_multiplier = 1.0,
            RandomEventKind::CapacityDrop => {
                self.state.capacity_factor = 1.0;
                for node in arena.iter_mut() {
                    node.temp_capacity_factor = 1.0;
                }
            }
            RandomEventKind::TrafficBurst => generator.burst_multiplier = 1.0,
            RandomEventKind::ServiceOutage => {
                if let Some(node) = active.target.and_then(|id| arena.get_mut(id)) {
                    node.disabled = false;
                }
            }
        }
        info!("random event ended: {}", active.kind.label());
        events.push(SimEvent::InterventionEnded { kind: InterventionKind::RandomEvent(active.kind) });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::mix::{TrafficMix, SUM_TOLERANCE};
    use crate::node::Node;
    use crate::types::{Position, TrafficType};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn generator() -> TrafficGenerator {
        TrafficGenerator::new(TrafficMix::default(), 0.5, 0.6, true)
    }

    fn only(cfg: &mut SurvivalConfig, spike: bool, shift: bool, random: bool) {
        cfg.malicious_spike.enabled = spike;
        cfg.traffic_shifts.enabled = shift;
        cfg.random_events.enabled = random;
    }

    fn run(
        ctl: &mut InterventionController,
        cfg: &SurvivalConfig,
        gen: &mut TrafficGenerator,
        arena: &mut NodeArena,
        rng: &mut ChaCha8Rng,
        seconds: f64,
        elapsed: &mut f64,
    ) -> Vec<SimEvent> {
        let dt = 0.1;
        let mut events = Vec::new();
        let steps = (seconds / dt).round() as usize;
        for _ in 0..steps {
            *elapsed += dt;
            ctl.expire_event(dt, gen, arena, &mut events);
            ctl.advance(dt, *elapsed, cfg, InterventionTargets { generator: &mut *gen, arena: &mut *arena }, rng, &mut events);
            assert!((gen.mix.sum() - 1.0).abs() < SUM_TOLERANCE);
        }
        events
    }

    #[test]
    fn test_milestone_latch_is_monotonic() {
        let cfg = SurvivalConfig::default();
        let mut ctl = InterventionController::new();
        let mut events = Vec::new();
        ctl.update_milestones(299.0, &cfg, &mut events);
        assert_eq!(ctl.rps_multiplier(), 1.0);
        ctl.update_milestones(610.0, &cfg, &mut events);
        assert_eq!(ctl.state.milestone_index, 2);
        assert_eq!(ctl.rps_multiplier(), 2.0);
        // Going back in time does not undo the latch.
        ctl.update_milestones(10.0, &cfg, &mut events);
        assert_eq!(ctl.state.milestone_index, 2);
        assert_eq!(ctl.rps_multiplier(), 2.0);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_malicious_spike_cycle() {
        let mut cfg = SurvivalConfig::default();
        only(&mut cfg, true, false, false);
        cfg.rps_acceleration.enabled = false;
        let mut ctl = InterventionController::new();
        let mut gen = generator();
        let before = *gen.mix.weights();
        let mut arena = NodeArena::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut elapsed = 0.0;

        let events = run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 86.0, &mut elapsed);
        let warnings = events.iter().filter(|e| matches!(e, SimEvent::Warning { .. })).count();
        assert_eq!(warnings, 1);
        assert!(!ctl.state.malicious_spike_active);

        run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 5.0, &mut elapsed);
        assert!(ctl.state.malicious_spike_active);
        assert!((gen.mix.share(TrafficType::Malicious) - 0.4).abs() < 1e-9);

        run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 15.0, &mut elapsed);
        assert!(!ctl.state.malicious_spike_active);
        for (a, b) in gen.mix.weights().iter().zip(before.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_traffic_shift_and_restore() {
        let mut cfg = SurvivalConfig::default();
        only(&mut cfg, false, true, false);
        let mut ctl = InterventionController::new();
        let mut gen = generator();
        let before = *gen.mix.weights();
        let mut arena = NodeArena::new();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut elapsed = 0.0;

        run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 121.0, &mut elapsed);
        let name = ctl.state.traffic_shift.clone().expect("shift active");
        let pattern = cfg.traffic_shifts.patterns.iter().find(|p| p.name == name).unwrap();
        let expected = (before[pattern.boost.index()] + 0.25).min(0.6);
        assert!((gen.mix.share(pattern.boost) - expected).abs() < 1e-9);

        run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 45.0, &mut elapsed);
        assert!(ctl.state.traffic_shift.is_none());
        assert_eq!(*gen.mix.weights(), before);
    }

    #[test]
    fn test_spike_and_shift_overlap() {
        let mut cfg = SurvivalConfig::default();
        only(&mut cfg, true, true, false);
        let mut ctl = InterventionController::new();
        let mut gen = generator();
        let before = *gen.mix.weights();
        let mut arena = NodeArena::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        // Run long enough for several overlapping cycles; the mix must stay a
        // simplex the whole time and return to base once both are inactive.
        let mut elapsed = 0.0;
        for _ in 0..20 {
            run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 30.0, &mut elapsed);
            if !ctl.state.malicious_spike_active && ctl.state.traffic_shift.is_none() {
                for (a, b) in gen.mix.weights().iter().zip(before.iter()) {
                    assert!((a - b).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_capacity_drop_reverts_exactly() {
        let config = SimConfig::default();
        let mut arena = NodeArena::new();
        let id = arena.insert_with(|id| Node::new(id, NodeKind::Compute, Position::default(), &config.services));
        let mut ctl = InterventionController::new();
        let mut gen = generator();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut events = Vec::new();
        let spec = RandomEventSpec { kind: RandomEventKind::CapacityDrop, duration: 20.0, multiplier: 0.5 };
        assert!(ctl.start_event(&spec, &mut gen, &mut arena, &mut rng, &mut events));
        assert_eq!(arena.get(id).unwrap().temp_capacity_factor, 0.5);
        assert_eq!(ctl.capacity_factor(), 0.5);
        // A second event cannot start while one is active.
        assert!(!ctl.start_event(&spec, &mut gen, &mut arena, &mut rng, &mut events));

        let mut cfg = config.survival.clone();
        only(&mut cfg, false, false, true);
        cfg.random_events.probability = 0.0;
        let mut elapsed = 0.0;
        run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 20.1, &mut elapsed);
        assert!(ctl.state.active_event.is_none());
        assert_eq!(arena.get(id).unwrap().temp_capacity_factor, 1.0);
        assert_eq!(ctl.capacity_factor(), 1.0);
    }

    #[test]
    fn test_outage_skips_firewalls_and_recovers() {
        let config = SimConfig::default();
        let mut arena = NodeArena::new();
        let waf = arena.insert_with(|id| Node::new(id, NodeKind::Waf, Position::default(), &config.services));
        let db = arena.insert_with(|id| Node::new(id, NodeKind::Database, Position::default(), &config.services));
        let mut ctl = InterventionController::new();
        let mut gen = generator();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut events = Vec::new();
        let spec = RandomEventSpec { kind: RandomEventKind::ServiceOutage, duration: 10.0, multiplier: 1.0 };
        ctl.start_event(&spec, &mut gen, &mut arena, &mut rng, &mut events);
        assert!(!arena.get(waf).unwrap().disabled);
        assert!(arena.get(db).unwrap().disabled);
        ctl.end_event(&mut gen, &mut arena, &mut events);
        assert!(!arena.get(db).unwrap().disabled);
    }

    #[test]
    fn test_burst_and_cost_revert() {
        let mut arena = NodeArena::new();
        let mut ctl = InterventionController::new();
        let mut gen = generator();
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut events = Vec::new();
        let burst = RandomEventSpec { kind: RandomEventKind::TrafficBurst, duration: 15.0, multiplier: 3.0 };
        ctl.start_event(&burst, &mut gen, &mut arena, &mut rng, &mut events);
        assert_eq!(gen.burst_multiplier, 3.0);
        ctl.end_event(&mut gen, &mut arena, &mut events);
        assert_eq!(gen.burst_multiplier, 1.0);

        let cost = RandomEventSpec { kind: RandomEventKind::CostSpike, duration: 30.0, multiplier: 2.0 };
        ctl.start_event(&cost, &mut gen, &mut arena, &mut rng, &mut events);
        assert_eq!(ctl.cost_multiplier(), 2.0);
        ctl.end_event(&mut gen, &mut arena, &mut events);
        assert_eq!(ctl.cost_multiplier(), 1.0);
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn test_event_expires_with_random_events_disabled() {
        let config = SimConfig::default();
        let mut arena = NodeArena::new();
        let db = arena.insert_with(|id| Node::new(id, NodeKind::Database, Position::default(), &config.services));
        let mut ctl = InterventionController::new();
        let mut gen = generator();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut events = Vec::new();
        let outage = RandomEventSpec { kind: RandomEventKind::ServiceOutage, duration: 10.0, multiplier: 1.0 };
        assert!(ctl.start_event(&outage, &mut gen, &mut arena, &mut rng, &mut events));
        assert!(arena.get(db).unwrap().disabled);

        let mut cfg = config.survival.clone();
        only(&mut cfg, false, false, false);
        let mut elapsed = 0.0;
        run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 10.1, &mut elapsed);
        assert!(ctl.state.active_event.is_none());
        assert!(!arena.get(db).unwrap().disabled);
    }

    #[test]
    fn test_random_events_poll_on_interval() {
        let mut cfg = SurvivalConfig::default();
        only(&mut cfg, false, false, true);
        cfg.random_events.probability = 1.0;
        let mut ctl = InterventionController::new();
        let mut gen = generator();
        let mut arena = NodeArena::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut elapsed = 0.0;
        run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 59.0, &mut elapsed);
        assert!(ctl.state.active_event.is_none());
        run(&mut ctl, &cfg, &mut gen, &mut arena, &mut rng, 1.5, &mut elapsed);
        assert!(ctl.state.active_event.is_some());
    }
}
