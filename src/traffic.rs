// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Traffic Generator

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::TrafficProfiles;
use crate::mix::TrafficMix;
use crate::types::{RequestId, TrafficRequest, TrafficType};

/// Growth scale of the logarithmic ramp.
const RAMP_GAIN: f64 = 1.8;
/// Seconds over which the ramp's log argument doubles.
const RAMP_PERIOD: f64 = 30.0;
/// Fraction of the gap to target closed per spawn.
const EASING: f64 = 0.01;

/// `base + ln(1 + t/30) * 1.8`, scaled by the latched milestone multiplier.
pub fn target_rps(base_rps: f64, elapsed: f64, milestone_multiplier: f64) -> f64 {
    (base_rps + (1.0 + elapsed.max(0.0) / RAMP_PERIOD).ln() * RAMP_GAIN) * milestone_multiplier
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficGenerator {
    pub mix: TrafficMix,
    pub current_rps: f64,
    pub spawn_timer: f64,
    /// Set by a traffic-burst event; 1 otherwise.
    pub burst_multiplier: f64,
    /// Ease toward the target curve after each spawn (survival only).
    pub ramp: bool,
    pub base_rps: f64,
    pub max_rps: Option<f64>,
    pub burst_count: u32,
    next_id: RequestId,
}

impl TrafficGenerator {
    pub fn new(mix: TrafficMix, initial_rps: f64, base_rps: f64, ramp: bool) -> Self {
        Self {
            mix,
            current_rps: initial_rps.max(0.0),
            spawn_timer: 0.0,
            burst_multiplier: 1.0,
            ramp,
            base_rps,
            max_rps: None,
            burst_count: 10,
            next_id: 0,
        }
    }

    pub fn effective_rps(&self) -> f64 {
        self.current_rps * self.burst_multiplier
    }

    /// Accumulate `dt` and report whether a spawn fires this tick. On a spawn
    /// the timer resets and, when ramping, the rate eases toward the target.
    pub fn advance(&mut self, dt: f64, elapsed: f64, milestone_multiplier: f64) -> bool {
        self.spawn_timer += dt;
        let rate = self.effective_rps();
        if rate <= 0.0 || self.spawn_timer <= 1.0 / rate {
            return false;
        }
        self.spawn_timer = 0.0;
        if self.ramp {
            let target = target_rps(self.base_rps, elapsed, milestone_multiplier);
            self.current_rps += (target - self.current_rps) * EASING;
            self.current_rps = self.clamp_rps(self.current_rps);
        }
        true
    }

    fn clamp_rps(&self, rps: f64) -> f64 {
        let rps = rps.max(0.0);
        match self.max_rps {
            Some(max) => rps.min(max),
            None => rps,
        }
    }

    /// Overwrite the current rate (sandbox slider, scripted scenarios).
    pub fn set_rps(&mut self, rps: f64) {
        self.current_rps = if rps.is_finite() { self.clamp_rps(rps) } else { 0.0 };
    }

    pub fn sample_type<R: Rng + ?Sized>(&self, rng: &mut R) -> TrafficType {
        self.mix.sample(rng)
    }

    /// Build a request of the given type from its profile.
    pub fn make_request(&mut self, traffic_type: TrafficType, profiles: &TrafficProfiles) -> TrafficRequest {
        let profile = profiles.get(traffic_type);
        let id = self.next_id;
        self.next_id += 1;
        TrafficRequest {
            id,
            traffic_type,
            destination: profile.destination,
            cacheable: profile.cacheable,
            cache_hit_rate: profile.cache_hit_rate,
            reward_weight: profile.reward,
            score_weight: profile.score,
            processing_weight: profile.processing_weight,
            cached: false,
        }
    }

    pub fn next_request_id(&self) -> RequestId {
        self.next_id
    }

    pub(crate) fn set_next_request_id(&mut self, id: RequestId) {
        self.next_id = id;
    }
}
