// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Traffic Mix

//! The traffic mix is a probability simplex over the six traffic types.
//!
//! Interventions never edit the mix in place. The player-controlled base
//! distribution is kept separately and the active overrides are stacked on top
//! of it in the order they started. Ending an override drops it from the stack
//! and refolds the rest, so a spike and a shift that overlap can end in either
//! order without losing state, and the base comes back bit-for-bit once the
//! stack is empty.

use crate::types::TrafficType;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const SUM_TOLERANCE: f64 = 1e-6;

/// A temporary override applied on top of the base distribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MixOverlay {
    /// MALICIOUS pinned to `percent`, the rest rescaled.
    Spike { percent: f64 },
    /// `boost` raised by `amount` (capped), the rest rescaled.
    Shift { boost: TrafficType, amount: f64, cap: f64 },
}

impl MixOverlay {
    fn same_kind(&self, other: &MixOverlay) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    fn apply(&self, weights: &mut [f64; 6]) {
        match *self {
            MixOverlay::Spike { percent } => set_share_in(weights, TrafficType::Malicious, percent),
            MixOverlay::Shift { boost, amount, cap } => {
                let raised = (weights[boost.index()] + amount).min(cap);
                set_share_in(weights, boost, raised);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MixParts", into = "MixParts")]
pub struct TrafficMix {
    base: [f64; 6],
    overlays: Vec<MixOverlay>,
    current: [f64; 6],
}

/// Persisted form; the effective distribution is always recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MixParts {
    base: [f64; 6],
    #[serde(default)]
    overlays: Vec<MixOverlay>,
}

impl From<MixParts> for TrafficMix {
    fn from(parts: MixParts) -> Self {
        TrafficMix::from_parts(parts.base, parts.overlays)
    }
}

impl From<TrafficMix> for MixParts {
    fn from(mix: TrafficMix) -> Self {
        MixParts { base: mix.base, overlays: mix.overlays }
    }
}

impl TrafficMix {
    /// Build a mix from raw weights. Weights are normalised; an all-zero
    /// vector collapses onto STATIC.
    pub fn new(weights: [f64; 6]) -> Self {
        let base = normalized(weights);
        Self { base, overlays: Vec::new(), current: base }
    }

    /// Rebuild from persisted parts.
    pub fn from_parts(base: [f64; 6], overlays: Vec<MixOverlay>) -> Self {
        let mut mix = Self { base: normalized(base), overlays, current: [0.0; 6] };
        mix.refold();
        mix
    }

    /// Effective distribution (base with overrides folded in).
    pub fn weights(&self) -> &[f64; 6] {
        &self.current
    }

    pub fn base(&self) -> &[f64; 6] {
        &self.base
    }

    pub fn overlays(&self) -> &[MixOverlay] {
        &self.overlays
    }

    pub fn share(&self, t: TrafficType) -> f64 {
        self.current[t.index()]
    }

    pub fn sum(&self) -> f64 {
        self.current.iter().sum()
    }

    pub fn entries(&self) -> Vec<(TrafficType, f64)> {
        TrafficType::ALL.iter().map(|t| (*t, self.share(*t))).collect()
    }

    /// Set one type's share of the base distribution; the other types are
    /// rescaled proportionally so the total stays 1.
    pub fn set_share(&mut self, t: TrafficType, fraction: f64) {
        set_share_in(&mut self.base, t, fraction);
        self.refold();
    }

    /// Replace the base distribution wholesale.
    pub fn set_base(&mut self, weights: [f64; 6]) {
        self.base = normalized(weights);
        self.refold();
    }

    /// Start an override. An override of the same kind already active is
    /// replaced.
    pub fn push_overlay(&mut self, overlay: MixOverlay) {
        self.overlays.retain(|o| !o.same_kind(&overlay));
        self.overlays.push(overlay);
        self.refold();
    }

    /// End the active spike override. Returns whether one was active.
    pub fn end_spike(&mut self) -> bool {
        self.remove_where(|o| matches!(o, MixOverlay::Spike { .. }))
    }

    /// End the active shift override. Returns whether one was active.
    pub fn end_shift(&mut self) -> bool {
        self.remove_where(|o| matches!(o, MixOverlay::Shift { .. }))
    }

    fn remove_where(&mut self, pred: impl Fn(&MixOverlay) -> bool) -> bool {
        let before = self.overlays.len();
        self.overlays.retain(|o| !pred(o));
        let removed = self.overlays.len() != before;
        if removed {
            self.refold();
        }
        removed
    }

    fn refold(&mut self) {
        let mut weights = self.base;
        for overlay in &self.overlays {
            overlay.apply(&mut weights);
        }
        self.current = weights;
    }

    /// Cumulative-weight sampling in `TrafficType::ALL` order.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TrafficType {
        sample_weights(&self.current, rng)
    }
}

impl Default for TrafficMix {
    fn default() -> Self {
        Self::new([0.30, 0.20, 0.15, 0.05, 0.10, 0.20])
    }
}

/// Draw `r` uniformly in `[0, sum)` and return the first type whose
/// cumulative boundary exceeds it. All-zero weights yield STATIC.
pub fn sample_weights<R: Rng + ?Sized>(weights: &[f64; 6], rng: &mut R) -> TrafficType {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return TrafficType::Static;
    }
    let r = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for t in TrafficType::ALL {
        cumulative += weights[t.index()];
        if cumulative > r {
            return t;
        }
    }
    // Rounding can leave r at the very top; fall back to the last weighted type.
    TrafficType::ALL
        .iter()
        .rev()
        .copied()
        .find(|t| weights[t.index()] > 0.0)
        .unwrap_or(TrafficType::Static)
}

fn normalized(weights: [f64; 6]) -> [f64; 6] {
    let clean = weights.map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 });
    let total: f64 = clean.iter().sum();
    if total <= 0.0 {
        let mut fallback = [0.0; 6];
        fallback[TrafficType::Static.index()] = 1.0;
        return fallback;
    }
    clean.map(|w| w / total)
}

/// Pin `t` to `value` and rescale the other five proportionally from their
/// current values so the total is 1. When the others are all zero the
/// remainder is spread evenly.
fn set_share_in(weights: &mut [f64; 6], t: TrafficType, value: f64) {
    let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    let idx = t.index();
    let others: f64 = weights
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, w)| *w)
        .sum();
    let remainder = 1.0 - value;
    for (i, w) in weights.iter_mut().enumerate() {
        if i == idx {
            *w = value;
        } else if others > 0.0 {
            *w *= remainder / others;
        } else {
            *w = remainder / 5.0;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
