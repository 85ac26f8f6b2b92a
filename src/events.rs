// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Events & Presentation Adapters

//! Everything the simulation tells the outside world goes through `SimEvent`.
//! Rendering, audio and UI layers implement the adapter traits below and are
//! fed with `dispatch`. They only ever see events; nothing here can reach back
//! into simulation state.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::config::RandomEventKind;
use crate::types::{Endpoint, NodeId, NodeKind, Outcome, Position, RequestId, TrafficType, UiSnapshot};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MaliciousIncoming,
    ShiftIncoming,
    MilestoneSurge,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum InterventionKind {
    MaliciousSpike,
    TrafficShift,
    RandomEvent(RandomEventKind),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Reputation,
    Bankrupt,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    NodePlaced { id: NodeId, kind: NodeKind, position: Position },
    NodeRemoved { id: NodeId, refund: f64 },
    NodeMoved { id: NodeId, position: Position },
    NodeUpgraded { id: NodeId, tier: u8 },
    NodeRepaired { id: NodeId, cost: f64 },
    Connected { from: Endpoint, to: NodeId },
    Disconnected { from: Endpoint, to: NodeId },
    ConnectionRejected { from: Endpoint, to: Endpoint, reason: String },
    RequestSpawned { request: RequestId, traffic_type: TrafficType, entry: Option<NodeId> },
    RequestForwarded { request: RequestId, traffic_type: TrafficType, from: NodeId, to: NodeId },
    RequestFinished {
        request: RequestId,
        traffic_type: TrafficType,
        node: Option<NodeId>,
        outcome: Outcome,
        cached: bool,
    },
    Warning { kind: WarningKind, message: String },
    InterventionStarted { kind: InterventionKind, label: String },
    InterventionEnded { kind: InterventionKind },
    GameOver { reason: GameOverReason },
}

// ─── Adapters ────────────────────────────────────────────────────────────────

/// Scene updates. All methods default to no-ops.
pub trait RenderAdapter {
    fn node_placed(&mut self, _id: NodeId, _kind: NodeKind, _position: Position) {}
    fn node_removed(&mut self, _id: NodeId) {}
    fn node_moved(&mut self, _id: NodeId, _position: Position) {}
    fn node_tier_changed(&mut self, _id: NodeId, _tier: u8) {}
    fn connection_added(&mut self, _from: Endpoint, _to: NodeId) {}
    fn connection_removed(&mut self, _from: Endpoint, _to: NodeId) {}
    fn request_moved(&mut self, _request: RequestId, _from: Option<NodeId>, _to: NodeId) {}
    fn request_finished(&mut self, _request: RequestId, _outcome: Outcome) {}
}

/// Fire-and-forget sounds.
pub trait AudioAdapter {
    fn placed(&mut self) {}
    fn connected(&mut self) {}
    fn completed(&mut self) {}
    fn failed(&mut self) {}
    fn blocked(&mut self) {}
    fn alarm(&mut self, _kind: WarningKind) {}
}

pub trait UiAdapter {
    fn snapshot(&mut self, _snapshot: &UiSnapshot) {}
    fn warning(&mut self, _kind: WarningKind, _message: &str) {}
    fn intervention(&mut self, _kind: InterventionKind, _active: bool) {}
    fn game_over(&mut self, _reason: GameOverReason) {}
}

/// Adapter that ignores everything; handy for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl RenderAdapter for Headless {}
impl AudioAdapter for Headless {}
impl UiAdapter for Headless {}

/// Route a tick's events to the presentation adapters.
pub fn dispatch(
    events: &[SimEvent],
    render: &mut dyn RenderAdapter,
    audio: &mut dyn AudioAdapter,
    ui: &mut dyn UiAdapter,
) {
    for event in events {
        match event {
            SimEvent::NodePlaced { id, kind, position } => {
                render.node_placed(*id, *kind, *position);
                audio.placed();
            }
            SimEvent::NodeRemoved { id, .. } => render.node_removed(*id),
            SimEvent::NodeMoved { id, position } => render.node_moved(*id, *position),
            SimEvent::NodeUpgraded { id, tier } => render.node_tier_changed(*id, *tier),
            SimEvent::NodeRepaired { .. } => {}
            SimEvent::Connected { from, to } => {
                render.connection_added(*from, *to);
                audio.connected();
            }
            SimEvent::Disconnected { from, to } => render.connection_removed(*from, *to),
            SimEvent::ConnectionRejected { .. } => audio.failed(),
            SimEvent::RequestSpawned { request, entry, .. } => {
                if let Some(to) = entry {
                    render.request_moved(*request, None, *to);
                }
            }
            SimEvent::RequestForwarded { request, from, to, .. } => {
                render.request_moved(*request, Some(*from), *to)
            }
            SimEvent::RequestFinished { request, outcome, .. } => {
                render.request_finished(*request, *outcome);
                match outcome {
                    Outcome::Completed => audio.completed(),
                    Outcome::MaliciousBlocked => audio.blocked(),
                    Outcome::Failed | Outcome::MaliciousPassed => audio.failed(),
                }
            }
            SimEvent::Warning { kind, message } => {
                ui.warning(*kind, message);
                audio.alarm(*kind);
            }
            SimEvent::InterventionStarted { kind, .. } => ui.intervention(*kind, true),
            SimEvent::InterventionEnded { kind } => ui.intervention(*kind, false),
            SimEvent::GameOver { reason } => ui.game_over(*reason),
        }
    }
}

// ─── Cue Queue ───────────────────────────────────────────────────────────────

/// Transient presentation cue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cue", rename_all = "snake_case")]
pub enum Cue {
    /// End the highlight on a node (cache hit, block).
    FlashEnd { node: NodeId },
    /// Take a warning banner down.
    WarningExpired { kind: WarningKind },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scheduled {
    due_ms: u64,
    seq: u64,
    cue: Cue,
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due_ms.cmp(&other.due_ms).then_with(|| self.seq.cmp(&other.seq))
    }
}

pub const FLASH_MS: u64 = 300;
pub const WARNING_MS: u64 = 4000;

/// Fire-once cues on a presentation clock of their own. Fed with events,
/// drained by the front end; it holds no handle to the simulation.
#[derive(Debug, Clone, Default)]
pub struct CueQueue {
    now_ms: u64,
    seq: u64,
    heap: BinaryHeap<Reverse<Scheduled>>,
}

impl CueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, cue: Cue, delay_ms: u64) {
        self.seq += 1;
        self.heap.push(Reverse(Scheduled { due_ms: self.now_ms + delay_ms, seq: self.seq, cue }));
    }

    /// Schedule the cues implied by a batch of events.
    pub fn observe(&mut self, events: &[SimEvent]) {
        for event in events {
            match event {
                SimEvent::RequestFinished {
                    node: Some(node),
                    outcome: Outcome::MaliciousBlocked,
                    ..
                }
                | SimEvent::RequestFinished { node: Some(node), cached: true, .. } => {
                    self.schedule(Cue::FlashEnd { node: *node }, FLASH_MS)
                }
                SimEvent::Warning { kind, .. } => {
                    self.schedule(Cue::WarningExpired { kind: *kind }, WARNING_MS)
                }
                _ => {}
            }
        }
    }

    /// Advance the cue clock by wall time and return the cues that are due,
    /// in due order.
    pub fn advance(&mut self, elapsed_ms: u64) -> Vec<Cue> {
        self.now_ms += elapsed_ms;
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.heap.peek() {
            if next.due_ms > self.now_ms {
                break;
            }
            if let Some(Reverse(item)) = self.heap.pop() {
                due.push(item.cue);
            }
        }
        due
    }

    pub fn pending(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        placed: u32,
        blocked: u32,
        failed: u32,
        moves: Vec<(RequestId, Option<NodeId>, NodeId)>,
        warnings: Vec<WarningKind>,
    }

    impl RenderAdapter for Recorder {
        fn request_moved(&mut self, request: RequestId, from: Option<NodeId>, to: NodeId) {
            self.moves.push((request, from, to));
        }
    }

    impl AudioAdapter for Recorder {
        fn placed(&mut self) {
            self.placed += 1;
        }
        fn blocked(&mut self) {
            self.blocked += 1;
        }
        fn failed(&mut self) {
            self.failed += 1;
        }
    }

    impl UiAdapter for Recorder {
        fn warning(&mut self, kind: WarningKind, _message: &str) {
            self.warnings.push(kind);
        }
    }

    fn finished(node: u32, outcome: Outcome, cached: bool) -> SimEvent {
        SimEvent::RequestFinished {
            request: 1,
            traffic_type: TrafficType::Read,
            node: Some(NodeId(node)),
            outcome,
            cached,
        }
    }

    #[test]
    fn test_dispatch_routes_events() {
        let events = vec![
            SimEvent::NodePlaced { id: NodeId(0), kind: NodeKind::Waf, position: Position::default() },
            SimEvent::RequestSpawned { request: 7, traffic_type: TrafficType::Read, entry: Some(NodeId(0)) },
            finished(0, Outcome::MaliciousBlocked, false),
            finished(0, Outcome::MaliciousPassed, false),
            SimEvent::Warning { kind: WarningKind::MaliciousIncoming, message: "DDoS".into() },
        ];
        let mut render = Recorder::default();
        let mut audio = Recorder::default();
        let mut ui = Recorder::default();
        dispatch(&events, &mut render, &mut audio, &mut ui);
        assert_eq!(audio.placed, 1);
        assert_eq!(audio.blocked, 1);
        assert_eq!(audio.failed, 1);
        assert_eq!(render.moves, vec![(7, None, NodeId(0))]);
        assert_eq!(ui.warnings, vec![WarningKind::MaliciousIncoming]);
    }

    #[test]
    fn test_cues_fire_once_in_order() {
        let mut cues = CueQueue::new();
        cues.observe(&[
            SimEvent::Warning { kind: WarningKind::ShiftIncoming, message: String::new() },
            finished(3, Outcome::Completed, true),
            finished(4, Outcome::Completed, false),
        ]);
        assert_eq!(cues.pending(), 2);
        assert_eq!(cues.advance(FLASH_MS), vec![Cue::FlashEnd { node: NodeId(3) }]);
        assert!(cues.advance(1000).is_empty());
        assert_eq!(
            cues.advance(WARNING_MS),
            vec![Cue::WarningExpired { kind: WarningKind::ShiftIncoming }]
        );
        assert_eq!(cues.pending(), 0);
    }

    #[test]
    fn test_headless_ignores_everything() {
        let mut h = Headless;
        let mut a = Headless;
        let mut u = Headless;
        dispatch(&[SimEvent::GameOver { reason: GameOverReason::Bankrupt }], &mut h, &mut a, &mut u);
    }
}
