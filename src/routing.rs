// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Next-Hop Routing

use crate::arena::NodeArena;
use crate::types::{Destination, NodeId, NodeKind};

/// Result of a queue's attempt to hand an item downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDispatch {
    Sent(NodeId),
    /// Every candidate's backlog is at its limit.
    Backpressure,
    /// No load balancer or compute node is connected.
    NoCandidates,
}

/// Plain round robin over `edges` in creation order. The cursor advances by
/// one per dispatch and wraps at the edge count.
pub fn round_robin(edges: &[NodeId], cursor: &mut usize) -> Option<NodeId> {
    if edges.is_empty() {
        return None;
    }
    let idx = *cursor % edges.len();
    *cursor = (idx + 1) % edges.len();
    Some(edges[idx])
}

/// Round robin restricted to downstream load balancers and compute nodes,
/// skipping any whose backlog has reached its queue limit. The cursor moves
/// on every attempt, accepted or not.
pub fn queue_dispatch(edges: &[NodeId], cursor: &mut usize, arena: &NodeArena) -> QueueDispatch {
    let candidates: Vec<NodeId> = edges
        .iter()
        .copied()
        .filter(|id| {
            arena
                .get(*id)
                .is_some_and(|n| matches!(n.kind, NodeKind::LoadBalancer | NodeKind::Compute))
        })
        .collect();
    if candidates.is_empty() {
        return QueueDispatch::NoCandidates;
    }
    for _ in 0..candidates.len() {
        let idx = *cursor % candidates.len();
        *cursor = (idx + 1) % candidates.len();
        let target = candidates[idx];
        if arena.get(target).is_some_and(|n| n.can_accept()) {
            return QueueDispatch::Sent(target);
        }
    }
    QueueDispatch::Backpressure
}

/// First connected node of `kind`, in edge order.
pub fn find_connected(edges: &[NodeId], arena: &NodeArena, kind: NodeKind) -> Option<NodeId> {
    edges
        .iter()
        .copied()
        .find(|id| arena.get(*id).is_some_and(|n| n.kind == kind))
}

/// The connected terminal node serving `destination`.
pub fn destination_target(
    edges: &[NodeId],
    arena: &NodeArena,
    destination: Destination,
) -> Option<NodeId> {
    destination
        .terminal_kind()
        .and_then(|kind| find_connected(edges, arena, kind))
}

/// Compute nodes prefer a connected cache and otherwise go straight to the
/// terminal for the destination. Blocked traffic has nowhere to go.
pub fn compute_next_hop(
    edges: &[NodeId],
    arena: &NodeArena,
    destination: Destination,
) -> Option<NodeId> {
    if destination == Destination::Blocked {
        return None;
    }
    find_connected(edges, arena, NodeKind::Cache)
        .or_else(|| destination_target(edges, arena, destination))
}
