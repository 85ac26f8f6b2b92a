// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Topology

use crate::arena::NodeArena;
use crate::types::{Endpoint, NodeId, NodeKind};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("a node cannot connect to itself")]
    SelfLoop,
    #[error("{0} -> {1} is already connected")]
    Duplicate(Endpoint, Endpoint),
    #[error("{from} -> {to} is not an allowed connection")]
    NotAllowed { from: String, to: String },
    #[error("no connection {0} -> {1}")]
    NoSuchEdge(Endpoint, Endpoint),
}

/// Adjacency policy. `None` stands for the ingress.
pub fn is_allowed(from: Option<NodeKind>, to: NodeKind) -> bool {
    use NodeKind::*;
    matches!(
        (from, to),
        (None, Waf)
            | (None, LoadBalancer)
            | (Some(Waf), LoadBalancer)
            | (Some(Waf), Queue)
            | (Some(Queue), LoadBalancer)
            | (Some(LoadBalancer), Queue)
            | (Some(Queue), Compute)
            | (Some(LoadBalancer), Compute)
            | (Some(Compute), Cache)
            | (Some(Cache), Database)
            | (Some(Cache), ObjectStore)
            | (Some(Compute), Database)
            | (Some(Compute), ObjectStore)
    )
}

/// Persisted edge form. `from` is `Endpoint::Ingress` for ingress edges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub from: Endpoint,
    pub to: NodeId,
}

/// Ingress edges live here; node-to-node edges live on each node's ordered
/// `out_edges` so round robin can walk them in creation order.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    ingress: Vec<NodeId>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry nodes connected to the ingress, in connection order.
    pub fn ingress(&self) -> &[NodeId] {
        &self.ingress
    }

    fn kind_of(arena: &NodeArena, endpoint: Endpoint) -> Result<Option<NodeKind>, TopologyError> {
        match endpoint {
            Endpoint::Ingress => Ok(None),
            Endpoint::Node(id) => arena
                .get(id)
                .map(|n| Some(n.kind))
                .ok_or(TopologyError::UnknownNode(id)),
        }
    }

    /// Validate an edge against the adjacency policy without mutating anything.
    pub fn validate(
        &self,
        arena: &NodeArena,
        from: Endpoint,
        to: Endpoint,
    ) -> Result<NodeId, TopologyError> {
        if from == to {
            return Err(TopologyError::SelfLoop);
        }
        let from_kind = Self::kind_of(arena, from)?;
        let (to_id, to_kind) = match to {
            Endpoint::Node(id) => (id, Self::kind_of(arena, to)?),
            Endpoint::Ingress => {
                return Err(TopologyError::NotAllowed {
                    from: describe(from_kind),
                    to: describe(None),
                })
            }
        };
        let Some(to_kind) = to_kind else {
            return Err(TopologyError::UnknownNode(to_id));
        };
        if !is_allowed(from_kind, to_kind) {
            return Err(TopologyError::NotAllowed {
                from: describe(from_kind),
                to: describe(Some(to_kind)),
            });
        }
        if self.has_edge(arena, from, to_id) {
            return Err(TopologyError::Duplicate(from, to));
        }
        Ok(to_id)
    }

    pub fn has_edge(&self, arena: &NodeArena, from: Endpoint, to: NodeId) -> bool {
        match from {
            Endpoint::Ingress => self.ingress.contains(&to),
            Endpoint::Node(id) => arena.get(id).is_some_and(|n| n.out_edges.contains(&to)),
        }
    }

    /// Add an edge. A rejected edge leaves everything untouched.
    pub fn connect(
        &mut self,
        arena: &mut NodeArena,
        from: Endpoint,
        to: Endpoint,
    ) -> Result<NodeId, TopologyError> {
        let to_id = match self.validate(arena, from, to) {
            Ok(id) => id,
            Err(err) => {
                warn!("connection {from} -> {to} rejected: {err}");
                return Err(err);
            }
        };
        match from {
            Endpoint::Ingress => self.ingress.push(to_id),
            Endpoint::Node(id) => {
                if let Some(node) = arena.get_mut(id) {
                    node.out_edges.push(to_id);
                }
            }
        }
        Ok(to_id)
    }

    pub fn disconnect(
        &mut self,
        arena: &mut NodeArena,
        from: Endpoint,
        to: NodeId,
    ) -> Result<(), TopologyError> {
        let removed = match from {
            Endpoint::Ingress => remove_item(&mut self.ingress, to),
            Endpoint::Node(id) => {
                let node = arena.get_mut(id).ok_or(TopologyError::UnknownNode(id))?;
                node.remove_edge(to)
            }
        };
        if removed {
            Ok(())
        } else {
            Err(TopologyError::NoSuchEdge(from, Endpoint::Node(to)))
        }
    }

    /// Drop every edge touching `id`. Called before the node leaves the arena.
    pub fn detach(&mut self, arena: &mut NodeArena, id: NodeId) {
        remove_item(&mut self.ingress, id);
        for node in arena.iter_mut() {
            node.remove_edge(id);
        }
        if let Some(node) = arena.get_mut(id) {
            node.out_edges.clear();
        }
    }

    /// Every edge, ingress edges first, then per node in creation order.
    pub fn edges(&self, arena: &NodeArena) -> Vec<Edge> {
        let ingress = self.ingress.iter().map(|to| Edge { from: Endpoint::Ingress, to: *to });
        let internal = arena.iter().flat_map(|n| {
            n.out_edges.iter().map(move |to| Edge { from: Endpoint::Node(n.id), to: *to })
        });
        ingress.chain(internal).collect()
    }
}

fn remove_item(list: &mut Vec<NodeId>, id: NodeId) -> bool {
    match list.iter().position(|x| *x == id) {
        Some(pos) => {
            list.remove(pos);
            true
        }
        None => false,
    }
}

fn describe(kind: Option<NodeKind>) -> String {
    kind.map_or_else(|| "internet".to_string(), |k| k.short_name().to_string())
}
