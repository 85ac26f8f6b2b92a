// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Node Arena

use crate::node::Node;
use crate::types::NodeId;

/// Creation-ordered node storage. A `NodeId` is the slot index; removed nodes
/// leave an empty slot so ids are never reused and iteration order stays the
/// order of placement.
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next inserted node will get.
    pub fn next_id(&self) -> NodeId {
        NodeId(self.slots.len() as u32)
    }

    /// Insert a node built for `next_id()`.
    pub fn insert_with(&mut self, build: impl FnOnce(NodeId) -> Node) -> NodeId {
        let id = self.next_id();
        self.slots.push(Some(build(id)));
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.slots.get_mut(id.0 as usize).and_then(Option::take)
    }

    /// Temporarily move a node out of its slot so it can be updated while the
    /// rest of the arena is borrowed mutably. Must be paired with `restore`.
    pub(crate) fn take(&mut self, id: NodeId) -> Option<Node> {
        self.remove(id)
    }

    pub(crate) fn restore(&mut self, node: Node) {
        let idx = node.id.0 as usize;
        if let Some(slot) = self.slots.get_mut(idx) {
            *slot = Some(node);
        }
    }

    /// Live node ids in creation order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(|n| n.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::types::{NodeKind, Position};

    fn place(arena: &mut NodeArena, kind: NodeKind) -> NodeId {
        let config = SimConfig::default();
        arena.insert_with(|id| Node::new(id, kind, Position::default(), &config.services))
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut arena = NodeArena::new();
        let a = place(&mut arena, NodeKind::Waf);
        let b = place(&mut arena, NodeKind::LoadBalancer);
        assert!(arena.remove(a).is_some());
        let c = place(&mut arena, NodeKind::Compute);
        assert_ne!(c, a);
        assert_eq!(arena.ids(), vec![b, c]);
        assert!(arena.get(a).is_none());
    }

    #[test]
    fn test_take_and_restore_keep_order() {
        let mut arena = NodeArena::new();
        let a = place(&mut arena, NodeKind::Waf);
        let b = place(&mut arena, NodeKind::Queue);
        let node = arena.take(a).unwrap();
        assert!(!arena.contains(a));
        arena.restore(node);
        assert_eq!(arena.ids(), vec![a, b]);
    }
}
