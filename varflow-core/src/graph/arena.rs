//! Node Arena
//!
//! The arena owns every node of a graph and maintains the edges between
//! them. Ownership only flows upstream: a `requires` slot holds a strong
//! count on its operand, while the matching `required_by` entry is a plain
//! id that keeps nothing alive.
//!
//! # Reclamation
//!
//! A node's strong count is the number of user handles plus the number of
//! `requires` slots (of live nodes) that point at it. When a release drops
//! the count to zero the node is queued as unreachable, and [`Arena::collect`]
//! removes it, cascading into operands whose counts drop to zero in turn.
//!
//! Collection does not touch the `required_by` sets of surviving operands.
//! Those entries go stale, since the slot's generation has moved on, and are
//! compacted out the next time propagation or [`Arena::live_dependents`]
//! walks them.

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::node::{Node, NodeId};
use crate::config::EngineConfig;
use crate::error::{Result, VarError};

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of graph nodes addressed by generational ids.
#[derive(Debug)]
pub struct Arena {
    slots: Vec<Slot>,

    /// Vacant slot indices, reused before growing.
    free: Vec<u32>,

    /// Nodes whose strong count reached zero and await collection.
    unreachable: Vec<NodeId>,

    len: usize,
    next_serial: u64,
    config: EngineConfig,
}

impl Arena {
    /// Create an empty arena.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            unreachable: Vec::new(),
            len: 0,
            next_serial: 0,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Add a node with no operands.
    ///
    /// The node starts with a strong count of zero; the caller is expected
    /// to retain it or to make it the operand of another node.
    pub fn insert(&mut self, mut node: Node) -> NodeId {
        debug_assert!(node.requires.is_empty());
        node.serial = self.next_serial;
        self.next_serial += 1;
        self.allocate(node)
    }

    /// Check that every operand is live, before building a node over them.
    pub fn check_operands(&self, operands: &[NodeId]) -> Result<()> {
        for &operand in operands {
            self.serial_of(operand)?;
        }
        Ok(())
    }

    /// Add an expression node and register an edge to each operand.
    ///
    /// The operands must have passed [`Arena::check_operands`] with no
    /// removal in between. Callers check first so that a rejected node is
    /// never handed to the arena.
    pub fn insert_expression(&mut self, mut node: Node, operands: &[NodeId]) -> NodeId {
        node.requires.clear();
        node.serial = self.next_serial;
        self.next_serial += 1;
        let id = self.allocate(node);
        for &operand in operands {
            // Live operands are all older than `id`, so no link can close a cycle.
            debug_assert!(self.contains(operand), "operand {} is not live", operand);
            self.link(id, operand);
        }
        id
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId::new(index, 0)
        }
    }

    fn serial_of(&self, id: NodeId) -> Result<u64> {
        self.get(id)
            .map(|node| node.serial)
            .ok_or(VarError::DanglingReference(id))
    }

    /// Register `dependent` as requiring `operand`.
    ///
    /// Appends `operand` to the dependent's `requires` (taking one strong
    /// count) and records a back-edge on the operand. The same operand may
    /// appear in several slots; each slot holds its own count.
    ///
    /// The operand must be strictly older than the dependent. Every node is
    /// newer than all of its operands, so no edge can close a cycle.
    pub fn add_edge(&mut self, dependent: NodeId, operand: NodeId) -> Result<()> {
        if self.serial_of(operand)? >= self.serial_of(dependent)? {
            return Err(VarError::Cycle { dependent, operand });
        }
        self.link(dependent, operand);
        Ok(())
    }

    fn link(&mut self, dependent: NodeId, operand: NodeId) {
        if let Some(node) = self.get_mut(operand) {
            node.strong += 1;
            node.required_by.insert(dependent);
        }
        if let Some(node) = self.get_mut(dependent) {
            node.requires.push(operand);
            node.cell.mark_dirty();
        }
        trace!(%dependent, %operand, "edge added");
    }

    /// Get a reference to a node.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    /// Get a mutable reference to a node.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Take one strong count on a node.
    pub fn retain(&mut self, id: NodeId) {
        match self.get_mut(id) {
            Some(node) => node.strong += 1,
            None => warn!(%id, "retain of a node that is not in the graph"),
        }
    }

    /// Give back one strong count. Returns `true` if the node became unreachable.
    pub fn release(&mut self, id: NodeId) -> bool {
        let Some(node) = self.get_mut(id) else {
            warn!(%id, "release of a node that is not in the graph");
            return false;
        };
        node.strong = node.strong.saturating_sub(1);
        if node.strong == 0 {
            self.unreachable.push(id);
            true
        } else {
            false
        }
    }

    /// Dependents whose ids still resolve. Dead back-edges are dropped from
    /// the node's `required_by` set as a side effect.
    pub fn live_dependents(&mut self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        let (live, dead): (Vec<NodeId>, Vec<NodeId>) = node
            .required_by
            .iter()
            .copied()
            .partition(|&dependent| self.contains(dependent));

        if !dead.is_empty() {
            if let Some(node) = self.get_mut(id) {
                node.required_by.retain(|d| !dead.contains(d));
            }
            trace!(%id, dropped = dead.len(), "compacted dead dependents");
        }
        live
    }

    /// Remove every unreachable node, cascading into operands whose strong
    /// count drops to zero. Returns the removed nodes.
    ///
    /// Removed nodes are handed back instead of dropped here: their operator
    /// functions may own handles whose `Drop` needs the graph lock.
    pub fn collect(&mut self) -> Vec<Node> {
        let mut queue = std::mem::take(&mut self.unreachable);
        let mut removed = Vec::new();

        while let Some(id) = queue.pop() {
            match self.get(id) {
                Some(node) if node.strong == 0 => {}
                _ => continue,
            }
            let Some(node) = self.remove(id) else {
                continue;
            };
            let operands: SmallVec<[NodeId; 2]> = node.requires.clone();
            for operand in operands {
                if let Some(op) = self.get_mut(operand) {
                    op.strong = op.strong.saturating_sub(1);
                    if op.strong == 0 {
                        queue.push(operand);
                    }
                }
            }
            removed.push(node);
        }

        if !removed.is_empty() {
            debug!(reclaimed = removed.len(), remaining = self.len, "collected unreachable nodes");
        }
        removed
    }

    fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
        Some(node)
    }

    /// Number of nodes waiting for collection.
    pub fn pending(&self) -> usize {
        self.unreachable.len()
    }

    /// Get the total number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Category, UnaryOp};
    use crate::graph::NodeKind;
    use crate::value::{Shape, Unit, Value};

    fn leaf(arena: &mut Arena, v: f64) -> NodeId {
        let id = arena.insert(Node::leaf(Value::from(v), Category::Generic));
        arena.retain(id);
        id
    }

    fn negate(arena: &mut Arena, operand: NodeId) -> NodeId {
        let node = Node::expression(
            NodeKind::Unary(UnaryOp::negate()),
            SmallVec::new(),
            Shape::scalar(),
            Unit::dimensionless(),
            Category::Generic,
            true,
        );
        arena.check_operands(&[operand]).unwrap();
        let id = arena.insert_expression(node, &[operand]);
        arena.retain(id);
        id
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena, 1.0);
        let b = leaf(&mut arena, 2.0);
        assert_eq!(arena.len(), 2);

        assert!(arena.release(a));
        assert_eq!(arena.collect().len(), 1);
        assert_eq!(arena.len(), 1);
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
    }

    #[test]
    fn edges_are_recorded_both_ways() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena, 1.0);
        let e = negate(&mut arena, a);

        assert_eq!(arena.get(e).unwrap().requires(), &[a]);
        assert!(arena.get(a).unwrap().required_by().contains(&e));
        assert_eq!(arena.get(a).unwrap().strong, 2);
        assert!(arena.get(e).unwrap().is_dirty());
    }

    #[test]
    fn repeated_operand_takes_a_count_per_slot() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena, 1.0);
        let e = negate(&mut arena, a);
        arena.add_edge(e, a).unwrap();

        let node = arena.get(a).unwrap();
        assert_eq!(node.strong, 3);
        assert_eq!(node.required_by().len(), 1);
        assert_eq!(arena.get(e).unwrap().requires(), &[a, a]);
    }

    #[test]
    fn edge_to_newer_node_is_a_cycle() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena, 1.0);
        let e = negate(&mut arena, a);

        let err = arena.add_edge(a, e).unwrap_err();
        assert!(matches!(err, VarError::Cycle { dependent, operand } if dependent == a && operand == e));
        assert!(arena.get(a).unwrap().requires().is_empty());
    }

    #[test]
    fn missing_operand_is_caught_before_insertion() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena, 1.0);
        let b = leaf(&mut arena, 2.0);
        arena.release(a);
        arena.collect();

        let err = arena.check_operands(&[b, a]).unwrap_err();
        assert!(matches!(err, VarError::DanglingReference(id) if id == a));
        assert_eq!(arena.len(), 1);
        assert!(arena.check_operands(&[b, b]).is_ok());
    }

    #[test]
    fn checked_insertion_links_every_operand() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena, 1.0);
        let b = leaf(&mut arena, 2.0);
        let node = Node::expression(
            NodeKind::Unary(UnaryOp::negate()),
            SmallVec::new(),
            Shape::scalar(),
            Unit::dimensionless(),
            Category::Generic,
            true,
        );
        arena.check_operands(&[a, b, a]).unwrap();
        let e = arena.insert_expression(node, &[a, b, a]);

        assert_eq!(arena.get(e).unwrap().requires(), &[a, b, a]);
        assert_eq!(arena.get(a).unwrap().strong, 3);
        assert_eq!(arena.get(b).unwrap().strong, 2);
        assert!(arena.get(e).unwrap().serial > arena.get(b).unwrap().serial);
        assert!(arena.get(e).unwrap().is_dirty());
    }

    #[test]
    fn collect_cascades_and_compacts_lazily() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena, 1.0);
        let e = negate(&mut arena, a);
        let f = negate(&mut arena, e);

        // Dropping the handle to `e` leaves it owned by `f`.
        assert!(!arena.release(e));
        assert!(arena.collect().is_empty());

        assert!(arena.release(f));
        assert_eq!(arena.collect().len(), 2);
        assert!(!arena.contains(e));
        assert!(!arena.contains(f));

        // The stale back-edge survives until it is walked.
        assert!(arena.get(a).unwrap().required_by().contains(&e));
        assert!(arena.live_dependents(a).is_empty());
        assert!(arena.get(a).unwrap().required_by().is_empty());
        assert_eq!(arena.get(a).unwrap().strong, 1);
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena, 1.0);
        arena.release(a);
        arena.collect();

        let b = leaf(&mut arena, 2.0);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
    }
}
