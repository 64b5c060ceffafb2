//! Staleness Propagation
//!
//! When a leaf changes, every node that transitively requires it must be
//! marked dirty before control returns to the caller. Propagation is push
//! only for the flag; values are pulled lazily on the next evaluation.
//!
//! # Algorithm
//!
//! ```text
//! mark_stale(node):
//!     if node.dirty: return      # its dependents were already marked
//!     node.dirty = true
//!     for dependent in live_dependents(node):
//!         mark_stale(dependent)
//! ```
//!
//! The walk uses an explicit queue rather than recursion, so deep chains
//! cannot exhaust the stack. A node that is already dirty is never expanded
//! again, which bounds the work by the number of edges leading into newly
//! dirtied nodes. Walking a node's dependents also compacts away back-edges
//! to reclaimed nodes.

use std::collections::VecDeque;

use tracing::trace;

use super::arena::Arena;
use super::node::NodeId;

/// Mark `id` and everything that depends on it dirty.
///
/// Returns the number of nodes that changed from fresh to dirty.
pub fn mark_stale(arena: &mut Arena, id: NodeId) -> usize {
    propagate(arena, VecDeque::from([id]))
}

/// Mark everything that depends on `id` dirty, leaving `id` itself alone.
///
/// Used after writing a leaf: the leaf holds the new value and is fresh,
/// only its dependents are stale.
pub fn mark_dependents_stale(arena: &mut Arena, id: NodeId) -> usize {
    let queue: VecDeque<NodeId> = arena.live_dependents(id).into();
    propagate(arena, queue)
}

/// Mark a single node fresh. Does not recurse: dependents become fresh only
/// when they are evaluated themselves.
pub fn mark_fresh(arena: &mut Arena, id: NodeId) {
    if let Some(node) = arena.get_mut(id) {
        node.cell.mark_fresh();
    }
}

fn propagate(arena: &mut Arena, mut queue: VecDeque<NodeId>) -> usize {
    let mut marked = 0;
    while let Some(id) = queue.pop_front() {
        match arena.get_mut(id) {
            Some(node) if !node.cell.is_dirty() => node.cell.mark_dirty(),
            _ => continue,
        }
        marked += 1;
        queue.extend(arena.live_dependents(id));
    }
    trace!(marked, "propagated staleness");
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Category, UnaryOp};
    use crate::graph::{Node, NodeKind};
    use crate::value::{Shape, Unit, Value};
    use smallvec::SmallVec;

    fn leaf(arena: &mut Arena) -> NodeId {
        let id = arena.insert(Node::leaf(Value::from(1.0), Category::Generic));
        arena.retain(id);
        id
    }

    fn negate(arena: &mut Arena, operands: &[NodeId]) -> NodeId {
        let node = Node::expression(
            NodeKind::Unary(UnaryOp::negate()),
            SmallVec::new(),
            Shape::scalar(),
            Unit::dimensionless(),
            Category::Generic,
            true,
        );
        arena.check_operands(operands).unwrap();
        let id = arena.insert_expression(node, operands);
        arena.retain(id);
        mark_fresh(arena, id);
        id
    }

    fn dirty(arena: &Arena, id: NodeId) -> bool {
        arena.get(id).unwrap().is_dirty()
    }

    #[test]
    fn mark_stale_propagates_through_chain() {
        let mut arena = Arena::default();
        let source = leaf(&mut arena);
        let derived1 = negate(&mut arena, &[source]);
        let derived2 = negate(&mut arena, &[derived1]);

        let marked = mark_dependents_stale(&mut arena, source);

        assert_eq!(marked, 2);
        assert!(!dirty(&arena, source));
        assert!(dirty(&arena, derived1));
        assert!(dirty(&arena, derived2));
    }

    #[test]
    fn diamond_marks_each_node_once() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena);
        let left = negate(&mut arena, &[a]);
        let right = negate(&mut arena, &[a]);
        let join = negate(&mut arena, &[left, right]);

        assert_eq!(mark_dependents_stale(&mut arena, a), 3);
        assert!(dirty(&arena, join));
    }

    #[test]
    fn dirty_node_is_not_expanded() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena);
        let b = negate(&mut arena, &[a]);
        let c = negate(&mut arena, &[b]);

        arena.get_mut(b).unwrap().cell.mark_dirty();
        assert_eq!(mark_stale(&mut arena, b), 0);
        assert!(!dirty(&arena, c));
    }

    #[test]
    fn mark_fresh_does_not_recurse() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena);
        let b = negate(&mut arena, &[a]);
        let c = negate(&mut arena, &[b]);

        mark_stale(&mut arena, b);
        mark_fresh(&mut arena, b);
        assert!(!dirty(&arena, b));
        assert!(dirty(&arena, c));
    }

    #[test]
    fn propagation_skips_reclaimed_dependents() {
        let mut arena = Arena::default();
        let a = leaf(&mut arena);
        let b = negate(&mut arena, &[a]);
        arena.release(b);
        arena.collect();

        assert_eq!(mark_dependents_stale(&mut arena, a), 0);
        assert!(arena.get(a).unwrap().required_by().is_empty());
    }
}
