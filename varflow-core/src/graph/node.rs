//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::cell::ValueCell;
use crate::expr::{BinaryOp, Category, UnaryOp};
use crate::value::{Shape, Unit, Value};

/// Handle to a node slot in the arena.
///
/// The generation distinguishes a node from a later node that reuses the
/// same slot, so a stale id never resolves to the wrong node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this node was created.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// What a node computes.
#[derive(Clone)]
pub enum NodeKind {
    /// Holds a value set directly by its owner. Has no operands.
    Leaf,

    /// Applies a function to one operand.
    Unary(UnaryOp),

    /// Applies a function to two operands.
    Binary(BinaryOp),
}

impl NodeKind {
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Leaf)
    }

    /// Operator symbol, or `None` for leaves.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            NodeKind::Leaf => None,
            NodeKind::Unary(op) => Some(op.symbol()),
            NodeKind::Binary(op) => Some(op.symbol()),
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Leaf => write!(f, "Leaf"),
            NodeKind::Unary(op) => write!(f, "Unary({})", op.symbol()),
            NodeKind::Binary(op) => write!(f, "Binary({})", op.symbol()),
        }
    }
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,

    /// User-facing label. Empty when unnamed.
    pub(crate) name: String,

    pub(crate) category: Category,

    /// Declared shape. For leaves, the shape of the stored value; for
    /// expressions, the shape resolved at construction.
    pub(crate) shape: Shape,

    /// Declared unit, fixed at construction.
    pub(crate) unit: Unit,

    pub(crate) cell: ValueCell,

    /// Per-node caching flag, combined with the graph's caching policy.
    pub(crate) caching: bool,

    /// All operands are dimensionless, so evaluation can skip unit checks.
    pub(crate) fast_path: bool,

    /// Operands, in positional order. Each slot holds one strong count on
    /// its operand.
    pub(crate) requires: SmallVec<[NodeId; 2]>,

    /// Nodes that require this one. Not owning; entries may point at
    /// reclaimed nodes until compacted.
    pub(crate) required_by: IndexSet<NodeId>,

    /// Handles plus `requires` slots of live nodes that point here.
    pub(crate) strong: usize,

    /// Creation order. An operand is always older than its dependents.
    pub(crate) serial: u64,
}

impl Node {
    /// Create a leaf holding `value`. Leaves are born fresh.
    pub fn leaf(value: Value, category: Category) -> Self {
        Self {
            kind: NodeKind::Leaf,
            name: String::new(),
            category,
            shape: value.shape().clone(),
            unit: value.unit,
            cell: ValueCell::fresh(value),
            caching: true,
            fast_path: true,
            requires: SmallVec::new(),
            required_by: IndexSet::new(),
            strong: 0,
            serial: 0,
        }
    }

    /// Create an expression node. Expressions are born dirty: nothing is
    /// cached until the first evaluation.
    pub fn expression(
        kind: NodeKind,
        requires: SmallVec<[NodeId; 2]>,
        shape: Shape,
        unit: Unit,
        category: Category,
        fast_path: bool,
    ) -> Self {
        Self {
            kind,
            name: String::new(),
            category,
            shape,
            unit,
            cell: ValueCell::dirty(),
            caching: true,
            fast_path,
            requires,
            required_by: IndexSet::new(),
            strong: 0,
            serial: 0,
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn is_dirty(&self) -> bool {
        self.cell.is_dirty()
    }

    pub fn caching(&self) -> bool {
        self.caching
    }

    /// Operands this node depends on.
    pub fn requires(&self) -> &[NodeId] {
        &self.requires
    }

    /// Recorded dependents, including ones that may since have been reclaimed.
    pub fn required_by(&self) -> &IndexSet<NodeId> {
        &self.required_by
    }

    /// Cached value, if any.
    pub fn cached(&self) -> Option<&Value> {
        self.cell.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_node_starts_fresh() {
        let node = Node::leaf(Value::from(3.0), Category::Generic);
        assert!(node.is_leaf());
        assert!(!node.is_dirty());
        assert_eq!(node.cached(), Some(&Value::from(3.0)));
        assert_eq!(node.shape(), &Shape::scalar());
    }

    #[test]
    fn expression_node_starts_dirty() {
        let op = UnaryOp::negate();
        let node = Node::expression(
            NodeKind::Unary(op),
            SmallVec::from_slice(&[NodeId::new(0, 0)]),
            Shape::scalar(),
            Unit::dimensionless(),
            Category::Generic,
            true,
        );
        assert!(!node.is_leaf());
        assert!(node.is_dirty());
        assert!(node.cached().is_none());
        assert_eq!(node.kind().symbol(), Some("-"));
        assert_eq!(node.requires(), &[NodeId::new(0, 0)]);
    }

    #[test]
    fn node_ids_compare_by_generation() {
        let a = NodeId::new(4, 0);
        let b = NodeId::new(4, 1);
        assert_ne!(a, b);
        assert_eq!(a.index(), b.index());
        assert_eq!(b.to_string(), "#4v1");
    }
}
