//! Graphs and Variable Handles
//!
//! A [`Graph`] owns an arena of nodes behind a lock. A [`Variable`] is a
//! handle to one node: cloning it takes a strong count, dropping it gives
//! the count back, and the last drop makes the node (and any operands only
//! it kept alive) eligible for reclamation.
//!
//! # Thread Safety
//!
//! Handles are `Send + Sync`. Every operation locks the whole graph for its
//! duration, so work on one graph is serialized; separate graphs never
//! contend.
//!
//! # Reclamation
//!
//! With [`ReclaimPolicy::Eager`] the last drop of a handle collects right
//! away. With [`ReclaimPolicy::Manual`] unreachable nodes wait for
//! [`Graph::collect`]. Either way the removed nodes are dropped after the
//! lock is released, so operator closures that own handles can let go of
//! them without deadlocking.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::config::{EngineConfig, ReclaimPolicy};
use crate::error::{Result, VarError};
use crate::eval;
use crate::expr::Category;
use crate::graph::{propagate, Arena, Node, NodeId, NodeKind};
use crate::value::{Array, Shape, Unit, Value};

/// A dependency graph of variables.
///
/// Cloning a `Graph` yields another handle to the same graph.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<Mutex<Arena>>,
}

impl Graph {
    /// Create an empty graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty graph with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        debug!(?config, "graph created");
        Self {
            inner: Arc::new(Mutex::new(Arena::new(config))),
        }
    }

    pub fn config(&self) -> EngineConfig {
        *self.lock().config()
    }

    /// Start building a leaf holding `value`.
    ///
    /// ```
    /// use varflow_core::{Category, Graph, Unit};
    ///
    /// let graph = Graph::new();
    /// let x = graph
    ///     .leaf(vec![0.0, 0.5, 1.0])
    ///     .unit(Unit::meter())
    ///     .name("x")
    ///     .category(Category::CellField)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(x.to_string(), "x");
    /// ```
    pub fn leaf(&self, value: impl Into<Value>) -> LeafBuilder<'_> {
        LeafBuilder {
            graph: self,
            value: value.into(),
            unit: None,
            shape: None,
            name: String::new(),
            category: Category::Generic,
        }
    }

    /// Create a leaf, optionally tagging a unit and broadcasting the value
    /// to `shape`.
    pub fn create_leaf(
        &self,
        value: impl Into<Value>,
        unit: Option<Unit>,
        shape: Option<Shape>,
    ) -> Result<Variable> {
        let mut builder = self.leaf(value);
        builder.unit = unit;
        builder.shape = shape;
        builder.build()
    }

    /// Create a dimensionless scalar leaf.
    pub fn scalar(&self, value: f64) -> Variable {
        self.insert_leaf(Node::leaf(Value::from(value), Category::Generic))
    }

    /// Reclaim every unreachable node. Returns how many were removed.
    pub fn collect(&self) -> usize {
        let removed = self.lock().collect();
        removed.len()
    }

    /// Number of live nodes, including ones awaiting collection.
    pub fn node_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether two handles refer to the same graph.
    pub fn same_graph(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Arena> {
        self.inner.lock()
    }

    /// Wrap a node that has already been retained for the new handle.
    pub(crate) fn adopt(&self, id: NodeId) -> Variable {
        Variable {
            graph: self.clone(),
            id,
        }
    }

    fn insert_leaf(&self, node: Node) -> Variable {
        let id = {
            let mut arena = self.lock();
            let id = arena.insert(node);
            arena.retain(id);
            id
        };
        debug!(%id, "leaf created");
        self.adopt(id)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.lock();
        f.debug_struct("Graph")
            .field("nodes", &arena.len())
            .field("pending", &arena.pending())
            .field("config", arena.config())
            .finish()
    }
}

/// Builder for leaf variables. See [`Graph::leaf`].
#[must_use]
pub struct LeafBuilder<'g> {
    graph: &'g Graph,
    value: Value,
    unit: Option<Unit>,
    shape: Option<Shape>,
    name: String,
    category: Category,
}

impl<'g> LeafBuilder<'g> {
    /// Tag the value with a unit. A value that already carries a different
    /// non-trivial unit is rejected at build time.
    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Broadcast the value to `shape`.
    pub fn shape(mut self, shape: impl Into<Shape>) -> Self {
        self.shape = Some(shape.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn build(self) -> Result<Variable> {
        let mut value = self.value;
        if let Some(unit) = self.unit {
            if !value.unit.is_dimensionless() && value.unit != unit {
                return Err(VarError::UnitMismatch {
                    op: "leaf".to_string(),
                    left: unit,
                    right: value.unit,
                });
            }
            value.unit = unit;
        }
        if let Some(shape) = self.shape {
            value.array = value
                .array
                .broadcast_to(&shape)
                .ok_or_else(|| VarError::ShapeMismatch {
                    left: shape.clone(),
                    right: value.shape().clone(),
                })?;
        }

        let mut node = Node::leaf(value, self.category);
        node.name = self.name;
        Ok(self.graph.insert_leaf(node))
    }
}

/// Handle to a node in a [`Graph`].
pub struct Variable {
    graph: Graph,
    id: NodeId,
}

impl Variable {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Whether both handles point at the same node.
    pub fn is_same(&self, other: &Variable) -> bool {
        self.id == other.id && self.graph.same_graph(&other.graph)
    }

    /// Current value, recomputing stale parts of the expression if needed.
    pub fn value(&self) -> Result<Value> {
        eval::evaluate(&mut self.graph.lock(), self.id)
    }

    /// Replace a leaf's value and mark its dependents dirty.
    ///
    /// The value is broadcast to the leaf's shape. A dimensionless value is
    /// taken to be in the leaf's unit; any other unit must match exactly.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.write_leaf(|current, leaf_unit| {
            let incoming = conform(current.shape(), leaf_unit, value)?;
            Ok(Value::new(incoming, leaf_unit))
        })
    }

    /// Overwrite only the elements where `mask` is nonzero.
    pub fn set_value_where(&self, value: impl Into<Value>, mask: impl Into<Array>) -> Result<()> {
        let value = value.into();
        let mask = mask.into();
        self.write_leaf(|current, leaf_unit| {
            let incoming = conform(current.shape(), leaf_unit, value)?;
            let array = current.array.select(&mask, &incoming)?;
            Ok(Value::new(array, leaf_unit))
        })
    }

    /// Overwrite the elements at the given flat indices. A single value is
    /// written to every index.
    pub fn put(&self, indices: &[usize], values: &[f64]) -> Result<()> {
        self.write_leaf(|current, leaf_unit| {
            let mut array = current.array.clone();
            array.put(indices, values)?;
            Ok(Value::new(array, leaf_unit))
        })
    }

    fn write_leaf<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&Value, Unit) -> Result<Value>,
    {
        let mut arena = self.graph.lock();
        let node = arena
            .get_mut(self.id)
            .ok_or(VarError::DanglingReference(self.id))?;
        if !node.is_leaf() {
            return Err(VarError::NotALeaf(self.id));
        }
        let current = node
            .cell
            .read()
            .ok_or(VarError::DanglingReference(self.id))?;
        let value = update(current, node.unit)?;
        node.cell.write(value);
        node.cell.mark_fresh();

        let marked = propagate::mark_dependents_stale(&mut arena, self.id);
        trace!(id = %self.id, marked, "leaf updated");
        Ok(())
    }

    /// Turn caching on or off for this node, and with `recursive` for every
    /// node it transitively requires. Disabling drops cached values.
    pub fn set_caching(&self, enabled: bool, recursive: bool) {
        let mut arena = self.graph.lock();
        let mut stack = vec![self.id];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = arena.get_mut(id) else {
                continue;
            };
            node.caching = enabled;
            if !enabled && !node.is_leaf() {
                node.cell.clear();
            }
            if recursive {
                stack.extend(node.requires.iter().copied());
            }
        }
        debug!(id = %self.id, enabled, recursive, nodes = seen.len(), "caching changed");
    }

    /// Dependents that are still alive. Dead back-edges are compacted away.
    pub fn live_dependents(&self) -> Vec<NodeId> {
        self.graph.lock().live_dependents(self.id)
    }

    /// A new, independent leaf holding this variable's current value.
    pub fn copy(&self) -> Result<Variable> {
        let value = self.value()?;
        let (name, category) = self.read(|node| (node.name.clone(), node.category))?;
        self.graph
            .leaf(value)
            .name(name)
            .category(category)
            .build()
    }

    fn read<T>(&self, f: impl FnOnce(&Node) -> T) -> Result<T> {
        let arena = self.graph.lock();
        arena
            .get(self.id)
            .map(f)
            .ok_or(VarError::DanglingReference(self.id))
    }

    pub fn name(&self) -> String {
        self.read(|node| node.name.clone()).unwrap_or_default()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        if let Some(node) = self.graph.lock().get_mut(self.id) {
            node.name = name.into();
        }
    }

    pub fn shape(&self) -> Shape {
        self.read(|node| node.shape.clone()).unwrap_or_default()
    }

    pub fn unit(&self) -> Unit {
        self.read(|node| node.unit).unwrap_or_default()
    }

    pub fn category(&self) -> Category {
        self.read(|node| node.category).unwrap_or_default()
    }

    pub fn is_dirty(&self) -> bool {
        self.read(|node| node.is_dirty()).unwrap_or(true)
    }

    /// Effective caching: the node flag combined with the graph policy.
    pub fn is_caching(&self) -> bool {
        let arena = self.graph.lock();
        let policy = arena.config().caching;
        arena
            .get(self.id)
            .is_some_and(|node| policy.caches(node.caching))
    }

    pub fn is_leaf(&self) -> bool {
        self.read(|node| node.is_leaf()).unwrap_or(false)
    }

    /// Operands, in positional order.
    pub fn requires(&self) -> Vec<NodeId> {
        self.read(|node| node.requires.to_vec()).unwrap_or_default()
    }
}

/// Bring an incoming value to a leaf's shape and unit.
fn conform(shape: &Shape, leaf_unit: Unit, value: Value) -> Result<Array> {
    if !value.unit.is_dimensionless() && value.unit != leaf_unit {
        return Err(VarError::UnitMismatch {
            op: "set".to_string(),
            left: leaf_unit,
            right: value.unit,
        });
    }
    value
        .array
        .broadcast_to(shape)
        .ok_or_else(|| VarError::ShapeMismatch {
            left: shape.clone(),
            right: value.shape().clone(),
        })
}

impl Clone for Variable {
    fn clone(&self) -> Self {
        self.graph.lock().retain(self.id);
        Self {
            graph: self.graph.clone(),
            id: self.id,
        }
    }
}

impl Drop for Variable {
    fn drop(&mut self) {
        let removed = {
            let mut arena = self.graph.lock();
            if arena.release(self.id) && arena.config().reclaim == ReclaimPolicy::Eager {
                arena.collect()
            } else {
                Vec::new()
            }
        };
        drop(removed);
    }
}

/// Renders the expression a node computes. Named nodes render as their name.
fn render(arena: &Arena, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(node) = arena.get(id) else {
        return write!(f, "<{}>", id);
    };
    if !node.name.is_empty() {
        return f.write_str(&node.name);
    }
    match (&node.kind, node.requires.as_slice()) {
        (NodeKind::Leaf, _) => match node.cell.read() {
            Some(value) => write!(f, "{}", value.array),
            None => write!(f, "<{}>", id),
        },
        (NodeKind::Unary(op), [operand]) if op.symbol() == "-" => {
            f.write_str("(-")?;
            render(arena, *operand, f)?;
            f.write_str(")")
        }
        (NodeKind::Unary(op), [operand]) => {
            write!(f, "{}(", op.symbol())?;
            render(arena, *operand, f)?;
            f.write_str(")")
        }
        (NodeKind::Binary(op), [left, right]) => {
            let (left, right) = if op.is_reversed() {
                (right, left)
            } else {
                (left, right)
            };
            f.write_str("(")?;
            render(arena, *left, f)?;
            write!(f, " {} ", op.symbol())?;
            render(arena, *right, f)?;
            f.write_str(")")
        }
        (kind, _) => write!(f, "<{:?} {}>", kind, id),
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(&self.graph.lock(), self.id, f)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.graph.lock();
        let mut s = f.debug_struct("Variable");
        s.field("id", &self.id);
        if let Some(node) = arena.get(self.id) {
            s.field("kind", node.kind())
                .field("name", &node.name)
                .field("shape", &node.shape)
                .field("unit", &node.unit)
                .field("category", &node.category)
                .field("dirty", &node.is_dirty())
                .field("caching", &node.caching)
                .field("requires", &node.requires());
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CachingPolicy;

    #[test]
    fn leaf_get_and_set() {
        let graph = Graph::new();
        let a = graph.scalar(0.0);
        assert_eq!(a.value().unwrap(), Value::from(0.0));

        a.set_value(42.0).unwrap();
        assert_eq!(a.value().unwrap(), Value::from(42.0));
        assert!(!a.is_dirty());
    }

    #[test]
    fn clone_shares_the_node() {
        let graph = Graph::new();
        let a = graph.scalar(0.0);
        let b = a.clone();
        assert!(a.is_same(&b));

        a.set_value(42.0).unwrap();
        assert_eq!(b.value().unwrap(), Value::from(42.0));

        drop(a);
        assert_eq!(graph.node_count(), 1);
        drop(b);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn builder_applies_unit_shape_and_name() {
        let graph = Graph::new();
        let v = graph
            .leaf(2.0)
            .unit(Unit::meter())
            .shape([3])
            .name("depth")
            .category(Category::CellField)
            .build()
            .unwrap();

        assert_eq!(v.shape(), Shape::vector(3));
        assert_eq!(v.unit(), Unit::meter());
        assert_eq!(v.name(), "depth");
        assert_eq!(v.category(), Category::CellField);
        assert_eq!(v.value().unwrap().as_slice(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn builder_rejects_conflicting_unit_and_shape() {
        let graph = Graph::new();
        let seconds = Value::new(Array::scalar(1.0), Unit::second());
        assert!(matches!(
            graph.leaf(seconds).unit(Unit::meter()).build(),
            Err(VarError::UnitMismatch { .. })
        ));
        assert!(matches!(
            graph.create_leaf(vec![1.0, 2.0], None, Some(Shape::vector(3))),
            Err(VarError::ShapeMismatch { .. })
        ));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn set_value_checks_shape_and_unit() {
        let graph = Graph::new();
        let v = graph
            .create_leaf(vec![1.0, 2.0, 3.0], Some(Unit::meter()), None)
            .unwrap();

        v.set_value(0.5).unwrap();
        assert_eq!(v.value().unwrap().as_slice(), &[0.5, 0.5, 0.5]);
        assert_eq!(v.value().unwrap().unit, Unit::meter());

        assert!(matches!(v.set_value(vec![1.0, 2.0]), Err(VarError::ShapeMismatch { .. })));
        let seconds = Value::new(Array::scalar(1.0), Unit::second());
        assert!(matches!(v.set_value(seconds), Err(VarError::UnitMismatch { .. })));
        assert_eq!(v.value().unwrap().as_slice(), &[0.5, 0.5, 0.5]);
    }

    #[test]
    fn put_writes_flat_indices() {
        let graph = Graph::new();
        let v = graph.create_leaf(vec![0.0; 4], None, None).unwrap();
        v.put(&[1, 3], &[7.0]).unwrap();
        assert_eq!(v.value().unwrap().as_slice(), &[0.0, 7.0, 0.0, 7.0]);
        assert!(matches!(v.put(&[9], &[1.0]), Err(VarError::InvalidArray(_))));
    }

    #[test]
    fn expressions_cannot_be_set() {
        let graph = Graph::new();
        let a = graph.scalar(1.0);
        let b = (&a + 1.0).unwrap();
        assert!(matches!(b.set_value(3.0), Err(VarError::NotALeaf(id)) if id == b.id()));
        assert!(!b.is_leaf());
        assert_eq!(b.requires().len(), 2);
    }

    #[test]
    fn disabling_caching_clears_cached_values() {
        let graph = Graph::new();
        let a = graph.scalar(1.0);
        let b = (&a * 2.0).unwrap();
        let c = (&b + 1.0).unwrap();
        c.value().unwrap();

        c.set_caching(false, true);
        assert!(!c.is_caching());
        assert!(!b.is_caching());
        assert!(graph.lock().get(b.id()).unwrap().cached().is_none());
        assert_eq!(a.value().unwrap(), Value::from(1.0));
        assert_eq!(c.value().unwrap(), Value::from(3.0));

        c.set_caching(true, false);
        assert!(c.is_caching());
        assert!(!b.is_caching());
    }

    #[test]
    fn is_caching_reflects_policy() {
        let graph = Graph::with_config(EngineConfig::default().with_caching(CachingPolicy::Never));
        let a = graph.scalar(1.0);
        assert!(!a.is_caching());
    }

    #[test]
    fn copy_is_independent() {
        let graph = Graph::new();
        let a = graph.leaf(2.0).name("a").build().unwrap();
        let b = (&a * 3.0).unwrap();
        let frozen = b.copy().unwrap();

        assert!(frozen.is_leaf());
        a.set_value(10.0).unwrap();
        assert_eq!(frozen.value().unwrap(), Value::from(6.0));
        assert!(frozen.live_dependents().is_empty());
    }

    #[test]
    fn display_renders_expression() {
        let graph = Graph::new();
        let x = graph.leaf(1.0).name("x").build().unwrap();
        let y = graph.leaf(2.0).name("y").build().unwrap();

        assert_eq!((&x + 4.0).unwrap().to_string(), "(x + 4)");
        assert_eq!((4.0 - &x).unwrap().to_string(), "(4 - x)");
        assert_eq!((-&(&x * &y).unwrap()).unwrap().to_string(), "(-(x * y))");
        assert_eq!(crate::ops::sqrt(&x).unwrap().to_string(), "sqrt(x)");

        let named = (&x / &y).unwrap();
        named.set_name("ratio");
        assert_eq!(named.to_string(), "ratio");
        assert_eq!(graph.scalar(3.0).to_string(), "3");
    }

    #[test]
    fn debug_shows_node_state() {
        let graph = Graph::new();
        let a = graph.leaf(1.0).name("a").build().unwrap();
        let out = format!("{:?}", a);
        assert!(out.contains("Variable"));
        assert!(out.contains("Leaf"));
        assert!(out.contains("dirty: false"));
    }

    #[test]
    fn manual_reclaim_waits_for_collect() {
        let graph = Graph::with_config(EngineConfig::default().with_reclaim(ReclaimPolicy::Manual));
        let a = graph.scalar(1.0);
        let b = (&a + 1.0).unwrap();
        drop(b);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.collect(), 2);
        assert_eq!(graph.node_count(), 1);
        assert!(a.live_dependents().is_empty());
    }
}
