//! Expression Construction
//!
//! Every operator application goes through [`apply_unary`] or
//! [`apply_binary`]: the operands are resolved for compatibility, and only
//! then is a single expression node allocated and wired to its operands.
//! A failed check allocates nothing. No operand value is read here;
//! evaluation happens on the first [`Variable::value`] call.
//!
//! Right-hand operands that are not variables (numbers, arrays, values)
//! become implicit constant leaves owned only by the new node.
//!
//! ```
//! use varflow_core::{ops, Graph};
//!
//! let graph = Graph::new();
//! let a = graph.scalar(3.0);
//! let b = ops::add(&a, 4.0).unwrap();
//! assert_eq!(b.value().unwrap().to_scalar(), Some(7.0));
//!
//! a.set_value(10.0).unwrap();
//! assert!(b.is_dirty());
//! assert_eq!(b.value().unwrap().to_scalar(), Some(14.0));
//! ```

use std::borrow::Cow;
use std::ops::{Add, Div, Mul, Neg, Sub};

use smallvec::SmallVec;
use tracing::debug;

use crate::error::{EvalError, Result, VarError};
use crate::expr::resolve::{resolve_axis, resolve_binary, resolve_reshape, resolve_take, resolve_unary};
use crate::expr::{BinaryOp, BinaryUnitRule, Category, Signature, UnaryOp, UnaryUnitRule};
use crate::graph::{Arena, Node, NodeId, NodeKind};
use crate::value::{Array, Shape, Value};
use crate::variable::Variable;

/// Second operand of a binary operator.
pub enum Operand<'a> {
    /// An existing node.
    Node(&'a Variable),
    /// A raw value, wrapped as a constant leaf.
    Constant(Value),
}

impl<'a> From<&'a Variable> for Operand<'a> {
    fn from(v: &'a Variable) -> Self {
        Operand::Node(v)
    }
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Self {
        Operand::Constant(Value::from(v))
    }
}

impl From<Vec<f64>> for Operand<'_> {
    fn from(v: Vec<f64>) -> Self {
        Operand::Constant(Value::from(v))
    }
}

impl From<Array> for Operand<'_> {
    fn from(v: Array) -> Self {
        Operand::Constant(Value::from(v))
    }
}

impl From<Value> for Operand<'_> {
    fn from(v: Value) -> Self {
        Operand::Constant(v)
    }
}

fn signature(arena: &Arena, id: NodeId) -> Result<Signature> {
    let node = arena.get(id).ok_or(VarError::DanglingReference(id))?;
    Ok(Signature {
        shape: node.shape.clone(),
        unit: node.unit,
        category: node.category,
    })
}

/// Build a node applying `op` to `node`.
///
/// `shape_override` declares the result shape for operators that do not
/// preserve their operand's shape (reductions, for instance).
///
/// Operator closures may own handles, so `op` must not be dropped while the
/// graph is locked: every check runs before it moves into the node.
pub fn apply_unary(node: &Variable, op: UnaryOp, shape_override: Option<Shape>) -> Result<Variable> {
    let graph = node.graph();
    let operand = signature(&graph.lock(), node.id())?;
    let res = resolve_unary(&op, &operand, shape_override)?;

    let id = {
        let mut arena = graph.lock();
        arena.check_operands(&[node.id()])?;
        let expr = Node::expression(
            NodeKind::Unary(op),
            SmallVec::new(),
            res.shape,
            res.unit,
            res.category,
            res.fast_path,
        );
        let id = arena.insert_expression(expr, &[node.id()]);
        arena.retain(id);
        id
    };
    debug!(%id, operand = %node.id(), "unary node created");
    Ok(graph.adopt(id))
}

/// Build a node applying `op` to `node` and `other`, in that order.
///
/// With a `shape_override` the operands need not broadcast together; `op`
/// is then responsible for producing a result of the declared shape. As in
/// [`apply_unary`], `op` only moves into the node once every check passed.
pub fn apply_binary<'a>(
    node: &Variable,
    other: impl Into<Operand<'a>>,
    op: BinaryOp,
    shape_override: Option<Shape>,
) -> Result<Variable> {
    let other = other.into();
    let graph = node.graph();
    if let Operand::Node(v) = &other {
        if !v.graph().same_graph(graph) {
            return Err(VarError::GraphMismatch);
        }
    }

    let (left, right) = {
        let arena = graph.lock();
        let left = signature(&arena, node.id())?;
        let right = match &other {
            Operand::Node(v) => signature(&arena, v.id())?,
            Operand::Constant(value) => Signature {
                shape: value.shape().clone(),
                unit: value.unit,
                category: Category::Constant,
            },
        };
        (left, right)
    };
    let res = resolve_binary(&op, &left, &right, shape_override)?;

    let id = {
        let mut arena = graph.lock();
        match &other {
            Operand::Node(v) => arena.check_operands(&[node.id(), v.id()])?,
            Operand::Constant(_) => arena.check_operands(&[node.id()])?,
        }
        let right = match other {
            Operand::Node(v) => v.id(),
            Operand::Constant(value) => arena.insert(Node::leaf(value, Category::Constant)),
        };
        let expr = Node::expression(
            NodeKind::Binary(op),
            SmallVec::new(),
            res.shape,
            res.unit,
            res.category,
            res.fast_path,
        );
        let id = arena.insert_expression(expr, &[node.id(), right]);
        arena.retain(id);
        id
    };
    debug!(%id, operand = %node.id(), "binary node created");
    Ok(graph.adopt(id))
}

pub fn add<'a>(a: &Variable, b: impl Into<Operand<'a>>) -> Result<Variable> {
    apply_binary(a, b, BinaryOp::add(), None)
}

pub fn subtract<'a>(a: &Variable, b: impl Into<Operand<'a>>) -> Result<Variable> {
    apply_binary(a, b, BinaryOp::subtract(), None)
}

pub fn multiply<'a>(a: &Variable, b: impl Into<Operand<'a>>) -> Result<Variable> {
    apply_binary(a, b, BinaryOp::multiply(), None)
}

pub fn divide<'a>(a: &Variable, b: impl Into<Operand<'a>>) -> Result<Variable> {
    apply_binary(a, b, BinaryOp::divide(), None)
}

/// `k - a`, keeping `a` as the first operand.
pub fn reverse_subtract(a: &Variable, k: impl Into<Value>) -> Result<Variable> {
    apply_binary(a, k.into(), BinaryOp::subtract().reversed(), None)
}

/// `k / a`, keeping `a` as the first operand.
pub fn reverse_divide(a: &Variable, k: impl Into<Value>) -> Result<Variable> {
    apply_binary(a, k.into(), BinaryOp::divide().reversed(), None)
}

/// Element-wise power with a runtime exponent. Both operands must be
/// dimensionless; use [`powi`] for dimensioned bases.
pub fn power<'a>(a: &Variable, b: impl Into<Operand<'a>>) -> Result<Variable> {
    apply_binary(a, b, BinaryOp::power(), None)
}

pub fn negate(a: &Variable) -> Result<Variable> {
    apply_unary(a, UnaryOp::negate(), None)
}

pub fn abs(a: &Variable) -> Result<Variable> {
    apply_unary(a, UnaryOp::abs(), None)
}

/// Integer power. The unit's exponents are multiplied by `n`.
pub fn powi(a: &Variable, n: i32) -> Result<Variable> {
    apply_unary(a, UnaryOp::powi(n), None)
}

pub fn sqrt(a: &Variable) -> Result<Variable> {
    apply_unary(a, UnaryOp::sqrt(), None)
}

pub fn exp(a: &Variable) -> Result<Variable> {
    apply_unary(a, UnaryOp::exp(), None)
}

pub fn sum(a: &Variable) -> Result<Variable> {
    apply_unary(a, UnaryOp::sum(), Some(Shape::scalar()))
}

pub fn mean(a: &Variable) -> Result<Variable> {
    apply_unary(a, UnaryOp::mean(), Some(Shape::scalar()))
}

pub fn max(a: &Variable) -> Result<Variable> {
    apply_unary(a, UnaryOp::max(), Some(Shape::scalar()))
}

pub fn min(a: &Variable) -> Result<Variable> {
    apply_unary(a, UnaryOp::min(), Some(Shape::scalar()))
}

/// Sum along `axis`. The axis is removed from the result shape.
pub fn sum_axis(a: &Variable, axis: usize) -> Result<Variable> {
    let shape = resolve_axis(&a.shape(), axis)?;
    apply_unary(a, UnaryOp::sum_axis(axis), Some(shape))
}

pub fn mean_axis(a: &Variable, axis: usize) -> Result<Variable> {
    let shape = resolve_axis(&a.shape(), axis)?;
    apply_unary(a, UnaryOp::mean_axis(axis), Some(shape))
}

pub fn max_axis(a: &Variable, axis: usize) -> Result<Variable> {
    let shape = resolve_axis(&a.shape(), axis)?;
    apply_unary(a, UnaryOp::max_axis(axis), Some(shape))
}

pub fn min_axis(a: &Variable, axis: usize) -> Result<Variable> {
    let shape = resolve_axis(&a.shape(), axis)?;
    apply_unary(a, UnaryOp::min_axis(axis), Some(shape))
}

/// Same elements under a new shape. One dimension may be given as `-1`
/// and is inferred; the element count must not change.
pub fn reshape(a: &Variable, dims: &[isize]) -> Result<Variable> {
    let shape = resolve_reshape(&a.shape(), dims)?;
    apply_unary(a, UnaryOp::reshape(shape.clone()), Some(shape))
}

/// Gather elements by flat (row-major) index into a vector.
pub fn take(a: &Variable, indices: &[usize]) -> Result<Variable> {
    let shape = resolve_take(&a.shape(), indices)?;
    apply_unary(a, UnaryOp::take(indices.to_vec()), Some(shape))
}

/// Apply an arbitrary shape- and unit-preserving function.
pub fn map<F>(a: &Variable, symbol: impl Into<Cow<'static, str>>, f: F) -> Result<Variable>
where
    F: Fn(&Array) -> std::result::Result<Array, EvalError> + Send + Sync + 'static,
{
    apply_unary(a, UnaryOp::new(symbol, UnaryUnitRule::Preserve, f), None)
}

/// Combine two operands with an arbitrary function. The operands must share
/// a unit, which the result keeps.
pub fn zip<'a, F>(
    a: &Variable,
    b: impl Into<Operand<'a>>,
    symbol: impl Into<Cow<'static, str>>,
    f: F,
) -> Result<Variable>
where
    F: Fn(&Array, &Array) -> std::result::Result<Array, EvalError> + Send + Sync + 'static,
{
    apply_binary(a, b, BinaryOp::new(symbol, BinaryUnitRule::Match, f), None)
}

// ----------------------------------------------------------------------------
// Operator overloads
// ----------------------------------------------------------------------------

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $build:ident, $reverse:ident) => {
        impl<'a> $trait<&'a Variable> for &Variable {
            type Output = Result<Variable>;

            fn $method(self, rhs: &'a Variable) -> Self::Output {
                $build(self, rhs)
            }
        }

        impl $trait<f64> for &Variable {
            type Output = Result<Variable>;

            fn $method(self, rhs: f64) -> Self::Output {
                $build(self, rhs)
            }
        }

        impl $trait<&Variable> for f64 {
            type Output = Result<Variable>;

            fn $method(self, rhs: &Variable) -> Self::Output {
                $reverse(rhs, self)
            }
        }
    };
}

binary_operator!(Add, add, add, add);
binary_operator!(Sub, sub, subtract, reverse_subtract);
binary_operator!(Mul, mul, multiply, multiply);
binary_operator!(Div, div, divide, reverse_divide);

impl Neg for &Variable {
    type Output = Result<Variable>;

    fn neg(self) -> Self::Output {
        negate(self)
    }
}
