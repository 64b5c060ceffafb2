//! Operator Descriptors
//!
//! An operator is a pure function over arrays plus the rule that decides
//! the unit of its result. The engine never looks inside the function: any
//! element-wise or reducing computation can be plugged in, and the built-in
//! arithmetic operators below are ordinary instances.
//!
//! Functions must be deterministic. The engine calls them while the graph
//! is locked, so they must not read or build graph nodes.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::EvalError;
use crate::value::{Array, Shape, Unit};

type UnaryFn = dyn Fn(&Array) -> Result<Array, EvalError> + Send + Sync;
type BinaryFn = dyn Fn(&Array, &Array) -> Result<Array, EvalError> + Send + Sync;

/// Unit of a unary operator's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryUnitRule {
    /// Same unit as the operand (negation, absolute value, reductions).
    Preserve,
    /// Operand must be dimensionless; so is the result (exp, trigonometry).
    Dimensionless,
    /// Operand unit raised to an integer power.
    Power(i32),
    /// Integer root of the operand unit; every exponent must divide evenly.
    Root(i32),
    /// Result has this unit whatever the operand.
    Fixed(Unit),
}

/// Unit of a binary operator's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryUnitRule {
    /// Operands must share a unit, which the result keeps (add, subtract).
    Match,
    /// Exponents add.
    Multiply,
    /// Exponents subtract.
    Divide,
    /// Both operands must be dimensionless (power with a runtime exponent).
    Dimensionless,
    /// Result has this unit whatever the operands.
    Fixed(Unit),
}

fn lift(err: crate::error::VarError) -> EvalError {
    EvalError::new(err.to_string())
}

fn elementwise(f: fn(f64, f64) -> f64) -> impl Fn(&Array, &Array) -> Result<Array, EvalError> {
    move |a, b| a.zip_with(b, f).map_err(lift)
}

/// A one-operand operator.
#[derive(Clone)]
pub struct UnaryOp {
    symbol: Cow<'static, str>,
    unit_rule: UnaryUnitRule,
    func: Arc<UnaryFn>,
}

impl UnaryOp {
    pub fn new<F>(symbol: impl Into<Cow<'static, str>>, unit_rule: UnaryUnitRule, func: F) -> Self
    where
        F: Fn(&Array) -> Result<Array, EvalError> + Send + Sync + 'static,
    {
        Self {
            symbol: symbol.into(),
            unit_rule,
            func: Arc::new(func),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn unit_rule(&self) -> UnaryUnitRule {
        self.unit_rule
    }

    pub fn apply(&self, operand: &Array) -> Result<Array, EvalError> {
        (self.func)(operand)
    }

    pub fn negate() -> Self {
        Self::new("-", UnaryUnitRule::Preserve, |a| Ok(a.map(|x| -x)))
    }

    pub fn abs() -> Self {
        Self::new("abs", UnaryUnitRule::Preserve, |a| Ok(a.map(f64::abs)))
    }

    pub fn sqrt() -> Self {
        Self::new("sqrt", UnaryUnitRule::Root(2), |a| Ok(a.map(f64::sqrt)))
    }

    pub fn exp() -> Self {
        Self::new("exp", UnaryUnitRule::Dimensionless, |a| Ok(a.map(f64::exp)))
    }

    pub fn powi(n: i32) -> Self {
        Self::new(format!("pow{}", n), UnaryUnitRule::Power(n), move |a| {
            Ok(a.map(|x| x.powi(n)))
        })
    }

    pub fn sum() -> Self {
        Self::new("sum", UnaryUnitRule::Preserve, |a| Ok(Array::scalar(a.sum())))
    }

    pub fn mean() -> Self {
        Self::new("mean", UnaryUnitRule::Preserve, |a| Ok(Array::scalar(a.mean())))
    }

    pub fn max() -> Self {
        Self::new("max", UnaryUnitRule::Preserve, |a| Ok(Array::scalar(a.max())))
    }

    pub fn min() -> Self {
        Self::new("min", UnaryUnitRule::Preserve, |a| Ok(Array::scalar(a.min())))
    }

    /// Sum along one axis, dropping it from the shape.
    pub fn sum_axis(axis: usize) -> Self {
        Self::new(format!("sum[axis={}]", axis), UnaryUnitRule::Preserve, move |a| {
            a.sum_axis(axis).map_err(lift)
        })
    }

    pub fn mean_axis(axis: usize) -> Self {
        Self::new(format!("mean[axis={}]", axis), UnaryUnitRule::Preserve, move |a| {
            a.mean_axis(axis).map_err(lift)
        })
    }

    pub fn max_axis(axis: usize) -> Self {
        Self::new(format!("max[axis={}]", axis), UnaryUnitRule::Preserve, move |a| {
            a.max_axis(axis).map_err(lift)
        })
    }

    pub fn min_axis(axis: usize) -> Self {
        Self::new(format!("min[axis={}]", axis), UnaryUnitRule::Preserve, move |a| {
            a.min_axis(axis).map_err(lift)
        })
    }

    pub fn reshape(shape: Shape) -> Self {
        Self::new("reshape", UnaryUnitRule::Preserve, move |a| {
            a.reshape(&shape).map_err(lift)
        })
    }

    /// Gather by flat index.
    pub fn take(indices: Vec<usize>) -> Self {
        Self::new("take", UnaryUnitRule::Preserve, move |a| {
            a.take(&indices).map_err(lift)
        })
    }
}

impl fmt::Debug for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryOp")
            .field("symbol", &self.symbol)
            .field("unit_rule", &self.unit_rule)
            .finish()
    }
}

/// A two-operand operator.
#[derive(Clone)]
pub struct BinaryOp {
    symbol: Cow<'static, str>,
    unit_rule: BinaryUnitRule,
    func: Arc<BinaryFn>,
    reversed: bool,
}

impl BinaryOp {
    pub fn new<F>(symbol: impl Into<Cow<'static, str>>, unit_rule: BinaryUnitRule, func: F) -> Self
    where
        F: Fn(&Array, &Array) -> Result<Array, EvalError> + Send + Sync + 'static,
    {
        Self {
            symbol: symbol.into(),
            unit_rule,
            func: Arc::new(func),
            reversed: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn unit_rule(&self) -> BinaryUnitRule {
        self.unit_rule
    }

    /// Whether the operands are swapped before the function is applied.
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// The same operator with its arguments swapped: `op.reversed()` applied
    /// to `(a, k)` computes `op(k, a)`. Used for `k - a` and `k / a`, where
    /// the node must stay the first operand.
    pub fn reversed(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }

    pub fn apply(&self, left: &Array, right: &Array) -> Result<Array, EvalError> {
        if self.reversed {
            (self.func)(right, left)
        } else {
            (self.func)(left, right)
        }
    }

    pub fn add() -> Self {
        Self::new("+", BinaryUnitRule::Match, elementwise(|a, b| a + b))
    }

    pub fn subtract() -> Self {
        Self::new("-", BinaryUnitRule::Match, elementwise(|a, b| a - b))
    }

    pub fn multiply() -> Self {
        Self::new("*", BinaryUnitRule::Multiply, elementwise(|a, b| a * b))
    }

    pub fn divide() -> Self {
        Self::new("/", BinaryUnitRule::Divide, elementwise(|a, b| a / b))
    }

    pub fn power() -> Self {
        Self::new("**", BinaryUnitRule::Dimensionless, elementwise(f64::powf))
    }
}

impl fmt::Debug for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryOp")
            .field("symbol", &self.symbol)
            .field("unit_rule", &self.unit_rule)
            .field("reversed", &self.reversed)
            .finish()
    }
}
