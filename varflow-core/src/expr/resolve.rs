//! Compatibility Resolution
//!
//! Before an expression node is allocated, its operands are checked for
//! compatibility and the node's declared shape, unit, and category are
//! worked out. Checks run in a fixed order (shape, category, unit) and the
//! first failure aborts construction.

use super::category::Category;
use super::op::{BinaryOp, BinaryUnitRule, UnaryOp, UnaryUnitRule};
use crate::error::{Result, VarError};
use crate::value::{Shape, Unit};

/// What the resolver needs to know about an operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub shape: Shape,
    pub unit: Unit,
    pub category: Category,
}

/// Declared attributes of a node about to be built.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub shape: Shape,
    pub unit: Unit,
    pub category: Category,
    /// Every operand is dimensionless.
    pub fast_path: bool,
}

/// Common broadcast shape of two operands.
pub fn resolve_shape(left: &Shape, right: &Shape) -> Result<Shape> {
    Shape::broadcast(left, right).ok_or_else(|| VarError::ShapeMismatch {
        left: left.clone(),
        right: right.clone(),
    })
}

/// Result category of combining two operands.
pub fn resolve_category(left: Category, right: Category) -> Result<Category> {
    if right == Category::Constant {
        Ok(left)
    } else if left == Category::Constant {
        Ok(right)
    } else if left.is_subtype_of(right) {
        Ok(left)
    } else if right.is_subtype_of(left) {
        Ok(right)
    } else {
        Err(VarError::AmbiguousCombination { left, right })
    }
}

/// Shape of a reduction along `axis`.
pub fn resolve_axis(shape: &Shape, axis: usize) -> Result<Shape> {
    shape.without_axis(axis).ok_or_else(|| VarError::ShapeMismatch {
        left: shape.clone(),
        right: Shape::new(&vec![1; axis + 1]),
    })
}

/// Shape of a reshape; one requested dimension may be `-1`.
pub fn resolve_reshape(shape: &Shape, request: &[isize]) -> Result<Shape> {
    shape.reshaped(request)
}

/// Shape of a flat gather. Every index must address an element of `shape`.
pub fn resolve_take(shape: &Shape, indices: &[usize]) -> Result<Shape> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= shape.numel()) {
        return Err(VarError::InvalidArray(format!(
            "index {} out of range for shape {}",
            bad, shape
        )));
    }
    Ok(Shape::vector(indices.len()))
}

fn unit_mismatch(op: &str, left: Unit, right: Unit) -> VarError {
    VarError::UnitMismatch {
        op: op.to_string(),
        left,
        right,
    }
}

pub fn resolve_unary(
    op: &UnaryOp,
    operand: &Signature,
    shape_override: Option<Shape>,
) -> Result<Resolution> {
    let unit = operand.unit;
    let unit = match op.unit_rule() {
        UnaryUnitRule::Preserve => unit,
        UnaryUnitRule::Dimensionless if unit.is_dimensionless() => unit,
        UnaryUnitRule::Dimensionless => {
            return Err(unit_mismatch(op.symbol(), unit, Unit::dimensionless()))
        }
        UnaryUnitRule::Power(n) => unit
            .checked_powi(n)
            .ok_or_else(|| unit_mismatch(op.symbol(), unit, unit))?,
        UnaryUnitRule::Root(n) => unit
            .root(n)
            .ok_or_else(|| unit_mismatch(op.symbol(), unit, Unit::dimensionless()))?,
        UnaryUnitRule::Fixed(fixed) => fixed,
    };

    Ok(Resolution {
        shape: shape_override.unwrap_or_else(|| operand.shape.clone()),
        unit,
        category: operand.category,
        fast_path: operand.unit.is_dimensionless(),
    })
}

/// Resolve a binary operator. A shape override skips the broadcast check:
/// the operator then owns the shape of its result.
pub fn resolve_binary(
    op: &BinaryOp,
    left: &Signature,
    right: &Signature,
    shape_override: Option<Shape>,
) -> Result<Resolution> {
    let shape = match shape_override {
        Some(shape) => shape,
        None => resolve_shape(&left.shape, &right.shape)?,
    };
    let category = resolve_category(left.category, right.category)?;

    // `left` is always the node; reversed operators compute `f(right, left)`.
    let (a, b) = if op.is_reversed() {
        (right.unit, left.unit)
    } else {
        (left.unit, right.unit)
    };
    let unit = match op.unit_rule() {
        BinaryUnitRule::Match if a == b => a,
        BinaryUnitRule::Match => return Err(unit_mismatch(op.symbol(), a, b)),
        BinaryUnitRule::Multiply => a
            .checked_mul(b)
            .ok_or_else(|| unit_mismatch(op.symbol(), a, b))?,
        BinaryUnitRule::Divide => a
            .checked_div(b)
            .ok_or_else(|| unit_mismatch(op.symbol(), a, b))?,
        BinaryUnitRule::Dimensionless if a.is_dimensionless() && b.is_dimensionless() => a,
        BinaryUnitRule::Dimensionless => return Err(unit_mismatch(op.symbol(), a, b)),
        BinaryUnitRule::Fixed(fixed) => fixed,
    };

    Ok(Resolution {
        shape,
        unit,
        category,
        fast_path: left.unit.is_dimensionless() && right.unit.is_dimensionless(),
    })
}
