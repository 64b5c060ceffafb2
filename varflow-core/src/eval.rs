//! Evaluation Engine
//!
//! Values are pulled, never pushed. Reading a node returns its cached value
//! when the node is fresh and caching is on; otherwise the node is
//! recomputed from its operands, which are read through this same path, so
//! only the stale part of an expression tree is ever recomputed.
//!
//! # How Evaluation Works
//!
//! 1. A leaf returns its stored value.
//!
//! 2. A fresh expression with caching enabled returns its cached value.
//!
//! 3. Anything else evaluates each operand, applies the operator function,
//!    conforms the result to the declared shape, and checks it for
//!    non-finite entries.
//!
//! 4. The result is cached if caching is enabled (the cell is cleared
//!    otherwise) and the node is marked fresh.
//!
//! A failure at any step returns early: nothing is cached and the node stays
//! dirty, so a retry after fixing the inputs recomputes.

use smallvec::SmallVec;
use tracing::trace;

use crate::config::NonFinitePolicy;
use crate::error::{EvalError, Result, VarError};
use crate::graph::{propagate, Arena, NodeId, NodeKind};
use crate::value::Value;

/// Evaluate a node, recomputing it if necessary.
pub fn evaluate(arena: &mut Arena, id: NodeId) -> Result<Value> {
    let node = arena.get(id).ok_or(VarError::DanglingReference(id))?;
    let caching = arena.config().caching.caches(node.caching);

    if !node.is_leaf() && !node.cell.is_dirty() && caching {
        if let Some(value) = node.cell.read() {
            trace!(%id, "cache hit");
            return Ok(value.clone());
        }
    }

    let value = recompute(arena, id)?;

    let node = arena.get_mut(id).ok_or(VarError::DanglingReference(id))?;
    if !node.is_leaf() {
        if caching {
            node.cell.write(value.clone());
        } else {
            node.cell.clear();
        }
    }
    propagate::mark_fresh(arena, id);
    Ok(value)
}

/// Compute a node's value from its operands' current values.
fn recompute(arena: &mut Arena, id: NodeId) -> Result<Value> {
    let node = arena.get(id).ok_or(VarError::DanglingReference(id))?;
    let kind = match &node.kind {
        NodeKind::Leaf => {
            return node.cell.read().cloned().ok_or(VarError::DanglingReference(id));
        }
        kind => kind.clone(),
    };
    let requires = node.requires.clone();
    let shape = node.shape.clone();
    let unit = node.unit;
    let fast_path = node.fast_path;

    let mut operands: SmallVec<[Value; 2]> = SmallVec::with_capacity(requires.len());
    for operand in requires {
        let value = evaluate(arena, operand)?;
        if !fast_path {
            let declared = arena
                .get(operand)
                .ok_or(VarError::DanglingReference(operand))?
                .unit;
            if value.unit != declared {
                return Err(VarError::UnitMismatch {
                    op: kind.symbol().unwrap_or_default().to_string(),
                    left: declared,
                    right: value.unit,
                });
            }
        }
        operands.push(value);
    }

    let fail = |source: EvalError| VarError::Evaluation { node: id, source };
    let array = match (&kind, operands.as_slice()) {
        (NodeKind::Unary(op), [a]) => op.apply(&a.array),
        (NodeKind::Binary(op), [a, b]) => op.apply(&a.array, &b.array),
        _ => Err(EvalError::new(format!(
            "{:?} cannot take {} operands",
            kind,
            operands.len()
        ))),
    }
    .map_err(fail)?;

    let array = match array.broadcast_to(&shape) {
        Some(conformed) => conformed,
        None => {
            return Err(fail(EvalError::new(format!(
                "result shape {} does not conform to declared shape {}",
                array.shape(),
                shape
            ))))
        }
    };

    if arena.config().non_finite == NonFinitePolicy::Reject && !array.is_finite() {
        return Err(fail(EvalError::new("non-finite result")));
    }

    trace!(%id, fast_path, "recomputed");
    Ok(Value::new(array, unit))
}
