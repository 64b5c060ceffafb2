//! Varflow Core
//!
//! This crate provides a lazy evaluation and dependency tracking engine for
//! numerical variables. It implements:
//!
//! - Leaf variables holding arrays tagged with physical units
//! - Expression nodes built from operators over other variables
//! - Staleness propagation when a leaf changes
//! - Pull-based evaluation with per-node caching
//! - Shape, unit, and category checks when an expression is built
//!
//! The crate is designed to be used both as a native Rust library and, with
//! the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: arrays, shapes, and units
//! - `graph`: the node arena, its edges, and staleness propagation
//! - `expr`: operator descriptors and the compatibility resolver
//! - `eval`: the evaluation engine
//! - `ops`: building expression nodes
//! - `variable`: the `Graph` and `Variable` handles
//! - `persist`: leaf snapshots
//!
//! # Example
//!
//! ```rust
//! use varflow_core::{ops, Graph, Unit};
//!
//! let graph = Graph::new();
//! let distance = graph.leaf(vec![10.0, 20.0]).unit(Unit::meter()).name("d").build()?;
//! let time = graph.leaf(2.0).unit(Unit::second()).name("t").build()?;
//!
//! // Nothing is computed yet.
//! let speed = ops::divide(&distance, &time)?;
//! assert_eq!(speed.to_string(), "(d / t)");
//! assert_eq!(speed.unit().to_string(), "m/s");
//!
//! assert_eq!(speed.value()?.as_slice(), &[5.0, 10.0]);
//!
//! // Changing a leaf marks the expression stale; the next read recomputes.
//! time.set_value(5.0)?;
//! assert!(speed.is_dirty());
//! assert_eq!(speed.value()?.as_slice(), &[2.0, 4.0]);
//! # Ok::<(), varflow_core::VarError>(())
//! ```

pub mod config;
pub mod error;
pub mod eval;
pub mod expr;
pub mod graph;
pub mod ops;
pub mod persist;
pub mod value;
pub mod variable;

#[cfg(feature = "python")]
mod python;

pub use config::{CachingPolicy, EngineConfig, NonFinitePolicy, ReclaimPolicy};
pub use error::{EvalError, Result, VarError};
pub use expr::{BinaryOp, BinaryUnitRule, Category, UnaryOp, UnaryUnitRule};
pub use graph::NodeId;
pub use ops::Operand;
pub use persist::LeafSnapshot;
pub use value::{Array, Shape, Unit, Value};
pub use variable::{Graph, LeafBuilder, Variable};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyGraph>()?;
    m.add_class::<python::PyVariable>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
