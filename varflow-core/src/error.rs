//! Error Types
//!
//! Every fallible operation in the crate returns [`VarError`]. Construction
//! errors (shape, unit, category) are raised before anything is allocated in
//! the graph, so a failed operator application leaves no partial state.
//! Evaluation errors are never cached: the failing node stays dirty and the
//! next read retries.

use thiserror::Error;

use crate::expr::Category;
use crate::graph::NodeId;
use crate::value::{Shape, Unit};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VarError>;

/// Errors raised while building, mutating, or evaluating the graph.
#[derive(Error, Debug)]
pub enum VarError {
    /// Shapes are incompatible. Raised when operands do not broadcast, when
    /// a reshape changes the element count, and when a reduction axis is out
    /// of range (then `right` is the smallest shape that has the axis).
    #[error("shape mismatch: {left} is incompatible with {right}")]
    ShapeMismatch { left: Shape, right: Shape },

    /// Physical dimensions are incompatible for the requested operator.
    #[error("unit mismatch in `{op}`: {left} vs {right}")]
    UnitMismatch { op: String, left: Unit, right: Unit },

    /// Neither operand category is a subtype of the other.
    #[error("cannot combine {left:?} with {right:?}: no common result category")]
    AmbiguousCombination { left: Category, right: Category },

    /// The operator function failed, or produced a value the engine rejects.
    #[error("evaluation of node {node} failed: {source}")]
    Evaluation {
        node: NodeId,
        #[source]
        source: EvalError,
    },

    /// A required operand no longer exists in the arena.
    #[error("node {0} is not present in the graph")]
    DanglingReference(NodeId),

    /// The edge would close a cycle in the requires graph.
    #[error("edge {dependent} -> {operand} would create a cycle")]
    Cycle { dependent: NodeId, operand: NodeId },

    /// Operands belong to different graphs.
    #[error("operands belong to different graphs")]
    GraphMismatch,

    /// The operation is only defined for leaf nodes.
    #[error("node {0} is not a leaf")]
    NotALeaf(NodeId),

    /// A unit string could not be parsed.
    #[error("invalid unit: {0}")]
    InvalidUnit(String),

    /// Array data does not match its declared shape, or an index is out of range.
    #[error("invalid array: {0}")]
    InvalidArray(String),

    /// Configuration could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Domain error reported by an operator function.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct EvalError {
    message: String,
}

impl EvalError {
    /// Create an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<rmp_serde::encode::Error> for VarError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        VarError::Persistence(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for VarError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        VarError::Persistence(err.to_string())
    }
}
