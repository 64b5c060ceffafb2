//! Expressions
//!
//! Operator descriptors, node categories, and the compatibility resolver
//! that runs before an expression node is built. Building the node itself
//! happens in [`crate::ops`].

mod category;
mod op;
pub mod resolve;

pub use category::Category;
pub use op::{BinaryOp, BinaryUnitRule, UnaryOp, UnaryUnitRule};
pub use resolve::{Resolution, Signature};
