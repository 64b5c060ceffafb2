//! Dependency Graph
//!
//! This module implements the graph of computation nodes and the
//! bookkeeping that keeps cached values honest.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are leaves (values set by their owner) or expressions (values
//!   computed from operand nodes)
//! - Edges are dependencies: if A requires B, A holds a strong count on B and
//!   B records A as a dependent
//!
//! When a leaf changes, we walk the dependent edges and mark every affected
//! node dirty. Nothing is recomputed at that point; the evaluation engine
//! recomputes dirty nodes when they are read.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a central arena addressed by generational ids rather
//!    than behind individual reference-counted pointers. Dependent edges are
//!    plain ids, so they can never keep a node alive.
//!
//! 2. Strong counts are kept explicitly in the arena, and reclamation is an
//!    arena collection pass instead of pointer decay.
//!
//! 3. We maintain both forward (requires) and reverse (required_by) edges
//!    to enable traversal in both directions.

mod arena;
mod cell;
mod node;
pub mod propagate;

pub use arena::Arena;
pub use cell::ValueCell;
pub use node::{Node, NodeId, NodeKind};
