//! Pure task-graph algorithms.
//!
//! # Responsibility
//! - Hold task dependencies in an index-based arena detached from storage.
//! - Detect cycles, order tasks topologically and run forward/backward
//!   scheduling passes.
//!
//! # Invariants
//! - Edges point from a task to the task it depends on.
//! - Every algorithm here is linear in nodes plus edges (topological order
//!   adds a `log V` factor for deterministic tie-breaking).
//! - Nothing in this module touches the database.

pub mod arena;
pub mod schedule;
pub mod validator;
