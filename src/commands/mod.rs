//! Command hierarchy
//!
//! Commands live in an arena-backed tree: each node knows its parent, so any command
//! can resolve its full invocation path and the top-level group it belongs to. Flags
//! declared persistent on a node are inherited by all of its descendants.

pub mod flags;
pub mod resolve;
pub mod tree;
