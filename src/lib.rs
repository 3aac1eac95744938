//! Command hierarchy and hook sequencing for the peer command-line interface
//!
//! Commands are registered in a tree rooted at `peer` and grouped into `node`,
//! `network` and `chaincode`. Before any command runs, the root setup hook caches
//! configuration (once per dispatcher) and the owning group's hook scopes logging to
//! the group. The business operations themselves sit behind
//! [`operations::PeerOperations`].

pub mod cli;
pub mod commands;
pub mod config_file;
pub mod dispatch;
pub mod logger;
pub mod operations;
pub mod registry;
pub mod settings;
