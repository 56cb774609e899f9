//! The command tree: validated nodes built from the resolved configuration
//!
//! Configured entries that share a name at the same level are merged before
//! validation, so several files can contribute subcommands to one group.

pub mod node;
pub mod tree;
