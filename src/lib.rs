//! Core implementation of cmdlink
//!
//! cmdlink turns a YAML (or JSON) file into a command-line tool. Each configured
//! command either sends a templated HTTP request, whose response can be streamed
//! through a chain of external processes, runs a shell script, or runs a program
//! directly. Config files can import each other and contribute subcommands to
//! the same groups.

use std::path::{Path, PathBuf};

use log::debug;

use crate::commands::tree::CommandTree;
use crate::config_file::ConfigError;

pub mod check;
pub mod cli;
pub mod commands;
pub mod config_file;
pub mod executor;
pub mod init_config;
pub mod logger;
pub mod template;

/// Load the configuration from a file (or auto-detect), returning the command tree
/// and the path of the root config file.
///
/// An explicit `config_file` must load. When auto-detection finds no file, the
/// tree is empty and no path is returned.
///
/// # Errors
///
/// Returns `ConfigError` if a config file cannot be read or parsed, or if its
/// imports form a cycle.
pub fn load_tree(config_file: Option<&Path>) -> Result<(CommandTree, Option<PathBuf>), ConfigError> {
    let config_path = match config_file {
        Some(file) => file.to_path_buf(),
        None => match config_file::find_config() {
            Ok(path) => path,
            Err(ConfigError::NotFound(dir)) => {
                debug!("No config file found from {}", dir.display());
                return Ok((CommandTree::default(), None));
            }
            Err(e) => return Err(e),
        },
    };
    debug!("Loading config file: {}", config_path.display());
    let resolved = config_file::load(&config_path)?;
    let tree = CommandTree::build(resolved);
    debug!(
        "Loaded {} top-level commands with {} issues",
        tree.roots.len(),
        tree.issues.len()
    );
    Ok((tree, Some(config_path)))
}
