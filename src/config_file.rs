//! Configuration file handling for cmdlink
//!
//! A configuration document may pull in other documents through `imports`. Loading
//! resolves the whole import graph depth-first, rejects cycles, and folds every
//! document into a single [`ResolvedConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;


/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No config file found (searched from {0})")]
    NotFound(PathBuf),
    #[error("Unknown working directory: {0}")]
    UnknownWorkingDirectory(String),
    #[error("Unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Circular import detected at {0}")]
    CircularImport(PathBuf),
}

/// One process in an HTTP response pipeline
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct PipeSpec {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// HTTP request description for `type: http` commands
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ApiSpec {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub query_params: Option<BTreeMap<String, String>>,
    pub body: Option<String>,
    /// Legacy single-stage form, superseded by `pipes` when both are present
    pub pipe: Option<PipeSpec>,
    pub pipes: Option<Vec<PipeSpec>>,
}

impl ApiSpec {
    /// The effective pipeline stages: `pipes` when non-empty, else the legacy `pipe`.
    #[must_use]
    pub fn stages(&self) -> Vec<PipeSpec> {
        match (&self.pipes, &self.pipe) {
            (Some(pipes), _) if !pipes.is_empty() => pipes.clone(),
            (_, Some(pipe)) if !pipe.command.is_empty() || !pipe.args.is_empty() => {
                vec![pipe.clone()]
            }
            _ => Vec::new(),
        }
    }
}

/// Configuration for a single command or command group, as written in the file
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CommandSpec {
    pub name: Option<String>,
    pub usage: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub subcommands: Vec<CommandSpec>,
    pub api: Option<ApiSpec>,
    pub script: Option<String>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
}

impl CommandSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// A single configuration document before imports are resolved
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Document {
    pub imports: Option<Vec<PathBuf>>,
    pub vars: Option<BTreeMap<String, String>>,
    pub commands: Option<Vec<CommandSpec>>,
}

impl Document {
    /// Parses a single document, choosing JSON or YAML from the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Document, ConfigError> {
        let contents = std::fs::read_to_string(file).map_err(|e| ConfigError::Read {
            path: file.to_path_buf(),
            source: e,
        })?;
        if contents.trim().is_empty() {
            return Ok(Document::default());
        }
        let document: Document = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(document)
    }
}

/// The merged result of a configuration file and everything it imports
#[derive(Debug, Default, Clone)]
pub struct ResolvedConfig {
    pub commands: Vec<CommandSpec>,
    pub vars: BTreeMap<String, String>,
}

impl ResolvedConfig {
    fn merge(&mut self, vars: BTreeMap<String, String>, commands: Vec<CommandSpec>) {
        self.vars.extend(vars);
        self.commands.extend(commands);
    }
}

/// Loads `path` and its imports into one configuration.
///
/// Imports are merged in declared order and the importing document last, so its
/// `vars` win on collision and its `commands` come after the imported ones.
///
/// # Errors
///
/// Returns `ConfigError::Read` or a parse error for any file in the import graph,
/// and `ConfigError::CircularImport` if a file imports itself, directly or not.
pub fn load(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    load_recursive(path, &[])
}

fn load_recursive(path: &Path, stack: &[PathBuf]) -> Result<ResolvedConfig, ConfigError> {
    let path = path.canonicalize().map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    if stack.contains(&path) {
        return Err(ConfigError::CircularImport(path));
    }
    debug!("Loading config file {}", path.display());

    let document = Document::from_file(&path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("/"));

    let mut visiting = stack.to_vec();
    visiting.push(path.clone());

    let mut resolved = ResolvedConfig::default();
    for import in document.imports.unwrap_or_default() {
        let import_path = if import.is_absolute() {
            import
        } else {
            base_dir.join(import)
        };
        let imported = load_recursive(&import_path, &visiting)?;
        resolved.merge(imported.vars, imported.commands);
    }
    resolved.merge(
        document.vars.unwrap_or_default(),
        document.commands.unwrap_or_default(),
    );
    Ok(resolved)
}

/// Environment variable that points at a config file, bypassing discovery
pub const CONFIG_ENV: &str = "CMDLINK_CONFIG";

/// Config file names looked up in the working directory and its parents
const FILENAMES: [&str; 3] = ["cmdlink.yaml", ".cmdlink.yaml", "cmdlink.json"];

/// Locates the configuration file to use when none was given on the command line.
///
/// Order: `$CMDLINK_CONFIG`, `~/.config/cmdlink/cmdlink.yaml`, the working directory
/// and its parents, then `~/.cmdlink.yaml`.
///
/// # Errors
///
/// Returns `ConfigError::UnknownWorkingDirectory` if the cwd cannot be determined,
/// or `ConfigError::NotFound` if no config file is found.
pub fn find_config() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        let path = PathBuf::from(path);
        debug!("Using config from ${CONFIG_ENV}: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir();
    if let Some(path) = home
        .as_ref()
        .map(|h| h.join(".config").join("cmdlink").join("cmdlink.yaml"))
        .filter(|p| p.exists())
    {
        info!("Found config file: {}", path.display());
        return Ok(path);
    }

    let cwd = std::env::current_dir()
        .map_err(|e| ConfigError::UnknownWorkingDirectory(e.to_string()))?;
    let mut dir = cwd.clone();
    debug!("Searching for config file in {}", cwd.display());
    loop {
        for file in &FILENAMES {
            let candidate = dir.join(file);
            if candidate.exists() {
                info!("Found config file: {}", candidate.display());
                return Ok(candidate);
            }
        }
        if !dir.pop() {
            break;
        }
    }

    if let Some(path) = home
        .map(|h| h.join(".cmdlink.yaml"))
        .filter(|p| p.exists())
    {
        info!("Found config file: {}", path.display());
        return Ok(path);
    }

    Err(ConfigError::NotFound(cwd))
}
