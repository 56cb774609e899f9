use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitConfigError {
    #[error("config file already exists at {0} (use --force to overwrite)")]
    ConfigExists(PathBuf),

    #[error("failed to write config: {0}")]
    Io(#[from] std::io::Error),
}

/// File name written by [`run`]
pub const CONFIG_FILENAME: &str = "cmdlink.yaml";

/// Starter configuration showing every command type
pub const EXAMPLE_CONFIG: &str = r#"# cmdlink configuration
#
# Run `cmdlink config check` after editing to validate this file.

# Other config files to merge in, relative to this file.
# imports:
#   - team.yaml

# Values for ${NAME} placeholders when NAME is not set in the environment.
vars:
  WEATHER_HOST: https://wttr.in

commands:
  - name: weather
    usage: Show the weather for a city
    type: http
    api:
      url: "${WEATHER_HOST}/{{index .args 0}}"
      method: GET
      query_params:
        format: "j1"
      headers:
        Accept: application/json
      pipes:
        - command: grep
          args: ["temp_C"]
        - command: head
          args: ["-n", "1"]

  - name: greet
    usage: Print a greeting
    type: shell
    script: 'echo "Hello, {{join .args ", "}}!"'

  - name: ll
    usage: List files, extra flags are passed to ls
    type: system
    command: ls
    args: ["-l", "-a"]

  - name: dev
    usage: Developer tools
    subcommands:
      - name: info
        usage: Show system information
        type: shell
        script: uname -a
      - name: disk
        usage: Show disk usage
        type: system
        command: df
        args: ["-h"]
"#;

/// Write the example configuration to `dir`.
///
/// # Errors
///
/// Returns `InitConfigError::ConfigExists` if the file already exists (unless
/// `force` is set), or `InitConfigError::Io` on write failure.
pub fn run(dir: &Path, force: bool) -> Result<PathBuf, InitConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    if path.exists() && !force {
        return Err(InitConfigError::ConfigExists(path));
    }
    std::fs::write(&path, EXAMPLE_CONFIG)?;
    Ok(path)
}
