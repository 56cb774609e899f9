use std::path::Path;
use std::process::ExitCode;

use cmdlink::cli::ConfigCommand;

/// Run a `config` built-in.
///
/// # Errors
///
/// Returns an error if the working directory is unknown or the example config
/// cannot be written.
pub fn run(
    command: &ConfigCommand,
    config_file: Option<&Path>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        ConfigCommand::Check => {
            let report = cmdlink::check::run(config_file);
            report.print();
            Ok(if report.is_valid() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        ConfigCommand::Init { force } => {
            let cwd = std::env::current_dir()?;
            let path = cmdlink::init_config::run(&cwd, *force)?;
            println!("Wrote example config to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}
