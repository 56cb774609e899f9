mod config;

use std::ffi::OsString;
use std::process::ExitCode;

use log::debug;

use cmdlink::cli::{self, Bootstrap, Invocation};
use cmdlink::commands::tree::CommandTree;
use cmdlink::executor::Executor;
use cmdlink::load_tree;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let bootstrap = Bootstrap::scan(&argv);

    let log_file = bootstrap
        .log_file
        .as_ref()
        .map(std::fs::File::create)
        .transpose()?;
    cmdlink::logger::init(log_file)?;

    // The config built-ins must work even when the config itself is broken.
    let builtin = bootstrap.command.as_deref() == Some("config");
    let tree = match load_tree(bootstrap.config.as_deref()) {
        Ok((tree, _)) => tree,
        Err(e) if builtin => {
            debug!("Ignoring config error for built-in command: {e}");
            CommandTree::default()
        }
        Err(e) => return Err(e.into()),
    };

    let (cli, invocation) = match cli::parse(&tree, &argv) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    match invocation {
        Some(Invocation::Builtin(cli::Builtin::Config(command))) => {
            config::run(&command, cli.config.as_deref())
        }
        Some(Invocation::Node { node, path, args }) => {
            debug!("Invoking '{}'", path.join(" "));
            let executor = Executor::new(tree.vars.clone());
            match executor.execute(node, &args).await {
                Ok(()) => Ok(ExitCode::SUCCESS),
                Err(e) => {
                    eprintln!("Execution failed: {e}");
                    let code = e
                        .exit_code()
                        .and_then(|code| u8::try_from(code).ok())
                        .filter(|code| *code != 0)
                        .map_or(ExitCode::FAILURE, ExitCode::from);
                    Ok(code)
                }
            }
        }
        None => {
            cli::build_command(&tree).print_help()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
