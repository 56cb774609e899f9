//! Command-line surface: fixed options and built-ins plus the configured tree
//!
//! The configured commands are only known at runtime, so the clap command built
//! from the [`Cli`] derive is extended with one subcommand per tree node before
//! parsing. Shell and system leaves take every remaining token verbatim.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::commands::node::{Action, CommandNode};
use crate::commands::tree::CommandTree;

/// Id of the positional argument collecting a leaf's runtime args
const ARGS: &str = "args";

#[derive(Parser, Debug)]
#[command(
    name = "cmdlink",
    version,
    about = "Run HTTP calls, shell scripts and system commands declared in a YAML file",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Path to config file (auto-detected if not specified)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log file path (debug logs are written there in addition to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Builtin>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Builtin {
    /// Configuration tools (check, init)
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Check the configuration for syntax and logic errors
    Check,
    /// Write an example cmdlink.yaml to the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// What the command line asked for
#[derive(Debug)]
pub enum Invocation<'a> {
    Builtin(Builtin),
    Node {
        node: &'a CommandNode,
        path: Vec<String>,
        args: Vec<String>,
    },
}

/// Options that must be known before the command tree can be built
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Bootstrap {
    pub config: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    /// First token of the command path, if any
    pub command: Option<String>,
}

impl Bootstrap {
    /// Reads the leading options of `argv` (program name included) up to the first
    /// command name. Malformed options are left for the full parse to report.
    #[must_use]
    pub fn scan(argv: &[OsString]) -> Bootstrap {
        let mut bootstrap = Bootstrap::default();
        let mut tokens = argv.iter().skip(1).map(|t| t.to_string_lossy());
        while let Some(token) = tokens.next() {
            if let Some(value) = token.strip_prefix("--config=") {
                bootstrap.config = Some(PathBuf::from(value));
            } else if let Some(value) = token.strip_prefix("--log-file=") {
                bootstrap.log_file = Some(PathBuf::from(value));
            } else if token == "--config" || token == "-c" {
                bootstrap.config = tokens.next().map(|v| PathBuf::from(v.into_owned()));
            } else if token == "--log-file" {
                bootstrap.log_file = tokens.next().map(|v| PathBuf::from(v.into_owned()));
            } else if token == "--" || token.starts_with('-') {
                continue;
            } else {
                bootstrap.command = Some(token.into_owned());
                break;
            }
        }
        bootstrap
    }
}

/// Builds the full clap command: fixed options, built-ins and the configured tree.
#[must_use]
pub fn build_command(tree: &CommandTree) -> clap::Command {
    tree.roots
        .iter()
        .fold(Cli::command(), |command, node| {
            command.subcommand(node_command(node))
        })
}

fn node_command(node: &CommandNode) -> clap::Command {
    let mut command = clap::Command::new(node.name.clone())
        .about(node.usage.clone())
        .disable_help_subcommand(true);

    let args = Arg::new(ARGS)
        .value_name("ARGS")
        .num_args(0..)
        .action(ArgAction::Append)
        .help("Arguments available to templates as .args");
    command = match node.action {
        Action::Group => command
            .subcommand_required(true)
            .arg_required_else_help(true),
        ref action if action.raw_args() => command
            .disable_help_flag(true)
            .arg(args.trailing_var_arg(true).allow_hyphen_values(true)),
        _ => command.arg(args),
    };

    node.children.iter().fold(command, |command, child| {
        command.subcommand(node_command(child))
    })
}

/// Parses `argv` against the tree.
///
/// # Errors
///
/// Returns the `clap::Error` for invalid input, including the help and version
/// requests that clap reports as errors.
pub fn parse<I, T>(tree: &CommandTree, argv: I) -> Result<(Cli, Option<Invocation<'_>>), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command(tree).try_get_matches_from(argv)?;
    let mut cli = Cli::from_arg_matches(&matches)?;
    if let Some(builtin) = cli.command.take() {
        return Ok((cli, Some(Invocation::Builtin(builtin))));
    }
    Ok((cli, resolve(tree, &matches)))
}

fn resolve<'a>(tree: &'a CommandTree, matches: &ArgMatches) -> Option<Invocation<'a>> {
    let mut siblings = &tree.roots;
    let mut current = matches;
    let mut found: Option<&CommandNode> = None;
    let mut path = Vec::new();

    while let Some((name, sub)) = current.subcommand() {
        let Some(node) = siblings.iter().find(|n| n.name == name) else {
            break;
        };
        path.push(node.name.clone());
        found = Some(node);
        siblings = &node.children;
        current = sub;
    }

    let args = current
        .get_many::<String>(ARGS)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    found.map(|node| Invocation::Node { node, path, args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::node::{ShellAction, SystemAction};
    use std::collections::BTreeMap;

    fn leaf(name: &str, action: Action) -> CommandNode {
        CommandNode {
            name: name.to_string(),
            usage: format!("{name} usage"),
            action,
            children: vec![],
        }
    }

    fn tree() -> CommandTree {
        let ll = leaf(
            "ll",
            Action::System(SystemAction {
                program: "ls".to_string(),
                args: vec!["-l".to_string(), "-a".to_string()],
            }),
        );
        let info = leaf(
            "info",
            Action::Shell(ShellAction {
                script: "echo info".to_string(),
            }),
        );
        let status = leaf(
            "status",
            Action::Http(crate::commands::node::HttpAction {
                url: "http://localhost/status".to_string(),
                method: reqwest::Method::GET,
                headers: BTreeMap::new(),
                query: BTreeMap::new(),
                body: String::new(),
                pipeline: vec![],
            }),
        );
        let dev = CommandNode {
            name: "dev".to_string(),
            usage: "Developer tools".to_string(),
            action: Action::Group,
            children: vec![info, status],
        };
        CommandTree {
            roots: vec![ll, dev],
            ..Default::default()
        }
    }

    fn invoke(tree: &CommandTree, argv: &[&str]) -> (Vec<String>, Vec<String>) {
        let (_, invocation) = parse(tree, argv).unwrap();
        match invocation {
            Some(Invocation::Node { path, args, .. }) => (path, args),
            other => panic!("Expected a node invocation, got: {other:?}"),
        }
    }

    #[test]
    fn test_command_is_well_formed() {
        build_command(&tree()).debug_assert();
    }

    #[test]
    fn test_system_passes_flags_through() {
        let tree = tree();
        let (path, args) = invoke(&tree, &["cmdlink", "ll", "-G", "--help", "x"]);
        assert_eq!(path, vec!["ll"]);
        assert_eq!(args, vec!["-G", "--help", "x"]);
    }

    #[test]
    fn test_nested_shell_leaf() {
        let tree = tree();
        let (path, args) = invoke(&tree, &["cmdlink", "dev", "info", "-la"]);
        assert_eq!(path, vec!["dev", "info"]);
        assert_eq!(args, vec!["-la"]);
    }

    #[test]
    fn test_http_leaf_keeps_flag_parsing() {
        let tree = tree();
        let (path, args) = invoke(&tree, &["cmdlink", "dev", "status", "London"]);
        assert_eq!(path, vec!["dev", "status"]);
        assert_eq!(args, vec!["London"]);

        let err = parse(&tree, ["cmdlink", "dev", "status", "--bogus"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_group_without_subcommand_shows_help() {
        let err = parse(&tree(), ["cmdlink", "dev"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_builtins_and_options() {
        let tree = tree();
        let (cli, invocation) =
            parse(&tree, ["cmdlink", "--config", "x.yaml", "config", "init", "--force"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.yaml")));
        assert!(matches!(
            invocation,
            Some(Invocation::Builtin(Builtin::Config(ConfigCommand::Init { force: true })))
        ));
    }

    #[test]
    fn test_bootstrap_scan() {
        let argv: Vec<OsString> = ["cmdlink", "--log-file=/tmp/l", "-c", "a.yaml", "ll", "--config", "b"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(
            Bootstrap::scan(&argv),
            Bootstrap {
                config: Some(PathBuf::from("a.yaml")),
                log_file: Some(PathBuf::from("/tmp/l")),
                command: Some("ll".to_string()),
            }
        );
        assert_eq!(Bootstrap::scan(&[OsString::from("cmdlink")]), Bootstrap::default());
    }
}
