use std::collections::BTreeMap;

use reqwest::Method;

use crate::executor::pipeline::Stage;

/// A templated HTTP request whose response can be piped through external processes
#[derive(Debug, Clone)]
pub struct HttpAction {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: String,
    pub pipeline: Vec<Stage>,
}

/// A templated script run by `sh -c`
#[derive(Debug, Clone)]
pub struct ShellAction {
    pub script: String,
}

/// A program run directly, with base arguments placed before the runtime ones
#[derive(Debug, Clone)]
pub struct SystemAction {
    pub program: String,
    pub args: Vec<String>,
}

/// What invoking a node does
#[derive(Debug, Clone)]
pub enum Action {
    Http(HttpAction),
    Shell(ShellAction),
    System(SystemAction),
    /// Only holds subcommands
    Group,
}

impl Action {
    /// Whether every token after the command path is passed through untouched,
    /// flag-like or not.
    #[must_use]
    pub fn raw_args(&self) -> bool {
        matches!(self, Action::Shell(_) | Action::System(_))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Http(_) => "http",
            Action::Shell(_) => "shell",
            Action::System(_) => "system",
            Action::Group => "group",
        }
    }
}

/// A validated node of the command tree
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub name: String,
    pub usage: String,
    pub action: Action,
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&CommandNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Returns a flattened list of this node and all of its descendants
    #[must_use]
    pub fn all_nodes(&self) -> Vec<&CommandNode> {
        std::iter::once(self)
            .chain(self.children.iter().flat_map(CommandNode::all_nodes))
            .collect()
    }
}
