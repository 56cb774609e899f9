use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use reqwest::Method;

use crate::commands::node::{Action, CommandNode, HttpAction, ShellAction, SystemAction};
use crate::config_file::{ApiSpec, CommandSpec, ResolvedConfig};
use crate::executor::pipeline::Stage;

/// Top-level names taken by built-in commands
pub const RESERVED_NAMES: [&str; 2] = ["config", "help"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A defect found while building the tree, located by its breadcrumb path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The runnable command tree built from a resolved configuration
#[derive(Debug, Default)]
pub struct CommandTree {
    pub roots: Vec<CommandNode>,
    pub vars: BTreeMap<String, String>,
    pub issues: Vec<ValidationIssue>,
}

impl CommandTree {
    /// Builds the tree, merging same-named siblings and validating every node.
    ///
    /// Invalid nodes are left out of the tree; every defect found anywhere in the
    /// configuration is kept in `issues`.
    #[must_use]
    pub fn build(config: ResolvedConfig) -> CommandTree {
        let mut builder = Builder::default();
        let mut roots = Vec::new();
        for (i, spec) in merge_siblings(config.commands).into_iter().enumerate() {
            if RESERVED_NAMES.contains(&spec.name()) {
                builder.push(
                    &[breadcrumb_segment(&spec, i)],
                    Severity::Warning,
                    format!("'{}' is a built-in command and is ignored", spec.name()),
                );
                continue;
            }
            roots.extend(builder.convert(spec, i, &[]));
        }

        for issue in &builder.issues {
            warn!("Invalid command {issue}");
        }
        CommandTree {
            roots,
            vars: config.vars,
            issues: builder.issues,
        }
    }

    /// Resolves a command path such as `["dev", "info"]`.
    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<&CommandNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.iter().find(|n| n.name == *first)?;
        for name in rest {
            node = node.child(name)?;
        }
        Some(node)
    }

    #[must_use]
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .collect()
    }
}

/// Merges same-named siblings, keeping the first occurrence in place.
///
/// A later duplicate with subcommands has them appended to the first occurrence;
/// its own type and fields are discarded. A later duplicate without subcommands
/// is dropped. Nameless entries are never merged.
#[must_use]
pub fn merge_siblings(specs: Vec<CommandSpec>) -> Vec<CommandSpec> {
    let mut merged: Vec<CommandSpec> = Vec::with_capacity(specs.len());
    for spec in specs {
        let existing = if spec.name().is_empty() {
            None
        } else {
            merged.iter_mut().find(|m| m.name() == spec.name())
        };
        match existing {
            Some(_) if spec.subcommands.is_empty() => {
                debug!("Dropping duplicate command '{}'", spec.name());
            }
            Some(existing) => {
                debug!(
                    "Merging {} subcommands into existing command '{}'",
                    spec.subcommands.len(),
                    existing.name()
                );
                existing.subcommands.extend(spec.subcommands);
            }
            None => merged.push(spec),
        }
    }
    merged
}

fn breadcrumb_segment(spec: &CommandSpec, index: usize) -> String {
    if spec.name().trim().is_empty() {
        format!("#{}", index + 1)
    } else {
        spec.name().to_string()
    }
}

#[derive(Default)]
struct Builder {
    issues: Vec<ValidationIssue>,
}

impl Builder {
    fn push(&mut self, path: &[String], severity: Severity, message: String) {
        self.issues.push(ValidationIssue {
            path: path.join(" -> "),
            message,
            severity,
        });
    }

    fn error(&mut self, path: &[String], message: String) {
        self.push(path, Severity::Error, message);
    }

    fn convert(
        &mut self,
        spec: CommandSpec,
        index: usize,
        parent: &[String],
    ) -> Option<CommandNode> {
        let mut path = parent.to_vec();
        path.push(breadcrumb_segment(&spec, index));

        let issues_before = self.issues.len();
        let has_subcommands = !spec.subcommands.is_empty();
        let children: Vec<CommandNode> = merge_siblings(spec.subcommands)
            .into_iter()
            .enumerate()
            .filter_map(|(i, child)| self.convert(child, i, &path))
            .collect();
        let children_issues = self.issues.len() - issues_before;

        let name = spec.name.unwrap_or_default();
        if name.trim().is_empty() {
            self.error(&path, "'name' is required".to_string());
            return None;
        }

        let own_errors = self.issues.len();
        let kind = spec.kind.as_deref().map(str::trim).unwrap_or_default();
        let action = match kind {
            "" if has_subcommands => Some(Action::Group),
            "" => {
                self.error(
                    &path,
                    "has no type and no subcommands; type must be http, shell, or system"
                        .to_string(),
                );
                None
            }
            "http" => self.http_action(spec.api, &path),
            "shell" => match spec.script.filter(|s| !s.trim().is_empty()) {
                Some(script) => Some(Action::Shell(ShellAction { script })),
                None => {
                    self.error(&path, "type is shell but 'script' is missing".to_string());
                    None
                }
            },
            "system" => match spec.command.filter(|c| !c.trim().is_empty()) {
                Some(program) => Some(Action::System(SystemAction {
                    program,
                    args: spec.args.unwrap_or_default(),
                })),
                None => {
                    self.error(&path, "type is system but 'command' is missing".to_string());
                    None
                }
            },
            other => {
                self.error(
                    &path,
                    format!("invalid type '{other}'; must be http, shell, or system"),
                );
                None
            }
        };

        let invalid = self.issues[own_errors..]
            .iter()
            .any(|i| i.severity == Severity::Error);
        if invalid {
            debug!(
                "Leaving out '{}' ({} issues below it)",
                path.join(" -> "),
                children_issues
            );
            return None;
        }
        Some(CommandNode {
            name,
            usage: spec.usage.unwrap_or_default(),
            action: action?,
            children,
        })
    }

    fn http_action(&mut self, api: Option<ApiSpec>, path: &[String]) -> Option<Action> {
        let api = api.unwrap_or_default();
        let mut valid = true;

        let url = api.url.clone().unwrap_or_default();
        if url.trim().is_empty() {
            self.error(path, "type is http but 'api.url' is missing".to_string());
            valid = false;
        }

        let method_name = api
            .method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let method = match Method::from_bytes(method_name.as_bytes()) {
            Ok(method) => Some(method),
            Err(_) => {
                self.error(path, format!("invalid HTTP method '{method_name}'"));
                None
            }
        };

        let both_pipe_forms = api.pipe.as_ref().is_some_and(|p| !p.command.is_empty())
            && api.pipes.as_ref().is_some_and(|p| !p.is_empty());
        if both_pipe_forms {
            self.push(
                path,
                Severity::Warning,
                "both 'pipe' and 'pipes' are set; 'pipe' is ignored".to_string(),
            );
        }

        let stages = api.stages();
        for (i, stage) in stages.iter().enumerate() {
            if stage.command.trim().is_empty() {
                self.error(path, format!("pipeline stage {} has no 'command'", i + 1));
                valid = false;
            }
        }

        let method = method?;
        if !valid {
            return None;
        }
        Some(Action::Http(HttpAction {
            url,
            method,
            headers: api.headers.unwrap_or_default(),
            query: api.query_params.unwrap_or_default(),
            body: api.body.unwrap_or_default(),
            pipeline: stages
                .into_iter()
                .map(|s| Stage::new(s.command, s.args))
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::PipeSpec;

    fn shell(name: &str, script: &str) -> CommandSpec {
        CommandSpec {
            name: Some(name.to_string()),
            kind: Some("shell".to_string()),
            script: Some(script.to_string()),
            ..Default::default()
        }
    }

    fn group(name: &str, subcommands: Vec<CommandSpec>) -> CommandSpec {
        CommandSpec {
            name: Some(name.to_string()),
            subcommands,
            ..Default::default()
        }
    }

    fn build(commands: Vec<CommandSpec>) -> CommandTree {
        CommandTree::build(ResolvedConfig {
            commands,
            vars: BTreeMap::new(),
        })
    }

    fn child_names(node: &CommandNode) -> Vec<&str> {
        node.children.iter().map(|c| c.name.as_str()).collect()
    }

    fn messages(tree: &CommandTree) -> Vec<String> {
        tree.issues.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_duplicate_group_splices_subcommands() {
        let tree = build(vec![
            group("dev", vec![shell("info", "echo info")]),
            group("dev", vec![shell("lint", "echo lint"), shell("fmt", "echo fmt")]),
        ]);
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(child_names(&tree.roots[0]), vec!["info", "lint", "fmt"]);
    }

    #[test]
    fn test_leaf_then_group_keeps_leaf_and_gains_children() {
        let tree = build(vec![
            shell("tools", "echo first"),
            group("tools", vec![shell("a", "echo a"), shell("b", "echo b")]),
        ]);
        assert_eq!(tree.roots.len(), 1);
        let tools = &tree.roots[0];
        assert!(matches!(tools.action, Action::Shell(ref s) if s.script == "echo first"));
        assert_eq!(child_names(tools), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_leaf_first_wins() {
        let tree = build(vec![shell("greet", "echo first"), shell("greet", "echo second")]);
        assert_eq!(tree.roots.len(), 1);
        assert!(matches!(tree.roots[0].action, Action::Shell(ref s) if s.script == "echo first"));
        assert!(tree.issues.is_empty());
    }

    #[test]
    fn test_spliced_duplicates_are_merged_one_level_down() {
        let tree = build(vec![
            group("dev", vec![shell("info", "echo one")]),
            group("dev", vec![shell("info", "echo two"), shell("more", "echo more")]),
        ]);
        let dev = &tree.roots[0];
        assert_eq!(child_names(dev), vec!["info", "more"]);
        assert!(matches!(dev.children[0].action, Action::Shell(ref s) if s.script == "echo one"));
    }

    #[test]
    fn test_find_resolves_nested_path() {
        let tree = build(vec![group(
            "dev",
            vec![group("db", vec![shell("reset", "echo reset")])],
        )]);
        assert_eq!(tree.find(&["dev", "db", "reset"]).unwrap().name, "reset");
        assert!(tree.find(&["dev", "nope"]).is_none());
        assert!(tree.find(&[]).is_none());
    }

    #[test]
    fn test_issues_accumulate_with_breadcrumbs() {
        let tree = build(vec![
            group(
                "dev",
                vec![
                    CommandSpec {
                        name: Some("info".to_string()),
                        kind: Some("shell".to_string()),
                        ..Default::default()
                    },
                    shell("ok", "echo ok"),
                ],
            ),
            CommandSpec {
                name: Some("weather".to_string()),
                kind: Some("http".to_string()),
                api: Some(ApiSpec::default()),
                ..Default::default()
            },
            CommandSpec {
                kind: Some("system".to_string()),
                command: Some("ls".to_string()),
                ..Default::default()
            },
            CommandSpec {
                name: Some("odd".to_string()),
                kind: Some("ftp".to_string()),
                ..Default::default()
            },
            CommandSpec {
                name: Some("empty".to_string()),
                ..Default::default()
            },
        ]);
        assert_eq!(
            messages(&tree),
            vec![
                "dev -> info: type is shell but 'script' is missing",
                "weather: type is http but 'api.url' is missing",
                "#3: 'name' is required",
                "odd: invalid type 'ftp'; must be http, shell, or system",
                "empty: has no type and no subcommands; type must be http, shell, or system",
            ]
        );
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(child_names(&tree.roots[0]), vec!["ok"]);
        assert_eq!(tree.errors().len(), 5);
    }

    #[test]
    fn test_http_defaults_and_pipeline() {
        let tree = build(vec![CommandSpec {
            name: Some("weather".to_string()),
            kind: Some("http".to_string()),
            api: Some(ApiSpec {
                url: Some("https://example.com/{{index .args 0}}".to_string()),
                pipes: Some(vec![
                    PipeSpec {
                        command: "jq".to_string(),
                        args: vec![".".to_string()],
                    },
                    PipeSpec {
                        command: "grep".to_string(),
                        args: vec!["temperature".to_string()],
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        let Action::Http(ref http) = tree.roots[0].action else {
            panic!("Expected http action");
        };
        assert_eq!(http.method, Method::GET);
        assert_eq!(http.pipeline.len(), 2);
        assert_eq!(http.pipeline[1].command, "grep");
        assert!(tree.issues.is_empty());
    }

    #[test]
    fn test_http_stage_without_command_is_invalid() {
        let tree = build(vec![CommandSpec {
            name: Some("api".to_string()),
            kind: Some("http".to_string()),
            api: Some(ApiSpec {
                url: Some("https://example.com".to_string()),
                method: Some("post".to_string()),
                pipes: Some(vec![PipeSpec::default()]),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert!(tree.roots.is_empty());
        assert_eq!(messages(&tree), vec!["api: pipeline stage 1 has no 'command'"]);
    }

    #[test]
    fn test_both_pipe_forms_is_a_warning() {
        let tree = build(vec![CommandSpec {
            name: Some("api".to_string()),
            kind: Some("http".to_string()),
            api: Some(ApiSpec {
                url: Some("https://example.com".to_string()),
                pipe: Some(PipeSpec {
                    command: "jq".to_string(),
                    args: vec![],
                }),
                pipes: Some(vec![PipeSpec {
                    command: "cat".to_string(),
                    args: vec![],
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.issues[0].severity, Severity::Warning);
        assert!(tree.errors().is_empty());
    }

    #[test]
    fn test_invalid_method() {
        let tree = build(vec![CommandSpec {
            name: Some("api".to_string()),
            kind: Some("http".to_string()),
            api: Some(ApiSpec {
                url: Some("https://example.com".to_string()),
                method: Some("GE T".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert!(tree.roots.is_empty());
        assert_eq!(messages(&tree), vec!["api: invalid HTTP method 'GE T'"]);
    }

    #[test]
    fn test_reserved_names_are_skipped() {
        let tree = build(vec![shell("config", "echo nope"), shell("fine", "echo ok")]);
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.roots[0].name, "fine");
        assert_eq!(tree.issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_raw_args_only_for_shell_and_system() {
        let tree = build(vec![
            shell("s", "echo"),
            CommandSpec {
                name: Some("ls".to_string()),
                kind: Some("system".to_string()),
                command: Some("ls".to_string()),
                ..Default::default()
            },
            group("g", vec![shell("x", "echo")]),
        ]);
        let raw: Vec<bool> = tree.roots.iter().map(|n| n.action.raw_args()).collect();
        assert_eq!(raw, vec![true, true, false]);
    }
}
