use std::fmt::Write as _;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anstyle::{AnsiColor, Color, Reset, Style};

use crate::commands::node::Action;
use crate::commands::tree::{Severity, ValidationIssue};
use crate::config_file::{ConfigError, find_config};

const SUCCESS_COLOR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));
const ERROR_COLOR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));
const WARNING_COLOR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
const DIM: Style = Style::new().dimmed();

/// Outcome of checking a configuration
#[derive(Debug)]
pub struct CheckReport {
    pub config_path: Option<PathBuf>,
    /// Set when the config file or one of its imports could not be loaded
    pub load_error: Option<ConfigError>,
    pub issues: Vec<ValidationIssue>,
    /// Number of runnable commands that passed validation
    pub commands: usize,
}

impl CheckReport {
    #[must_use]
    pub fn error_count(&self) -> usize {
        usize::from(self.load_error.is_some())
            + self
                .issues
                .iter()
                .filter(|i| i.severity == Severity::Error)
                .count()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.config_path.is_some() && self.error_count() == 0
    }

    /// Renders the report, with ANSI colors when `color` is set.
    #[must_use]
    pub fn render(&self, color: bool) -> String {
        let paint = |style: Style, text: &str| {
            if color {
                format!("{style}{text}{Reset}")
            } else {
                text.to_string()
            }
        };
        let ok = paint(SUCCESS_COLOR, "✓");
        let err = paint(ERROR_COLOR, "✘");
        let warn = paint(WARNING_COLOR, "!");

        let mut out = String::new();
        let Some(ref path) = self.config_path else {
            if let Some(ref e) = self.load_error {
                let _ = writeln!(out, "{err} {e}");
                return out;
            }
            let _ = writeln!(out, "{err} No config file found");
            let _ = writeln!(
                out,
                "{}",
                paint(DIM, "Run `cmdlink config init` to create one.")
            );
            return out;
        };
        let _ = writeln!(out, "{ok} Config file: {}", path.display());

        if let Some(ref e) = self.load_error {
            let _ = writeln!(out, "{err} {e}");
        }
        for issue in &self.issues {
            let mark = match issue.severity {
                Severity::Error => &err,
                Severity::Warning => &warn,
            };
            let _ = writeln!(out, "{mark} {issue}");
        }

        let errors = self.error_count();
        if errors == 0 {
            let _ = writeln!(
                out,
                "{ok} Configuration is valid ({} commands)",
                self.commands
            );
        } else {
            let _ = writeln!(
                out,
                "{err} Found {errors} error{} in configuration",
                if errors == 1 { "" } else { "s" }
            );
        }
        out
    }

    /// Prints the report to stderr, colored when stderr is a terminal.
    pub fn print(&self) {
        eprint!("{}", self.render(std::io::stderr().is_terminal()));
    }
}

/// Loads the configuration and collects every problem found along the way.
#[must_use]
pub fn run(config_file: Option<&Path>) -> CheckReport {
    let mut report = CheckReport {
        config_path: None,
        load_error: None,
        issues: vec![],
        commands: 0,
    };
    let path = match config_file.map_or_else(find_config, |p| Ok(p.to_path_buf())) {
        Ok(path) => path,
        Err(ConfigError::NotFound(_)) => return report,
        Err(e) => {
            report.load_error = Some(e);
            return report;
        }
    };
    report.config_path = Some(path.clone());

    match crate::load_tree(Some(&path)) {
        Ok((tree, _)) => {
            report.commands = tree
                .roots
                .iter()
                .flat_map(|root| root.all_nodes())
                .filter(|node| !matches!(node.action, Action::Group))
                .count();
            report.issues = tree.issues;
        }
        Err(e) => report.load_error = Some(e),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("cmdlink.yaml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r"
commands:
  - name: dev
    subcommands:
      - name: info
        type: shell
        script: uname -a
      - name: ll
        type: system
        command: ls
",
        );
        let report = run(Some(&path));
        assert!(report.is_valid());
        assert_eq!(report.commands, 2);
        let text = report.render(false);
        assert!(text.contains("✓ Configuration is valid (2 commands)"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_reports_every_issue() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r"
commands:
  - name: dev
    subcommands:
      - name: info
        type: shell
      - type: system
        command: ls
  - name: weather
    type: http
",
        );
        let report = run(Some(&path));
        assert!(!report.is_valid());
        assert_eq!(report.error_count(), 3);
        let text = report.render(false);
        assert!(text.contains("✘ dev -> info: type is shell but 'script' is missing"));
        assert!(text.contains("✘ weather: type is http but 'api.url' is missing"));
        assert!(text.contains("Found 3 errors in configuration"));
    }

    #[test]
    fn test_load_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "imports: [missing.yaml]\n");
        let report = run(Some(&path));
        assert!(report.load_error.is_some());
        assert_eq!(report.error_count(), 1);
        assert!(report.render(false).contains("Found 1 error in configuration"));
    }

    #[test]
    fn test_colored_output() {
        let report = CheckReport {
            config_path: Some(PathBuf::from("cmdlink.yaml")),
            load_error: None,
            issues: vec![],
            commands: 0,
        };
        assert!(report.render(true).contains(&format!("{SUCCESS_COLOR}✓{Reset}")));
    }
}
