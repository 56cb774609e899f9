//! Running a resolved command node
//!
//! Each [`Action`] variant has one handler. HTTP responses outside the 2xx range
//! are printed for diagnosis and never reach the pipeline.

pub mod pipeline;

use std::collections::BTreeMap;
use std::io::{self, IsTerminal};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use crate::commands::node::{Action, CommandNode, HttpAction, ShellAction, SystemAction};
use crate::executor::pipeline::Pipeline;
use crate::template::{RenderError, expand_env, render_and_expand};

/// Errors raised while running a single invocation
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("render {field} error: {source}")]
    Render {
        field: String,
        #[source]
        source: RenderError,
    },
    #[error("invalid request: {0}")]
    Request(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("http request failed with status {0}")]
    HttpStatus(StatusCode),
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' exited with {status}")]
    Exit { program: String, status: ExitStatus },
    #[error("failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid pipeline: {0}")]
    InvalidStage(String),
    #[error("'{0}' only groups subcommands and cannot be run")]
    NotRunnable(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExecutionError {
    /// The exit code of a failed child process, if that is what went wrong.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionError::Exit { status, .. } => status.code(),
            _ => None,
        }
    }
}

/// Runs command nodes against the config `vars`
#[derive(Debug, Clone)]
pub struct Executor {
    client: Client,
    vars: BTreeMap<String, String>,
}

impl Executor {
    #[must_use]
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Executor {
            client: Client::new(),
            vars,
        }
    }

    /// Runs `node` with the positional `args` of the invocation.
    ///
    /// # Errors
    ///
    /// Returns an `ExecutionError` describing the first failure; see the variants.
    pub async fn execute(&self, node: &CommandNode, args: &[String]) -> Result<(), ExecutionError> {
        debug!("Executing '{}' ({}) with {args:?}", node.name, node.action.kind());
        match &node.action {
            Action::Http(http) => {
                let mut stdout = tokio::io::stdout();
                self.run_http(http, args, &mut stdout, Stdio::inherit())
                    .await
            }
            Action::Shell(shell) => self.run_shell(shell, args).await,
            Action::System(system) => self.run_system(system, args).await,
            Action::Group => Err(ExecutionError::NotRunnable(node.name.clone())),
        }
    }

    fn render(&self, field: &str, template: &str, args: &[String]) -> Result<String, ExecutionError> {
        render_and_expand(template, args, &self.vars).map_err(|source| ExecutionError::Render {
            field: field.to_string(),
            source,
        })
    }

    /// Sends the request and writes the body to `out`, or streams it through the
    /// pipeline whose last stage writes to `pipe_output`.
    async fn run_http<W>(
        &self,
        http: &HttpAction,
        args: &[String],
        out: &mut W,
        pipe_output: Stdio,
    ) -> Result<(), ExecutionError>
    where
        W: AsyncWrite + Unpin,
    {
        let url = self.render("url", &http.url, args)?;
        let body = if http.body.is_empty() {
            String::new()
        } else {
            self.render("body", &http.body, args)?
        };
        let query = http
            .query
            .iter()
            .map(|(key, value)| {
                let value = self.render(&format!("query '{key}'"), value, args)?;
                Ok::<_, ExecutionError>((key.clone(), value))
            })
            .collect::<Result<Vec<(String, String)>, _>>()?;

        let mut request = self.client.request(http.method.clone(), &url);
        if !query.is_empty() {
            request = request.query(&query);
        }
        for (name, value) in &http.headers {
            request = request.header(name, expand_env(value, &self.vars));
        }
        if !body.is_empty() {
            request = request.body(body);
        }
        let request = request.build().map_err(ExecutionError::Request)?;

        info!("Requesting {} {}", request.method(), request.url());
        let spinner = request_spinner(
            format!("Requesting {}...", request.url()),
            std::io::stderr().is_terminal(),
        );
        let response = self.client.execute(request).await;
        spinner.finish_and_clear();
        let response = response.map_err(ExecutionError::Network)?;
        let status = response.status();
        debug!("Response status {status}");

        if !status.is_success() {
            eprintln!("HTTP request failed with status: {status}");
            copy_body(response, out, false).await?;
            return Err(ExecutionError::HttpStatus(status));
        }

        if http.pipeline.is_empty() {
            return copy_body(response, out, true).await;
        }

        let pipeline = Pipeline::render(&http.pipeline, args, &self.vars)?;
        let body = response.bytes_stream().map_err(io::Error::other);
        pipeline.run(body, pipe_output).await
    }

    async fn run_shell(&self, shell: &ShellAction, args: &[String]) -> Result<(), ExecutionError> {
        let script = self.render("script", &shell.script, args)?;
        debug!("Running script: {script}");
        let mut command = Command::new("sh");
        command.arg("-c").arg(&script);
        run_inherited("sh", &mut command).await
    }

    async fn run_system(&self, system: &SystemAction, args: &[String]) -> Result<(), ExecutionError> {
        let argv: Vec<String> = system
            .args
            .iter()
            .chain(args)
            .map(|arg| expand_env(arg, &self.vars))
            .collect();
        debug!("Running {} {argv:?}", system.program);
        let mut command = Command::new(&system.program);
        command.args(&argv);
        run_inherited(&system.program, &mut command).await
    }
}

/// Spinner on stderr while a request is in flight; hidden unless `visible`.
fn request_spinner(message: String, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner().with_message(message);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Streams the response body to `out` as it arrives.
async fn copy_body<W>(
    mut response: reqwest::Response,
    out: &mut W,
    trailing_newline: bool,
) -> Result<(), ExecutionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = response.chunk().await.map_err(ExecutionError::Network)? {
        out.write_all(&chunk).await?;
    }
    if trailing_newline {
        out.write_all(b"\n").await?;
    }
    out.flush().await?;
    Ok(())
}

/// Runs `command` with the standard streams of this process.
async fn run_inherited(program: &str, command: &mut Command) -> Result<(), ExecutionError> {
    let status = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| ExecutionError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(ExecutionError::Exit {
            program: program.to_string(),
            status,
        })
    }
}
