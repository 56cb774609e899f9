//! Streaming an HTTP response body through a chain of external processes
//!
//! Stages are wired like a shell pipe: stage 0 reads the body, every later stage
//! reads its predecessor's stdout, and the last stage writes to the given sink.
//! All stages are spawned before any of them is awaited so that data keeps
//! flowing through the OS pipe buffers while the chain runs.

use std::collections::BTreeMap;
use std::io;
use std::pin::pin;
use std::process::Stdio;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::executor::ExecutionError;
use crate::template::render_and_expand;

/// One process of a pipeline, as configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub command: String,
    pub args: Vec<String>,
}

impl Stage {
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Stage {
            command: command.into(),
            args,
        }
    }
}

/// A non-empty chain of stages whose arguments have been rendered
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// # Errors
    ///
    /// Returns `ExecutionError::InvalidStage` if `stages` is empty or a stage has
    /// no command.
    pub fn new(stages: Vec<Stage>) -> Result<Self, ExecutionError> {
        if stages.is_empty() {
            return Err(ExecutionError::InvalidStage(
                "a pipeline needs at least one stage".to_string(),
            ));
        }
        if let Some(i) = stages.iter().position(|s| s.command.trim().is_empty()) {
            return Err(ExecutionError::InvalidStage(format!(
                "stage {} has no command",
                i + 1
            )));
        }
        Ok(Pipeline { stages })
    }

    /// Renders every stage argument against the invocation's `args`, then builds
    /// the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Render` if an argument fails to render, or the
    /// errors of [`Pipeline::new`].
    pub fn render(
        stages: &[Stage],
        args: &[String],
        vars: &BTreeMap<String, String>,
    ) -> Result<Self, ExecutionError> {
        let rendered = stages
            .iter()
            .map(|stage| {
                let stage_args = stage
                    .args
                    .iter()
                    .map(|arg| render_and_expand(arg, args, vars))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|source| ExecutionError::Render {
                        field: format!("pipe '{}' args", stage.command),
                        source,
                    })?;
                Ok::<_, ExecutionError>(Stage::new(stage.command.clone(), stage_args))
            })
            .collect::<Result<Vec<_>, ExecutionError>>()?;
        Pipeline::new(rendered)
    }

    /// Runs the chain with `input` as stage 0's stdin and `output` as the last
    /// stage's stdout. Every stage's stderr is inherited.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Spawn` if a stage cannot be started. Otherwise
    /// every stage is awaited and the first failure is returned: a non-zero exit
    /// (`ExecutionError::Exit`), a failed wait (`ExecutionError::Wait`), or an
    /// error reading `input` (`ExecutionError::Io`).
    pub async fn run<S>(&self, input: S, output: Stdio) -> Result<(), ExecutionError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let last = self.stages.len() - 1;
        let mut output = Some(output);
        let mut previous: Option<Stdio> = None;
        let mut head_stdin: Option<ChildStdin> = None;
        let mut children: Vec<(String, Child)> = Vec::with_capacity(self.stages.len());

        for (i, stage) in self.stages.iter().enumerate() {
            debug!("Starting pipe stage {i}: {} {:?}", stage.command, stage.args);
            let mut command = Command::new(&stage.command);
            command.args(&stage.args).stderr(Stdio::inherit());
            command.stdin(previous.take().unwrap_or_else(Stdio::piped));
            if i == last {
                command.stdout(output.take().unwrap_or_else(Stdio::inherit));
            } else {
                command.stdout(Stdio::piped());
            }

            let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
                program: stage.command.clone(),
                source,
            })?;

            if i == 0 {
                head_stdin = child.stdin.take();
            }
            if i != last {
                let stdout = child.stdout.take().ok_or_else(|| {
                    ExecutionError::Io(io::Error::other("pipe stage stdout was not captured"))
                })?;
                previous = Some(stdout.try_into().map_err(ExecutionError::Io)?);
            }
            children.push((stage.command.clone(), child));
        }

        let feeder = head_stdin.map(|stdin| tokio::spawn(feed(input, stdin)));

        let mut failure: Option<ExecutionError> = None;
        for (program, mut child) in children {
            match child.wait().await {
                Ok(status) if status.success() => debug!("Pipe stage '{program}' finished"),
                Ok(status) => {
                    warn!("Pipe stage '{program}' exited with {status}");
                    failure.get_or_insert(ExecutionError::Exit { program, status });
                }
                Err(source) => {
                    failure.get_or_insert(ExecutionError::Wait { program, source });
                }
            }
        }

        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failure.get_or_insert(ExecutionError::Io(e));
                }
                Err(e) => {
                    failure.get_or_insert(ExecutionError::Io(io::Error::other(e)));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Copies `input` into the first stage's stdin, closing it at end of input.
async fn feed<S>(input: S, mut stdin: ChildStdin) -> io::Result<()>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut input = pin!(input);
    while let Some(chunk) = input.next().await {
        match stdin.write_all(&chunk?).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("First pipe stage closed its input early");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
    match stdin.shutdown().await {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}
