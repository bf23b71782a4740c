//! External process execution
//!
//! This module provides:
//! - Captured output of a finished command
//! - The `CommandRunner` trait used by the resolver and the wrapper updater
//! - A system runner that spawns real processes

use crate::error::ResolveError;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// The command line that was executed
    pub command: String,
    /// Exit status as reported by the OS
    pub status: String,
    /// Whether the command exited successfully
    pub success: bool,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Create a successful output
    pub fn success(command: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: "exit status: 0".to_string(),
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failed output
    pub fn failure(
        command: impl Into<String>,
        code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            status: format!("exit status: {}", code),
            success: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Turn a non-zero exit into `ResolutionFailed`, otherwise yield stdout
    pub fn into_stdout(self) -> Result<String, ResolveError> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(ResolveError::resolution_failed(
                self.command,
                self.status,
                self.stderr,
                self.stdout,
            ))
        }
    }
}

/// Render a program and its arguments as one line for messages
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trait for running external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, optionally inside `cwd`, capturing its output
    ///
    /// A non-zero exit is not an error at this level; only a failure to
    /// spawn the process is.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, ResolveError>;
}

/// Runner that executes real commands
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    /// Create a new system runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, ResolveError> {
        let command = command_line(program, args);
        tracing::debug!(%command, "running");

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|source| ResolveError::SpawnFailed {
            command: command.clone(),
            source,
        })?;

        Ok(CommandOutput {
            command,
            status: output.status.to_string(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner shared by the unit tests of the resolver and the
    //! wrapper updater.

    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&[String]) -> CommandOutput + Send + Sync>;

    /// Runner answering commands by substring match on the command line
    pub struct ScriptedRunner {
        rules: Vec<(String, Handler)>,
        calls: Mutex<Vec<(String, Option<PathBuf>)>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self {
                rules: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Answer commands containing `pattern` with a fixed stdout
        pub fn on(self, pattern: &str, stdout: &str) -> Self {
            let stdout = stdout.to_string();
            self.on_with(pattern, move |args| {
                CommandOutput::success(args.join(" "), stdout.clone())
            })
        }

        /// Fail commands containing `pattern`
        pub fn fail_on(self, pattern: &str, stderr: &str) -> Self {
            let stderr = stderr.to_string();
            self.on_with(pattern, move |args| {
                CommandOutput::failure(args.join(" "), 1, "", stderr.clone())
            })
        }

        /// Answer commands containing `pattern` with a computed output
        pub fn on_with<F>(mut self, pattern: &str, handler: F) -> Self
        where
            F: Fn(&[String]) -> CommandOutput + Send + Sync + 'static,
        {
            self.rules.push((pattern.to_string(), Box::new(handler)));
            self
        }

        /// Command lines seen so far, in order
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(c, _)| c.clone())
                .collect()
        }

        /// Working directories seen so far, in order
        pub fn dirs(&self) -> Vec<Option<PathBuf>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, d)| d.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            cwd: Option<&Path>,
        ) -> Result<CommandOutput, ResolveError> {
            let line = command_line(program, args);
            self.calls
                .lock()
                .unwrap()
                .push((line.clone(), cwd.map(Path::to_path_buf)));
            let rule = self.rules.iter().find(|(p, _)| line.contains(p.as_str()));
            Ok(match rule {
                Some((_, handler)) => {
                    let mut output = handler(args);
                    output.command = line;
                    output
                }
                None => CommandOutput::success(line, ""),
            })
        }
    }
}
