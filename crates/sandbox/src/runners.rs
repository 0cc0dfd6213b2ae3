//! Language runners.
//!
//! A runner turns source text into one sandboxed process run: allocate a
//! namespace, write the source, spawn the runtime under the limit policy,
//! wait with the deadline, release the namespace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use code_agent_core::{Error, Result};

use crate::limits::MemoryRlimit;
use crate::process::{resolve_program, ProcessLauncher, SpawnSpec};
use crate::result::{ExecutionResult, UNSAFE_COMMAND_ERROR};
use crate::workspace::SandboxWorkspace;

// =============================================================================
// Language
// =============================================================================

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Shell,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::JavaScript, Language::Shell];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Shell => "shell",
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::unsupported_language(s))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Runner Trait
// =============================================================================

/// Per-runtime strategy for executing source text.
///
/// `Err` is reserved for internal faults (namespace allocation, writing the
/// source file, unexpected spawn errors); every expected failure is an
/// unsuccessful [`ExecutionResult`].
#[async_trait]
pub trait LanguageRunner: Send + Sync {
    fn language(&self) -> Language;

    async fn run(&self, code: &str, cancel: &CancellationToken) -> Result<ExecutionResult>;
}

/// Shared handles every built-in runner needs.
#[derive(Clone)]
pub struct RunnerContext {
    pub workspace: Arc<SandboxWorkspace>,
    pub launcher: Arc<ProcessLauncher>,
}

impl RunnerContext {
    /// Write `code` to `file_name` in a fresh namespace and run `program` on it.
    async fn run_source(
        &self,
        program: PathBuf,
        memory_rlimit: MemoryRlimit,
        file_name: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let namespace = self.workspace.allocate().await?;
        let source = namespace.file(file_name);
        tokio::fs::write(&source, code).await?;

        let spec = SpawnSpec::new(program, namespace.path())
            .arg(&source)
            .memory_rlimit(memory_rlimit);
        let result = self.launch(spec, cancel).await;

        namespace.release().await;
        result
    }

    async fn launch(&self, spec: SpawnSpec, cancel: &CancellationToken) -> Result<ExecutionResult> {
        let deadline = self.launcher.limits().wall_clock_deadline();
        let report = self.launcher.run(spec, deadline, cancel).await?;
        Ok(ExecutionResult::from_report(report, self.launcher.mode()))
    }

    fn missing(&self, runtime: &str) -> ExecutionResult {
        ExecutionResult::failure(format!("{} is not installed", runtime), self.launcher.mode())
    }
}

// =============================================================================
// Python
// =============================================================================

const PYTHON_CANDIDATES: [&str; 2] = ["python3", "python"];

/// Runs python source with the configured interpreter, or the first python
/// found on the host `PATH`.
pub struct PythonRunner {
    ctx: RunnerContext,
    interpreter: Option<String>,
}

impl PythonRunner {
    pub fn new(ctx: RunnerContext, interpreter: Option<String>) -> Self {
        Self { ctx, interpreter }
    }

    fn interpreter(&self) -> Option<PathBuf> {
        match self.interpreter {
            Some(ref configured) => resolve_program(configured),
            None => PYTHON_CANDIDATES.iter().find_map(|name| resolve_program(name)),
        }
    }
}

#[async_trait]
impl LanguageRunner for PythonRunner {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn run(&self, code: &str, cancel: &CancellationToken) -> Result<ExecutionResult> {
        let Some(interpreter) = self.interpreter() else {
            return Ok(self.ctx.missing("Python"));
        };
        self.ctx
            .run_source(interpreter, MemoryRlimit::AddressSpace, "main.py", code, cancel)
            .await
    }
}

// =============================================================================
// JavaScript
// =============================================================================

/// Runs javascript with an external runtime binary (node by default).
///
/// The memory ceiling is applied as RLIMIT_DATA; see [`MemoryRlimit::Data`].
pub struct JavaScriptRunner {
    ctx: RunnerContext,
    runtime: String,
}

impl JavaScriptRunner {
    pub fn new(ctx: RunnerContext, runtime: impl Into<String>) -> Self {
        Self {
            ctx,
            runtime: runtime.into(),
        }
    }
}

#[async_trait]
impl LanguageRunner for JavaScriptRunner {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    async fn run(&self, code: &str, cancel: &CancellationToken) -> Result<ExecutionResult> {
        let Some(runtime) = resolve_program(&self.runtime) else {
            return Ok(self.ctx.missing("Node.js"));
        };
        match self
            .ctx
            .run_source(runtime, MemoryRlimit::Data, "main.js", code, cancel)
            .await
        {
            // Binary vanished between lookup and spawn.
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(self.ctx.missing("Node.js"))
            }
            other => other,
        }
    }
}

// =============================================================================
// Shell
// =============================================================================

/// Read-only commands the shell runner accepts.
pub const ALLOWED_SHELL_COMMANDS: [&str; 5] = ["echo", "ls", "pwd", "whoami", "date"];

const SHELL: &str = "/bin/sh";

/// Runs allow-listed shell commands.
///
/// The filter is word based: the text is split on whitespace and every
/// word must be an allowed command name. Flags, arguments, paths and shell
/// operators are all rejected, even after an allowed command, so this is
/// a coarse capability filter and not a shell parser.
pub struct ShellRunner {
    ctx: RunnerContext,
}

impl ShellRunner {
    pub fn new(ctx: RunnerContext) -> Self {
        Self { ctx }
    }

    pub fn is_allowed(command: &str) -> bool {
        command
            .split_whitespace()
            .all(|word| ALLOWED_SHELL_COMMANDS.contains(&word))
    }
}

#[async_trait]
impl LanguageRunner for ShellRunner {
    fn language(&self) -> Language {
        Language::Shell
    }

    async fn run(&self, code: &str, cancel: &CancellationToken) -> Result<ExecutionResult> {
        if !Self::is_allowed(code) {
            tracing::warn!(command = %code, "Rejected shell command outside the allow-list");
            return Ok(ExecutionResult::failure(
                UNSAFE_COMMAND_ERROR,
                self.ctx.launcher.mode(),
            ));
        }

        // The namespace is the working directory, so `ls` sees nothing shared.
        let namespace = self.ctx.workspace.allocate().await?;
        let spec = SpawnSpec::new(SHELL, namespace.path()).args(["-c", code]);
        let result = self.ctx.launch(spec, cancel).await;
        namespace.release().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("JavaScript".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!(" SHELL ".parse::<Language>().unwrap(), Language::Shell);

        let err = "ruby".parse::<Language>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported language: ruby");
    }

    #[test]
    fn test_shell_allow_list() {
        assert!(ShellRunner::is_allowed("echo"));
        assert!(ShellRunner::is_allowed("pwd whoami date"));
        assert!(ShellRunner::is_allowed("ls\techo"));

        assert!(!ShellRunner::is_allowed("ls; rm -rf /"));
        assert!(!ShellRunner::is_allowed("echo hello"));
        assert!(!ShellRunner::is_allowed("ls -la"));
        assert!(!ShellRunner::is_allowed("cat /etc/passwd"));
        assert!(!ShellRunner::is_allowed("echo && echo"));
        assert!(!ShellRunner::is_allowed("$(whoami)"));
    }
}
