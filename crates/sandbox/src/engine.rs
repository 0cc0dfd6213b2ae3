//! Execution engine façade.
//!
//! This module provides the `SandboxEngine` trait seen by the dispatcher and
//! `ExecutionEngine`, the subprocess implementation that owns one sandbox
//! workspace for its lifetime.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use code_agent_core::config::AgentConfig;
use code_agent_core::{Error, Result};

use crate::executor::CodeExecutor;
use crate::installer::{DependencyInstaller, InstallResult, PackageManagers};
use crate::limits::{LimitMode, ResourceLimits};
use crate::process::ProcessLauncher;
use crate::result::ExecutionResult;
use crate::runners::RunnerContext;
use crate::workspace::SandboxWorkspace;

// =============================================================================
// Sandbox Engine Trait
// =============================================================================

/// Operations the dispatcher may invoke on a sandbox.
///
/// Expected failures (unsupported language, timeout, missing runtime,
/// rejected command) come back as unsuccessful results. `Err` is the fatal
/// signal: the engine is shut down or an internal fault could not be
/// encoded as a result.
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Run `code` in `language`.
    async fn execute(&self, code: &str, language: &str) -> Result<ExecutionResult>;

    /// Install `packages` with the package manager for `language`.
    async fn install_dependencies(
        &self,
        packages: &[String],
        language: &str,
    ) -> Result<InstallResult>;
}

// =============================================================================
// Engine Options
// =============================================================================

/// Construction options for [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub limits: ResourceLimits,
    /// Parent directory for the workspace root; system temp dir when unset.
    pub workspace_parent: Option<PathBuf>,
    pub python_interpreter: Option<String>,
    pub node_binary: String,
    pub package_managers: PackageManagers,
    pub install_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            workspace_parent: None,
            python_interpreter: None,
            node_binary: "node".into(),
            package_managers: PackageManagers::default(),
            install_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&AgentConfig> for EngineOptions {
    fn from(config: &AgentConfig) -> Self {
        let sandbox = &config.sandbox;
        Self {
            limits: ResourceLimits::from(sandbox),
            workspace_parent: config.workspace_dir.clone(),
            python_interpreter: sandbox.python_interpreter.clone(),
            node_binary: sandbox.node_binary.clone(),
            package_managers: PackageManagers {
                pip: sandbox.pip_binary.clone(),
                npm: sandbox.npm_binary.clone(),
            },
            install_timeout: Duration::from_secs(sandbox.install_timeout_secs),
        }
    }
}

// =============================================================================
// Execution Engine
// =============================================================================

/// Subprocess-backed sandbox engine.
///
/// Composes the code executor and the dependency installer over one shared
/// workspace and launcher. Any number of calls may be in flight at once;
/// each gets its own namespace and child process.
pub struct ExecutionEngine {
    workspace: Arc<SandboxWorkspace>,
    launcher: Arc<ProcessLauncher>,
    executor: CodeExecutor,
    installer: DependencyInstaller,
    shut_down: AtomicBool,
}

impl ExecutionEngine {
    /// Create the engine and its workspace.
    pub fn new(options: EngineOptions) -> Result<Self> {
        let workspace = Arc::new(SandboxWorkspace::create(options.workspace_parent.as_deref())?);
        let launcher = Arc::new(ProcessLauncher::new(options.limits));

        if launcher.mode() == LimitMode::Unenforced {
            tracing::warn!(
                "Resource limits cannot be enforced on this platform; only the wall-clock deadline applies"
            );
        }

        let ctx = RunnerContext {
            workspace: workspace.clone(),
            launcher: launcher.clone(),
        };
        let executor =
            CodeExecutor::with_default_runners(ctx, options.python_interpreter, options.node_binary);
        let installer = DependencyInstaller::new(
            workspace.clone(),
            launcher.clone(),
            options.package_managers,
            options.install_timeout,
        );

        tracing::info!(
            root = %workspace.root().display(),
            max_memory_bytes = options.limits.max_memory_bytes,
            max_cpu_seconds = options.limits.max_cpu_seconds,
            max_processes = options.limits.max_processes,
            limits = %launcher.mode(),
            "Execution engine initialized"
        );

        Ok(Self {
            workspace,
            launcher,
            executor,
            installer,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Create the engine from the agent configuration.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Self::new(EngineOptions::from(config))
    }

    /// Replace the code executor, e.g. to register extra runners.
    pub fn with_executor(mut self, executor: CodeExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Handles runners need to share this engine's workspace and launcher.
    pub fn runner_context(&self) -> RunnerContext {
        RunnerContext {
            workspace: self.workspace.clone(),
            launcher: self.launcher.clone(),
        }
    }

    /// Run `code`, stopping early if `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        code: &str,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        self.ensure_running()?;
        let result = self.executor.execute_code(code, language, cancel).await;
        tracing::info!(
            language = %language,
            success = result.success,
            elapsed_ms = (result.elapsed_seconds * 1000.0) as u64,
            "Code execution finished"
        );
        Ok(result)
    }

    /// Install packages, stopping early if `cancel` fires.
    pub async fn install_dependencies_with_cancel(
        &self,
        packages: &[String],
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<InstallResult> {
        self.ensure_running()?;
        Ok(self.installer.install(packages, language, cancel).await)
    }

    /// Destroy the workspace. Safe to call any number of times.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.workspace.destroy();
        tracing::info!("Execution engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn workspace_root(&self) -> &Path {
        self.workspace.root()
    }

    pub fn limits(&self) -> &ResourceLimits {
        self.launcher.limits()
    }

    pub fn limit_mode(&self) -> LimitMode {
        self.launcher.mode()
    }

    /// Number of child processes spawned by this engine.
    pub fn spawn_count(&self) -> u64 {
        self.launcher.spawn_count()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::EngineShutdown);
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxEngine for ExecutionEngine {
    async fn execute(&self, code: &str, language: &str) -> Result<ExecutionResult> {
        self.execute_with_cancel(code, language, &CancellationToken::new())
            .await
    }

    async fn install_dependencies(
        &self,
        packages: &[String],
        language: &str,
    ) -> Result<InstallResult> {
        self.install_dependencies_with_cancel(packages, language, &CancellationToken::new())
            .await
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Mock Sandbox (for testing without spawning processes)
// =============================================================================

/// Scripted sandbox for dispatcher tests. Records every call.
#[derive(Default)]
pub struct MockSandbox {
    pub exec_responses: std::sync::Mutex<Vec<ExecutionResult>>,
    pub install_responses: std::sync::Mutex<Vec<InstallResult>>,
    pub calls: std::sync::Mutex<Vec<String>>,
}

impl MockSandbox {
    /// Create a mock sandbox with predefined exec responses.
    pub fn new(responses: Vec<ExecutionResult>) -> Self {
        Self {
            exec_responses: std::sync::Mutex::new(responses),
            ..Default::default()
        }
    }

    /// Queue an install response.
    pub fn with_install_response(self, response: InstallResult) -> Self {
        self.install_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(response);
        self
    }

    /// Calls seen so far, as `"execute:<language>"` / `"install:<language>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl SandboxEngine for MockSandbox {
    async fn execute(&self, _code: &str, language: &str) -> Result<ExecutionResult> {
        self.record(format!("execute:{}", language));
        let mut responses = self
            .exec_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if responses.is_empty() {
            Ok(ExecutionResult {
                success: true,
                output: "[mock] code executed".to_string(),
                error: None,
                elapsed_seconds: 0.0,
                memory_bytes: 0,
                limits: LimitMode::Enforced,
            })
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn install_dependencies(
        &self,
        packages: &[String],
        language: &str,
    ) -> Result<InstallResult> {
        self.record(format!("install:{}", language));
        let mut responses = self
            .install_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if responses.is_empty() {
            Ok(InstallResult {
                success: true,
                output: "[mock] packages installed".to_string(),
                error: None,
                installed_packages: packages.iter().cloned().collect(),
            })
        } else {
            Ok(responses.remove(0))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
