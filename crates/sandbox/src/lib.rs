#![deny(unused)]
//! Sandboxed code execution for the code agent.
//!
//! Runs untrusted, model-generated snippets (python, javascript, a
//! read-only shell subset) and installs declared dependencies, each in a
//! resource-limited child process with its own private directory.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Dispatcher (CodeAgent)                │
//! │    ↓ execute / install                 │
//! ├────────────────────────────────────────┤
//! │  ExecutionEngine (owns workspace)      │
//! │    ↓ CodeExecutor │ DependencyInstaller│
//! ├────────────────────────────────────────┤
//! │  LanguageRunner (python/js/shell)      │
//! │    ↓ ProcessLauncher                   │
//! ├────────────────────────────────────────┤
//! │  Child process                         │
//! │    rlimits: AS/DATA, CPU, NPROC        │
//! │    cwd: <workspace>/inv-<seq>-<uuid>   │
//! │    wall-clock deadline, group kill     │
//! └────────────────────────────────────────┘
//! ```
//!
//! Isolation is single-host and cooperative: rlimits, a private directory
//! and a cleared environment. There is no filesystem, network or PID
//! namespace isolation.
//!
//! # Usage
//!
//! ```ignore
//! use code_agent_sandbox::{EngineOptions, ExecutionEngine, SandboxEngine};
//!
//! let engine = ExecutionEngine::new(EngineOptions::default())?;
//! let result = engine.execute("print('hi')", "python").await?;
//! assert_eq!(result.output, "hi\n");
//! engine.shutdown();
//! ```

pub mod engine;
pub mod executor;
pub mod installer;
pub mod limits;
pub mod process;
pub mod result;
pub mod runners;
pub mod workspace;

pub use engine::{EngineOptions, ExecutionEngine, MockSandbox, SandboxEngine};
pub use executor::CodeExecutor;
pub use installer::{DependencyInstaller, InstallResult, PackageManagers};
pub use limits::{LimitMode, MemoryRlimit, ResourceLimits};
pub use result::ExecutionResult;
pub use runners::{Language, LanguageRunner, RunnerContext};
pub use workspace::{InvocationNamespace, SandboxWorkspace};
