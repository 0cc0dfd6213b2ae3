//! Dependency installer.
//!
//! Spawns the language's package manager once with the whole package list,
//! under the same launcher as the runners, with a CPU budget matching the
//! install timeout. Success is the manager's aggregate exit code; partial
//! installs are not accounted for.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::limits::MemoryRlimit;
use crate::process::{resolve_program, ProcessLauncher, ProcessOutcome, SpawnSpec};
use crate::runners::Language;
use crate::workspace::SandboxWorkspace;

/// Result of one install request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    /// The full request on success, empty otherwise.
    #[serde(rename = "installed")]
    pub installed_packages: BTreeSet<String>,
}

impl InstallResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            installed_packages: BTreeSet::new(),
        }
    }

    /// Normalized `{success, output, error, installed}` map.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(self.success));
        map.insert("output".into(), Value::String(self.output.clone()));
        map.insert(
            "error".into(),
            self.error.clone().map(Value::String).unwrap_or(Value::Null),
        );
        map.insert("installed".into(), json!(self.installed_packages));
        map
    }
}

/// Package manager binaries per language.
#[derive(Debug, Clone)]
pub struct PackageManagers {
    pub pip: String,
    pub npm: String,
}

impl Default for PackageManagers {
    fn default() -> Self {
        Self {
            pip: "pip".into(),
            npm: "npm".into(),
        }
    }
}

impl PackageManagers {
    fn for_language(&self, language: Language) -> Option<&str> {
        match language {
            Language::Python => Some(&self.pip),
            Language::JavaScript => Some(&self.npm),
            Language::Shell => None,
        }
    }

    /// npm runs on node, which needs the data-segment ceiling.
    fn memory_rlimit(language: Language) -> MemoryRlimit {
        match language {
            Language::JavaScript => MemoryRlimit::Data,
            Language::Python | Language::Shell => MemoryRlimit::AddressSpace,
        }
    }
}

pub struct DependencyInstaller {
    workspace: Arc<SandboxWorkspace>,
    launcher: Arc<ProcessLauncher>,
    managers: PackageManagers,
    timeout: Duration,
}

impl DependencyInstaller {
    pub fn new(
        workspace: Arc<SandboxWorkspace>,
        launcher: Arc<ProcessLauncher>,
        managers: PackageManagers,
        timeout: Duration,
    ) -> Self {
        Self {
            workspace,
            launcher,
            managers,
            timeout,
        }
    }

    /// Install `packages` with the package manager for `language`.
    ///
    /// Runs in the workspace root, so packages npm installs there resolve
    /// from every later javascript namespace.
    pub async fn install(
        &self,
        packages: &[String],
        language: &str,
        cancel: &CancellationToken,
    ) -> InstallResult {
        if packages.is_empty() {
            return InstallResult {
                success: true,
                output: "No packages to install".into(),
                error: None,
                installed_packages: BTreeSet::new(),
            };
        }

        let parsed = language.parse::<Language>().ok();
        let manager = parsed.and_then(|lang| self.managers.for_language(lang).map(|m| (lang, m)));
        let Some((lang, manager)) = manager else {
            return InstallResult::failure(format!("Unsupported language: {}", language));
        };

        if let Some(bad) = packages.iter().find(|p| !is_valid_package_name(p)) {
            return InstallResult::failure(format!("Invalid package name: {}", bad));
        }

        let Some(program) = resolve_program(manager) else {
            return InstallResult::failure(format!("{} is not installed", manager));
        };

        tracing::info!(manager = %manager, packages = ?packages, "Installing dependencies");

        let spec = self.spawn_spec(program, lang, packages);

        let report = match self.launcher.run(spec, self.timeout, cancel).await {
            Ok(report) => report,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return InstallResult::failure(format!("{} is not installed", manager));
            }
            Err(e) => {
                tracing::error!(manager = %manager, error = %e, "Failed to spawn package manager");
                return InstallResult::failure(e.to_string());
            }
        };

        let hit_cpu_limit = report.hit_cpu_limit();
        match report.outcome {
            ProcessOutcome::TimedOut => InstallResult::failure("Installation timeout"),
            ProcessOutcome::Exited { .. } if hit_cpu_limit => {
                InstallResult::failure("Installation timeout")
            }
            ProcessOutcome::Cancelled => InstallResult::failure("Installation cancelled"),
            ProcessOutcome::Exited {
                status,
                stdout,
                stderr,
            } => {
                let stdout = String::from_utf8_lossy(&stdout);
                let stderr = String::from_utf8_lossy(&stderr).into_owned();
                let success = status.success();

                let error = if !stderr.is_empty() {
                    Some(stderr.clone())
                } else if !success {
                    Some(format!("{} exited with {}", manager, status))
                } else {
                    None
                };

                tracing::info!(
                    manager = %manager,
                    success,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Dependency installation finished"
                );

                InstallResult {
                    success,
                    output: format!("{}{}", stdout, stderr),
                    error,
                    installed_packages: if success {
                        packages.iter().cloned().collect()
                    } else {
                        BTreeSet::new()
                    },
                }
            }
        }
    }
}

impl DependencyInstaller {
    /// One manager invocation in the workspace root.
    ///
    /// The CPU budget follows the install timeout rather than the
    /// per-snippet budget, so a long build ends as a timeout, not SIGXCPU.
    fn spawn_spec(&self, program: PathBuf, language: Language, packages: &[String]) -> SpawnSpec {
        SpawnSpec::new(program, self.workspace.root())
            .arg("install")
            .args(packages)
            .inherit_env("HOME")
            .inherit_env("LANG")
            .memory_rlimit(PackageManagers::memory_rlimit(language))
            .cpu_seconds(self.timeout.as_secs().max(1))
    }
}

/// Package specs may not look like flags or smuggle extra arguments.
fn is_valid_package_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('-') && !name.chars().any(char::is_whitespace)
}
