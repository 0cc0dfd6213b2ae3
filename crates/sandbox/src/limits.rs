//! Resource limit policy applied to every spawned child.
//!
//! On Unix hosts the limits are installed with `setrlimit` inside a
//! `pre_exec` hook, i.e. in the forked child before the interpreter image is
//! loaded. Other hosts run children unconstrained and report
//! [`LimitMode::Unenforced`] on every result.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use code_agent_core::config::SandboxSettings;

/// Static memory / CPU / process-count ceiling for spawned processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes (RLIMIT_AS, or RLIMIT_DATA, see [`MemoryRlimit`]).
    pub max_memory_bytes: u64,
    /// CPU-time ceiling in seconds (RLIMIT_CPU). Also the wall-clock deadline.
    pub max_cpu_seconds: u64,
    /// Process ceiling (RLIMIT_NPROC).
    pub max_processes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 512 * 1024 * 1024, // 512MB
            max_cpu_seconds: 30,
            max_processes: 5,
        }
    }
}

impl From<&SandboxSettings> for ResourceLimits {
    fn from(settings: &SandboxSettings) -> Self {
        Self {
            max_memory_bytes: settings.max_memory_bytes,
            max_cpu_seconds: settings.max_cpu_seconds,
            max_processes: settings.max_processes,
        }
    }
}

/// Which rlimit carries the memory ceiling for a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryRlimit {
    /// RLIMIT_AS: every mapping counts, reservations included.
    #[default]
    AddressSpace,
    /// RLIMIT_DATA: only writable private mappings count. V8 reserves
    /// gigabytes of `PROT_NONE` address space at startup and aborts under
    /// RLIMIT_AS, so node and npm are capped on what they actually commit.
    Data,
}

/// Whether the limit policy is actually enforced on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitMode {
    /// rlimits are installed in every child.
    Enforced,
    /// No OS facility available; only the wall-clock deadline applies.
    Unenforced,
}

impl LimitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enforced => "enforced",
            Self::Unenforced => "unenforced",
        }
    }
}

impl std::fmt::Display for LimitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResourceLimits {
    /// Wall-clock deadline for one run.
    pub fn wall_clock_deadline(&self) -> Duration {
        Duration::from_secs(self.max_cpu_seconds)
    }

    /// The same policy with a different CPU budget.
    pub fn with_cpu_seconds(self, max_cpu_seconds: u64) -> Self {
        Self {
            max_cpu_seconds,
            ..self
        }
    }

    /// Enforcement mode available on this host.
    pub fn mode(&self) -> LimitMode {
        if cfg!(unix) {
            LimitMode::Enforced
        } else {
            LimitMode::Unenforced
        }
    }

    /// Install the limits (and a fresh process group) into `cmd`.
    #[cfg(unix)]
    pub(crate) fn install(&self, cmd: &mut tokio::process::Command, memory: MemoryRlimit) {
        let limits = *self;
        // SAFETY: the hook only issues setpgid/getrlimit/setrlimit syscalls,
        // which are async-signal-safe, and does not allocate.
        unsafe {
            cmd.pre_exec(move || limits.apply_in_child(memory));
        }
    }

    #[cfg(not(unix))]
    pub(crate) fn install(&self, _cmd: &mut tokio::process::Command, _memory: MemoryRlimit) {}

    #[cfg(unix)]
    fn apply_in_child(&self, memory: MemoryRlimit) -> std::io::Result<()> {
        use nix::sys::resource::Resource;
        use nix::unistd::{setpgid, Pid};

        // Own process group, so a timeout can kill the whole tree.
        setpgid(Pid::from_raw(0), Pid::from_raw(0))?;

        let memory_resource = match memory {
            MemoryRlimit::AddressSpace => Resource::RLIMIT_AS,
            MemoryRlimit::Data => Resource::RLIMIT_DATA,
        };
        set_clamped(memory_resource, self.max_memory_bytes, self.max_memory_bytes)?;
        // Soft limit delivers SIGXCPU, hard limit one second later SIGKILL.
        set_clamped(
            Resource::RLIMIT_CPU,
            self.max_cpu_seconds,
            self.max_cpu_seconds.saturating_add(1),
        )?;
        set_clamped(
            Resource::RLIMIT_NPROC,
            self.max_processes,
            self.max_processes,
        )?;
        Ok(())
    }
}

/// Lower a limit, never asking for more than the inherited hard limit.
#[cfg(unix)]
fn set_clamped(resource: nix::sys::resource::Resource, soft: u64, hard: u64) -> nix::Result<()> {
    use nix::sys::resource::{getrlimit, setrlimit};

    let (_, current_hard) = getrlimit(resource)?;
    let hard = hard.min(current_hard);
    let soft = soft.min(hard);
    setrlimit(resource, soft, hard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_memory_bytes, 512 * 1024 * 1024);
        assert_eq!(limits.max_cpu_seconds, 30);
        assert_eq!(limits.max_processes, 5);
        assert_eq!(limits.wall_clock_deadline(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_settings() {
        let settings = SandboxSettings {
            max_cpu_seconds: 3,
            ..Default::default()
        };
        let limits = ResourceLimits::from(&settings);
        assert_eq!(limits.max_cpu_seconds, 3);
        assert_eq!(limits.max_processes, 5);
    }

    #[test]
    fn test_with_cpu_seconds_keeps_other_limits() {
        let limits = ResourceLimits::default().with_cpu_seconds(300);
        assert_eq!(limits.max_cpu_seconds, 300);
        assert_eq!(limits.max_memory_bytes, 512 * 1024 * 1024);
        assert_eq!(limits.max_processes, 5);
        assert_eq!(MemoryRlimit::default(), MemoryRlimit::AddressSpace);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_hosts_enforce() {
        assert_eq!(ResourceLimits::default().mode(), LimitMode::Enforced);
        assert_eq!(
            serde_json::to_value(LimitMode::Enforced).unwrap(),
            serde_json::json!("enforced")
        );
    }
}
