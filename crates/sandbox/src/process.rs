//! Process launching shared by language runners and the dependency installer.
//!
//! Every child is spawned with no stdin, a cleared environment, both output
//! streams captured and the [`ResourceLimits`] installed. The wall-clock
//! deadline starts only once the spawn has succeeded, and the wait races
//! exit, deadline and cancellation; the losing child is killed together with
//! its process group, never left running.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::limits::{LimitMode, MemoryRlimit, ResourceLimits};

/// Captured output beyond this many bytes per stream is discarded.
const MAX_CAPTURE_BYTES: usize = 10 * 1024 * 1024;

const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_millis(25);

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// What to spawn.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    /// Variables added on top of `PATH`.
    pub env: Vec<(String, String)>,
    pub memory_rlimit: MemoryRlimit,
    /// CPU budget replacing the launcher's for this child only.
    pub cpu_seconds: Option<u64>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
            memory_rlimit: MemoryRlimit::default(),
            cpu_seconds: None,
        }
    }

    pub fn memory_rlimit(mut self, memory_rlimit: MemoryRlimit) -> Self {
        self.memory_rlimit = memory_rlimit;
        self
    }

    pub fn cpu_seconds(mut self, cpu_seconds: u64) -> Self {
        self.cpu_seconds = Some(cpu_seconds);
        self
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Pass a variable through from the host environment, if set.
    pub fn inherit_env(mut self, key: &str) -> Self {
        if let Ok(value) = std::env::var(key) {
            self.env.push((key.to_string(), value));
        }
        self
    }
}

/// How the wait ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    Exited {
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut,
    Cancelled,
}

/// Outcome plus resource usage of one child.
#[derive(Debug)]
pub struct ProcessReport {
    pub outcome: ProcessOutcome,
    pub elapsed: Duration,
    /// Peak resident set size; 0 where the host does not expose it.
    pub peak_memory_bytes: u64,
}

impl ProcessReport {
    /// Whether the child was stopped for exceeding its CPU-time rlimit.
    ///
    /// The soft limit delivers SIGXCPU; a child that ignores it gets SIGKILL
    /// at the hard limit. The launcher only sends SIGKILL itself on timeout
    /// or cancellation, which never produce an `Exited` outcome, so an
    /// exit by SIGKILL is attributed to the CPU rlimit.
    pub fn hit_cpu_limit(&self) -> bool {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;
            use std::os::unix::process::ExitStatusExt;
            if let ProcessOutcome::Exited { status, .. } = &self.outcome {
                return matches!(
                    status.signal(),
                    Some(sig) if sig == Signal::SIGXCPU as i32 || sig == Signal::SIGKILL as i32
                );
            }
        }
        false
    }
}

/// Spawns resource-limited children and counts them.
#[derive(Debug)]
pub struct ProcessLauncher {
    limits: ResourceLimits,
    spawned: AtomicU64,
}

impl ProcessLauncher {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            spawned: AtomicU64::new(0),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn mode(&self) -> LimitMode {
        self.limits.mode()
    }

    /// Number of children spawned so far.
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Spawn `spec` and wait for it, at most `deadline` after the spawn.
    ///
    /// Errors are spawn failures only (`NotFound` for a missing binary);
    /// everything after a successful spawn is reported in the outcome.
    pub async fn run(
        &self,
        spec: SpawnSpec,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> std::io::Result<ProcessReport> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PATH", host_path())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        let limits = match spec.cpu_seconds {
            Some(cpu_seconds) => self.limits.with_cpu_seconds(cpu_seconds),
            None => self.limits,
        };
        limits.install(&mut cmd, spec.memory_rlimit);

        let mut child = cmd.spawn()?;
        self.spawned.fetch_add(1, Ordering::SeqCst);

        let started = Instant::now();
        let deadline_at = tokio::time::Instant::now() + deadline;
        let pid = child.id();
        tracing::debug!(program = %spec.program.display(), pid = ?pid, "Spawned child process");

        let stdout_task = child.stdout.take().map(|out| tokio::spawn(capture(out)));
        let stderr_task = child.stderr.take().map(|err| tokio::spawn(capture(err)));

        let mut sampler = tokio::time::interval(MEMORY_SAMPLE_INTERVAL);
        let mut peak_memory_bytes = 0u64;

        let waited = loop {
            tokio::select! {
                status = child.wait() => break Waited::Exited(status?),
                _ = tokio::time::sleep_until(deadline_at) => break Waited::TimedOut,
                _ = cancel.cancelled() => break Waited::Cancelled,
                _ = sampler.tick() => {
                    if let Some(rss) = pid.and_then(peak_rss_bytes) {
                        peak_memory_bytes = peak_memory_bytes.max(rss);
                    }
                }
            }
        };

        let outcome = match waited {
            Waited::Exited(status) => {
                // Stragglers that inherited the pipes would keep the readers open.
                kill_group(pid);
                let stdout = collect(stdout_task, deadline_at).await;
                let stderr = collect(stderr_task, deadline_at).await;
                ProcessOutcome::Exited {
                    status,
                    stdout,
                    stderr,
                }
            }
            Waited::TimedOut | Waited::Cancelled => {
                terminate(&mut child, pid).await;
                abort(stdout_task);
                abort(stderr_task);
                if matches!(waited, Waited::TimedOut) {
                    tracing::warn!(pid = ?pid, deadline_ms = deadline.as_millis() as u64, "Child process timed out and was killed");
                    ProcessOutcome::TimedOut
                } else {
                    tracing::info!(pid = ?pid, "Child process cancelled and was killed");
                    ProcessOutcome::Cancelled
                }
            }
        };

        Ok(ProcessReport {
            outcome,
            elapsed: started.elapsed(),
            peak_memory_bytes,
        })
    }
}

enum Waited {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

async fn capture<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(captured);
        }
        let room = MAX_CAPTURE_BYTES.saturating_sub(captured.len());
        captured.extend_from_slice(&chunk[..n.min(room)]);
    }
}

async fn collect(
    task: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    deadline_at: tokio::time::Instant,
) -> Vec<u8> {
    let Some(mut task) = task else {
        return Vec::new();
    };
    match tokio::time::timeout_at(deadline_at, &mut task).await {
        Ok(Ok(Ok(bytes))) => bytes,
        Ok(Ok(Err(e))) => {
            tracing::warn!(error = %e, "Failed to read child output");
            Vec::new()
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Output reader task failed");
            Vec::new()
        }
        Err(_) => {
            task.abort();
            tracing::warn!("Child output still open at deadline, discarding");
            Vec::new()
        }
    }
}

fn abort(task: Option<JoinHandle<std::io::Result<Vec<u8>>>>) {
    if let Some(task) = task {
        task.abort();
    }
}

async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.kill().await {
        tracing::debug!(pid = ?pid, error = %e, "Child already gone");
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        // ESRCH just means the group is already empty.
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[cfg(target_os = "linux")]
fn peak_rss_bytes(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    parse_vm_hwm(&status)
}

#[cfg(not(target_os = "linux"))]
fn peak_rss_bytes(_pid: u32) -> Option<u64> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_hwm(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

fn host_path() -> String {
    std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string())
}

/// Locate an executable: a path containing a separator is checked as-is,
/// a bare name is searched on the host `PATH`.
pub fn resolve_program(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    std::env::split_paths(&host_path())
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
