//! Execution result record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::limits::LimitMode;
use crate::process::{ProcessOutcome, ProcessReport};

pub const TIMEOUT_ERROR: &str = "Execution timeout";
pub const CANCELLED_ERROR: &str = "Execution cancelled";
pub const UNSAFE_COMMAND_ERROR: &str = "Unsafe command detected";

/// Outcome of running one snippet.
///
/// `success` is false whenever the process failed to spawn, timed out or
/// exited non-zero, and `error` is always set in that case. A successful
/// run keeps non-empty stderr in `error` as a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    #[serde(rename = "time")]
    pub elapsed_seconds: f64,
    #[serde(rename = "memory")]
    pub memory_bytes: u64,
    pub limits: LimitMode,
}

impl ExecutionResult {
    /// A failed result that never reached a running process.
    pub fn failure(error: impl Into<String>, limits: LimitMode) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            elapsed_seconds: 0.0,
            memory_bytes: 0,
            limits,
        }
    }

    pub(crate) fn from_report(report: ProcessReport, limits: LimitMode) -> Self {
        let elapsed_seconds = report.elapsed.as_secs_f64();
        let memory_bytes = report.peak_memory_bytes;
        let hit_cpu_limit = report.hit_cpu_limit();

        let (success, output, error) = match report.outcome {
            ProcessOutcome::TimedOut => (false, String::new(), Some(TIMEOUT_ERROR.to_string())),
            ProcessOutcome::Cancelled => {
                (false, String::new(), Some(CANCELLED_ERROR.to_string()))
            }
            ProcessOutcome::Exited { .. } if hit_cpu_limit => {
                (false, String::new(), Some(TIMEOUT_ERROR.to_string()))
            }
            ProcessOutcome::Exited {
                status,
                stdout,
                stderr,
            } => {
                let stderr = String::from_utf8_lossy(&stderr).into_owned();
                let error = if !stderr.is_empty() {
                    Some(stderr)
                } else if !status.success() {
                    Some(format!("Process exited with {}", status))
                } else {
                    None
                };
                (
                    status.success(),
                    String::from_utf8_lossy(&stdout).into_owned(),
                    error,
                )
            }
        };

        Self {
            success,
            output,
            error,
            elapsed_seconds,
            memory_bytes,
            limits,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_ERROR)
    }

    /// Normalized `{success, output, error, time, memory, limits}` map.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(self.success));
        map.insert("output".into(), Value::String(self.output.clone()));
        map.insert(
            "error".into(),
            self.error.clone().map(Value::String).unwrap_or(Value::Null),
        );
        map.insert("time".into(), serde_json::json!(self.elapsed_seconds));
        map.insert("memory".into(), Value::from(self.memory_bytes));
        map.insert("limits".into(), Value::String(self.limits.as_str().into()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_populates_error() {
        let result = ExecutionResult::failure("Unsupported language: cobol", LimitMode::Enforced);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unsupported language: cobol"));
        assert!(!result.timed_out());
    }

    #[test]
    fn test_normalized_map_keys() {
        let result = ExecutionResult {
            success: true,
            output: "hi\n".into(),
            error: None,
            elapsed_seconds: 0.5,
            memory_bytes: 1024,
            limits: LimitMode::Enforced,
        };
        let map = result.to_map();
        assert_eq!(map["success"], json!(true));
        assert_eq!(map["output"], json!("hi\n"));
        assert_eq!(map["error"], Value::Null);
        assert_eq!(map["time"], json!(0.5));
        assert_eq!(map["memory"], json!(1024));
        assert_eq!(map["limits"], json!("enforced"));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_report_exit_codes() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;
        use std::time::Duration;

        let report = |raw: i32, stderr: &str| ProcessReport {
            outcome: ProcessOutcome::Exited {
                status: ExitStatus::from_raw(raw),
                stdout: b"out".to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            },
            elapsed: Duration::from_millis(10),
            peak_memory_bytes: 0,
        };

        // Zero exit with stderr: diagnostic kept, success unchanged.
        let ok = ExecutionResult::from_report(report(0, "warning"), LimitMode::Enforced);
        assert!(ok.success);
        assert_eq!(ok.output, "out");
        assert_eq!(ok.error.as_deref(), Some("warning"));

        // Exit code 1 (raw wait status 256) with empty stderr.
        let failed = ExecutionResult::from_report(report(256, ""), LimitMode::Enforced);
        assert!(!failed.success);
        assert!(failed.error.unwrap().contains("exit status: 1"));

        // Killed by SIGXCPU counts as a timeout.
        let xcpu = nix::sys::signal::Signal::SIGXCPU as i32;
        let cpu = ExecutionResult::from_report(report(xcpu, ""), LimitMode::Enforced);
        assert!(cpu.timed_out());
        assert!(!cpu.success);

        // SIGXCPU ignored: the hard limit kills with SIGKILL, still a timeout.
        let killed = ExecutionResult::from_report(report(9, ""), LimitMode::Enforced);
        assert!(killed.timed_out(), "{:?}", killed);
        assert_eq!(killed.output, "");
    }
}
