//! Sandbox integration tests.
//!
//! Tests the full pipeline: ExecutionEngine → CodeExecutor → LanguageRunner →
//! child process. Tests that need a python interpreter or node return early
//! when the host has none.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use code_agent_core::Error;
use code_agent_sandbox::process::resolve_program;
use code_agent_sandbox::{EngineOptions, ExecutionEngine, ResourceLimits, SandboxEngine};

// =============================================================================
// Helpers
// =============================================================================

fn python_available() -> bool {
    ["python3", "python"]
        .iter()
        .any(|name| resolve_program(name).is_some())
}

fn node_available() -> bool {
    resolve_program("node").is_some()
}

fn engine_with_cpu_seconds(max_cpu_seconds: u64) -> ExecutionEngine {
    ExecutionEngine::new(EngineOptions {
        limits: ResourceLimits {
            max_cpu_seconds,
            ..ResourceLimits::default()
        },
        ..EngineOptions::default()
    })
    .unwrap()
}

fn workspace_entries(engine: &ExecutionEngine) -> usize {
    std::fs::read_dir(engine.workspace_root()).unwrap().count()
}

// =============================================================================
// 1. Python execution
// =============================================================================

#[tokio::test]
async fn test_python_hello() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(10);

    let result = engine.execute("print('hi')", "python").await.unwrap();

    assert!(result.success, "{:?}", result);
    assert_eq!(result.output, "hi\n");
    assert_eq!(result.error, None);
    assert_eq!(workspace_entries(&engine), 0, "namespace must be released");

    let map = result.to_map();
    assert_eq!(map["success"], serde_json::json!(true));
    assert!(map.contains_key("time"));
    assert!(map.contains_key("memory"));
}

#[tokio::test]
async fn test_python_runtime_error() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(10);

    let result = engine
        .execute("print('before')\nraise ValueError('boom')", "python")
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.output, "before\n");
    assert!(result.error.unwrap().contains("ValueError: boom"));

    let result = engine
        .execute("import sys\nsys.exit(3)", "python")
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_stderr_on_success_is_kept() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(10);

    let result = engine
        .execute("import sys\nsys.stderr.write('careful')\nprint('ok')", "python")
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output, "ok\n");
    assert_eq!(result.error.as_deref(), Some("careful"));
}

// =============================================================================
// 2. JavaScript execution
// =============================================================================

#[tokio::test]
async fn test_javascript_hello() {
    if !node_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(10);

    let result = engine.execute("console.log('hi')", "javascript").await.unwrap();

    assert!(result.success, "{:?}", result);
    assert_eq!(result.output, "hi\n");
    assert_eq!(result.error, None);
    assert_eq!(workspace_entries(&engine), 0, "namespace must be released");
}

#[tokio::test]
async fn test_javascript_runtime_error() {
    if !node_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(10);

    let result = engine
        .execute("console.log('before'); throw new Error('boom')", "javascript")
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.output, "before\n");
    assert!(result.error.unwrap().contains("Error: boom"));
}

#[tokio::test]
async fn test_javascript_busy_loop_times_out() {
    if !node_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(1);

    let started = Instant::now();
    let result = engine.execute("while (true) {}", "javascript").await.unwrap();

    assert_eq!(result.error.as_deref(), Some("Execution timeout"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

// =============================================================================
// 3. Timeouts
// =============================================================================

#[tokio::test]
async fn test_python_sleep_times_out() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(1);

    let started = Instant::now();
    let result = engine
        .execute("import time\ntime.sleep(30)", "python")
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Execution timeout"));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(workspace_entries(&engine), 0);
}

#[tokio::test]
async fn test_python_busy_loop_times_out() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(1);

    let started = Instant::now();
    let result = engine.execute("while True: pass", "python").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Execution timeout"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timed_out_process_is_gone() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(1);
    let pid_file = std::env::temp_dir().join(format!("code-agent-pid-{}", uuid::Uuid::new_v4()));

    let code = format!(
        "import os, time\nopen({:?}, 'w').write(str(os.getpid()))\ntime.sleep(30)",
        pid_file.display().to_string()
    );
    let result = engine.execute(&code, "python").await.unwrap();
    assert!(result.timed_out());

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    std::fs::remove_file(&pid_file).unwrap();
    assert!(
        !std::path::Path::new(&format!("/proc/{}", pid.trim())).exists(),
        "timed-out child {} is still running",
        pid
    );
}

#[tokio::test]
async fn test_cancellation() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(30);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = engine
        .execute_with_cancel("import time\ntime.sleep(30)", "python", &cancel)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Execution cancelled"));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(workspace_entries(&engine), 0);
}

// =============================================================================
// 4. Shell allow-list
// =============================================================================

#[tokio::test]
async fn test_unsafe_shell_spawns_nothing() {
    let engine = engine_with_cpu_seconds(5);

    for command in ["ls; rm -rf /", "echo hello", "ls -la", "cat /etc/passwd", "sudo ls"] {
        let result = engine.execute(command, "shell").await.unwrap();
        assert!(!result.success, "{} should be rejected", command);
        assert_eq!(result.error.as_deref(), Some("Unsafe command detected"));
    }
    assert_eq!(engine.spawn_count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_allowed_shell_runs_in_private_namespace() {
    let engine = engine_with_cpu_seconds(5);

    let result = engine.execute("echo", "shell").await.unwrap();
    assert!(result.success, "{:?}", result);
    assert_eq!(result.output, "\n");

    let result = engine.execute("pwd", "shell").await.unwrap();
    assert!(result.success, "{:?}", result);
    assert!(result.output.contains("inv-"), "{}", result.output);

    let result = engine.execute("ls", "shell").await.unwrap();
    assert!(result.success);
    assert_eq!(result.output, "", "fresh namespace must be empty");

    assert_eq!(engine.spawn_count(), 3);
    assert_eq!(workspace_entries(&engine), 0);
}

// =============================================================================
// 5. Isolation between concurrent invocations
// =============================================================================

#[tokio::test]
async fn test_concurrent_executions_are_isolated() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(20);

    let runs = (0..12).map(|i| {
        let code = format!(
            "import os, time\ntime.sleep(0.2)\nprint('marker-{}', sorted(os.listdir('.')))",
            i
        );
        let engine = &engine;
        async move { (i, engine.execute(&code, "python").await.unwrap()) }
    });

    let results = futures::future::join_all(runs).await;

    let mut seen = HashSet::new();
    for (i, result) in results {
        assert!(result.success, "{:?}", result);
        assert_eq!(
            result.output,
            format!("marker-{} ['main.py']\n", i),
            "invocation {} saw foreign files or output",
            i
        );
        seen.insert(result.output);
    }
    assert_eq!(seen.len(), 12);
    assert_eq!(workspace_entries(&engine), 0);
}

#[tokio::test]
async fn test_concurrent_javascript_executions_are_isolated() {
    if !node_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(20);

    let runs = (0..6).map(|i| {
        let code = format!(
            "const fs = require('fs');\nsetTimeout(() => console.log('marker-{}', JSON.stringify(fs.readdirSync('.').sort())), 200);",
            i
        );
        let engine = &engine;
        async move { (i, engine.execute(&code, "javascript").await.unwrap()) }
    });

    let results = futures::future::join_all(runs).await;

    for (i, result) in results {
        assert!(result.success, "{:?}", result);
        assert_eq!(
            result.output,
            format!("marker-{} [\"main.js\"]\n", i),
            "invocation {} saw foreign files or output",
            i
        );
    }
    assert_eq!(workspace_entries(&engine), 0);
}

// =============================================================================
// 6. Configuration and environment faults
// =============================================================================

#[tokio::test]
async fn test_unsupported_language() {
    let engine = engine_with_cpu_seconds(5);
    let result = engine.execute("puts 'hi'", "ruby").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Unsupported language: ruby"));
    assert_eq!(engine.spawn_count(), 0);
}

#[tokio::test]
async fn test_missing_javascript_runtime() {
    let engine = ExecutionEngine::new(EngineOptions {
        node_binary: "definitely-not-node-4f2a".into(),
        ..EngineOptions::default()
    })
    .unwrap();

    let result = engine
        .execute("console.log('hi')", "javascript")
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Node.js is not installed"));
    assert_eq!(engine.spawn_count(), 0);
}

#[tokio::test]
async fn test_missing_python_interpreter() {
    let engine = ExecutionEngine::new(EngineOptions {
        python_interpreter: Some("/definitely/not/python".into()),
        ..EngineOptions::default()
    })
    .unwrap();

    let result = engine.execute("print('hi')", "python").await.unwrap();
    assert_eq!(result.error.as_deref(), Some("Python is not installed"));
}

// =============================================================================
// 7. Dependency installation
// =============================================================================

#[tokio::test]
async fn test_install_empty_list() {
    let engine = engine_with_cpu_seconds(5);
    for language in ["python", "javascript", "shell", "ruby"] {
        let result = engine.install_dependencies(&[], language).await.unwrap();
        assert!(result.success);
        assert!(result.installed_packages.is_empty());
    }
    assert_eq!(engine.spawn_count(), 0);
}

#[tokio::test]
async fn test_install_unknown_language() {
    let engine = engine_with_cpu_seconds(5);
    let result = engine
        .install_dependencies(&["rails".into()], "ruby")
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Unsupported language: ruby"));
    assert!(result.installed_packages.is_empty());
}

// =============================================================================
// 8. Lifecycle
// =============================================================================

#[tokio::test]
async fn test_shutdown_twice_leaves_nothing() {
    let engine = engine_with_cpu_seconds(5);
    let root = engine.workspace_root().to_path_buf();

    engine.shutdown();
    engine.shutdown();

    assert!(!root.exists());
    assert!(matches!(
        engine.execute("echo", "shell").await,
        Err(Error::EngineShutdown)
    ));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_peak_memory_is_reported() {
    if !python_available() {
        return;
    }
    let engine = engine_with_cpu_seconds(10);

    let result = engine
        .execute(
            "import time\nblob = b'x' * (64 * 1024 * 1024)\ntime.sleep(0.5)\nprint(len(blob))",
            "python",
        )
        .await
        .unwrap();

    assert!(result.success, "{:?}", result);
    assert!(
        result.memory_bytes >= 48 * 1024 * 1024,
        "peak memory {} too low",
        result.memory_bytes
    );
}
