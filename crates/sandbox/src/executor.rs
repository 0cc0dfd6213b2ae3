//! Code executor: routes a (code, language) pair to its runner.

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::limits::LimitMode;
use crate::result::ExecutionResult;
use crate::runners::{
    JavaScriptRunner, Language, LanguageRunner, PythonRunner, RunnerContext, ShellRunner,
};

/// Dispatches source text to the runner registered for its language.
pub struct CodeExecutor {
    runners: HashMap<Language, Arc<dyn LanguageRunner>>,
    mode: LimitMode,
}

impl CodeExecutor {
    /// Executor with no runners registered.
    pub fn empty(mode: LimitMode) -> Self {
        Self {
            runners: HashMap::new(),
            mode,
        }
    }

    /// Executor with the built-in python, javascript and shell runners.
    pub fn with_default_runners(
        ctx: RunnerContext,
        python_interpreter: Option<String>,
        node_binary: impl Into<String>,
    ) -> Self {
        let mut executor = Self::empty(ctx.launcher.mode());
        executor.register(Arc::new(PythonRunner::new(ctx.clone(), python_interpreter)));
        executor.register(Arc::new(JavaScriptRunner::new(ctx.clone(), node_binary)));
        executor.register(Arc::new(ShellRunner::new(ctx)));
        executor
    }

    /// Register (or replace) the runner for its language.
    pub fn register(&mut self, runner: Arc<dyn LanguageRunner>) {
        self.runners.insert(runner.language(), runner);
    }

    pub fn supports(&self, language: &str) -> bool {
        language
            .parse::<Language>()
            .map(|lang| self.runners.contains_key(&lang))
            .unwrap_or(false)
    }

    /// Run `code`. Never fails: every fault becomes an unsuccessful result.
    pub async fn execute_code(
        &self,
        code: &str,
        language: &str,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let runner = match language.parse::<Language>() {
            Ok(lang) => self.runners.get(&lang),
            Err(_) => None,
        };
        let Some(runner) = runner else {
            return ExecutionResult::failure(format!("Unsupported language: {}", language), self.mode);
        };

        match runner.run(code, cancel).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(language = %language, error = %e, "Execution error");
                ExecutionResult::failure(e.to_string(), self.mode)
            }
        }
    }
}
