//! Operation dispatcher.
//!
//! Routes a [`CodeOperation`] to the completion provider (suggest, edit,
//! test) or to the sandbox (install, execute) and folds the outcome into an
//! [`OperationResult`].

use serde_json::{json, Map, Value};
use std::sync::Arc;

use code_agent_core::config::AgentConfig;
use code_agent_core::{
    CodeOperation, CompletionProvider, Error, OperationKind, OperationResult, Result,
};
use code_agent_sandbox::{ExecutionEngine, Language, SandboxEngine};

use crate::analyzer::{CodeAnalyzer, DEFAULT_CONTEXT_WINDOW};

/// Dispatches code operations for one provider and one sandbox.
pub struct CodeAgent {
    provider: Arc<dyn CompletionProvider>,
    sandbox: Arc<dyn SandboxEngine>,
    default_language: String,
}

impl CodeAgent {
    pub fn new(provider: Arc<dyn CompletionProvider>, sandbox: Arc<dyn SandboxEngine>) -> Self {
        Self {
            provider,
            sandbox,
            default_language: "python".to_string(),
        }
    }

    /// Build an agent with a fresh [`ExecutionEngine`] configured from `config`.
    ///
    /// The engine's workspace is removed when the agent is dropped.
    pub fn from_config(config: &AgentConfig, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        let engine = ExecutionEngine::from_config(config)?;
        Ok(Self::new(provider, Arc::new(engine)).with_default_language(config.default_language()))
    }

    /// Language used for installs when the operation names none.
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Process one operation.
    ///
    /// Never fails: provider errors and fatal sandbox errors are reported as
    /// an unsuccessful result with an `"Operation failed: ..."` error.
    pub async fn execute_operation(&self, operation: &CodeOperation) -> OperationResult {
        tracing::info!(
            operation = %operation.operation_type,
            language = %operation.language,
            provider = %self.provider.name(),
            "Handling code operation"
        );

        let outcome = match operation.operation_type {
            OperationKind::Suggest => self.handle_suggest(operation).await,
            OperationKind::Edit => self.handle_edit(operation).await,
            OperationKind::Test => self.handle_test(operation).await,
            OperationKind::Install => self.handle_install(operation).await,
            OperationKind::Execute => self.handle_execute(operation).await,
        };

        outcome.unwrap_or_else(|e| {
            tracing::error!(
                operation = %operation.operation_type,
                error = %e,
                "Code operation failed"
            );
            OperationResult::failed(format!("Operation failed: {}", e))
        })
    }

    async fn handle_suggest(&self, op: &CodeOperation) -> Result<OperationResult> {
        let imports = CodeAnalyzer::extract_imports(&op.content);
        let cursor = op
            .cursor_position
            .map(|p| p.to_string())
            .unwrap_or_else(|| "none".to_string());

        let prompt = format!(
            "Given the following code context in {}:\n\n{}\n\nCurrent imports: {}\nCursor position: {}\n\nPlease suggest completions or improvements for this code.",
            op.language,
            op.content,
            imports.join(", "),
            cursor
        );
        let response = self.provider.generate_response(&prompt).await?;

        Ok(OperationResult::ok(response).with_metadata("imports", json!(imports)))
    }

    async fn handle_edit(&self, op: &CodeOperation) -> Result<OperationResult> {
        let mut prompt = format!(
            "Edit the following code in {}:\n\n{}\n\n",
            op.language, op.content
        );
        if let Some(position) = op.cursor_position {
            let window = CodeAnalyzer::get_context_window(&op.content, position, DEFAULT_CONTEXT_WINDOW);
            prompt.push_str(&format!("Context around cursor:\n{}\n\n", window));
        }
        if let Some(ref selected) = op.selected_text {
            prompt.push_str(&format!("Selected text:\n{}\n\n", selected));
        }
        prompt.push_str("Please provide the edited code with improvements or fixes.");

        let response = self.provider.generate_response(&prompt).await?;

        Ok(OperationResult::ok(response).with_metadata("modified_at", json!(op.cursor_position)))
    }

    async fn handle_test(&self, op: &CodeOperation) -> Result<OperationResult> {
        let prompt = format!(
            "Generate tests for the following {} code:\n\n{}\n\nPlease provide comprehensive test cases covering the main functionality.",
            op.language, op.content
        );
        let response = self.provider.generate_response(&prompt).await?;

        Ok(OperationResult::ok(response)
            .with_metadata("test_framework", json!(test_framework(&op.language))))
    }

    async fn handle_install(&self, op: &CodeOperation) -> Result<OperationResult> {
        let packages = requested_packages(&op.parameters)?;
        let language = if op.language.trim().is_empty() {
            self.default_language.as_str()
        } else {
            op.language.as_str()
        };

        let installed = self.sandbox.install_dependencies(&packages, language).await?;

        Ok(OperationResult {
            success: installed.success,
            content: installed.output,
            metadata: Map::from_iter([(
                "installed_packages".to_string(),
                json!(installed.installed_packages),
            )]),
            errors: installed.error.into_iter().collect(),
        })
    }

    async fn handle_execute(&self, op: &CodeOperation) -> Result<OperationResult> {
        let executed = self.sandbox.execute(&op.content, &op.language).await?;

        let mut metadata = Map::new();
        metadata.insert("execution_time".into(), json!(executed.elapsed_seconds));
        metadata.insert("memory_usage".into(), json!(executed.memory_bytes));
        metadata.insert("limits".into(), json!(executed.limits));

        Ok(OperationResult {
            success: executed.success,
            content: executed.output,
            metadata,
            errors: executed.error.into_iter().collect(),
        })
    }
}

fn test_framework(language: &str) -> &'static str {
    match language.parse::<Language>() {
        Ok(Language::Python) => "pytest",
        Ok(Language::JavaScript) => "jest",
        _ => "unknown",
    }
}

/// `parameters.packages` as a list of names; absent means none.
fn requested_packages(parameters: &Map<String, Value>) -> Result<Vec<String>> {
    match parameters.get("packages") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    Error::invalid_request(format!("package names must be strings, got {}", item))
                })
            })
            .collect(),
        Some(other) => Err(Error::invalid_request(format!(
            "packages must be an array, got {}",
            other
        ))),
    }
}
