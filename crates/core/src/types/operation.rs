use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Dispatcher Contract
// =============================================================================

/// Kind of operation a caller asks the agent to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Suggest completions or improvements.
    Suggest,
    /// Edit the given code.
    Edit,
    /// Generate tests for the given code.
    Test,
    /// Install packages.
    Install,
    /// Run the given code in the sandbox.
    Execute,
}

impl OperationKind {
    /// Whether this kind reaches the sandbox rather than the completion provider.
    pub fn uses_sandbox(&self) -> bool {
        matches!(self, Self::Install | Self::Execute)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Suggest => "suggest",
            Self::Edit => "edit",
            Self::Test => "test",
            Self::Install => "install",
            Self::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// A code operation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeOperation {
    pub operation_type: OperationKind,
    /// Source code, or the shell command for `execute` with language `shell`.
    pub content: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub language: String,
    #[serde(default)]
    pub cursor_position: Option<usize>,
    #[serde(default)]
    pub selected_text: Option<String>,
    /// Free-form parameters, e.g. `{"packages": ["requests"]}` for installs.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl CodeOperation {
    /// Create an operation with no cursor and no parameters.
    pub fn new(
        operation_type: OperationKind,
        content: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            operation_type,
            content: content.into(),
            file_path: None,
            language: language.into(),
            cursor_position: None,
            selected_text: None,
            parameters: Map::new(),
        }
    }

    /// Set the cursor position.
    pub fn with_cursor(mut self, position: usize) -> Self {
        self.cursor_position = Some(position);
        self
    }

    /// Set a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Result of a code operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl OperationResult {
    /// A successful result carrying content.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            ..Default::default()
        }
    }

    /// A failed result with a single error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            metadata: Map::new(),
            errors: vec![error.into()],
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
