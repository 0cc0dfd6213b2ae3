use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File, FileFormat};
use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Parent directory for the sandbox workspace root. System temp dir when unset.
    pub workspace_dir: Option<PathBuf>,
    pub default_language: String,
    pub sandbox: SandboxSettings,
    pub logging: LoggingConfig,
    pub provider: ProviderSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SandboxSettings {
    pub max_memory_bytes: u64,
    pub max_cpu_seconds: u64,
    pub max_processes: u64,
    pub install_timeout_secs: u64,
    /// Explicit interpreter for python code; looked up on PATH when unset.
    pub python_interpreter: Option<String>,
    pub node_binary: String,
    pub pip_binary: String,
    pub npm_binary: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderSettings {
    pub name: String,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key: Option<Secret<String>>,
}

impl AgentConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("CODE_AGENT_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map CODE_AGENT__SANDBOX__MAX_CPU_SECONDS=10 to sandbox.max_cpu_seconds
            .add_source(
                Environment::with_prefix("CODE_AGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Parse a TOML document, filling anything it omits with defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Language used when a request does not name one.
    pub fn default_language(&self) -> &str {
        if self.default_language.is_empty() {
            "python"
        } else {
            &self.default_language
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            max_memory_bytes: 512 * 1024 * 1024, // 512MB
            max_cpu_seconds: 30,
            max_processes: 5,
            install_timeout_secs: 300,
            python_interpreter: None,
            node_binary: "node".into(),
            pip_binary: "pip".into(),
            npm_binary: "npm".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "openai".into(),
            model: Some("gpt-4".into()),
            temperature: 0.7,
            max_tokens: 2000,
            api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.default_language(), "python");
        assert_eq!(config.sandbox.max_memory_bytes, 512 * 1024 * 1024);
        assert_eq!(config.sandbox.max_cpu_seconds, 30);
        assert_eq!(config.sandbox.max_processes, 5);
        assert!(config.workspace_dir.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AgentConfig::from_toml_str(
            r#"
            default_language = "javascript"

            [sandbox]
            max_cpu_seconds = 2

            [provider]
            name = "anthropic"
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_language(), "javascript");
        assert_eq!(config.sandbox.max_cpu_seconds, 2);
        assert_eq!(config.sandbox.max_processes, 5);
        assert_eq!(config.sandbox.node_binary, "node");
        assert_eq!(config.provider.name, "anthropic");
        assert_eq!(
            config.provider.api_key.as_ref().unwrap().expose_secret(),
            "sk-test"
        );
        assert!(!format!("{:?}", config.provider).contains("sk-test"));
    }
}
