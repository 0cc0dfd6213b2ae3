//! Completion provider capability.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{Error, Result};

/// Text-generation backend consumed by the dispatcher.
///
/// The sandbox never talks to a provider; only prompt-building operations
/// (suggest, edit, test) do.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Generate a full response for a prompt.
    async fn generate_response(&self, prompt: &str) -> Result<String>;

    /// Stream a response as text chunks. The stream is finite and cannot be
    /// restarted; call again for a new one.
    async fn stream_response(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>>;

    /// Embed text. Providers without an embedding endpoint keep the default,
    /// which reports [`Error::UnsupportedCapability`].
    async fn get_embedding(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::unsupported_capability(format!(
            "embeddings are not supported by provider '{}'",
            self.name()
        )))
    }
}
