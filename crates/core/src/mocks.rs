//! Mock implementations of core traits for testing.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Mutex;

use crate::{traits::CompletionProvider, Error, Result};

// =============================================================================
// Mock Completion Provider
// =============================================================================

/// Scripted mock provider that returns predefined responses in rotation
/// and records every prompt it receives.
pub struct MockProvider {
    responses: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
    embedding_dim: Option<usize>,
    fail_with: Option<String>,
}

impl MockProvider {
    /// Create a new mock provider with a queue of responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
            embedding_dim: None,
            fail_with: None,
        }
    }

    /// Create a mock that always returns the same response.
    pub fn constant(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    /// Create a mock whose every call fails with a provider error.
    pub fn failing(message: &str) -> Self {
        let mut mock = Self::new(Vec::new());
        mock.fail_with = Some(message.to_string());
        mock
    }

    /// Support embeddings of the given dimension.
    pub fn with_embeddings(mut self, dim: usize) -> Self {
        self.embedding_dim = Some(dim);
        self
    }

    /// Get the number of calls made to this mock.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_response(&self, prompt: &str) -> Result<String> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());

        if let Some(ref message) = self.fail_with {
            return Err(Error::model_provider(message.clone()));
        }

        let responses = self.responses.lock().unwrap();
        let idx = (prompts.len() - 1) % responses.len().max(1);
        Ok(responses.get(idx).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_response(&self, prompt: &str) -> Result<String> {
        self.next_response(prompt)
    }

    async fn stream_response(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.next_response(prompt)?;
        let chunks: Vec<Result<String>> = response
            .split_inclusive(' ')
            .map(|chunk| Ok(chunk.to_string()))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn get_embedding(&self, text: &str) -> Result<Vec<f32>> {
        match self.embedding_dim {
            Some(dim) => Ok(vec![(text.len() % 7) as f32 / 7.0; dim]),
            None => Err(Error::unsupported_capability(
                "embeddings are not supported by provider 'mock'",
            )),
        }
    }
}
