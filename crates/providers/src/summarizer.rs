//! LLM-backed summarizer and point extractor.

use async_trait::async_trait;
use convmem_config::ProviderConfig;
use convmem_core::error::CollaboratorError;
use convmem_core::provider::{PromptMessage, Provider, ProviderRequest, Summarizer};
use std::sync::Arc;
use tracing::debug;

/// Runs summary and extraction prompts through any [`Provider`].
pub struct LlmSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
            max_tokens: None,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &ProviderConfig) -> Self {
        Self::new(provider, config.model.clone()).with_max_tokens(config.max_tokens)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Run one prompt and return the trimmed reply, which may be empty.
    async fn run(&self, prompt: String) -> Result<String, CollaboratorError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![PromptMessage::user(prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = self.provider.complete(request).await?;
        let text = response.content.trim();
        debug!(provider = self.provider.name(), chars = text.len(), "Collaborator replied");
        Ok(text.to_string())
    }
}

pub(crate) fn summary_prompt(transcript: &str) -> String {
    format!(
        "Summarize the following conversation in 2-3 sentences, focusing on the key topics \
         and important information:\n\n{transcript}\n\nSummary:"
    )
}

pub(crate) fn extraction_prompt(transcript: &str, points: usize) -> String {
    let template: Vec<String> = (1..=points).map(|i| format!("- Point {i}")).collect();
    format!(
        "Extract exactly {points} key points from the following conversation. Focus on \
         important information, preferences, facts, and context that would be useful to \
         remember for future conversations.\n\n{transcript}\n\n\
         Please provide exactly {points} key points in the following format:\n{}\n\nKey Points:",
        template.join("\n")
    )
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<String, CollaboratorError> {
        let summary = self.run(summary_prompt(transcript)).await?;
        if summary.is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(summary)
    }

    /// A blank reply is returned as-is; the caller pads it to the point count.
    async fn extract(&self, transcript: &str, points: usize) -> Result<String, CollaboratorError> {
        self.run(extraction_prompt(transcript, points)).await
    }
}
