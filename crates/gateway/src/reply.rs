//! Reply generation for `/chat`.
//!
//! A single completion call: a system prompt carrying the summary and
//! long-term points, the short-term turns, then the new user message.

use convmem_config::ProviderConfig;
use convmem_core::memory::MemoryContext;
use convmem_core::message::Role;
use convmem_core::provider::{PromptMessage, Provider, ProviderRequest};
use std::sync::Arc;
use tracing::{debug, warn};

const FALLBACK_REPLY: &str =
    "I apologize, but I couldn't generate a response right now. Please try again in a moment.";

/// Outcome of one reply attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// The provider failed and `text` is the canned apology.
    pub fallback: bool,
}

/// Turns memory context and a user message into an assistant reply.
pub struct Responder {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl Responder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &ProviderConfig) -> Self {
        Self {
            max_tokens: Some(config.max_tokens),
            ..Self::new(provider, config.model.clone(), config.temperature)
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Whether the provider answers its health check. Errors count as unreachable.
    pub async fn provider_reachable(&self) -> bool {
        match self.provider.health_check().await {
            Ok(reachable) => reachable,
            Err(e) => {
                warn!(provider = self.provider.name(), "Provider health check failed: {e}");
                false
            }
        }
    }

    /// Generate a reply. Provider failures produce the fallback text, never an error.
    pub async fn reply(&self, context: &MemoryContext, message: &str) -> Reply {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: build_prompt(context, message),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match self.provider.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                debug!(model = %response.model, "Reply generated");
                Reply {
                    text: response.content.trim().to_string(),
                    fallback: false,
                }
            }
            Ok(_) => {
                warn!("Provider returned an empty reply");
                fallback()
            }
            Err(e) => {
                warn!(provider = self.provider.name(), "Reply generation failed: {e}");
                fallback()
            }
        }
    }
}

fn fallback() -> Reply {
    Reply {
        text: FALLBACK_REPLY.into(),
        fallback: true,
    }
}

fn system_prompt(context: &MemoryContext) -> String {
    let mut prompt = String::from(
        "You are a helpful conversational assistant. Use the memory below to keep \
         continuity with this user, and answer naturally.",
    );

    if !context.slider_summary.is_empty() {
        prompt.push_str("\n\nPrevious conversation summary: ");
        prompt.push_str(&context.slider_summary);
    }
    if !context.long_term_points.is_empty() {
        prompt.push_str("\n\nKey points from earlier conversations:");
        for point in &context.long_term_points {
            prompt.push_str("\n- ");
            prompt.push_str(point);
        }
    }
    if context.slider_summary.is_empty() && context.long_term_points.is_empty() {
        prompt.push_str("\n\nNo earlier history is available for this user.");
    }
    prompt
}

/// Assemble the prompt. The newest short-term turn is dropped when it is the
/// message being answered, since that turn is ingested before the reply.
pub(crate) fn build_prompt(context: &MemoryContext, message: &str) -> Vec<PromptMessage> {
    let mut turns = context.short_term_messages.as_slice();
    if let Some((last, rest)) = turns.split_last() {
        if last.role() == Role::User && last.content() == message {
            turns = rest;
        }
    }

    let mut messages = Vec::with_capacity(turns.len() + 2);
    messages.push(PromptMessage::system(system_prompt(context)));
    messages.extend(turns.iter().map(|turn| match turn.role() {
        Role::User => PromptMessage::user(turn.content()),
        Role::Assistant => PromptMessage::assistant(turn.content()),
    }));
    messages.push(PromptMessage::user(message));
    messages
}
