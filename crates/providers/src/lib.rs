//! LLM provider implementations for convmem.
//!
//! [`OpenAiCompatProvider`] implements `convmem_core::Provider`;
//! [`LlmSummarizer`] turns any provider into the memory core's `Summarizer`.

pub mod openai_compat;
pub mod summarizer;

pub use openai_compat::OpenAiCompatProvider;
pub use summarizer::LlmSummarizer;
