//! `convmem context|history|login|logout`: one-shot memory operations.

use convmem_config::AppConfig;
use convmem_memory::{Degradation, MemoryOrchestrator};
use convmem_providers::{LlmSummarizer, OpenAiCompatProvider};
use std::sync::Arc;

async fn open_memory(config: &AppConfig) -> Result<MemoryOrchestrator, Box<dyn std::error::Error>> {
    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);
    let summarizer = Arc::new(LlmSummarizer::from_config(provider, &config.provider));
    Ok(convmem_memory::open_orchestrator(config, summarizer).await?)
}

fn print_degradations(degradations: &[Degradation]) {
    for d in degradations {
        println!("   degraded: {} ({})", d.step.as_str(), d.reason);
    }
}

pub async fn context(
    config: &AppConfig,
    user_id: &str,
    conversation_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let memory = open_memory(config).await?;
    let context = memory.get_context(user_id, conversation_id).await;
    memory.close().await;

    if context.is_empty() {
        println!("No memory for {user_id}/{conversation_id}");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}

pub async fn history(
    config: &AppConfig,
    user_id: &str,
    skip: u64,
    limit: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let limit = limit.min(convmem_gateway::api::MAX_HISTORY_LIMIT);
    let memory = open_memory(config).await?;
    let page = memory.history(user_id, skip, limit).await;
    memory.close().await;
    let page = page?;

    println!(
        "Chat log for {user_id}: {} of {} (skip {skip})",
        page.entries.len(),
        page.total
    );
    for entry in &page.entries {
        println!(
            "  {} [{}] {:>9}: {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.conversation_id,
            entry.role.as_str(),
            entry.content
        );
    }
    Ok(())
}

pub async fn login(
    config: &AppConfig,
    user_id: &str,
    conversation_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let memory = open_memory(config).await?;
    let report = memory.login(user_id, conversation_id).await;
    memory.close().await;

    if report.transferred {
        println!("Memory restored for {user_id}/{conversation_id}");
    } else {
        println!("No saved memory for {user_id}/{conversation_id}");
    }
    print_degradations(&report.degradations);
    Ok(())
}

pub async fn logout(
    config: &AppConfig,
    user_id: &str,
    conversation_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let memory = open_memory(config).await?;
    let report = memory.logout(user_id, conversation_id).await;
    memory.close().await;

    if report.transferred {
        println!("Session saved and cleared for {user_id}/{conversation_id}");
    } else {
        println!("Session cleared for {user_id}/{conversation_id} (nothing saved)");
    }
    print_degradations(&report.degradations);
    Ok(())
}
