//! Model listing functionality
//!
//! This module handles listing the models a provider offers for a task.

use std::error::Error;

use crate::api::models::ModelTask;
use crate::cli::{engine_or_exit, resolve_provider, AppContext};
use crate::core::provider::Provider;

/// The model the configuration would use for `task` on `provider`.
fn configured_default(ctx: &AppContext, provider: Provider, task: ModelTask) -> Option<String> {
    match (task, provider) {
        (ModelTask::Chat, _) => Some(ctx.config.chat_model(provider)),
        (ModelTask::Image, Provider::OpenAi) => Some(ctx.config.image_model()),
        (ModelTask::Image, Provider::Gemini) => None,
    }
}

pub async fn list_models(
    ctx: &AppContext,
    engine: Option<&str>,
    task: ModelTask,
) -> Result<(), Box<dyn Error>> {
    let provider = resolve_provider(engine, &ctx.config)?;
    let engine = engine_or_exit(provider);

    println!("🤖 Available {task} models for {}", provider.display_name());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    let default_model = configured_default(ctx, provider, task);
    if let Some(default_model) = &default_model {
        println!("🎯 Default model: {default_model} (from config)");
        println!();
    }

    let models = engine
        .adapter()
        .fetch_available_models(ctx.client.http(), task, ctx.client.timeout())
        .await;

    if models.is_empty() {
        println!("No models found for this provider.");
        return Ok(());
    }

    println!("Found {} models:", models.len());
    println!();
    for model in models {
        let marker = if default_model.as_deref() == Some(model.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  • {model}{marker}");
    }
    Ok(())
}
