//! `aiterm image`: generate one image and save it.

use std::error::Error;

use crate::api::images::{generate_image, save_image};
use crate::cli::{engine_or_exit, AppContext};
use crate::core::provider::Provider;

pub async fn run_image(
    ctx: &AppContext,
    model: Option<String>,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: aiterm image <prompt>");
        std::process::exit(1);
    }

    let engine = engine_or_exit(Provider::OpenAi);
    let model = model.unwrap_or_else(|| ctx.config.image_model());

    eprintln!("🎨 Generating image with {model}...");
    let bytes = generate_image(
        ctx.client.http(),
        engine.base_url(),
        engine.api_key(),
        &model,
        &prompt,
        ctx.client.timeout(),
    )
    .await?;
    let path = save_image(&ctx.paths.image_dir(), &prompt, &bytes)?;
    println!("🖼  Image saved to {}", path.display());
    Ok(())
}
