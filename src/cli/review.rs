// src/cli/review.rs — `prompt-doctor review`

use std::sync::Arc;
use std::time::Duration;

use crate::generation::openai::OpenAiBackend;
use crate::generation::GenerationOptions;
use crate::infra::config::Config;
use crate::render::Context;
use crate::session::{open_browser, SessionCoordinator};

pub struct ReviewArgs {
    pub id: String,
    pub context: Context,
    pub model: Option<String>,
    pub port: Option<u16>,
    pub no_browser: bool,
    pub timeout: Option<u64>,
}

/// Run a review session and print the final generation to stdout.
pub async fn run_review(mut config: Config, args: ReviewArgs) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_browser {
        config.server.open_browser = false;
    }
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .or_else(|| config.review.timeout());

    let backend = Arc::new(OpenAiBackend::from_config(&config.generation)?);
    let coordinator = SessionCoordinator::from_config(&config, backend)?;

    let options = GenerationOptions {
        model: args.model,
        temperature: config.generation.temperature,
        max_tokens: config.generation.max_tokens,
        ..Default::default()
    };

    tracing::info!(
        "Reviewing '{}' with {} context variable(s)",
        args.id,
        args.context.len()
    );
    let session = coordinator.open(&args.id, args.context, options).await?;
    let url = session.url();
    eprintln!("{}", review_banner(&args.id, &url));
    if coordinator.opens_browser() {
        if let Err(e) = open_browser(&url) {
            tracing::debug!("Browser launch failed: {}", e);
            eprintln!("  Couldn't launch a browser; open {url} yourself.");
        }
    }

    let result = session.wait_timeout(timeout).await?;
    println!("{}", result.content);
    Ok(())
}

fn review_banner(id: &str, url: &str) -> String {
    format!("Reviewing '{id}' at {url}\n  Save or discard in the page to finish.")
}
