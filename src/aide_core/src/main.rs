// Thin launcher for the assistant core. Initializes logging, loads the
// configuration document, builds the composition root, then either
// answers a single prompt or runs a line-oriented loop on stdin with
// sentence-streamed output.

use aide_core::core::assistant::Assistant;
use aide_core::core::config::AssistantConfig;
use aide_core::streaming::SentenceConsumer;
use aide_types::prelude::{GenerationParams, Message, RequestHints, SentenceChunk};
use anyhow::{Context, Result as AnyhowResult};
use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::ChronoUtc, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the assistant configuration document (JSON).
    #[arg(long, default_value = "config/aide.json")]
    config: PathBuf,

    /// Answer a single prompt and exit instead of reading stdin.
    #[arg(long)]
    prompt: Option<String>,
}

/// Prints each completed sentence as it becomes available, the way a
/// speech synthesizer would consume it.
struct StdoutSpeaker;

#[async_trait]
impl SentenceConsumer for StdoutSpeaker {
    async fn consume(
        &self,
        chunk: SentenceChunk,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !chunk.is_sentinel() {
            println!("{}", chunk.text);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stderr());

    let base_subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "aide_core=info".into()),
    );

    match log_format.as_str() {
        "json" => {
            let json_layer = tracing_bunyan_formatter::JsonStorageLayer;
            let bunyan_layer = tracing_bunyan_formatter::BunyanFormattingLayer::new(
                "aide_node".into(),
                non_blocking_writer,
            );
            base_subscriber.with(json_layer).with(bunyan_layer).init();
        }
        _ => {
            let fmt_layer = fmt::layer()
                .with_writer(non_blocking_writer)
                .with_timer(ChronoUtc::rfc_3339());
            base_subscriber.with(fmt_layer).init();
        }
    }

    let args = Args::parse();
    let config = AssistantConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    let assistant = Assistant::build(config)
        .await
        .context("building the assistant core")?;
    info!("Assistant ready");

    let outcome = match args.prompt {
        Some(prompt) => answer(&assistant, &prompt).await,
        None => repl(&assistant).await,
    };

    assistant.shutdown();
    outcome
}

async fn answer(assistant: &Assistant, prompt: &str) -> AnyhowResult<()> {
    let messages = [Message::user(prompt)];
    let session = assistant
        .stream(&messages, &GenerationParams::default(), &RequestHints::default())
        .await?;
    let outcome = session.run(Some(Arc::new(StdoutSpeaker))).await;
    info!(
        sentences = outcome.report.total_sentences,
        tokens = outcome.report.total_tokens,
        "Prompt answered"
    );
    Ok(())
}

async fn repl(assistant: &Assistant) -> AnyhowResult<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt == "exit" || prompt == "quit" {
            break;
        }
        if prompt == "status" {
            match serde_json::to_string_pretty(&assistant.status()) {
                Ok(rendered) => println!("{rendered}"),
                Err(e) => error!(error = %e, "Could not render status"),
            }
            continue;
        }
        if let Err(e) = answer(assistant, prompt).await {
            error!(error = %e, "Request failed");
            println!("Sorry, I could not answer that: {e}");
        }
    }
    Ok(())
}
