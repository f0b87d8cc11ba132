//! `hearth chat` — Interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;

use anyhow::bail;
use hearth_channels::CliChannel;
use hearth_channels::cli::CHANNEL_NAME;
use hearth_config::AppConfig;
use hearth_core::channel::{Channel, InboundMessage};
use tracing::warn;

use crate::runtime;

pub async fn run(config_path: Option<&Path>, message: Option<String>, user: String) -> anyhow::Result<()> {
    let config = runtime::load_config(config_path)?;

    // Check for API key early — give a clear error
    if !config.has_api_key() && config.providers.values().all(|p| p.api_key.is_none()) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
        eprintln!("    OPENAI_API_KEY=sk-...             (for OpenAI direct)");
        eprintln!("    HEARTH_API_KEY=sk-...             (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        bail!("No API key found. See above for setup instructions.");
    }

    let orchestrator = runtime::build(&config).await?;

    if let Some(text) = message {
        // Single message mode
        let reply = orchestrator.respond(&InboundMessage::new(CHANNEL_NAME, user, text)).await;
        println!("{}", reply.text);
        return Ok(());
    }

    println!();
    println!("  hearth — interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Agents:    {}", orchestrator.agents().iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let channel = CliChannel::new(user);
    let mut rx = channel.start().await?;

    prompt()?;
    while let Some(result) = rx.recv().await {
        match result {
            Ok(inbound) => {
                let reply = orchestrator.respond(&inbound).await;
                channel.send(inbound.chat_key(), &reply).await?;
            }
            Err(e) => {
                warn!(error = %e, "Input error");
                break;
            }
        }
        prompt()?;
    }

    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
