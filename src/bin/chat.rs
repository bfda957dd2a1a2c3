//! Interactive console chat.
//!
//! # Environment Variables
//!
//! - `CHAT_MODEL` - Azure OpenAI deployment name
//! - `AZURE_OPENAI_KEY` - API key
//! - `AZURE_OPENAI_ENDPOINT` - resource endpoint
//! - `AZURE_OPENAI_API_VERSION` - REST API version (default: 2024-02-01)
//! - `CHAT_CONFIG` - optional YAML settings file (or pass it as the first argument)
//! - `RUST_LOG` - tracing filter (default: "info,plugin_chat=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin chat -- chat.yaml
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use plugin_chat::chat::{ChatLoop, ConsoleIo, LogObserver};
use plugin_chat::config::{Settings, ENV_CONFIG_PATH};
use plugin_chat::llms::AzureChatCompletion;
use plugin_chat::plugins::{LightsPlugin, TimePlugin};
use plugin_chat::CapabilityRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plugin_chat=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from));
    let settings = Settings::load(config_path.as_deref()).context("loading settings")?;

    let client = AzureChatCompletion::from_settings(&settings)
        .context("configuring Azure OpenAI chat completion")?;

    let mut registry = CapabilityRegistry::new();
    registry.add_plugin(&LightsPlugin::new())?;
    registry.add_plugin(&TimePlugin::new())?;

    tracing::info!(
        "plugin-chat {} ready: model '{}', {} capabilities",
        plugin_chat::VERSION,
        settings.deployment.as_deref().unwrap_or_default(),
        registry.len()
    );
    tracing::info!("Type '{}' to quit", settings.exit_sentinel);

    let mut session = ChatLoop::new(
        Arc::new(client),
        Arc::new(registry),
        settings.loop_settings(),
    )
    .with_observer(Arc::new(LogObserver::new()));

    let mut io = ConsoleIo::new(std::io::stdout().is_terminal());
    session.run(&mut io).await?;
    Ok(())
}
