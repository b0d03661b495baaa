use dotenv::dotenv;
use eyre::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use contract_event_notifier::alerts::Notifier;
use contract_event_notifier::commands::{canonical_address, CommandHandler};
use contract_event_notifier::config::{AppConfig, ContractConfig};
use contract_event_notifier::dispatcher::Dispatcher;
use contract_event_notifier::explorer::EtherscanClient;
use contract_event_notifier::listener::{connect, AlloyConnection};
use contract_event_notifier::registry::Registry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // 1. Load Config
    let config = AppConfig::new()?;

    // File logging; stdout belongs to the command surface
    let file_appender = tracing_appender::rolling::daily(
        &config.logging.directory,
        &config.logging.file_prefix,
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    info!("Starting contract event notifier");
    info!("  Provider: [HIDDEN]");
    info!("  Explorer: {}", config.explorer.api_url);
    info!("  Default channel: {}", config.notifications.default_channel);

    // 2. Setup Components
    let provider = Arc::new(connect(&config.provider.ws_url).await?);
    let notifier = Arc::new(Notifier::new(config.notifications.clone()));
    if !notifier.has_channel(&config.notifications.default_channel) {
        warn!(
            "Default channel {} has no delivery settings",
            config.notifications.default_channel
        );
    }

    let (tx, rx) = mpsc::channel(100);
    let connection = Arc::new(AlloyConnection::new(provider, tx));
    let registry = Arc::new(Registry::new(connection));
    let explorer = Arc::new(EtherscanClient::new(config.explorer.clone()));
    let handler = CommandHandler::new(
        registry.clone(),
        explorer,
        config.notifications.default_channel.clone(),
    );

    // 3. Dispatcher (Consumer)
    let dispatcher = Dispatcher::new(registry.clone(), notifier);
    tokio::spawn(dispatcher.run(rx));

    // 4. Contracts from config
    for contract in &config.contracts {
        let default_channel = &config.notifications.default_channel;
        preload_contract(&handler, &registry, contract, default_channel).await;
    }

    // 5. Command surface on stdin
    println!("Ready. Type help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = handler.handle_line(&line).await;
        if reply.ephemeral {
            eprintln!("{}", reply.content);
        } else {
            println!("{}", reply.content);
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}

async fn preload_contract(
    handler: &CommandHandler,
    registry: &Registry,
    contract: &ContractConfig,
    default_channel: &str,
) {
    let address = canonical_address(&contract.address);
    let channel = contract.channel.as_deref().unwrap_or(default_channel);

    if let Err(e) = handler.add_contract(&address, channel).await {
        error!("Failed to register configured contract {}: {}", address, e);
        return;
    }
    for event in &contract.events {
        if let Err(e) = registry.subscribe(&address, event).await {
            error!("Failed to subscribe to {} on {}: {}", event, address, e);
        }
    }
}
