//! Guildlink entry point: loads the config, starts the Discord client and
//! connects one bridge per account.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn};

use guildlink::bridge::{BridgeEvent, BridgeServices, ChatBridge, ChatBridgeManager};
use guildlink::common::directory::{StaticGuildConfigs, StaticPlayerDirectory};
use guildlink::config::{env::get_config_path, load_and_validate};
use guildlink::discord::{ContentTranslator, DiscordBot};
use guildlink::protocol::TcpSessionConnector;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Guildlink v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Server: {}:{}", config.minecraft.host, config.port());
    for account in &config.minecraft.accounts {
        info!("  Account: {}", account);
    }
    info!("  Guilds: {}", config.guilds.len());

    // ============================================================
    // Discord client and shared services
    // ============================================================
    let translator = Arc::new(ContentTranslator::new());
    let discord_bot = DiscordBot::new(&config.discord.token, translator.clone()).await?;
    let provider = Arc::new(discord_bot.channel_provider());
    let players = Arc::new(StaticPlayerDirectory::new(config.player_refs()));
    let guilds = Arc::new(StaticGuildConfigs::new(config.guild_links()));

    // ============================================================
    // One bridge per account
    // ============================================================
    let bridges: Vec<ChatBridge> = config
        .minecraft
        .accounts
        .iter()
        .map(|account| {
            let services = BridgeServices {
                connector: Arc::new(TcpSessionConnector::new(config.client_options(account))),
                players: players.clone(),
                guilds: guilds.clone(),
                discord: provider.clone(),
                translator: translator.clone(),
            };
            ChatBridge::new(config.bridge_settings(account), services)
        })
        .collect();

    for bridge in &bridges {
        spawn_event_log(bridge);
    }

    let manager = ChatBridgeManager::new(bridges);
    discord_bot.attach(manager.clone()).await;
    let shard_manager = discord_bot.shard_manager();

    info!("Starting Discord bot...");
    let mut discord_task = tokio::spawn(discord_bot.run());

    manager.connect_all().await;

    // ============================================================
    // Run until shutdown
    // ============================================================
    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - disconnecting bridges...");
            true
        }
        result = &mut discord_task => {
            match result {
                Ok(Ok(())) => warn!("Discord client stopped"),
                Ok(Err(e)) => error!("Discord client failed: {}", e),
                Err(e) => error!("Discord task panicked: {}", e),
            }
            false
        }
    };

    manager.disconnect_all();

    if shutdown {
        let timeout = Duration::from_secs(5);
        if tokio::time::timeout(timeout, shard_manager.shutdown_all())
            .await
            .is_err()
        {
            warn!("Discord shutdown timed out");
        }
        info!("Discord shutdown complete");
    }

    info!("Exiting...");
    Ok(())
}

/// Log in-game commands and errors a bridge raises.
fn spawn_event_log(bridge: &ChatBridge) {
    let name = bridge.name().to_string();
    let mut events = bridge.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                BridgeEvent::Command { message, command } => {
                    info!(
                        bridge = %name,
                        "Command '{}' from {}",
                        command.name,
                        message.author_ign().unwrap_or("unknown")
                    );
                }
                BridgeEvent::Error(e) => warn!(bridge = %name, "Bridge error: {}", e),
                _ => {}
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
