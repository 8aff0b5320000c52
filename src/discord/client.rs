//! Discord bot client.
//!
//! Builds the serenity client and exposes what the bridges need from it:
//! a channel provider over its HTTP client and cache, and the shard
//! manager for shutdown.

use std::sync::Arc;
use std::time::Duration;

use serenity::gateway::ShardManager;
use serenity::http::HttpBuilder;
use serenity::prelude::*;
use serenity::Client;
use tracing::{error, info};

use crate::bridge::ChatBridgeManager;
use crate::discord::channel::SerenityChannelProvider;
use crate::discord::handler::BridgeHandler;
use crate::discord::translator::ContentTranslator;

impl TypeMapKey for ChatBridgeManager {
    type Value = ChatBridgeManager;
}

async fn build_client(token: &str, translator: Arc<ContentTranslator>) -> anyhow::Result<Client> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_EMOJIS_AND_STICKERS;

    // Build a custom reqwest client with timeout settings
    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let http = HttpBuilder::new(token).client(reqwest_client).build();

    let client = serenity::client::ClientBuilder::new_with_http(http, intents)
        .event_handler(BridgeHandler::new(translator))
        .await?;
    Ok(client)
}

pub struct DiscordBot {
    client: Client,
}

impl DiscordBot {
    pub async fn new(token: &str, translator: Arc<ContentTranslator>) -> anyhow::Result<Self> {
        let client = build_client(token, translator).await?;
        Ok(Self { client })
    }

    /// Channel provider backed by this client's HTTP client and cache.
    pub fn channel_provider(&self) -> SerenityChannelProvider {
        SerenityChannelProvider::new(self.client.http.clone(), self.client.cache.clone())
    }

    /// Make the bridges reachable from the event handler.
    pub async fn attach(&self, manager: ChatBridgeManager) {
        self.client
            .data
            .write()
            .await
            .insert::<ChatBridgeManager>(manager);
    }

    pub fn shard_manager(&self) -> Arc<ShardManager> {
        self.client.shard_manager.clone()
    }

    /// Run the gateway until it stops. serenity reconnects shards itself.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("Connecting to Discord...");
        match self.client.start().await {
            Ok(()) => {
                info!("Discord client disconnected normally");
                Ok(())
            }
            Err(e) => {
                error!("Discord client error: {}", e);
                Err(e.into())
            }
        }
    }
}
