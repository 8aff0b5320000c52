//! Discord message event handling.
//!
//! Feeds messages from bridged channels to the bridge manager, which is
//! stored in the client's data map once the bridges are built.

use std::sync::Arc;

use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tracing::{debug, error, info};

use crate::bridge::ChatBridgeManager;
use crate::common::command::{parse_command, CommandOrigin};
use crate::common::messages::DiscordMessage;
use crate::discord::directory::GuildDirectory;
use crate::discord::translator::ContentTranslator;

/// Discord event handler.
pub struct BridgeHandler {
    translator: Arc<ContentTranslator>,
}

impl BridgeHandler {
    pub fn new(translator: Arc<ContentTranslator>) -> Self {
        Self { translator }
    }
}

/// Message text with attachment URLs appended.
fn content_with_attachments(content: &str, attachments: &[String]) -> String {
    let mut full_content = content.to_string();
    for url in attachments {
        if !full_content.is_empty() {
            full_content.push(' ');
        }
        full_content.push_str(url);
    }
    full_content
}

#[async_trait]
impl EventHandler for BridgeHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        // Ignore our own messages
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        // Ignore bots and webhooks, which includes relayed game chat
        if msg.author.bot || msg.webhook_id.is_some() {
            return;
        }

        // Only handle guild (server) messages
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let manager = {
            let data = ctx.data.read().await;
            match data.get::<ChatBridgeManager>() {
                Some(manager) => manager.clone(),
                None => return,
            }
        };

        let channel_id = msg.channel_id.get();
        let Some(config) = manager
            .bridge_for_channel(channel_id)
            .and_then(|bridge| bridge.linked_config())
        else {
            return;
        };

        let content = msg.content.trim();
        if content.is_empty() && msg.attachments.is_empty() {
            return;
        }

        // Prefixed commands are for bots, not for the game
        if parse_command(content, &config.prefixes, &config.bot_ign, CommandOrigin::Discord).is_some() {
            debug!("Skipping command in channel {}: {}", channel_id, content);
            return;
        }

        let sender = msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .or_else(|| msg.author.global_name.clone())
            .unwrap_or_else(|| msg.author.name.clone());

        let attachments: Vec<String> = msg.attachments.iter().map(|a| a.url.clone()).collect();
        let full_content = content_with_attachments(content, &attachments);

        let directory = GuildDirectory::from_cache(&ctx.cache, guild_id);
        let translated = self.translator.discord_to_minecraft(&full_content, &directory);
        if translated.trim().is_empty() {
            return;
        }

        let message = DiscordMessage {
            channel_id,
            message_id: msg.id.get(),
            author_id: msg.author.id.get(),
            author_name: sender,
            content: translated,
        };

        match manager.route_discord_message(message).await {
            Ok(Some(outcome)) => debug!("Discord -> Minecraft [{}]: {:?}", channel_id, outcome),
            Ok(None) => {}
            Err(e) => error!("Failed to relay Discord message from {}: {}", channel_id, e),
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "Discord bot connected as {} ({} guilds)",
            ready.user.name,
            ready.guilds.len()
        );
    }
}
