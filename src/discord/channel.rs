//! Delivery handles for bound Discord channels.
//!
//! The bridge only talks to Discord through [`DiscordChannel`], bound at link
//! time through a [`DiscordChannelProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{CreateAllowedMentions, CreateMessage, CreateWebhook, ExecuteWebhook};
use serenity::cache::Cache;
use serenity::http::{Http, HttpError};
use serenity::model::channel::ReactionType;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::model::webhook::Webhook;
use tracing::{debug, info};

use crate::common::error::{DiscordError, DiscordResult};
use crate::discord::directory::GuildDirectory;

/// Name given to webhooks this bot creates.
const WEBHOOK_NAME: &str = "guildlink";

/// A message posted through the channel webhook under a player's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookPayload {
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: String,
}

impl WebhookPayload {
    /// Payload posted as `ign` with their head as avatar.
    pub fn for_player(ign: &str, content: impl Into<String>) -> Self {
        Self {
            username: ign.to_string(),
            avatar_url: Some(format!("https://mc-heads.net/avatar/{}", ign)),
            content: content.into(),
        }
    }
}

/// A bound Discord text channel.
#[async_trait]
pub trait DiscordChannel: Send + Sync {
    fn id(&self) -> u64;

    async fn send_via_webhook(&self, payload: &WebhookPayload) -> DiscordResult<()>;

    async fn send_via_bot(&self, content: &str) -> DiscordResult<()>;

    async fn react(&self, message_id: u64, emoji: &str) -> DiscordResult<()>;

    /// Current snapshot of the owning guild.
    fn directory(&self) -> GuildDirectory;
}

/// Binds channel handles by id.
#[async_trait]
pub trait DiscordChannelProvider: Send + Sync {
    async fn channel(&self, channel_id: u64) -> DiscordResult<Arc<dyn DiscordChannel>>;
}

/// Map a serenity error onto our taxonomy. 403 means we lack permissions.
fn classify(error: serenity::Error, channel_id: u64) -> DiscordError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &error {
        match response.status_code.as_u16() {
            403 => {
                return DiscordError::PermissionDenied {
                    message: response.error.message.clone(),
                }
            }
            404 => return DiscordError::ChannelNotFound { channel_id },
            _ => {}
        }
    }
    DiscordError::Serenity(error)
}

/// Mentions a relayed message may ping. Never everyone/here.
fn allowed_mentions() -> CreateAllowedMentions {
    CreateAllowedMentions::new()
        .everyone(false)
        .all_users(true)
        .all_roles(true)
}

/// Channel handle backed by the serenity HTTP client and cache.
pub struct SerenityChannel {
    http: Arc<Http>,
    cache: Arc<Cache>,
    channel_id: ChannelId,
    guild_id: GuildId,
    webhook: Webhook,
}

#[async_trait]
impl DiscordChannel for SerenityChannel {
    fn id(&self) -> u64 {
        self.channel_id.get()
    }

    async fn send_via_webhook(&self, payload: &WebhookPayload) -> DiscordResult<()> {
        let mut builder = ExecuteWebhook::new()
            .content(&payload.content)
            .username(&payload.username)
            .allowed_mentions(allowed_mentions());
        if let Some(avatar_url) = &payload.avatar_url {
            builder = builder.avatar_url(avatar_url);
        }
        self.webhook
            .execute(&self.http, false, builder)
            .await
            .map_err(|e| classify(e, self.id()))?;
        Ok(())
    }

    async fn send_via_bot(&self, content: &str) -> DiscordResult<()> {
        let message = CreateMessage::new()
            .content(content)
            .allowed_mentions(allowed_mentions());
        self.channel_id
            .send_message(&self.http, message)
            .await
            .map_err(|e| classify(e, self.id()))?;
        Ok(())
    }

    async fn react(&self, message_id: u64, emoji: &str) -> DiscordResult<()> {
        self.channel_id
            .create_reaction(
                &self.http,
                MessageId::new(message_id),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(|e| classify(e, self.id()))
    }

    fn directory(&self) -> GuildDirectory {
        GuildDirectory::from_cache(&self.cache, self.guild_id)
    }
}

/// Resolves channels through the Discord API, reusing or creating a webhook.
pub struct SerenityChannelProvider {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityChannelProvider {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    async fn webhook_for(&self, channel_id: ChannelId) -> DiscordResult<Webhook> {
        let id = channel_id.get();
        let existing = channel_id
            .webhooks(&self.http)
            .await
            .map_err(|e| classify(e, id))?;

        // Only webhooks we own carry a token.
        if let Some(webhook) = existing.into_iter().find(|w| w.token.is_some()) {
            debug!("Reusing webhook {} in channel {}", webhook.id, id);
            return Ok(webhook);
        }

        info!("Creating webhook in channel {}", id);
        channel_id
            .create_webhook(&self.http, CreateWebhook::new(WEBHOOK_NAME))
            .await
            .map_err(|e| classify(e, id))
    }
}

#[async_trait]
impl DiscordChannelProvider for SerenityChannelProvider {
    async fn channel(&self, channel_id: u64) -> DiscordResult<Arc<dyn DiscordChannel>> {
        let id = ChannelId::new(channel_id);
        let channel = id
            .to_channel(&self.http)
            .await
            .map_err(|e| classify(e, channel_id))?
            .guild()
            .ok_or(DiscordError::ChannelNotFound { channel_id })?;

        let webhook = self.webhook_for(id).await?;

        Ok(Arc::new(SerenityChannel {
            http: self.http.clone(),
            cache: self.cache.clone(),
            channel_id: id,
            guild_id: channel.guild_id,
            webhook,
        }))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_payload_uses_head_avatar() {
        let payload = WebhookPayload::for_player("Steve", "hi");
        assert_eq!(payload.username, "Steve");
        assert_eq!(
            payload.avatar_url.as_deref(),
            Some("https://mc-heads.net/avatar/Steve")
        );
    }
}
