//! Minecraft to Discord relay and send feedback.

use fancy_regex::Regex;
use tracing::{debug, warn};

use crate::bridge::filter::{FilterDirection, MessageFilter};
use crate::common::error::DiscordResult;
use crate::common::messages::{ChatMessage, DiscordOrigin, MessageType};
use crate::common::types::ChannelKind;
use crate::discord::channel::{DiscordChannel, WebhookPayload};
use crate::discord::translator::ContentTranslator;
use crate::game::formatter::{FormatContext, MessageFormatter};
use crate::game::sender::SendOutcome;

pub const DELIVERED_REACTION: &str = "✅";
pub const REJECTED_REACTION: &str = "❌";
pub const BLOCKED_REACTION: &str = "⚠️";

/// System lines worth showing in the guild channel.
const GUILD_NOTICE_PATTERNS: [&str; 4] = [
    r"^Guild > \w{1,16} (?:joined|left)\.$",
    r"^(?:\[[^\]]+\] )?\w{1,16} (?:joined|left) the guild!$",
    r"^(?:\[[^\]]+\] )?\w{1,16} was kicked from the guild by (?:\[[^\]]+\] )?\w{1,16}!$",
    r"^(?:\[[^\]]+\] )?\w{1,16} was (?:promoted|demoted) from .+ to .+$",
];

/// Decides which game lines reach Discord and renders them.
pub struct RelayPolicy {
    notices: Vec<Regex>,
    filter: MessageFilter,
    fallback: MessageFormatter,
}

impl RelayPolicy {
    pub fn new(filter: MessageFilter, fallback: MessageFormatter) -> Self {
        let notices = GUILD_NOTICE_PATTERNS
            .iter()
            // Constant patterns; failing to compile is a bug.
            .map(|p| Regex::new(p).expect("guild notice pattern compiles"))
            .collect();
        Self {
            notices,
            filter,
            fallback,
        }
    }

    pub fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    fn is_guild_notice(&self, text: &str) -> bool {
        self.notices
            .iter()
            .any(|p| p.is_match(text).unwrap_or(false))
    }

    /// Channel a game line should be relayed to, if any.
    pub fn target(&self, message: &ChatMessage) -> Option<ChannelKind> {
        if message.is_from_self || message.is_spam || message.is_blocked {
            return None;
        }

        let kind = match message.message_type {
            Some(MessageType::Guild) => ChannelKind::Guild,
            Some(MessageType::Officer) => ChannelKind::Officer,
            Some(_) => return None,
            None if self.is_guild_notice(&message.cleaned_text) => ChannelKind::Guild,
            None => return None,
        };

        let text = if message.is_system() {
            &message.cleaned_text
        } else {
            &message.content
        };
        if let Some(pattern) = self
            .filter
            .blocking_pattern(FilterDirection::MinecraftToDiscord, text)
        {
            debug!(pattern, "Filtered game line: {}", message.cleaned_text);
            return None;
        }

        Some(kind)
    }

    /// Post a game line to `channel`.
    ///
    /// Player lines go through the webhook under the player's name; if that
    /// fails the bot posts them with the fallback format.
    pub async fn deliver(
        &self,
        channel: &dyn DiscordChannel,
        translator: &ContentTranslator,
        message: &ChatMessage,
    ) -> DiscordResult<()> {
        let directory = channel.directory();

        let Some(ign) = message.author_ign() else {
            let content = translator.minecraft_to_discord(&message.cleaned_text, &directory);
            return channel.send_via_bot(&content).await;
        };

        let content = translator.minecraft_to_discord(&message.content, &directory);
        if content.trim().is_empty() {
            return Ok(());
        }

        let payload = WebhookPayload::for_player(ign, content.clone());
        match channel.send_via_webhook(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Webhook send to {} failed, using bot: {}", channel.id(), e);
                let mut context = FormatContext::new(ign, content);
                if let Some(rank) = message.author.as_ref().and_then(|a| a.guild_rank.clone()) {
                    context = context.with_rank(rank);
                }
                channel.send_via_bot(&self.fallback.format(&context)).await
            }
        }
    }
}

/// React to the Discord message a send came from, with a notice on failure.
pub async fn report_outcome(
    channel: &dyn DiscordChannel,
    origin: DiscordOrigin,
    outcome: SendOutcome,
) -> DiscordResult<()> {
    match outcome {
        SendOutcome::Delivered | SendOutcome::Unconfirmed => {
            channel.react(origin.message_id, DELIVERED_REACTION).await
        }
        SendOutcome::Rejected => {
            channel.react(origin.message_id, REJECTED_REACTION).await?;
            channel
                .send_via_bot("That message was rejected in game as a duplicate. Try rewording it.")
                .await
        }
        SendOutcome::Blocked => {
            channel.react(origin.message_id, BLOCKED_REACTION).await?;
            channel
                .send_via_bot(&format!(
                    "<@{}> your message was blocked by the in-game chat filter.",
                    origin.author_id
                ))
                .await
        }
        SendOutcome::NotConnected => channel.react(origin.message_id, REJECTED_REACTION).await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::common::directory::StaticPlayerDirectory;
    use crate::discord::channel::testing::{Delivery, FakeChannel};
    use crate::game::parser::ChatLineParser;

    fn parse(line: &str) -> ChatMessage {
        ChatLineParser::new("BridgeBot", Arc::new(StaticPlayerDirectory::new(vec![]))).parse(line)
    }

    fn policy() -> RelayPolicy {
        RelayPolicy::new(
            MessageFilter::new(&["(?i)discord\\.gg".to_string()], &[]),
            MessageFormatter::minecraft_to_discord_default(),
        )
    }

    #[test]
    fn test_targets() {
        let policy = policy();
        assert_eq!(policy.target(&parse("Guild > Steve [Member]: hi")), Some(ChannelKind::Guild));
        assert_eq!(policy.target(&parse("Officer > Steve: hi")), Some(ChannelKind::Officer));
        assert_eq!(policy.target(&parse("Party > Steve: hi")), None);
        assert_eq!(policy.target(&parse("Guild > BridgeBot: echo")), None);
        assert_eq!(policy.target(&parse("Guild > Steve joined.")), Some(ChannelKind::Guild));
        assert_eq!(policy.target(&parse("[MVP+] Alex joined the guild!")), Some(ChannelKind::Guild));
        assert_eq!(policy.target(&parse("You cannot say the same message twice!")), None);
        assert_eq!(policy.target(&parse("Guild > Steve: join discord.gg/abc")), None);
    }

    #[tokio::test]
    async fn test_webhook_with_bot_fallback() {
        let policy = policy();
        let translator = ContentTranslator::new();
        let channel = FakeChannel::new(10);
        let message = parse("Guild > Steve [Member]: hello *world*");

        policy.deliver(&channel, &translator, &message).await.unwrap();
        *channel.fail_webhook.lock().unwrap() = true;
        policy.deliver(&channel, &translator, &message).await.unwrap();

        let deliveries = channel.deliveries();
        match &deliveries[0] {
            Delivery::Webhook(payload) => {
                assert_eq!(payload.username, "Steve");
                assert_eq!(payload.content, "hello \\*world\\*");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(deliveries[1], Delivery::Bot("**Steve**: hello \\*world\\*".to_string()));
    }

    #[tokio::test]
    async fn test_blocked_notice_mentions_author() {
        let channel = FakeChannel::new(10);
        let origin = DiscordOrigin {
            channel_id: 10,
            message_id: 99,
            author_id: 7,
        };
        report_outcome(&channel, origin, SendOutcome::Blocked).await.unwrap();
        let deliveries = channel.deliveries();
        assert_eq!(
            deliveries[0],
            Delivery::Reaction { message_id: 99, emoji: BLOCKED_REACTION.to_string() }
        );
        match &deliveries[1] {
            Delivery::Bot(text) => assert!(text.starts_with("<@7>")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
