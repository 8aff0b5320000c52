//! Owns every bridge and routes Discord traffic to the right one.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::bridge::orchestrator::ChatBridge;
use crate::common::error::BridgeResult;
use crate::common::messages::{BroadcastRequest, DiscordMessage};
use crate::game::sender::SendOutcome;

/// One bridge per configured account.
#[derive(Clone, Default)]
pub struct ChatBridgeManager {
    bridges: Vec<ChatBridge>,
}

impl ChatBridgeManager {
    pub fn new(bridges: Vec<ChatBridge>) -> Self {
        Self { bridges }
    }

    pub fn bridges(&self) -> &[ChatBridge] {
        &self.bridges
    }

    /// Connect every bridge concurrently.
    pub async fn connect_all(&self) {
        info!("Connecting {} bridges", self.bridges.len());
        join_all(self.bridges.iter().map(|bridge| bridge.connect())).await;
    }

    pub fn disconnect_all(&self) {
        for bridge in &self.bridges {
            bridge.disconnect();
        }
    }

    /// Broadcast through every linked bridge. Failures are logged per bridge.
    pub async fn broadcast(&self, request: BroadcastRequest) -> usize {
        let linked: Vec<&ChatBridge> = self.bridges.iter().filter(|b| b.is_linked()).collect();
        let results = join_all(linked.iter().map(|bridge| bridge.broadcast(request.clone()))).await;

        let mut delivered = 0;
        for (bridge, result) in linked.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(bridge = %bridge.name(), "Broadcast failed: {}", e),
            }
        }
        delivered
    }

    /// Linked bridge serving the named in-game guild.
    pub fn bridge_for_guild(&self, guild_name: &str) -> Option<&ChatBridge> {
        self.bridges.iter().find(|bridge| {
            bridge
                .linked_config()
                .is_some_and(|config| config.name.eq_ignore_ascii_case(guild_name))
        })
    }

    /// Linked bridge a Discord channel is mapped to.
    pub fn bridge_for_channel(&self, channel_id: u64) -> Option<&ChatBridge> {
        self.bridges
            .iter()
            .find(|bridge| bridge.handles_channel(channel_id))
    }

    /// Hand a Discord message to the bridge bound to its channel.
    ///
    /// `Ok(None)` when no bridge serves the channel or a filter dropped it.
    pub async fn route_discord_message(
        &self,
        message: DiscordMessage,
    ) -> BridgeResult<Option<SendOutcome>> {
        let Some(bridge) = self.bridge_for_channel(message.channel_id) else {
            debug!("No bridge for Discord channel {}", message.channel_id);
            return Ok(None);
        };
        bridge.handle_discord_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::bridge::orchestrator::{BridgeServices, BridgeSettings};
    use crate::common::directory::{StaticGuildConfigs, StaticPlayerDirectory};
    use crate::common::types::{ChannelKind, ChannelMapping, GuildLinkConfig};
    use crate::discord::channel::testing::{Delivery, FakeChannelProvider};
    use crate::discord::translator::ContentTranslator;
    use crate::game::session::testing::ScriptedConnector;
    use crate::game::session::SessionEvent;

    fn guild(name: &str, channel: u64) -> GuildLinkConfig {
        GuildLinkConfig {
            name: name.to_string(),
            bot_ign: "BridgeBot".to_string(),
            prefixes: vec!["!".to_string()],
            channel_mappings: vec![ChannelMapping {
                kind: ChannelKind::Guild,
                discord_channel_id: channel,
            }],
        }
    }

    fn bridge(
        guild_name: &str,
        connector: &ScriptedConnector,
        channels: &Arc<FakeChannelProvider>,
    ) -> ChatBridge {
        let mut settings = BridgeSettings::new(guild_name);
        settings.guild_name = Some(guild_name.to_string());
        let services = BridgeServices {
            connector: Arc::new(connector.clone()),
            players: Arc::new(StaticPlayerDirectory::new(vec![])),
            guilds: Arc::new(StaticGuildConfigs::new(vec![guild("Alpha", 1), guild("Beta", 2)])),
            discord: channels.clone(),
            translator: Arc::new(ContentTranslator::new()),
        };
        ChatBridge::new(settings, services)
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_and_broadcast() {
        let alpha_connector = ScriptedConnector::new();
        let beta_connector = ScriptedConnector::new();
        let channels = Arc::new(FakeChannelProvider::with_channels(&[1, 2]));
        let manager = ChatBridgeManager::new(vec![
            bridge("Alpha", &alpha_connector, &channels),
            bridge("Beta", &beta_connector, &channels),
        ]);

        manager.connect_all().await;
        let mut alpha = alpha_connector.take_session().unwrap();
        let beta = beta_connector.take_session().unwrap();
        alpha.emit(SessionEvent::Spawn);
        beta.emit(SessionEvent::Spawn);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(manager.bridge_for_guild("beta").unwrap().name(), "Beta");
        assert_eq!(manager.bridge_for_channel(1).unwrap().name(), "Alpha");
        assert!(manager.bridge_for_channel(3).is_none());

        let routed = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .route_discord_message(DiscordMessage {
                        channel_id: 1,
                        message_id: 11,
                        author_id: 7,
                        author_name: "Alice".to_string(),
                        content: "hi".to_string(),
                    })
                    .await
            })
        };
        let line = alpha.next_chat().await.unwrap();
        assert!(line.starts_with("/gc Alice: hi"));
        assert_eq!(routed.await.unwrap().unwrap(), Some(SendOutcome::Unconfirmed));

        let unrouted = manager
            .route_discord_message(DiscordMessage {
                channel_id: 3,
                message_id: 12,
                author_id: 7,
                author_name: "Alice".to_string(),
                content: "hi".to_string(),
            })
            .await
            .unwrap();
        assert!(unrouted.is_none());

        let delivered = manager
            .broadcast(BroadcastRequest {
                content: "Maintenance at noon".to_string(),
                discord: true,
                minecraft: false,
            })
            .await;
        assert_eq!(delivered, 2);
        assert!(channels
            .get(2)
            .deliveries()
            .contains(&Delivery::Bot("Maintenance at noon".to_string())));

        manager.disconnect_all();
        assert!(manager.bridges().iter().all(|b| !b.is_ready()));
    }
}
