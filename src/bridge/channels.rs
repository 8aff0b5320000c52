//! Discord channel bindings for a linked bridge.
//!
//! Linking binds one handle per configured channel mapping. The bindings are
//! built in full before they are published, so a half-linked bridge never
//! delivers anywhere.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::common::error::LinkError;
use crate::common::types::{ChannelKind, GuildLinkConfig};
use crate::discord::channel::{DiscordChannel, DiscordChannelProvider};

/// Guild configuration plus a bound handle per mapped channel kind.
#[derive(Clone)]
pub struct LinkedChannels {
    config: GuildLinkConfig,
    bound: HashMap<ChannelKind, Arc<dyn DiscordChannel>>,
}

impl LinkedChannels {
    /// Bind every mapping of `config`.
    ///
    /// Any failure aborts the whole bind; a guild with no mappings at all has
    /// nothing to relay to.
    pub async fn bind(
        config: GuildLinkConfig,
        provider: &dyn DiscordChannelProvider,
    ) -> Result<Self, LinkError> {
        if config.channel_mappings.is_empty() {
            return Err(LinkError::NoUsableChannel(config.name.clone()));
        }

        let mut bound = HashMap::new();
        for mapping in &config.channel_mappings {
            let channel = provider.channel(mapping.discord_channel_id).await?;
            debug!(
                "Bound {:?} chat to Discord channel {}",
                mapping.kind, mapping.discord_channel_id
            );
            bound.insert(mapping.kind, channel);
        }

        Ok(Self { config, bound })
    }

    pub fn config(&self) -> &GuildLinkConfig {
        &self.config
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&Arc<dyn DiscordChannel>> {
        self.bound.get(&kind)
    }

    /// Handle for a Discord channel id, with the kind it is mapped to.
    pub fn by_id(&self, channel_id: u64) -> Option<(ChannelKind, &Arc<dyn DiscordChannel>)> {
        let kind = self.config.kind_for(channel_id)?;
        self.bound.get(&kind).map(|channel| (kind, channel))
    }

    pub fn contains(&self, channel_id: u64) -> bool {
        self.config.kind_for(channel_id).is_some()
    }

    /// Every bound handle, guild channel first.
    pub fn all(&self) -> Vec<Arc<dyn DiscordChannel>> {
        [ChannelKind::Guild, ChannelKind::Officer]
            .iter()
            .filter_map(|kind| self.bound.get(kind).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::DiscordError;
    use crate::common::types::ChannelMapping;
    use crate::discord::channel::testing::FakeChannelProvider;

    fn config() -> GuildLinkConfig {
        GuildLinkConfig {
            name: "Elite".to_string(),
            bot_ign: "BridgeBot".to_string(),
            prefixes: vec!["!".to_string()],
            channel_mappings: vec![
                ChannelMapping { kind: ChannelKind::Guild, discord_channel_id: 10 },
                ChannelMapping { kind: ChannelKind::Officer, discord_channel_id: 20 },
            ],
        }
    }

    #[tokio::test]
    async fn test_bind_all_mappings() {
        let provider = FakeChannelProvider::with_channels(&[10, 20]);
        let linked = LinkedChannels::bind(config(), &provider).await.unwrap();

        assert_eq!(linked.channel(ChannelKind::Guild).unwrap().id(), 10);
        let (kind, channel) = linked.by_id(20).unwrap();
        assert_eq!(kind, ChannelKind::Officer);
        assert_eq!(channel.id(), 20);
        assert!(!linked.contains(30));
        assert_eq!(linked.all().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_channel_fails_bind() {
        let provider = FakeChannelProvider::with_channels(&[10]);
        let err = LinkedChannels::bind(config(), &provider).await.err().unwrap();
        assert!(matches!(
            err,
            LinkError::Discord(DiscordError::ChannelNotFound { channel_id: 20 })
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_no_mappings_is_unusable() {
        let mut config = config();
        config.channel_mappings.clear();
        let provider = FakeChannelProvider::default();
        let err = LinkedChannels::bind(config, &provider).await.err().unwrap();
        assert!(matches!(err, LinkError::NoUsableChannel(_)));
    }
}
