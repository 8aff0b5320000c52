//! Snapshot of one Discord guild's members, roles, channels and emojis.
//!
//! Built from the serenity cache so translation stays a pure function of
//! its input.

use serenity::cache::Cache;
use serenity::model::id::GuildId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub id: u64,
    pub username: String,
    /// Nickname or global display name.
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntry {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiEntry {
    pub id: u64,
    pub name: String,
    pub animated: bool,
}

impl EmojiEntry {
    /// Discord markup for this emoji.
    pub fn render(&self) -> String {
        if self.animated {
            format!("<a:{}:{}>", self.name, self.id)
        } else {
            format!("<:{}:{}>", self.name, self.id)
        }
    }
}

/// Cached view of a Discord guild used for mention/emoji resolution.
#[derive(Debug, Clone, Default)]
pub struct GuildDirectory {
    pub members: Vec<MemberEntry>,
    pub roles: Vec<NamedEntry>,
    pub channels: Vec<NamedEntry>,
    pub emojis: Vec<EmojiEntry>,
}

impl GuildDirectory {
    /// Snapshot a guild from the serenity cache.
    pub fn from_cache(cache: &Cache, guild_id: GuildId) -> Self {
        let Some(guild) = cache.guild(guild_id) else {
            return Self::default();
        };

        let members = guild
            .members
            .values()
            .map(|member| MemberEntry {
                id: member.user.id.get(),
                username: member.user.name.clone(),
                display_name: member.display_name().to_string(),
            })
            .collect();

        let roles = guild
            .roles
            .values()
            .filter(|role| role.name != "@everyone")
            .map(|role| NamedEntry {
                id: role.id.get(),
                name: role.name.clone(),
            })
            .collect();

        let channels = guild
            .channels
            .values()
            .map(|channel| NamedEntry {
                id: channel.id.get(),
                name: channel.name.clone(),
            })
            .collect();

        let emojis = guild
            .emojis
            .values()
            .map(|emoji| EmojiEntry {
                id: emoji.id.get(),
                name: emoji.name.clone(),
                animated: emoji.animated,
            })
            .collect();

        Self {
            members,
            roles,
            channels,
            emojis,
        }
    }

    /// Member whose username or display name equals `name` (case-insensitive).
    ///
    /// Ambiguous names resolve to nothing.
    pub fn member_by_name(&self, name: &str) -> Option<&MemberEntry> {
        let mut matches = self.members.iter().filter(|m| {
            m.username.eq_ignore_ascii_case(name) || m.display_name.eq_ignore_ascii_case(name)
        });
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    /// Member whose display name equals `name` (case-insensitive).
    pub fn member_by_display_name(&self, name: &str) -> Option<&MemberEntry> {
        let mut matches = self
            .members
            .iter()
            .filter(|m| m.display_name.eq_ignore_ascii_case(name));
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    pub fn role_by_name(&self, name: &str) -> Option<&NamedEntry> {
        self.roles.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn channel_by_name(&self, name: &str) -> Option<&NamedEntry> {
        self.channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn emoji_by_name(&self, name: &str) -> Option<&EmojiEntry> {
        self.emojis.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn member_by_id(&self, id: u64) -> Option<&MemberEntry> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn role_by_id(&self, id: u64) -> Option<&NamedEntry> {
        self.roles.iter().find(|r| r.id == id)
    }

    pub fn channel_by_id(&self, id: u64) -> Option<&NamedEntry> {
        self.channels.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, username: &str, display_name: &str) -> MemberEntry {
        MemberEntry {
            id,
            username: username.to_string(),
            display_name: display_name.to_string(),
        }
    }

    #[test]
    fn test_member_lookup_is_exact_and_unambiguous() {
        let directory = GuildDirectory {
            members: vec![
                member(1, "steve", "Steve the Great"),
                member(2, "alex", "Builder"),
                member(3, "builder", "Someone"),
            ],
            ..Default::default()
        };

        assert_eq!(directory.member_by_name("STEVE").map(|m| m.id), Some(1));
        assert_eq!(directory.member_by_name("steve the great").map(|m| m.id), Some(1));
        assert!(directory.member_by_name("ste").is_none());
        // "builder" is alex's display name and the third member's username.
        assert!(directory.member_by_name("builder").is_none());
        assert_eq!(directory.member_by_display_name("builder").map(|m| m.id), Some(2));
    }

    #[test]
    fn test_emoji_render() {
        let still = EmojiEntry { id: 5, name: "pog".to_string(), animated: false };
        let moving = EmojiEntry { id: 6, name: "dance".to_string(), animated: true };
        assert_eq!(still.render(), "<:pog:5>");
        assert_eq!(moving.render(), "<a:dance:6>");
    }
}
