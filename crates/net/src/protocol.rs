//! Platform wire types
//!
//! Only the fields the reconciler reads are modeled; everything else in the
//! Discord payloads is ignored on deserialization.

use serde::{Deserialize, Serialize};

use crate::permissions::Permissions;

/// A platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            bot: false,
        }
    }

    /// Mention markup, e.g. `<@42>`
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A guild role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub permissions: Permissions,
}

/// A guild as returned by the guild endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Guild {
    pub fn role(&self, role_id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == role_id)
    }
}

/// A guild entry in the current user's guild list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialGuild {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A guild the bot was removed from, or that went unavailable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: String,
    #[serde(default)]
    pub unavailable: bool,
}

/// A guild member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Channel kinds the reconciler distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ChannelType {
    Text,
    Voice,
    Category,
    Other(u8),
}

impl From<u8> for ChannelType {
    fn from(value: u8) -> Self {
        match value {
            0 => ChannelType::Text,
            2 => ChannelType::Voice,
            4 => ChannelType::Category,
            other => ChannelType::Other(other),
        }
    }
}

impl From<ChannelType> for u8 {
    fn from(value: ChannelType) -> Self {
        match value {
            ChannelType::Text => 0,
            ChannelType::Voice => 2,
            ChannelType::Category => 4,
            ChannelType::Other(other) => other,
        }
    }
}

/// Target of a permission overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum OverwriteType {
    Role,
    Member,
}

impl From<u8> for OverwriteType {
    fn from(value: u8) -> Self {
        if value == 1 {
            OverwriteType::Member
        } else {
            OverwriteType::Role
        }
    }
}

impl From<OverwriteType> for u8 {
    fn from(value: OverwriteType) -> Self {
        match value {
            OverwriteType::Role => 0,
            OverwriteType::Member => 1,
        }
    }
}

/// A per-role or per-member permission overwrite on a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OverwriteType,
    #[serde(default)]
    pub allow: Permissions,
    #[serde(default)]
    pub deny: Permissions,
}

impl PermissionOverwrite {
    pub fn role(id: impl Into<String>, allow: Permissions, deny: Permissions) -> Self {
        Self {
            id: id.into(),
            kind: OverwriteType::Role,
            allow,
            deny,
        }
    }

    pub fn member(id: impl Into<String>, allow: Permissions, deny: Permissions) -> Self {
        Self {
            id: id.into(),
            kind: OverwriteType::Member,
            allow,
            deny,
        }
    }
}

/// A guild channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

impl Channel {
    pub fn is_text(&self) -> bool {
        self.kind == ChannelType::Text
    }

    pub fn is_voice(&self) -> bool {
        self.kind == ChannelType::Voice
    }

    /// Topic with "unset" and "empty" treated alike
    pub fn topic(&self) -> &str {
        self.topic.as_deref().unwrap_or("")
    }

    pub fn is_child_of(&self, parent_id: &str) -> bool {
        self.parent_id.as_deref() == Some(parent_id)
    }

    pub fn overwrite(&self, target_id: &str) -> Option<&PermissionOverwrite> {
        self.permission_overwrites.iter().find(|o| o.id == target_id)
    }

    /// Whether a member-specific overwrite grants `user_id` view access
    pub fn grants_view_to(&self, user_id: &str) -> bool {
        self.permission_overwrites.iter().any(|o| {
            o.kind == OverwriteType::Member
                && o.id == user_id
                && o.allow.contains(Permissions::VIEW_CHANNEL)
        })
    }
}

/// Payload for creating a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateChannel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

/// Payload for editing a channel; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditChannel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: User,
    #[serde(default)]
    pub content: String,
}

/// Gateway dispatch events the manager reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEvent {
    /// The bot joined a guild, or a guild became available
    GuildCreate(Guild),
    /// The bot left a guild, or a guild became unavailable
    GuildDelete(UnavailableGuild),
    /// A message was posted in a channel the bot can see
    MessageCreate(Message),
}

impl GatewayEvent {
    /// Decode the data of a dispatch named `kind`
    pub fn from_dispatch(kind: &str, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({"t": kind, "d": data}))
    }
}
