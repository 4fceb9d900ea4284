//! Platform trait
//!
//! Everything the reconciler needs from the chat platform. Mutations must be
//! safe to repeat; the reconciler re-applies them every interval.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{
    Channel, CreateChannel, EditChannel, Guild, Member, Message, PartialGuild,
    PermissionOverwrite, User,
};

/// Chat platform operations
#[async_trait]
pub trait Platform: Send + Sync {
    /// The bot's own user
    async fn current_user(&self) -> Result<User>;

    /// Guilds the bot is a member of
    async fn user_guilds(&self, limit: u32) -> Result<Vec<PartialGuild>>;

    /// Guild details, including owner and roles
    async fn guild(&self, guild_id: &str) -> Result<Guild>;

    /// All channels of a guild
    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>>;

    /// Member roster of a guild, at most `limit` entries
    async fn guild_members(&self, guild_id: &str, limit: u32) -> Result<Vec<Member>>;

    /// A single guild member
    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Member>;

    async fn create_channel(&self, guild_id: &str, channel: &CreateChannel) -> Result<Channel>;

    async fn edit_channel(&self, channel_id: &str, edit: &EditChannel) -> Result<Channel>;

    async fn delete_channel(&self, channel_id: &str) -> Result<()>;

    /// Create or replace the overwrite for `overwrite.id` on a channel
    async fn set_permission(&self, channel_id: &str, overwrite: &PermissionOverwrite)
        -> Result<()>;

    /// Remove the overwrite for a role or member from a channel
    async fn delete_permission(&self, channel_id: &str, target_id: &str) -> Result<()>;

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message>;

    /// React to a message with a unicode emoji
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()>;
}
