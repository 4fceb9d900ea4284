//! Ofisu Network Library
//!
//! Chat platform boundary for the Ofisu reconciler.
//!
//! # Architecture
//!
//! - **Protocol**: Discord wire types (guilds, channels, overwrites, members, events)
//! - **Platform**: the async trait the reconciler talks to
//! - **Client**: REST implementation of `Platform`
//! - **Memory**: in-process implementation for tests
//! - **Gateway**: websocket session delivering guild and message events
//!
//! # Usage
//!
//! ```ignore
//! let client = DiscordClient::new(token, Duration::from_secs(30))?;
//! let me = client.current_user().await?;
//!
//! for guild in client.user_guilds(GUILD_LIST_LIMIT).await? {
//!     let channels = client.guild_channels(&guild.id).await?;
//! }
//! ```

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod permissions;
pub mod platform;
pub mod protocol;

pub use client::DiscordClient;
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use memory::{MemoryPlatform, MutationCounts, Op, Reaction, SentMessage};
pub use permissions::Permissions;
pub use platform::Platform;
pub use protocol::{
    Channel, ChannelType, CreateChannel, EditChannel, GatewayEvent, Guild, Member, Message,
    OverwriteType, PartialGuild, PermissionOverwrite, Role, UnavailableGuild, User,
};

/// Maximum number of guilds fetched per guild list request
pub const GUILD_LIST_LIMIT: u32 = 100;

/// Maximum number of members fetched per roster request
pub const MEMBER_LIST_LIMIT: u32 = 1000;
