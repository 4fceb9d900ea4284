//! In-memory platform for testing
//!
//! Holds guilds, channels and members in process, applies mutations the way
//! the real platform would, and records what the reconciler did. Individual
//! operations can be made to fail to exercise error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::protocol::{
    Channel, CreateChannel, EditChannel, Guild, Member, Message, PartialGuild,
    PermissionOverwrite, User,
};

/// Platform operations, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CurrentUser,
    UserGuilds,
    Guild,
    GuildChannels,
    GuildMembers,
    GuildMember,
    CreateChannel,
    EditChannel,
    DeleteChannel,
    SetPermission,
    DeletePermission,
    SendMessage,
    AddReaction,
}

/// How an injected failure surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Injected,
    NotFound,
}

/// Counts of state-changing channel operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationCounts {
    pub created: usize,
    pub edited: usize,
    pub deleted: usize,
    pub permissions_set: usize,
    pub permissions_deleted: usize,
}

impl MutationCounts {
    pub fn total(&self) -> usize {
        self.created + self.edited + self.deleted + self.permissions_set + self.permissions_deleted
    }
}

/// A message the bot posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: String,
    pub content: String,
}

/// A reaction the bot added
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
}

#[derive(Debug)]
struct PlatformState {
    bot: User,
    guilds: BTreeMap<String, Guild>,
    channels: Vec<Channel>,
    members: BTreeMap<String, Vec<Member>>,
    messages: Vec<SentMessage>,
    reactions: Vec<Reaction>,
    counts: MutationCounts,
    calls: HashMap<Op, usize>,
    failures: HashMap<Op, Fault>,
    next_id: u64,
}

impl PlatformState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{}", 900_000 + self.next_id)
    }

    /// Count the call, then fail it if requested
    fn enter(&mut self, op: Op) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get(&op) {
            Some(Fault::Injected) => Err(Error::Injected(format!("{:?}", op))),
            Some(Fault::NotFound) => Err(Error::NotFound(format!("{:?} target", op))),
            None => Ok(()),
        }
    }

    fn channel_mut(&mut self, channel_id: &str) -> Result<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| Error::NotFound(format!("channel {}", channel_id)))
    }
}

/// In-process `Platform`
#[derive(Debug)]
pub struct MemoryPlatform {
    state: Mutex<PlatformState>,
}

impl MemoryPlatform {
    /// Create a platform where the bot is `bot`
    pub fn new(bot: User) -> Self {
        Self {
            state: Mutex::new(PlatformState {
                bot,
                guilds: BTreeMap::new(),
                channels: Vec::new(),
                members: BTreeMap::new(),
                messages: Vec::new(),
                reactions: Vec::new(),
                counts: MutationCounts::default(),
                calls: HashMap::new(),
                failures: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// A poisoned lock only means a test panicked mid-call; keep the data
    fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_guild(&self, guild: Guild) {
        self.state().guilds.insert(guild.id.clone(), guild);
    }

    pub fn add_member(&self, guild_id: &str, member: Member) {
        self.state()
            .members
            .entry(guild_id.to_string())
            .or_default()
            .push(member);
    }

    /// Seed a channel as if someone created it by hand
    pub fn add_channel(&self, channel: Channel) {
        self.state().channels.push(channel);
    }

    pub fn channels(&self, guild_id: &str) -> Vec<Channel> {
        self.state()
            .channels
            .iter()
            .filter(|c| c.guild_id.as_deref() == Some(guild_id))
            .cloned()
            .collect()
    }

    pub fn channel_named(&self, guild_id: &str, name: &str, voice: bool) -> Option<Channel> {
        self.channels(guild_id)
            .into_iter()
            .find(|c| c.name == name && c.is_voice() == voice)
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.state().messages.clone()
    }

    pub fn reactions(&self) -> Vec<Reaction> {
        self.state().reactions.clone()
    }

    pub fn counts(&self) -> MutationCounts {
        self.state().counts
    }

    /// Forget recorded mutations, messages and reactions
    pub fn reset_activity(&self) {
        let mut state = self.state();
        state.counts = MutationCounts::default();
        state.messages.clear();
        state.reactions.clear();
        state.calls.clear();
    }

    /// Number of times an operation was attempted
    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Make every future call of `op` fail
    pub fn fail(&self, op: Op) {
        self.state().failures.insert(op, Fault::Injected);
    }

    /// Make every future call of `op` answer as if its target was already gone
    pub fn report_missing(&self, op: Op) {
        self.state().failures.insert(op, Fault::NotFound);
    }

    pub fn recover(&self, op: Op) {
        self.state().failures.remove(&op);
    }
}

#[async_trait]
impl Platform for MemoryPlatform {
    async fn current_user(&self) -> Result<User> {
        let mut state = self.state();
        state.enter(Op::CurrentUser)?;
        Ok(state.bot.clone())
    }

    async fn user_guilds(&self, limit: u32) -> Result<Vec<PartialGuild>> {
        let mut state = self.state();
        state.enter(Op::UserGuilds)?;
        Ok(state
            .guilds
            .values()
            .take(limit as usize)
            .map(|g| PartialGuild {
                id: g.id.clone(),
                name: g.name.clone(),
            })
            .collect())
    }

    async fn guild(&self, guild_id: &str) -> Result<Guild> {
        let mut state = self.state();
        state.enter(Op::Guild)?;
        state
            .guilds
            .get(guild_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("guild {}", guild_id)))
    }

    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>> {
        let mut state = self.state();
        state.enter(Op::GuildChannels)?;
        Ok(state
            .channels
            .iter()
            .filter(|c| c.guild_id.as_deref() == Some(guild_id))
            .cloned()
            .collect())
    }

    async fn guild_members(&self, guild_id: &str, limit: u32) -> Result<Vec<Member>> {
        let mut state = self.state();
        state.enter(Op::GuildMembers)?;
        Ok(state
            .members
            .get(guild_id)
            .map(|m| m.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Member> {
        let mut state = self.state();
        state.enter(Op::GuildMember)?;
        state
            .members
            .get(guild_id)
            .and_then(|members| members.iter().find(|m| m.user.id == user_id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("member {}", user_id)))
    }

    async fn create_channel(&self, guild_id: &str, channel: &CreateChannel) -> Result<Channel> {
        let mut state = self.state();
        state.enter(Op::CreateChannel)?;
        let created = Channel {
            id: state.next_id(),
            guild_id: Some(guild_id.to_string()),
            name: channel.name.clone(),
            kind: channel.kind,
            parent_id: channel.parent_id.clone(),
            topic: channel.topic.clone().filter(|t| !t.is_empty()),
            permission_overwrites: channel.permission_overwrites.clone(),
        };
        state.channels.push(created.clone());
        state.counts.created += 1;
        Ok(created)
    }

    async fn edit_channel(&self, channel_id: &str, edit: &EditChannel) -> Result<Channel> {
        let mut state = self.state();
        state.enter(Op::EditChannel)?;
        let channel = state.channel_mut(channel_id)?;
        if let Some(topic) = &edit.topic {
            channel.topic = Some(topic.clone()).filter(|t| !t.is_empty());
        }
        let edited = channel.clone();
        state.counts.edited += 1;
        Ok(edited)
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        let mut state = self.state();
        state.enter(Op::DeleteChannel)?;
        let before = state.channels.len();
        state.channels.retain(|c| c.id != channel_id);
        if state.channels.len() == before {
            return Err(Error::NotFound(format!("channel {}", channel_id)));
        }
        state.counts.deleted += 1;
        Ok(())
    }

    async fn set_permission(
        &self,
        channel_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> Result<()> {
        let mut state = self.state();
        state.enter(Op::SetPermission)?;
        let channel = state.channel_mut(channel_id)?;
        match channel
            .permission_overwrites
            .iter_mut()
            .find(|o| o.id == overwrite.id)
        {
            Some(existing) => *existing = overwrite.clone(),
            None => channel.permission_overwrites.push(overwrite.clone()),
        }
        state.counts.permissions_set += 1;
        Ok(())
    }

    async fn delete_permission(&self, channel_id: &str, target_id: &str) -> Result<()> {
        let mut state = self.state();
        state.enter(Op::DeletePermission)?;
        let channel = state.channel_mut(channel_id)?;
        channel.permission_overwrites.retain(|o| o.id != target_id);
        state.counts.permissions_deleted += 1;
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message> {
        let mut state = self.state();
        state.enter(Op::SendMessage)?;
        let message = Message {
            id: state.next_id(),
            channel_id: channel_id.to_string(),
            guild_id: None,
            author: state.bot.clone(),
            content: content.to_string(),
        };
        state.messages.push(SentMessage {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(message)
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        let mut state = self.state();
        state.enter(Op::AddReaction)?;
        state.reactions.push(Reaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }
}
