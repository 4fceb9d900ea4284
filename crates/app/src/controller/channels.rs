//! Channel track: converge the managed category to the installed office

use std::collections::HashSet;

use ofisu_net::{Channel, ChannelType, CreateChannel, EditChannel};
use tracing::{debug, info};

use super::{channel_name, room_for_channel, Controller, CATEGORY_NAME};
use crate::error::SyncResult;
use crate::state::RemoteState;

impl Controller {
    pub(super) async fn sync_channels(&self, state: &mut RemoteState) -> SyncResult<()> {
        let office = self.installed_office()?;
        state.office = office.clone();

        let channels = self.platform.guild_channels(&self.guild_id).await?;
        state.channels = channels.clone();

        let parent_id = self.ensure_category(&channels).await?;
        state.parent_channel_id = Some(parent_id.clone());

        let mut text_rooms: HashSet<String> = HashSet::new();
        let mut voice_rooms: HashSet<String> = HashSet::new();

        for channel in channels
            .iter()
            .filter(|c| c.is_child_of(&parent_id) && (c.is_text() || c.is_voice()))
        {
            let room = office
                .as_deref()
                .and_then(|office| room_for_channel(office, &channel.name));

            let Some(room) = room else {
                self.delete_channel(channel, "room no longer exists").await?;
                continue;
            };
            if channel.is_voice() && !room.voice_enabled {
                self.delete_channel(channel, "room has no voice").await?;
                continue;
            }

            if channel.is_text() && channel.topic() != room.topic() {
                let edit = EditChannel {
                    topic: Some(room.topic().to_string()),
                };
                self.platform.edit_channel(&channel.id, &edit).await?;
                debug!(channel = %channel.name, topic = room.topic(), "Updated channel topic");
            }

            self.enforce_private(channel).await?;

            if channel.is_voice() {
                voice_rooms.insert(room.id.clone());
            } else {
                text_rooms.insert(room.id.clone());
            }
        }

        if let Some(office) = &office {
            for room in office.rooms() {
                if !text_rooms.contains(&room.id) {
                    let topic = Some(room.topic().to_string()).filter(|t| !t.is_empty());
                    self.create_room_channel(&parent_id, &room.id, ChannelType::Text, topic)
                        .await?;
                }
                if room.voice_enabled && !voice_rooms.contains(&room.id) {
                    self.create_room_channel(&parent_id, &room.id, ChannelType::Voice, None)
                        .await?;
                }
            }
        }

        // the users track reads this snapshot right after us
        state.channels = self.platform.guild_channels(&self.guild_id).await?;
        Ok(())
    }

    /// Find the managed category, creating it if missing
    async fn ensure_category(&self, channels: &[Channel]) -> SyncResult<String> {
        let existing = channels
            .iter()
            .find(|c| c.kind == ChannelType::Category && c.name == CATEGORY_NAME);
        if let Some(category) = existing {
            return Ok(category.id.clone());
        }

        let create = CreateChannel {
            name: CATEGORY_NAME.to_string(),
            kind: ChannelType::Category,
            parent_id: None,
            topic: None,
            permission_overwrites: vec![self.private_overwrite()],
        };
        let category = self.platform.create_channel(&self.guild_id, &create).await?;
        info!(guild_id = %self.guild_id, channel_id = %category.id, "Created managed category");
        Ok(category.id)
    }

    /// Make the default-role overwrite match the private one exactly
    async fn enforce_private(&self, channel: &Channel) -> SyncResult<()> {
        let wanted = self.private_overwrite();
        let matches = channel
            .overwrite(&wanted.id)
            .is_some_and(|o| o.kind == wanted.kind && o.allow == wanted.allow && o.deny == wanted.deny);
        if !matches {
            self.platform.set_permission(&channel.id, &wanted).await?;
            debug!(channel = %channel.name, "Restored private overwrite");
        }
        Ok(())
    }

    async fn create_room_channel(
        &self,
        parent_id: &str,
        room_id: &str,
        kind: ChannelType,
        topic: Option<String>,
    ) -> SyncResult<()> {
        let create = CreateChannel {
            name: channel_name(room_id),
            kind,
            parent_id: Some(parent_id.to_string()),
            topic,
            permission_overwrites: vec![self.private_overwrite()],
        };
        let channel = self.platform.create_channel(&self.guild_id, &create).await?;
        info!(
            guild_id = %self.guild_id,
            channel = %channel.name,
            kind = ?kind,
            "Created room channel"
        );
        Ok(())
    }

    /// A channel someone else already deleted counts as deleted
    async fn delete_channel(&self, channel: &Channel, reason: &str) -> SyncResult<()> {
        match self.platform.delete_channel(&channel.id).await {
            Ok(()) => {
                info!(guild_id = %self.guild_id, channel = %channel.name, reason, "Deleted channel");
            }
            Err(e) if e.is_not_found() => {
                debug!(guild_id = %self.guild_id, channel = %channel.name, "Channel already gone");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
