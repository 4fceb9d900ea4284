//! Users track: converge channel access to each user's desired room
//!
//! There is no explicit move. A user should see exactly the channels of the
//! room stored as their location; access anywhere else is revoked.

use ofisu_net::{Channel, Permissions, PermissionOverwrite, User};
use tracing::debug;

use super::{room_for_channel, Controller};
use crate::error::{SyncError, SyncResult};
use crate::state::RemoteState;

impl Controller {
    pub(super) async fn sync_users(&self, state: &mut RemoteState) -> SyncResult<()> {
        let Some(office) = state.office.clone() else {
            return Ok(());
        };
        let Some(parent_id) = state.parent_channel_id.clone() else {
            return Ok(());
        };

        // grants from the previous pass must be visible before comparing
        state.channels = self.platform.guild_channels(&self.guild_id).await?;

        let keys: Vec<String> = state
            .members
            .iter()
            .map(|m| self.keys.user_location(office.id(), &m.user.id))
            .collect();
        let locations = self.store.get_many(&keys)?;

        let desired: Vec<(&User, String)> = state
            .members
            .iter()
            .zip(locations)
            .filter_map(|(member, location)| Some((&member.user, location?)))
            .filter(|(_, location)| !location.is_empty())
            .collect();
        if desired.is_empty() {
            return Ok(());
        }

        for channel in state
            .channels
            .iter()
            .filter(|c| c.is_child_of(&parent_id) && (c.is_text() || c.is_voice()))
        {
            let current = room_for_channel(&office, &channel.name).ok_or_else(|| {
                SyncError::StaleCache(format!(
                    "channel '{}' has no room in office '{}'",
                    channel.name,
                    office.id()
                ))
            })?;

            for (user, desired_id) in &desired {
                let target = office.room(desired_id).ok_or_else(|| {
                    SyncError::StaleCache(format!(
                        "user {} wants room '{}' which is not in office '{}'",
                        user.id,
                        desired_id,
                        office.id()
                    ))
                })?;
                let has_access = channel.grants_view_to(&user.id);

                if current.id != target.id && has_access {
                    let notice = format!(
                        "*{} left {} heading towards {}*",
                        user.mention(),
                        current.name,
                        target.name
                    );
                    self.notify(channel, &notice).await?;
                    match self.platform.delete_permission(&channel.id, &user.id).await {
                        Ok(()) => {}
                        // revoked concurrently, or the channel went away
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e.into()),
                    }
                    debug!(user_id = %user.id, channel = %channel.name, "Revoked room access");
                } else if current.id == target.id && !has_access {
                    let grant = PermissionOverwrite::member(
                        user.id.clone(),
                        Permissions::VIEW_CHANNEL,
                        Permissions::NONE,
                    );
                    self.platform.set_permission(&channel.id, &grant).await?;
                    let notice = format!("*{} entered {}*", user.mention(), target.name);
                    self.notify(channel, &notice).await?;
                    debug!(user_id = %user.id, channel = %channel.name, "Granted room access");
                }
            }
        }

        Ok(())
    }

    /// Post a movement notice; voice channels get none
    async fn notify(&self, channel: &Channel, notice: &str) -> SyncResult<()> {
        if channel.is_text() {
            self.platform.send_message(&channel.id, notice).await?;
        }
        Ok(())
    }
}
