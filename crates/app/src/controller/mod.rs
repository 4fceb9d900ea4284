//! Guild controller - reconciles one guild against its installed office
//!
//! The controller polls: every `sync` call checks which tracks are due and
//! runs them in order (members, channels, users). All platform mutations are
//! idempotent, so rerunning a track against a converged guild changes nothing.
//! Chat commands are handled under the same lock and never sync directly;
//! they reset a track's timestamp so the next pass picks it up.

mod channels;
mod commands;
mod users;


use std::sync::Arc;

use ofisu_core::{KeySpace, KeyValueStore, Office, OfficeRegistry, Room};
use ofisu_net::{Permissions, PermissionOverwrite, Platform, MEMBER_LIST_LIMIT};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::state::{RemoteState, Track};

/// Prefix joined to a room ID to name its channels
pub const CHANNEL_PREFIX: &str = "o-";

/// Name of the category holding every managed channel
pub const CATEGORY_NAME: &str = "ofisu";

/// Room a user lands in when entering the office
pub const ENTRANCE_ROOM: &str = "parking_lot";

/// Channel name for a room
pub fn channel_name(room_id: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, room_id)
}

/// The room a managed channel stands for
///
/// The platform lower-cases channel names, so fall back to a case-insensitive
/// match on the room ID.
pub fn room_for_channel<'a>(office: &'a Office, channel_name: &str) -> Option<&'a Room> {
    let room_id = channel_name.strip_prefix(CHANNEL_PREFIX)?;
    office.room(room_id).or_else(|| {
        office
            .rooms()
            .find(|room| room.id.eq_ignore_ascii_case(room_id))
    })
}

/// Reconciler for a single guild
pub struct Controller {
    guild_id: String,
    keys: KeySpace,
    platform: Arc<dyn Platform>,
    store: Arc<dyn KeyValueStore>,
    offices: Arc<OfficeRegistry>,
    state: Mutex<RemoteState>,
}

impl Controller {
    pub fn new(
        guild_id: impl Into<String>,
        platform: Arc<dyn Platform>,
        store: Arc<dyn KeyValueStore>,
        offices: Arc<OfficeRegistry>,
    ) -> Self {
        let guild_id = guild_id.into();
        Self {
            keys: KeySpace::new(guild_id.clone()),
            guild_id,
            platform,
            store,
            offices,
            state: Mutex::new(RemoteState::new()),
        }
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// Run every due track
    ///
    /// A failing track aborts the pass and keeps its old timestamp, so it is
    /// retried on the next call.
    pub async fn sync(&self) -> SyncResult<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        for track in Track::ORDER {
            if !state.is_due(track, now) {
                continue;
            }
            debug!(guild_id = %self.guild_id, track = track.name(), "Running sync track");

            if let Err(e) = self.run_track(track, &mut state).await {
                warn!(
                    guild_id = %self.guild_id,
                    track = track.name(),
                    error = %e,
                    "Sync track failed"
                );
                return Err(e);
            }
            state.mark_synced(track, now);
        }

        Ok(())
    }

    async fn run_track(&self, track: Track, state: &mut RemoteState) -> SyncResult<()> {
        match track {
            Track::Members => self.sync_members(state).await,
            Track::Channels => self.sync_channels(state).await,
            Track::Users => self.sync_users(state).await,
        }
    }

    async fn sync_members(&self, state: &mut RemoteState) -> SyncResult<()> {
        state.members = self
            .platform
            .guild_members(&self.guild_id, MEMBER_LIST_LIMIT)
            .await?;
        debug!(guild_id = %self.guild_id, members = state.members.len(), "Fetched members");
        Ok(())
    }

    /// Resolve the installed office from the store
    ///
    /// An ID with no loaded office is an error; the stored value is left alone.
    fn installed_office(&self) -> SyncResult<Option<Arc<Office>>> {
        let Some(office_id) = self.store.get(&self.keys.installed_office())? else {
            return Ok(None);
        };
        match self.offices.get(&office_id) {
            Some(office) => Ok(Some(Arc::clone(office))),
            None => Err(SyncError::UnknownOffice(office_id)),
        }
    }

    /// The overwrite hiding managed channels from everyone by default
    ///
    /// The @everyone role shares the guild's ID.
    fn private_overwrite(&self) -> PermissionOverwrite {
        PermissionOverwrite::role(
            self.guild_id.clone(),
            Permissions::NONE,
            Permissions::VIEW_CHANNEL | Permissions::CREATE_INSTANT_INVITE,
        )
    }

    #[cfg(test)]
    pub(crate) async fn lock_state(&self) -> tokio::sync::MutexGuard<'_, RemoteState> {
        self.state.lock().await
    }
}
