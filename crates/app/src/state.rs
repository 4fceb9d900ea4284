//! Per-guild reconciliation state
//!
//! Owned by one controller and only touched while its lock is held.

use std::sync::Arc;

use ofisu_core::Office;
use ofisu_net::{Channel, Member};
use tokio::time::{Duration, Instant};

/// An independently scheduled reconciliation concern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    Members,
    Channels,
    Users,
}

impl Track {
    /// Execution order within one sync pass; later tracks read what earlier ones cached
    pub const ORDER: [Track; 3] = [Track::Members, Track::Channels, Track::Users];

    pub fn interval(self) -> Duration {
        match self {
            Track::Members => Duration::from_secs(30 * 60),
            Track::Channels => Duration::from_secs(10 * 60),
            Track::Users => Duration::from_secs(5 * 60),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Track::Members => "members",
            Track::Channels => "channels",
            Track::Users => "users",
        }
    }

    fn index(self) -> usize {
        match self {
            Track::Members => 0,
            Track::Channels => 1,
            Track::Users => 2,
        }
    }
}

/// How the guild currently looks, as last observed
#[derive(Debug, Default)]
pub struct RemoteState {
    /// Installed office, resolved by the channels track
    pub office: Option<Arc<Office>>,
    pub channels: Vec<Channel>,
    pub members: Vec<Member>,
    /// The managed category
    pub parent_channel_id: Option<String>,
    /// `None` means never synced, or a sync was requested
    synced: [Option<Instant>; 3],
}

impl RemoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `track` has gone longer than its interval without a sync
    pub fn is_due(&self, track: Track, now: Instant) -> bool {
        match self.synced[track.index()] {
            None => true,
            Some(at) => now.saturating_duration_since(at) > track.interval(),
        }
    }

    pub fn mark_synced(&mut self, track: Track, at: Instant) {
        self.synced[track.index()] = Some(at);
    }

    pub fn last_synced(&self, track: Track) -> Option<Instant> {
        self.synced[track.index()]
    }

    /// Force `track` to run on the next sync pass
    pub fn request_sync(&mut self, track: Track) {
        self.synced[track.index()] = None;
    }

    pub fn request_full_sync(&mut self) {
        self.synced = [None; 3];
    }

    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == channel_id)
    }

    /// Whether a channel sits under the managed category
    pub fn is_managed_channel(&self, channel_id: &str) -> bool {
        match (&self.parent_channel_id, self.channel(channel_id)) {
            (Some(parent_id), Some(channel)) => channel.is_child_of(parent_id),
            _ => false,
        }
    }
}
