//! Controller manager - one controller per guild the bot is in
//!
//! Controllers are added and removed on gateway notifications, and the guild
//! set is re-derived from the platform every `GUILD_SET_STALENESS` to catch
//! missed notifications. Every tick fans a sync out to all controllers.

use std::collections::HashMap;
use std::sync::Arc;

use ofisu_core::{KeyValueStore, OfficeRegistry};
use ofisu_net::{GatewayEvent, Message, Platform, User, GUILD_LIST_LIMIT};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::controller::Controller;
use crate::error::{SyncError, SyncResult};

/// How long the registry may go without checking the platform's guild list
pub const GUILD_SET_STALENESS: Duration = Duration::from_secs(12 * 60);

/// Text prefix addressing the bot
const MESSAGE_PREFIX: &str = "o ";

/// Owns the guild -> controller registry
pub struct ControllerManager {
    platform: Arc<dyn Platform>,
    store: Arc<dyn KeyValueStore>,
    offices: Arc<OfficeRegistry>,
    bot: User,
    sync_timeout: Duration,
    controllers: RwLock<HashMap<String, Arc<Controller>>>,
    guilds_synced: Mutex<Option<Instant>>,
}

impl ControllerManager {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn KeyValueStore>,
        offices: Arc<OfficeRegistry>,
        bot: User,
        sync_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            store,
            offices,
            bot,
            sync_timeout,
            controllers: RwLock::new(HashMap::new()),
            guilds_synced: Mutex::new(None),
        }
    }

    /// IDs of managed guilds, sorted
    pub async fn guild_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.controllers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn controller(&self, guild_id: &str) -> Option<Arc<Controller>> {
        self.controllers.read().await.get(guild_id).cloned()
    }

    fn new_controller(&self, guild_id: &str) -> Arc<Controller> {
        Arc::new(Controller::new(
            guild_id,
            Arc::clone(&self.platform),
            Arc::clone(&self.store),
            Arc::clone(&self.offices),
        ))
    }

    /// Get or create the controller for a guild
    async fn add_controller(&self, guild_id: &str) -> Arc<Controller> {
        let mut controllers = self.controllers.write().await;
        if let Some(existing) = controllers.get(guild_id) {
            return Arc::clone(existing);
        }

        let controller = self.new_controller(guild_id);
        controllers.insert(guild_id.to_string(), Arc::clone(&controller));
        info!(guild_id, "Added guild");
        controller
    }

    /// The bot joined a guild: register it and sync right away
    pub async fn guild_joined(&self, guild_id: &str) {
        let controller = self.add_controller(guild_id).await;
        if let Err(e) = sync_with_deadline(controller, self.sync_timeout).await {
            warn!(guild_id, error = %e, "Initial guild sync failed");
        }
    }

    /// The bot left a guild
    pub async fn guild_left(&self, guild_id: &str) {
        if self.controllers.write().await.remove(guild_id).is_some() {
            info!(guild_id, "Removed guild");
        }
    }

    /// Strip the bot's address from a message, if it has one
    fn addressed_content<'a>(&self, content: &'a str) -> Option<&'a str> {
        let mention = self.bot.mention();
        let nick_mention = format!("<@!{}>", self.bot.id);

        let prefixes = [MESSAGE_PREFIX, mention.as_str(), nick_mention.as_str()];
        let stripped = prefixes
            .into_iter()
            .find_map(|prefix| content.strip_prefix(prefix))
            .map(str::trim);
        stripped
    }

    /// Hand a message to its guild's controller if it is addressed to the bot
    pub async fn route_message(&self, message: &Message) {
        if message.author.id == self.bot.id {
            return;
        }
        let Some(content) = self.addressed_content(&message.content) else {
            return;
        };
        let Some(guild_id) = message.guild_id.as_deref() else {
            debug!(channel_id = %message.channel_id, "Ignoring direct message");
            return;
        };

        let Some(controller) = self.controller(guild_id).await else {
            warn!(guild_id, "Message for unknown guild");
            return;
        };
        debug!(guild_id, "Passing message to controller");
        controller.handle_message(message, content).await;
    }

    /// Dispatch a gateway event
    pub async fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::GuildCreate(guild) => self.guild_joined(&guild.id).await,
            GatewayEvent::GuildDelete(guild) => self.guild_left(&guild.id).await,
            GatewayEvent::MessageCreate(message) => self.route_message(&message).await,
        }
    }

    /// Make the registry match the platform's guild list
    pub async fn reconcile_guilds(&self) -> SyncResult<()> {
        let guilds = self.platform.user_guilds(GUILD_LIST_LIMIT).await?;

        let mut controllers = self.controllers.write().await;
        for guild in &guilds {
            if !controllers.contains_key(&guild.id) {
                controllers.insert(guild.id.clone(), self.new_controller(&guild.id));
                info!(guild_id = %guild.id, "Added guild");
            }
        }
        controllers.retain(|guild_id, _| {
            let known = guilds.iter().any(|g| &g.id == guild_id);
            if !known {
                info!(guild_id = %guild_id, "Removed guild");
            }
            known
        });

        Ok(())
    }

    /// One scheduler tick
    ///
    /// Refreshes the guild set when stale, then syncs every guild. Returns the
    /// first sync error; the rest are only logged.
    pub async fn tick(&self) -> SyncResult<()> {
        {
            let mut guilds_synced = self.guilds_synced.lock().await;
            let now = Instant::now();
            let stale = guilds_synced
                .map_or(true, |at| now.saturating_duration_since(at) > GUILD_SET_STALENESS);
            if stale {
                match self.reconcile_guilds().await {
                    Ok(()) => *guilds_synced = Some(now),
                    Err(e) => warn!(error = %e, "Failed to refresh guild list"),
                }
            }
        }

        self.sync_all().await
    }

    /// Sync every controller concurrently
    async fn sync_all(&self) -> SyncResult<()> {
        // snapshot so no registry lock is held across platform calls
        let controllers: Vec<Arc<Controller>> =
            self.controllers.read().await.values().cloned().collect();

        let mut tasks = JoinSet::new();
        for controller in controllers {
            tasks.spawn(sync_with_deadline(controller, self.sync_timeout));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    } else {
                        debug!(error = %e, "Additional guild sync failure");
                    }
                }
                Err(e) => error!(error = %e, "Guild sync task panicked"),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Run one controller sync, bounded by `deadline`
///
/// Expiry drops the sync mid-track, so that track's timestamp is not advanced.
async fn sync_with_deadline(controller: Arc<Controller>, deadline: Duration) -> SyncResult<()> {
    match timeout(deadline, controller.sync()).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout {
            guild_id: controller.guild_id().to_string(),
            secs: deadline.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ofisu_core::{MemoryStore, Office};
    use ofisu_net::{
        Channel, CreateChannel, EditChannel, Guild, Member, MemoryPlatform, Op, PartialGuild,
        PermissionOverwrite, UnavailableGuild,
    };

    const BOT: &str = "1";

    fn guild(id: &str) -> Guild {
        Guild {
            id: id.to_string(),
            name: format!("guild {}", id),
            owner_id: "owner".to_string(),
            roles: Vec::new(),
        }
    }

    fn bot() -> User {
        User {
            id: BOT.to_string(),
            username: "ofisu".to_string(),
            bot: true,
        }
    }

    fn manager_with(platform: Arc<dyn Platform>, sync_timeout: Duration) -> ControllerManager {
        let offices = Arc::new(OfficeRegistry::from_offices([Office::parse_str(
            "graph hq {\nparking_lot -- reception\n}",
        )]));
        ControllerManager::new(
            platform,
            Arc::new(MemoryStore::new()),
            offices,
            bot(),
            sync_timeout,
        )
    }

    fn setup() -> (Arc<MemoryPlatform>, ControllerManager) {
        let platform = Arc::new(MemoryPlatform::new(bot()));
        platform.add_guild(guild("10"));
        platform.add_guild(guild("20"));
        let manager = manager_with(platform.clone(), Duration::from_secs(5));
        (platform, manager)
    }

    fn message(guild_id: Option<&str>, author_id: &str, content: &str) -> Message {
        Message {
            id: "m".to_string(),
            channel_id: "c".to_string(),
            guild_id: guild_id.map(str::to_string),
            author: User::new(author_id, "someone"),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_guild_join_is_idempotent_and_syncs() {
        let (platform, manager) = setup();

        manager.handle_event(GatewayEvent::GuildCreate(guild("10"))).await;
        manager.handle_event(GatewayEvent::GuildCreate(guild("10"))).await;

        assert_eq!(manager.guild_ids().await, ["10"]);
        // the second join finds every track fresh
        assert_eq!(platform.calls(Op::GuildMembers), 1);
        assert!(platform.channels("10").iter().any(|c| c.name == "ofisu"));
    }

    #[tokio::test]
    async fn test_guild_left() {
        let (_platform, manager) = setup();
        manager.guild_joined("10").await;

        manager
            .handle_event(GatewayEvent::GuildDelete(UnavailableGuild {
                id: "10".to_string(),
                unavailable: false,
            }))
            .await;
        manager.guild_left("unknown").await;

        assert!(manager.guild_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_reconciles_guild_set_when_stale() {
        let (platform, manager) = setup();
        manager.guild_joined("99").await;

        manager.tick().await.unwrap();
        assert_eq!(manager.guild_ids().await, ["10", "20"]);
        assert_eq!(platform.calls(Op::UserGuilds), 1);

        // fresh: the guild list is not fetched again
        platform.add_guild(guild("30"));
        manager.tick().await.unwrap();
        assert_eq!(platform.calls(Op::UserGuilds), 1);

        tokio::time::advance(GUILD_SET_STALENESS).await;
        manager.tick().await.unwrap();
        assert_eq!(platform.calls(Op::UserGuilds), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        manager.tick().await.unwrap();
        assert_eq!(platform.calls(Op::UserGuilds), 2);
        assert_eq!(manager.guild_ids().await, ["10", "20", "30"]);
    }

    #[tokio::test]
    async fn test_tick_syncs_every_guild() {
        let (platform, manager) = setup();

        manager.tick().await.unwrap();

        for guild_id in ["10", "20"] {
            assert!(platform.channels(guild_id).iter().any(|c| c.name == "ofisu"));
        }
    }

    #[tokio::test]
    async fn test_one_guild_failing_does_not_block_others() {
        let (platform, manager) = setup();
        manager.reconcile_guilds().await.unwrap();
        let store_key = ofisu_core::KeySpace::new("10").installed_office();
        manager.store.set(&store_key, "gone").unwrap();

        let err = manager.tick().await.unwrap_err();

        assert!(matches!(err, SyncError::UnknownOffice(_)));
        assert!(platform.channels("20").iter().any(|c| c.name == "ofisu"));
    }

    #[tokio::test]
    async fn test_guild_list_failure_still_syncs_known_guilds() {
        let (platform, manager) = setup();
        manager.reconcile_guilds().await.unwrap();
        platform.fail(Op::UserGuilds);

        manager.tick().await.unwrap();

        assert!(platform.channels("10").iter().any(|c| c.name == "ofisu"));
    }

    #[tokio::test]
    async fn test_routing_prefixes() {
        let (platform, manager) = setup();
        manager.reconcile_guilds().await.unwrap();

        for content in ["o offices", "<@1> offices", "<@!1>   offices"] {
            manager.route_message(&message(Some("10"), "42", content)).await;
        }
        let sent = platform.messages();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|m| m.content.starts_with("<@42> Available offices:")));
    }

    #[test]
    fn test_addressed_content() {
        let (_, manager) = setup();

        assert_eq!(manager.addressed_content("o  look "), Some("look"));
        assert_eq!(manager.addressed_content("<@1>go reception"), Some("go reception"));
        assert_eq!(manager.addressed_content("<@!1> help"), Some("help"));
        assert_eq!(manager.addressed_content("<@2> help"), None);
        assert_eq!(manager.addressed_content("look"), None);
    }

    #[tokio::test]
    async fn test_routing_ignores_other_messages() {
        let (platform, manager) = setup();
        manager.reconcile_guilds().await.unwrap();

        manager.route_message(&message(Some("10"), BOT, "o offices")).await;
        manager.route_message(&message(Some("10"), "42", "offices")).await;
        manager.route_message(&message(Some("10"), "42", "oh offices")).await;
        manager.route_message(&message(None, "42", "o offices")).await;
        manager.route_message(&message(Some("77"), "42", "o offices")).await;

        assert!(platform.messages().is_empty());
    }

    /// A platform whose channel listing never returns
    struct HangingPlatform {
        inner: MemoryPlatform,
    }

    #[async_trait]
    impl Platform for HangingPlatform {
        async fn current_user(&self) -> ofisu_net::Result<User> {
            self.inner.current_user().await
        }
        async fn user_guilds(&self, limit: u32) -> ofisu_net::Result<Vec<PartialGuild>> {
            self.inner.user_guilds(limit).await
        }
        async fn guild(&self, guild_id: &str) -> ofisu_net::Result<Guild> {
            self.inner.guild(guild_id).await
        }
        async fn guild_channels(&self, _guild_id: &str) -> ofisu_net::Result<Vec<Channel>> {
            std::future::pending().await
        }
        async fn guild_members(&self, guild_id: &str, limit: u32) -> ofisu_net::Result<Vec<Member>> {
            self.inner.guild_members(guild_id, limit).await
        }
        async fn guild_member(&self, guild_id: &str, user_id: &str) -> ofisu_net::Result<Member> {
            self.inner.guild_member(guild_id, user_id).await
        }
        async fn create_channel(
            &self,
            guild_id: &str,
            channel: &CreateChannel,
        ) -> ofisu_net::Result<Channel> {
            self.inner.create_channel(guild_id, channel).await
        }
        async fn edit_channel(&self, channel_id: &str, edit: &EditChannel) -> ofisu_net::Result<Channel> {
            self.inner.edit_channel(channel_id, edit).await
        }
        async fn delete_channel(&self, channel_id: &str) -> ofisu_net::Result<()> {
            self.inner.delete_channel(channel_id).await
        }
        async fn set_permission(
            &self,
            channel_id: &str,
            overwrite: &PermissionOverwrite,
        ) -> ofisu_net::Result<()> {
            self.inner.set_permission(channel_id, overwrite).await
        }
        async fn delete_permission(&self, channel_id: &str, target_id: &str) -> ofisu_net::Result<()> {
            self.inner.delete_permission(channel_id, target_id).await
        }
        async fn send_message(&self, channel_id: &str, content: &str) -> ofisu_net::Result<Message> {
            self.inner.send_message(channel_id, content).await
        }
        async fn add_reaction(
            &self,
            channel_id: &str,
            message_id: &str,
            emoji: &str,
        ) -> ofisu_net::Result<()> {
            self.inner.add_reaction(channel_id, message_id, emoji).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_sync_times_out_and_retries_track() {
        let inner = MemoryPlatform::new(bot());
        inner.add_guild(guild("10"));
        let manager = manager_with(Arc::new(HangingPlatform { inner }), Duration::from_secs(120));
        manager.reconcile_guilds().await.unwrap();

        let err = manager.tick().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Timeout { ref guild_id, secs: 120 } if guild_id == "10"
        ));

        let controller = manager.controller("10").await.unwrap();
        let state = controller.lock_state().await;
        assert!(state
            .last_synced(crate::state::Track::Members)
            .is_some());
        assert!(state
            .last_synced(crate::state::Track::Channels)
            .is_none());
    }
}
