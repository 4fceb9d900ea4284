//! REST client for the Discord API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::protocol::{
    Channel, CreateChannel, EditChannel, Guild, Member, Message, PartialGuild,
    PermissionOverwrite, User,
};

/// Default API root
pub const API_BASE: &str = "https://discord.com/api/v10";

/// Discord REST client authenticated as a bot
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    content: &'a str,
}

impl DiscordClient {
    /// Create a client; every request is bounded by `timeout`
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ofisu/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: API_BASE.to_string(),
            token: token.into(),
        })
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    /// Send a request and decode its JSON body
    async fn send<T: DeserializeOwned>(&self, path: &str, req: RequestBuilder) -> Result<T> {
        let response = self.dispatch(path, req).await?;
        Ok(response.json().await?)
    }

    /// Send a request whose body is irrelevant
    async fn send_empty(&self, path: &str, req: RequestBuilder) -> Result<()> {
        self.dispatch(path, req).await?;
        Ok(())
    }

    async fn dispatch(&self, path: &str, req: RequestBuilder) -> Result<reqwest::Response> {
        debug!(path, "Platform request");
        let response = self.authorized(req).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(path.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(path, "Rate limited by platform");
        }
        Err(Error::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(path, self.http.get(self.url(path))).await
    }
}

#[async_trait]
impl Platform for DiscordClient {
    async fn current_user(&self) -> Result<User> {
        self.get("/users/@me").await
    }

    async fn user_guilds(&self, limit: u32) -> Result<Vec<PartialGuild>> {
        self.get(&format!("/users/@me/guilds?limit={}", limit)).await
    }

    async fn guild(&self, guild_id: &str) -> Result<Guild> {
        self.get(&format!("/guilds/{}", guild_id)).await
    }

    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>> {
        self.get(&format!("/guilds/{}/channels", guild_id)).await
    }

    async fn guild_members(&self, guild_id: &str, limit: u32) -> Result<Vec<Member>> {
        self.get(&format!("/guilds/{}/members?limit={}", guild_id, limit))
            .await
    }

    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Member> {
        self.get(&format!("/guilds/{}/members/{}", guild_id, user_id))
            .await
    }

    async fn create_channel(&self, guild_id: &str, channel: &CreateChannel) -> Result<Channel> {
        let path = format!("/guilds/{}/channels", guild_id);
        let req = self.http.post(self.url(&path)).json(channel);
        self.send(&path, req).await
    }

    async fn edit_channel(&self, channel_id: &str, edit: &EditChannel) -> Result<Channel> {
        let path = format!("/channels/{}", channel_id);
        let req = self.http.patch(self.url(&path)).json(edit);
        self.send(&path, req).await
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        let path = format!("/channels/{}", channel_id);
        let req = self.http.delete(self.url(&path));
        self.send_empty(&path, req).await
    }

    async fn set_permission(
        &self,
        channel_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> Result<()> {
        let path = format!("/channels/{}/permissions/{}", channel_id, overwrite.id);
        let req = self.http.put(self.url(&path)).json(overwrite);
        self.send_empty(&path, req).await
    }

    async fn delete_permission(&self, channel_id: &str, target_id: &str) -> Result<()> {
        let path = format!("/channels/{}/permissions/{}", channel_id, target_id);
        let req = self.http.delete(self.url(&path));
        self.send_empty(&path, req).await
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message> {
        let path = format!("/channels/{}/messages", channel_id);
        let req = self.http.post(self.url(&path)).json(&MessageBody { content });
        self.send(&path, req).await
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        let path = format!(
            "/channels/{}/messages/{}/reactions/{}/@me",
            channel_id, message_id, emoji
        );
        let req = self.http.put(self.url(&path)).header("content-length", 0);
        self.send_empty(&path, req).await
    }
}
