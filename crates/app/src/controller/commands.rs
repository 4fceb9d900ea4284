//! Chat command handling
//!
//! Commands produce a `Response`; delivery is a separate step so every reply
//! path shares one fallback when the platform refuses the message.

use std::sync::Arc;

use ofisu_core::{Office, OfficeRegistry};
use ofisu_net::{Message, Permissions, User};
use tracing::{error, info, warn};

use super::{room_for_channel, Controller, CHANNEL_PREFIX, ENTRANCE_ROOM};
use crate::command::{self, Command};
use crate::error::SyncResult;
use crate::state::{RemoteState, Track};

const HELP_TEXT: &str = r#"help:
__global commands__
"help" => this message
"go to office" => puts you in the parking lot of the office
"about" => print information about this ofisu install

__ofisu channel commands__
"look" or "l" => look around the room to see where you can go
"go <room>" => will take you to <room>

__admin commands__
"offices" => prints available offices
"!sync" => syncs up discord with the state of your office
"!install <office>" => initializes an office on your server, NOTE: this will completely reset your office
"!uninstall" => removes the office from your server, NOTE: this completely deletes all state
"#;

const APOLOGY: &str = "something went wrong :(";
const NO_OFFICE: &str = "No office installed, ask an admin to install one.";
const MOVE_FAILED: &str = "Could not move you, try again";
const NOT_ADMIN: &str = "You need to be a server admin to run this command";
const WRONG_CHANNEL: &str =
    "I don't know how to handle that command. Is it available in this channel? Try asking for help";
const NOT_UNDERSTOOD: &str = "I don't know how to handle that command, try asking for help";

/// Emoji acknowledging a successful move
const ACK_EMOJI: &str = "\u{1F44D}";

/// What to send back for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Response {
    /// The static help text
    Help,
    /// `<@user> text`
    Reply(String),
    /// `*<@user> text*`
    Action(String),
    /// Thumbs-up reaction on the command message
    Acknowledge,
    /// Generic failure notice
    Apology,
}

/// Listing of configured offices, ordered by ID
fn offices_listing(offices: &OfficeRegistry, installed: Option<&Office>) -> String {
    if offices.is_empty() {
        return "No offices available".to_string();
    }
    let mut listing = String::from("Available offices:\n");
    for office in offices.offices() {
        let active = if installed.is_some_and(|i| i.id() == office.id()) {
            " (active)"
        } else {
            ""
        };
        listing.push_str(&format!("- `{}`{}: {}\n", office.id(), active, office.name()));
    }
    listing
}

fn look(office: &Office, current_id: &str) -> Response {
    let adjacent = office.adjacent_rooms(current_id);
    if adjacent.is_empty() {
        return Response::Action("This room has no adjacent rooms".to_string());
    }
    Response::Reply(format!(
        "From here you can go to:\n{}",
        bullet_list(adjacent.iter().map(|r| r.name.as_str()))
    ))
}

fn bullet_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|name| format!("- {}\n", name))
        .collect()
}

impl Controller {
    /// Handle one message addressed to the bot; `content` has the prefix stripped
    ///
    /// Never fails: errors become an apology to the user.
    pub async fn handle_message(&self, message: &Message, content: &str) {
        let command = command::parse(content);

        let mut state = self.state.lock().await;
        let response = match self.respond(&mut state, message, command).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    guild_id = %self.guild_id,
                    user_id = %message.author.id,
                    error = %e,
                    "Command failed"
                );
                Response::Apology
            }
        };
        self.deliver(message, response).await;
    }

    pub(crate) async fn respond(
        &self,
        state: &mut RemoteState,
        message: &Message,
        command: Command<'_>,
    ) -> SyncResult<Response> {
        let author = &message.author;

        match command {
            Command::Help => Ok(Response::Help),
            Command::Offices => Ok(Response::Reply(offices_listing(
                &self.offices,
                state.office.as_deref(),
            ))),
            Command::Sync => {
                state.request_full_sync();
                Ok(Response::Reply(
                    "Will sync everything up in a moment!".to_string(),
                ))
            }
            Command::EnterOffice => Ok(self.enter_office(state, author)),
            Command::Install(office_id) => {
                if !self.is_guild_admin(author).await? {
                    return Ok(Response::Reply(NOT_ADMIN.to_string()));
                }
                self.install(state, office_id)
            }
            Command::Uninstall => {
                if !self.is_guild_admin(author).await? {
                    return Ok(Response::Reply(NOT_ADMIN.to_string()));
                }
                self.store.delete(&self.keys.installed_office())?;
                state.request_full_sync();
                info!(guild_id = %self.guild_id, "Office uninstalled");
                Ok(Response::Reply("office uninstalled!".to_string()))
            }
            Command::Look => Ok(match self.current_room(state, message) {
                Ok((office, current_id)) => look(&office, &current_id),
                Err(refusal) => refusal,
            }),
            Command::Go(destination) => Ok(match self.current_room(state, message) {
                Ok((office, current_id)) => {
                    self.go(state, author, &office, &current_id, destination)
                }
                Err(refusal) => refusal,
            }),
            Command::Unknown => Ok(match self.current_room(state, message) {
                Ok(_) => Response::Reply(NOT_UNDERSTOOD.to_string()),
                Err(refusal) => refusal,
            }),
        }
    }

    /// Office and room ID for a room channel, or the reply refusing the command
    fn current_room(
        &self,
        state: &RemoteState,
        message: &Message,
    ) -> Result<(Arc<Office>, String), Response> {
        if !state.is_managed_channel(&message.channel_id) {
            return Err(Response::Reply(WRONG_CHANNEL.to_string()));
        }
        let Some(office) = state.office.clone() else {
            return Err(Response::Reply(NO_OFFICE.to_string()));
        };

        let channel_name = state
            .channel(&message.channel_id)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let current_id = match room_for_channel(&office, &channel_name) {
            Some(room) => room.id.clone(),
            None => channel_name
                .strip_prefix(CHANNEL_PREFIX)
                .unwrap_or(&channel_name)
                .to_string(),
        };
        Ok((office, current_id))
    }

    fn go(
        &self,
        state: &mut RemoteState,
        author: &User,
        office: &Office,
        current_id: &str,
        destination: &str,
    ) -> Response {
        let candidates = office.move_candidates(current_id, destination);
        let target = match candidates.as_slice() {
            [] => {
                return Response::Reply(format!(
                    "That destination seems invalid. You can try going to:\n{}",
                    bullet_list(office.adjacent_rooms(current_id).iter().map(|r| r.name.as_str()))
                ))
            }
            [target] => target,
            several => {
                return Response::Reply(format!(
                    "Which one do you want to go to?\n{}",
                    bullet_list(several.iter().map(|r| r.name.as_str()))
                ))
            }
        };

        let key = self.keys.user_location(office.id(), &author.id);
        if let Err(e) = self.store.set(&key, &target.id) {
            warn!(user_id = %author.id, error = %e, "Failed to store location");
            return Response::Reply(MOVE_FAILED.to_string());
        }
        info!(
            guild_id = %self.guild_id,
            user_id = %author.id,
            from = %current_id,
            to = %target.id,
            "User moved"
        );
        state.request_sync(Track::Users);
        Response::Acknowledge
    }

    fn enter_office(&self, state: &mut RemoteState, author: &User) -> Response {
        let Some(office) = &state.office else {
            return Response::Reply(NO_OFFICE.to_string());
        };

        let key = self.keys.user_location(office.id(), &author.id);
        if let Err(e) = self.store.set(&key, ENTRANCE_ROOM) {
            warn!(user_id = %author.id, error = %e, "Failed to store location");
            return Response::Reply(MOVE_FAILED.to_string());
        }

        state.request_sync(Track::Users);
        Response::Action("drives up to the office".to_string())
    }

    fn install(&self, state: &mut RemoteState, office_id: &str) -> SyncResult<Response> {
        let Some(office) = self.offices.get(office_id) else {
            return Ok(Response::Reply(format!(
                "Office with ID '{}' is not available\n{}",
                office_id,
                offices_listing(&self.offices, state.office.as_deref())
            )));
        };
        self.store.set(&self.keys.installed_office(), office.id())?;
        state.request_full_sync();
        info!(guild_id = %self.guild_id, office_id = %office.id(), "Office installed");
        Ok(Response::Reply(format!("'{}' is now installed!", office.name())))
    }

    /// Guild owner, or holder of a role with the administrator bit
    async fn is_guild_admin(&self, user: &User) -> SyncResult<bool> {
        let guild = self.platform.guild(&self.guild_id).await?;
        if guild.owner_id == user.id {
            return Ok(true);
        }

        let member = self.platform.guild_member(&self.guild_id, &user.id).await?;
        Ok(member.roles.iter().any(|role_id| {
            guild
                .role(role_id)
                .is_some_and(|role| role.permissions.contains(Permissions::ADMINISTRATOR))
        }))
    }

    /// Send a response, falling back to an apology if sending fails
    pub(crate) async fn deliver(&self, message: &Message, response: Response) {
        let mention = message.author.mention();
        let content = match response {
            Response::Help => HELP_TEXT.to_string(),
            Response::Reply(text) => format!("{} {}", mention, text),
            Response::Action(text) => format!("*{} {}*", mention, text),
            Response::Apology => format!("{} {}", mention, APOLOGY),
            Response::Acknowledge => {
                if let Err(e) = self
                    .platform
                    .add_reaction(&message.channel_id, &message.id, ACK_EMOJI)
                    .await
                {
                    warn!(channel_id = %message.channel_id, error = %e, "Failed to acknowledge");
                }
                return;
            }
        };

        let Err(e) = self.platform.send_message(&message.channel_id, &content).await else {
            return;
        };
        warn!(channel_id = %message.channel_id, error = %e, "Failed to send reply");

        let apology = format!("{} {}", mention, APOLOGY);
        if let Err(e) = self.platform.send_message(&message.channel_id, &apology).await {
            error!(channel_id = %message.channel_id, error = %e, "Failed to send apology");
        }
    }
}
