//! Key hierarchy for persisted guild state
//!
//! Keys are versioned by their root path. Changing the layout below requires
//! migrating existing data; nothing enforces that here.

/// Root of every key written by the reconciler
const ROOT: &str = "ofisu/discord/guilds";

/// Builds keys scoped to one guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    guild_id: String,
}

impl KeySpace {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
        }
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// Key holding the installed office ID
    pub fn installed_office(&self) -> String {
        format!("{}/{}/installed_office", ROOT, self.guild_id)
    }

    /// Key holding the room a user wants to be in
    pub fn user_location(&self, office_id: &str, user_id: &str) -> String {
        format!(
            "{}/{}/office/{}/users/{}/location",
            ROOT, self.guild_id, office_id, user_id
        )
    }
}
