//! Room model - a node in the office graph

use serde::{Deserialize, Serialize};

/// A Room is somewhere members can hang out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Stable identifier, taken from the node token
    pub id: String,
    /// Display name (defaults to the ID)
    pub name: String,
    /// Free-text labels from `# has:` annotations
    pub items: Vec<String>,
    /// Whether the room also gets a voice channel
    pub voice_enabled: bool,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            items: Vec::new(),
            voice_enabled: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_voice(mut self) -> Self {
        self.voice_enabled = true;
        self
    }

    /// Channel topic for this room: the display name, unless it is just the ID
    pub fn topic(&self) -> &str {
        if self.name == self.id {
            ""
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_is_id() {
        let room = Room::new("reception");
        assert_eq!(room.name, "reception");
        assert_eq!(room.topic(), "");
    }

    #[test]
    fn test_topic_uses_display_name() {
        let room = Room::new("break").with_name("Break Room");
        assert_eq!(room.topic(), "Break Room");
    }

    #[test]
    fn test_serializes_with_field_names() {
        let room = Room::new("break").with_name("Break Room").with_voice();
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["id"], "break");
        assert_eq!(json["name"], "Break Room");
        assert_eq!(json["voice_enabled"], true);
    }
}
