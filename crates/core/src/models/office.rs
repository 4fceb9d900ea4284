//! Office model - an undirected graph of rooms

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Room;
use crate::matching::{matches_room, normalize_name};

/// An Office is the desired topology a guild mirrors
///
/// Built once by ingestion and immutable afterwards. Adjacency lists keep file
/// order; every edge is recorded in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    id: String,
    name: String,
    rooms: BTreeMap<String, Room>,
    edges: BTreeMap<String, Vec<String>>,
}

impl Office {
    pub(crate) fn empty() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            rooms: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a room by ID
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// All rooms, ordered by ID
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Neighbor IDs of a room in file order
    pub fn neighbors(&self, room_id: &str) -> &[String] {
        self.edges.get(room_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Adjacency entries as (room ID, neighbor IDs)
    pub fn adjacency(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.edges.iter().map(|(id, n)| (id.as_str(), n.as_slice()))
    }

    /// Rooms reachable in one step from `room_id`, in adjacency order
    ///
    /// Empty if the room has no edges or does not exist.
    pub fn adjacent_rooms(&self, room_id: &str) -> Vec<&Room> {
        self.neighbors(room_id)
            .iter()
            .filter_map(|id| self.rooms.get(id))
            .collect()
    }

    /// Neighbors of `from` that a typed destination could refer to
    ///
    /// A room qualifies if the normalized text is a prefix of its normalized
    /// name, or within the edit-distance threshold of it. Results follow
    /// adjacency order and each room appears at most once.
    pub fn move_candidates(&self, from: &str, desired: &str) -> Vec<&Room> {
        let desired = normalize_name(desired);
        let mut candidates: Vec<&Room> = Vec::new();

        for room in self.adjacent_rooms(from) {
            if candidates.iter().any(|c| c.id == room.id) {
                continue;
            }
            if matches_room(&desired, &normalize_name(&room.name)) {
                candidates.push(room);
            }
        }

        candidates
    }

    pub(crate) fn set_header(&mut self, id: String, name: Option<String>) {
        self.name = name.unwrap_or_else(|| id.clone());
        self.id = id;
    }

    /// Insert a room if it has not been seen and return it for updates
    pub(crate) fn room_entry(&mut self, room_id: &str) -> &mut Room {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id))
    }

    pub(crate) fn add_edge(&mut self, a: &str, b: &str) {
        self.room_entry(a);
        self.room_entry(b);
        self.edges.entry(a.to_string()).or_default().push(b.to_string());
        self.edges.entry(b.to_string()).or_default().push(a.to_string());
    }
}
