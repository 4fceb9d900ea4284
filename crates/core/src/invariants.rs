//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::models::Office;

/// Validate that an office graph is internally consistent
pub fn assert_office_invariants(office: &Office) {
    for (room_id, neighbors) in office.adjacency() {
        // Every adjacency key must be a declared room
        debug_assert!(
            office.room(room_id).is_some(),
            "Office {} has edges for unknown room {}",
            office.id(),
            room_id
        );

        for neighbor in neighbors {
            // Edge endpoints are always materialized as rooms
            debug_assert!(
                office.room(neighbor).is_some(),
                "Office {} room {} links to unknown room {}",
                office.id(),
                room_id,
                neighbor
            );

            // Edges are recorded in both directions
            debug_assert!(
                office.neighbors(neighbor).iter().any(|n| n == room_id),
                "Office {} edge {} -- {} is not symmetric",
                office.id(),
                room_id,
                neighbor
            );
        }
    }

    for room in office.rooms() {
        debug_assert!(
            !room.name.trim().is_empty(),
            "Office {} room {} has empty name",
            office.id(),
            room.id
        );
    }
}
