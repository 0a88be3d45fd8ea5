//! Pending deletion tombstone

use serde::{Deserialize, Serialize};

use super::EntityKind;

/// A tombstone recording a server-side delete still owed.
///
/// Created only for records previously confirmed to exist server-side;
/// deleting an unsynced local-only record just removes its store row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeletion {
    pub entity_type: EntityKind,
    pub entity_id: i64,
    pub farm_id: i64,
}

impl PendingDeletion {
    #[must_use]
    pub const fn new(entity_type: EntityKind, entity_id: i64, farm_id: i64) -> Self {
        Self {
            entity_type,
            entity_id,
            farm_id,
        }
    }
}
