//! Measurement unit model

use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

/// A measurement unit (kg, crate, litre, ...), unique per farm by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub farm_id: i64,
}

impl Unit {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            farm_id: 0,
        }
    }
}

impl Entity for Unit {
    const KIND: EntityKind = EntityKind::Unit;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn farm_id(&self) -> i64 {
        self.farm_id
    }

    fn set_farm_id(&mut self, farm_id: i64) {
        self.farm_id = farm_id;
    }
}
