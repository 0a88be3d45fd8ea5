//! Buyer model

use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

/// A buyer known to the farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub farm_id: i64,
}

impl Buyer {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            contact: None,
            location: None,
            farm_id: 0,
        }
    }
}

impl Entity for Buyer {
    const KIND: EntityKind = EntityKind::Buyer;

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
