//! Product model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

/// A harvested or stocked product tracked per farm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    /// On-hand quantity, never negative.
    pub quantity: i64,
    #[serde(default)]
    pub harvest_date: Option<NaiveDate>,
    /// Low-inventory alert threshold.
    #[serde(default)]
    pub minimum_threshold: i64,
    #[serde(default)]
    pub unit_id: Option<i64>,
    #[serde(default)]
    pub farm_id: i64,
}

impl Product {
    #[must_use]
    pub fn new(name: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: 0,
            name: name.into(),
            category: None,
            quantity,
            harvest_date: None,
            minimum_threshold: 0,
            unit_id: None,
            farm_id: 0,
        }
    }

    /// Whether the on-hand quantity has fallen to the alert threshold.
    #[must_use]
    pub const fn is_low(&self) -> bool {
        self.quantity <= self.minimum_threshold
    }
}

impl Entity for Product {
    const KIND: EntityKind = EntityKind::Product;

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
