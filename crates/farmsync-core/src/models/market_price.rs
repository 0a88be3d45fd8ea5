//! Market price model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

/// An observed market price for a product, recorded per farm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    #[serde(default)]
    pub id: i64,
    pub product_name: String,
    /// Never negative.
    pub current_price: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub date_updated: Option<NaiveDate>,
    #[serde(default)]
    pub farm_id: i64,
}

impl MarketPrice {
    #[must_use]
    pub fn new(product_name: impl Into<String>, current_price: f64) -> Self {
        Self {
            id: 0,
            product_name: product_name.into(),
            current_price,
            unit: None,
            location: None,
            date_updated: None,
            farm_id: 0,
        }
    }
}

impl Entity for MarketPrice {
    const KIND: EntityKind = EntityKind::MarketPrice;

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
