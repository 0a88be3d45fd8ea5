//! Expense model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

/// A farm expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(default)]
    pub id: i64,
    pub description: String,
    /// Always greater than zero.
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date_incurred: Option<NaiveDate>,
    #[serde(default)]
    pub farm_id: i64,
}

impl Expense {
    #[must_use]
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            id: 0,
            description: description.into(),
            amount,
            category: None,
            date_incurred: None,
            farm_id: 0,
        }
    }
}

impl Entity for Expense {
    const KIND: EntityKind = EntityKind::Expense;

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
