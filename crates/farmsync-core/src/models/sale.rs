//! Sale model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

/// A recorded sale of a product.
///
/// A sale either references an existing buyer (`buyer_id`) or carries an
/// embedded new buyer (`create_new_buyer` + name/contact) that the server
/// creates alongside the sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    #[serde(default)]
    pub id: i64,
    pub product_id: i64,
    /// Always greater than zero.
    pub quantity_sold: i64,
    pub price_per_unit: f64,
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(default)]
    pub sale_date: Option<NaiveDate>,
    #[serde(default)]
    pub buyer_id: Option<i64>,
    #[serde(default)]
    pub create_new_buyer: bool,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub buyer_contact: Option<String>,
    #[serde(default)]
    pub unit_id: Option<i64>,
    #[serde(default)]
    pub farm_id: i64,
}

impl Sale {
    #[must_use]
    pub fn new(product_id: i64, quantity_sold: i64, price_per_unit: f64) -> Self {
        Self {
            id: 0,
            product_id,
            quantity_sold,
            price_per_unit,
            total_price: None,
            sale_date: None,
            buyer_id: None,
            create_new_buyer: false,
            buyer_name: None,
            buyer_contact: None,
            unit_id: None,
            farm_id: 0,
        }
    }

    /// Total sale value, derived when the server has not supplied one.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.total_price
            .unwrap_or_else(|| self.quantity_sold as f64 * self.price_per_unit)
    }
}

impl Entity for Sale {
    const KIND: EntityKind = EntityKind::Sale;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_derived_when_absent() {
        let sale = Sale::new(3, 4, 2.5);
        assert!((sale.total() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_prefers_server_value() {
        let mut sale = Sale::new(3, 4, 2.5);
        sale.total_price = Some(9.0);
        assert!((sale.total() - 9.0).abs() < f64::EPSILON);
    }
}
