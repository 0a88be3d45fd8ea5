//! Entity normalization: canonical records out of heterogeneous raw shapes.
//!
//! Server responses and locally persisted rows arrive as loose JSON; form
//! layers historically sent numbers as strings. Each entity defines its
//! required fields and coercion rules here. Normalization never fails loudly:
//! a malformed record becomes `None` and is filtered out of display
//! sequences with a logged warning.

use chrono::NaiveDate;
use serde_json::Value;

use crate::models::{
    Buyer, EntityKind, Expense, MarketPrice, Product, Sale, Unit,
};

/// Conversion from a raw JSON record to a canonical entity.
pub trait Normalize: Sized {
    /// Returns `None` when a required field is absent or of the wrong kind.
    fn normalize(raw: &Value) -> Option<Self>;
}

/// Normalize a sequence, dropping malformed records.
///
/// Each drop logs the record's position so callers can report
/// "N invalid records skipped".
pub fn filter_normalized<T: Normalize>(kind: EntityKind, raws: &[Value]) -> Vec<T> {
    let mut records = Vec::with_capacity(raws.len());
    let mut dropped = 0_usize;

    for (position, raw) in raws.iter().enumerate() {
        match T::normalize(raw) {
            Some(record) => records.push(record),
            None => {
                dropped += 1;
                tracing::warn!(
                    "Dropping malformed {} record at position {position}",
                    kind.label()
                );
            }
        }
    }

    if dropped > 0 {
        tracing::warn!("{dropped} invalid {} record(s) skipped", kind.label());
    }
    records
}

/// Coerce a JSON value to an integer. Accepts integral numbers and numeric
/// strings; fractional values are rejected rather than truncated.
pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0)
                .and_then(|float| {
                    if float >= i64::MIN as f64 && float <= i64::MAX as f64 {
                        #[allow(clippy::cast_possible_truncation)]
                        Some(float as i64)
                    } else {
                        None
                    }
                })
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce a JSON value to a float. Accepts numbers and numeric strings.
pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce a JSON value to non-empty trimmed text.
pub(crate) fn coerce_text(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Coerce a JSON value to an ISO date (`YYYY-MM-DD`).
pub(crate) fn coerce_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

impl Normalize for Product {
    fn normalize(raw: &Value) -> Option<Self> {
        let map = raw.as_object()?;
        let quantity = coerce_i64(map.get("quantity")?)?;
        if quantity < 0 {
            return None;
        }
        let minimum_threshold = match map.get("minimum_threshold") {
            Some(Value::Null) | None => 0,
            Some(value) => {
                let threshold = coerce_i64(value)?;
                if threshold < 0 {
                    return None;
                }
                threshold
            }
        };

        Some(Self {
            id: coerce_i64(map.get("id")?)?,
            name: coerce_text(map.get("name")?)?,
            category: map.get("category").and_then(coerce_text),
            quantity,
            harvest_date: map.get("harvest_date").and_then(coerce_date),
            minimum_threshold,
            unit_id: map.get("unit_id").and_then(coerce_i64),
            farm_id: coerce_i64(map.get("farm_id")?)?,
        })
    }
}

impl Normalize for Sale {
    fn normalize(raw: &Value) -> Option<Self> {
        let map = raw.as_object()?;
        let quantity_sold = coerce_i64(map.get("quantity_sold")?)?;
        if quantity_sold <= 0 {
            return None;
        }
        let price_per_unit = coerce_f64(map.get("price_per_unit")?)?;
        if price_per_unit < 0.0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let total_price = map
            .get("total_price")
            .and_then(coerce_f64)
            .or(Some(quantity_sold as f64 * price_per_unit));

        Some(Self {
            id: coerce_i64(map.get("id")?)?,
            product_id: coerce_i64(map.get("product_id")?)?,
            quantity_sold,
            price_per_unit,
            total_price,
            sale_date: map.get("sale_date").and_then(coerce_date),
            buyer_id: map.get("buyer_id").and_then(coerce_i64),
            create_new_buyer: map
                .get("create_new_buyer")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            buyer_name: map.get("buyer_name").and_then(coerce_text),
            buyer_contact: map.get("buyer_contact").and_then(coerce_text),
            unit_id: map.get("unit_id").and_then(coerce_i64),
            farm_id: coerce_i64(map.get("farm_id")?)?,
        })
    }
}

impl Normalize for Expense {
    fn normalize(raw: &Value) -> Option<Self> {
        let map = raw.as_object()?;
        let amount = coerce_f64(map.get("amount")?)?;
        if amount <= 0.0 {
            return None;
        }

        Some(Self {
            id: coerce_i64(map.get("id")?)?,
            description: coerce_text(map.get("description")?)?,
            amount,
            category: map.get("category").and_then(coerce_text),
            date_incurred: map.get("date_incurred").and_then(coerce_date),
            farm_id: coerce_i64(map.get("farm_id")?)?,
        })
    }
}

impl Normalize for Buyer {
    fn normalize(raw: &Value) -> Option<Self> {
        let map = raw.as_object()?;

        Some(Self {
            id: coerce_i64(map.get("id")?)?,
            name: coerce_text(map.get("name")?)?,
            contact: map.get("contact").and_then(coerce_text),
            location: map.get("location").and_then(coerce_text),
            farm_id: coerce_i64(map.get("farm_id")?)?,
        })
    }
}

impl Normalize for MarketPrice {
    fn normalize(raw: &Value) -> Option<Self> {
        let map = raw.as_object()?;
        let current_price = coerce_f64(map.get("current_price")?)?;
        if current_price < 0.0 {
            return None;
        }

        Some(Self {
            id: coerce_i64(map.get("id")?)?,
            product_name: coerce_text(map.get("product_name")?)?,
            current_price,
            unit: map.get("unit").and_then(coerce_text),
            location: map.get("location").and_then(coerce_text),
            date_updated: map.get("date_updated").and_then(coerce_date),
            farm_id: coerce_i64(map.get("farm_id")?)?,
        })
    }
}

impl Normalize for Unit {
    fn normalize(raw: &Value) -> Option<Self> {
        let map = raw.as_object()?;

        Some(Self {
            id: coerce_i64(map.get("id")?)?,
            name: coerce_text(map.get("name")?)?,
            farm_id: coerce_i64(map.get("farm_id")?)?,
        })
    }
}
