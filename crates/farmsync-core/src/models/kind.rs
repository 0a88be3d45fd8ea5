//! Entity type tags shared by the store, gateway, and sync engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the six server-mirrored entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Sale,
    Expense,
    Buyer,
    MarketPrice,
    Unit,
}

impl EntityKind {
    pub const ALL: [Self; 6] = [
        Self::Product,
        Self::Sale,
        Self::Expense,
        Self::Buyer,
        Self::MarketPrice,
        Self::Unit,
    ];

    /// Local store table name.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::Sale => "sales",
            Self::Expense => "expenses",
            Self::Buyer => "buyers",
            Self::MarketPrice => "market_prices",
            Self::Unit => "units",
        }
    }

    /// REST path segment under `/api/`.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::Sale => "sales",
            Self::Expense => "expenses",
            Self::Buyer => "buyers",
            Self::MarketPrice => "market-prices",
            Self::Unit => "units",
        }
    }

    /// Singular wire key, used both for nested create responses
    /// (`{"sale": {...}}`) and for tombstone `entity_type` tags.
    pub const fn singular(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Sale => "sale",
            Self::Expense => "expense",
            Self::Buyer => "buyer",
            Self::MarketPrice => "price",
            Self::Unit => "unit",
        }
    }

    /// Human label for log and error messages.
    pub const fn label(self) -> &'static str {
        match self {
            Self::MarketPrice => "market price",
            other => other.singular(),
        }
    }

    /// Parse a tombstone `entity_type` tag.
    pub fn from_singular(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.singular() == tag)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}
