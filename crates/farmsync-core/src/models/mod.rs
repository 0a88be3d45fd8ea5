//! Data models for farmsync

mod buyer;
mod expense;
mod kind;
mod market_price;
mod pending_deletion;
mod product;
mod sale;
mod unit;

pub use buyer::Buyer;
pub use expense::Expense;
pub use kind::EntityKind;
pub use market_price::MarketPrice;
pub use pending_deletion::PendingDeletion;
pub use product::Product;
pub use sale::Sale;
pub use unit::Unit;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::normalize::Normalize;

/// A server-mirrored record that the local store, coordinator, and sync
/// engine can handle generically.
///
/// Ids are `i64`: server-assigned ids are small positive integers, and
/// unsynced local creates carry a temporary id derived from the creation
/// timestamp (Unix milliseconds) until the server confirms the create.
pub trait Entity:
    Normalize + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn farm_id(&self) -> i64;
    fn set_farm_id(&mut self, farm_id: i64);

    /// Wire payload for create/update calls: the record without its id.
    ///
    /// The server assigns ids; sending a temporary one would leak local
    /// bookkeeping into the API.
    fn payload(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Value::Object(map) = &mut value {
            map.remove("id");
        }
        value
    }
}
