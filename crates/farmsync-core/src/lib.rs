//! farmsync-core - Offline-first sync core for farm records
//!
//! This crate contains the shared models, the durable local store, the remote
//! gateway, and the write/sync coordination logic used by all farmsync
//! clients. UI concerns (forms, rendering, navigation) live outside; they
//! call `save`, `delete`, `list`, `sync`, and `clear` on this core.

pub mod coordinator;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod normalize;
pub mod session;
pub mod sync;

pub use coordinator::{Coordinator, DeleteOutcome, SaveOutcome, WriteError};
pub use db::{Database, LocalStore, PendingSummary, RowState};
pub use error::{Error, Result};
pub use gateway::{DateRange, GatewayError, HttpGateway, RemoteGateway};
pub use models::{
    Buyer, Entity, EntityKind, Expense, MarketPrice, PendingDeletion, Product, Sale, Unit,
};
pub use session::Session;
pub use sync::{SyncEngine, SyncError, SyncReport, SyncedCounts};
