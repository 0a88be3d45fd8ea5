//! Local store layer for farmsync

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{LocalStore, PendingSummary, RowState};
