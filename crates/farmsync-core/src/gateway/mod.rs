//! Remote gateway: the only component that talks to the farm API.
//!
//! Callers never see transport errors or raw status codes; every failure is
//! classified into [`GatewayError`] at this boundary so the coordinator and
//! sync engine can decide between buffering, rejecting, and forcing logout
//! without inspecting error text.

mod http;

pub use http::HttpGateway;

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::models::EntityKind;

/// Classified remote failure.
///
/// `NetworkUnreachable` is the only class that triggers offline buffering.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Connection refused, DNS failure, or request timeout.
    #[error("Server unreachable")]
    NetworkUnreachable,
    /// HTTP 401/403; the session is no longer valid.
    #[error("Not authorized")]
    Unauthorized,
    /// HTTP 400/409/422; the server rejected the record itself.
    #[error("{0}")]
    ValidationRejected(String),
    /// Any other remote failure.
    #[error("API error: {0}")]
    Api(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Inclusive date range for export requests; open ends are allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    #[must_use]
    pub const fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }
}

/// Remote API surface the coordinator and sync engine depend on.
///
/// `list` and `create` return raw JSON records; normalization happens in the
/// caller so malformed server records are dropped per record, not per call.
#[allow(async_fn_in_trait)]
pub trait RemoteGateway {
    /// Probe whether the server answers at all. Any HTTP response counts as
    /// reachable; only a transport failure does not.
    async fn check_connectivity(&self) -> bool;

    async fn list(&self, kind: EntityKind) -> GatewayResult<Vec<Value>>;

    /// Create a record; returns the server's copy (with its assigned id).
    async fn create(&self, kind: EntityKind, payload: &Value) -> GatewayResult<Value>;

    async fn update(&self, kind: EntityKind, id: i64, payload: &Value) -> GatewayResult<Value>;

    async fn delete(&self, kind: EntityKind, id: i64) -> GatewayResult<()>;

    /// Server-rendered CSV export; formatting stays remote.
    async fn export(&self, kind: EntityKind, range: DateRange) -> GatewayResult<Vec<u8>>;
}
