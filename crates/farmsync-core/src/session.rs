//! Session context supplied by the authentication collaborator.
//!
//! The core reads it read-only; on an `Unauthorized` outcome the coordinator
//! or sync engine raises the `invalidated` flag, which the host application
//! observes as a force-logout signal. Token issuance and refresh live
//! entirely outside this crate.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read-only session snapshot: bearer token, farm scope, display currency.
pub struct Session {
    token: String,
    farm_id: i64,
    currency: String,
    invalidated: AtomicBool,
}

impl Session {
    pub fn new(token: impl Into<String>, farm_id: i64, currency: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            farm_id,
            currency: currency.into(),
            invalidated: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub const fn farm_id(&self) -> i64 {
        self.farm_id
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Mark the session as no longer authorized.
    ///
    /// Idempotent; the host is expected to poll or check after failed calls
    /// and redirect to re-authentication.
    pub fn invalidate(&self) {
        if !self.invalidated.swap(true, Ordering::SeqCst) {
            tracing::warn!("Session invalidated; re-authentication required");
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("farm_id", &self.farm_id)
            .field("currency", &self.currency)
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}
