//! Sync engine: flushes buffered writes and queued deletions to the server.
//!
//! Runs only when invoked (a connectivity-restored hook or a manual
//! trigger); nothing in the core retries on its own. A record is either
//! fully migrated out of the buffer or fully retained, never half-moved.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::db::{LocalStore, RowState};
use crate::error::Error;
use crate::gateway::{GatewayError, RemoteGateway};
use crate::models::{Buyer, Entity, EntityKind, Expense, MarketPrice, Product, Sale, Unit};
use crate::normalize::coerce_i64;
use crate::session::Session;

/// Failures that abort a sync pass before any per-record work.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connectivity gate failed; nothing was attempted.
    #[error("Cannot sync while offline")]
    Offline,
    /// The session is no longer valid; re-authentication required.
    #[error("Not authorized")]
    Unauthorized,
    #[error(transparent)]
    Store(#[from] Error),
}

/// Per-type counts of confirmed records; deletions count under their type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncedCounts {
    pub products: usize,
    pub sales: usize,
    pub expenses: usize,
    pub buyers: usize,
    pub prices: usize,
    pub units: usize,
}

impl SyncedCounts {
    fn slot_mut(&mut self, kind: EntityKind) -> &mut usize {
        match kind {
            EntityKind::Product => &mut self.products,
            EntityKind::Sale => &mut self.sales,
            EntityKind::Expense => &mut self.expenses,
            EntityKind::Buyer => &mut self.buyers,
            EntityKind::MarketPrice => &mut self.prices,
            EntityKind::Unit => &mut self.units,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.products + self.sales + self.expenses + self.buyers + self.prices + self.units
    }
}

/// Outcome of one sync pass. Partial failure is a normal outcome: confirmed
/// records are counted, rejected ones stay buffered and appear in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced: SyncedCounts,
    pub errors: Vec<String>,
}

impl SyncReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Whether a push pass may keep going.
enum Pass {
    Completed,
    ConnectivityLost,
}

/// Flushes the offline buffer. One instance per process, alongside the
/// coordinator; both share the store and session.
#[derive(Clone)]
pub struct SyncEngine<G> {
    store: LocalStore,
    gateway: G,
    session: Arc<Session>,
}

impl<G: RemoteGateway> SyncEngine<G> {
    pub fn new(store: LocalStore, gateway: G, session: Arc<Session>) -> Self {
        Self {
            store,
            gateway,
            session,
        }
    }

    /// Push all buffered creates, updates, and deletions, one record at a
    /// time.
    ///
    /// Sequential per-record calls so each confirmed create receives its
    /// server-assigned id. Entity types are processed as independent passes;
    /// a rejection skips one record, losing connectivity mid-pass ends the
    /// run with the remainder still buffered.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        if !self.gateway.check_connectivity().await {
            tracing::info!("Sync skipped: server unreachable");
            return Err(SyncError::Offline);
        }

        let farm_id = self.session.farm_id();
        if self.store.pending_summary(farm_id).await?.total() == 0 {
            tracing::debug!("Nothing buffered; sync is a no-op");
            return Ok(SyncReport::default());
        }

        let mut report = SyncReport::default();
        let connected = 'push: {
            if let Pass::ConnectivityLost = self.push_kind::<Product>(&mut report).await? {
                break 'push false;
            }
            if let Pass::ConnectivityLost = self.push_kind::<Sale>(&mut report).await? {
                break 'push false;
            }
            if let Pass::ConnectivityLost = self.push_kind::<Expense>(&mut report).await? {
                break 'push false;
            }
            if let Pass::ConnectivityLost = self.push_kind::<Buyer>(&mut report).await? {
                break 'push false;
            }
            if let Pass::ConnectivityLost = self.push_kind::<MarketPrice>(&mut report).await? {
                break 'push false;
            }
            if let Pass::ConnectivityLost = self.push_kind::<Unit>(&mut report).await? {
                break 'push false;
            }
            !matches!(self.push_deletions(&mut report).await?, Pass::ConnectivityLost)
        };

        if !connected {
            report
                .errors
                .push("Server became unreachable; remaining records are still buffered".into());
        }
        tracing::info!(
            "Sync finished: {} record(s) confirmed, {} error(s)",
            report.synced.total(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Push buffered creates and updates of one entity type, oldest first.
    async fn push_kind<E: Entity>(&self, report: &mut SyncReport) -> Result<Pass, SyncError> {
        let pending = self.store.list_pending::<E>(self.session.farm_id()).await?;

        for (state, record) in pending {
            let local_id = record.id();
            let error = match state {
                RowState::BufferedCreate => {
                    match self.gateway.create(E::KIND, &record.payload()).await {
                        Ok(raw) => {
                            self.confirm_create(local_id, record, &raw, report).await?;
                            continue;
                        }
                        Err(error) => error,
                    }
                }
                RowState::BufferedUpdate => {
                    match self.gateway.update(E::KIND, local_id, &record.payload()).await {
                        Ok(_) => {
                            self.store.put(&record, RowState::Clean).await?;
                            *report.synced.slot_mut(E::KIND) += 1;
                            continue;
                        }
                        Err(error) => error,
                    }
                }
                RowState::Clean => continue,
            };

            if let Pass::ConnectivityLost =
                self.record_failure(E::KIND, local_id, error, report)?
            {
                return Ok(Pass::ConnectivityLost);
            }
        }

        Ok(Pass::Completed)
    }

    /// Replace the temp-id row with the server-confirmed record.
    async fn confirm_create<E: Entity>(
        &self,
        temp_id: i64,
        record: E,
        raw: &Value,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let confirmed = match E::normalize(raw) {
            Some(confirmed) => Some(confirmed),
            None => {
                // An unreadable ack that still names the id is enough to
                // promote; the next list() refresh picks up the server copy
                raw.get("id")
                    .and_then(coerce_i64)
                    .filter(|id| *id > 0)
                    .map(|id| {
                        let mut record = record;
                        record.set_id(id);
                        record
                    })
            }
        };

        match confirmed {
            Some(confirmed) => {
                self.store.promote(temp_id, &confirmed).await?;
                *report.synced.slot_mut(E::KIND) += 1;
            }
            None => {
                report.errors.push(format!(
                    "{} {temp_id}: server response did not include a record id",
                    E::KIND.label()
                ));
            }
        }
        Ok(())
    }

    /// Push queued deletions; each confirmed one clears its tombstone.
    async fn push_deletions(&self, report: &mut SyncReport) -> Result<Pass, SyncError> {
        let tombstones = self.store.list_tombstones(self.session.farm_id()).await?;

        for tombstone in tombstones {
            match self
                .gateway
                .delete(tombstone.entity_type, tombstone.entity_id)
                .await
            {
                Ok(()) => {
                    // The row is normally gone already, but a mirror refresh
                    // between the offline delete and this pass may have left
                    // a stale clean copy
                    self.store
                        .delete(tombstone.entity_type, tombstone.entity_id)
                        .await?;
                    self.store
                        .remove_tombstone(tombstone.entity_type, tombstone.entity_id)
                        .await?;
                    *report.synced.slot_mut(tombstone.entity_type) += 1;
                }
                Err(error) => {
                    if let Pass::ConnectivityLost = self.record_failure(
                        tombstone.entity_type,
                        tombstone.entity_id,
                        error,
                        report,
                    )? {
                        return Ok(Pass::ConnectivityLost);
                    }
                }
            }
        }

        Ok(Pass::Completed)
    }

    /// Classify a per-record failure: rejections are recorded and the pass
    /// continues, auth failures abort, connectivity loss ends the run.
    fn record_failure(
        &self,
        kind: EntityKind,
        id: i64,
        error: GatewayError,
        report: &mut SyncReport,
    ) -> Result<Pass, SyncError> {
        match error {
            GatewayError::NetworkUnreachable => Ok(Pass::ConnectivityLost),
            GatewayError::Unauthorized => {
                self.session.invalidate();
                Err(SyncError::Unauthorized)
            }
            GatewayError::ValidationRejected(message) | GatewayError::Api(message) => {
                report.errors.push(format!("{} {id}: {message}", kind.label()));
                Ok(Pass::Completed)
            }
        }
    }
}
