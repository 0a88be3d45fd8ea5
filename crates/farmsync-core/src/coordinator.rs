//! Write-path coordinator: the single entry point for record writes.
//!
//! Every save and delete goes through one coordinator instance so the
//! attempt-then-buffer policy, farm scoping, and session invalidation are
//! applied uniformly. Policy: one remote attempt, no automatic retry; only
//! an unreachable server buffers, a rejection surfaces immediately.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::db::{LocalStore, PendingSummary, RowState};
use crate::error::Error;
use crate::gateway::{DateRange, GatewayError, RemoteGateway};
use crate::models::{Entity, EntityKind, PendingDeletion};
use crate::normalize::{coerce_i64, filter_normalized};
use crate::session::Session;

/// Result of a save: the record reached the server or was buffered locally.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome<E> {
    /// Server confirmed; the returned record carries the server's copy.
    Confirmed(E),
    /// Server unreachable; the record is buffered for the next sync.
    SavedOffline(E),
}

impl<E> SaveOutcome<E> {
    pub fn into_record(self) -> E {
        match self {
            Self::Confirmed(record) | Self::SavedOffline(record) => record,
        }
    }
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Server confirmed the deletion.
    Confirmed,
    /// Server unreachable; removed locally, tombstone queued.
    QueuedOffline,
    /// The record had never been synced; removing it locally was enough.
    RemovedLocal,
}

/// Failures surfaced to the caller. Rejections and auth failures are never
/// buffered.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The server rejected the record; fix it and save again.
    #[error("{0}")]
    Rejected(String),
    /// The session is no longer valid; re-authentication required.
    #[error("Not authorized")]
    Unauthorized,
    /// Other remote failure.
    #[error("API error: {0}")]
    Api(String),
    /// Local store failure.
    #[error(transparent)]
    Store(#[from] Error),
}

pub type WriteResult<T> = Result<T, WriteError>;

/// Coordinates writes between the local store, the remote gateway, and the
/// session. One instance per process; cheap to clone.
#[derive(Clone)]
pub struct Coordinator<G> {
    store: LocalStore,
    gateway: G,
    session: Arc<Session>,
}

impl<G: RemoteGateway> Coordinator<G> {
    pub fn new(store: LocalStore, gateway: G, session: Arc<Session>) -> Self {
        Self {
            store,
            gateway,
            session,
        }
    }

    /// Save a record: create when it has no id, update otherwise.
    ///
    /// Exactly one remote attempt. An unreachable server buffers the record
    /// and reports `SavedOffline`; any other failure leaves the store
    /// untouched. Editing a record whose create is still buffered rewrites
    /// the buffered payload in place without a remote call.
    pub async fn save<E: Entity>(&self, mut record: E) -> WriteResult<SaveOutcome<E>> {
        record.set_farm_id(self.session.farm_id());

        if record.id() == 0 {
            return self.save_create(record).await;
        }

        match self.store.row_state(E::KIND, record.id()).await? {
            Some(RowState::BufferedCreate) => {
                // Not a server record yet; the pending create picks up the edit
                self.store.put(&record, RowState::BufferedCreate).await?;
                tracing::debug!("Rewrote buffered {} create {}", E::KIND, record.id());
                Ok(SaveOutcome::SavedOffline(record))
            }
            _ => self.save_update(record).await,
        }
    }

    async fn save_create<E: Entity>(&self, mut record: E) -> WriteResult<SaveOutcome<E>> {
        match self.gateway.create(E::KIND, &record.payload()).await {
            Ok(raw) => {
                let confirmed = adopt_server_record(record, &raw)?;
                self.store.put(&confirmed, RowState::Clean).await?;
                Ok(SaveOutcome::Confirmed(confirmed))
            }
            Err(GatewayError::NetworkUnreachable) => {
                self.store.buffer_create(&mut record).await?;
                tracing::info!("{} saved offline", E::KIND.label());
                Ok(SaveOutcome::SavedOffline(record))
            }
            Err(error) => Err(self.classify(error)),
        }
    }

    async fn save_update<E: Entity>(&self, record: E) -> WriteResult<SaveOutcome<E>> {
        match self
            .gateway
            .update(E::KIND, record.id(), &record.payload())
            .await
        {
            Ok(raw) => {
                let confirmed = adopt_server_record(record, &raw)?;
                self.store.put(&confirmed, RowState::Clean).await?;
                Ok(SaveOutcome::Confirmed(confirmed))
            }
            Err(GatewayError::NetworkUnreachable) => {
                self.store.put(&record, RowState::BufferedUpdate).await?;
                tracing::info!("{} update saved offline", E::KIND.label());
                Ok(SaveOutcome::SavedOffline(record))
            }
            Err(error) => Err(self.classify(error)),
        }
    }

    /// Delete a record, optimistically removing it from local listings.
    ///
    /// A record whose create is still buffered never reached the server, so
    /// deleting it locally settles it. Otherwise the server is asked once;
    /// if unreachable, the deletion is queued as a tombstone.
    pub async fn delete(&self, kind: EntityKind, id: i64) -> WriteResult<DeleteOutcome> {
        if self.store.row_state(kind, id).await? == Some(RowState::BufferedCreate) {
            self.store.delete(kind, id).await?;
            tracing::debug!("Discarded buffered {} create {id}", kind.label());
            return Ok(DeleteOutcome::RemovedLocal);
        }

        match self.gateway.delete(kind, id).await {
            Ok(()) => {
                self.store.delete(kind, id).await?;
                Ok(DeleteOutcome::Confirmed)
            }
            Err(GatewayError::NetworkUnreachable) => {
                self.store.delete(kind, id).await?;
                self.store
                    .add_tombstone(&PendingDeletion::new(kind, id, self.session.farm_id()))
                    .await?;
                tracing::info!("{} deletion queued offline", kind.label());
                Ok(DeleteOutcome::QueuedOffline)
            }
            Err(error) => Err(self.classify(error)),
        }
    }

    /// List records: fetch from the server, refresh the local mirror, and
    /// return the merged view (mirror plus buffered rows). When the server
    /// is unreachable the local rows are served as-is.
    pub async fn list<E: Entity>(&self) -> WriteResult<Vec<E>> {
        let farm_id = self.session.farm_id();
        match self.gateway.list(E::KIND).await {
            Ok(raws) => {
                let records: Vec<E> = filter_normalized(E::KIND, &raws);
                self.store.replace_mirror(farm_id, &records).await?;
                Ok(self.store.list(farm_id).await?)
            }
            Err(GatewayError::NetworkUnreachable) => {
                tracing::info!("Server unreachable; serving local {}", E::KIND.table());
                Ok(self.store.list(farm_id).await?)
            }
            Err(error) => Err(self.classify(error)),
        }
    }

    /// Local-only read; never touches the network.
    pub async fn cached<E: Entity>(&self) -> WriteResult<Vec<E>> {
        Ok(self.store.list(self.session.farm_id()).await?)
    }

    /// Server-rendered export (CSV bytes); formatting stays remote.
    pub async fn export(&self, kind: EntityKind, range: DateRange) -> WriteResult<Vec<u8>> {
        self.gateway
            .export(kind, range)
            .await
            .map_err(|error| self.classify(error))
    }

    /// Counts of buffered writes and queued deletions.
    pub async fn pending(&self) -> WriteResult<PendingSummary> {
        Ok(self.store.pending_summary(self.session.farm_id()).await?)
    }

    /// Drop all local rows of one entity type.
    pub async fn clear(&self, kind: EntityKind) -> WriteResult<()> {
        self.store.clear(kind).await?;
        Ok(())
    }

    /// Logout teardown: wipe every local table including tombstones.
    pub async fn clear_all(&self) -> WriteResult<()> {
        self.store.clear_all().await?;
        Ok(())
    }

    fn classify(&self, error: GatewayError) -> WriteError {
        match error {
            GatewayError::Unauthorized => {
                self.session.invalidate();
                WriteError::Unauthorized
            }
            GatewayError::ValidationRejected(message) => WriteError::Rejected(message),
            GatewayError::NetworkUnreachable => WriteError::Api("Server unreachable".into()),
            GatewayError::Api(message) => WriteError::Api(message),
        }
    }
}

/// Canonical record out of a confirmed create/update response, falling back
/// to the local record with the server id grafted on when the response body
/// does not normalize.
fn adopt_server_record<E: Entity>(mut record: E, raw: &Value) -> Result<E, WriteError> {
    match E::normalize(raw) {
        Some(confirmed) => Ok(confirmed),
        None => {
            let id = raw
                .get("id")
                .and_then(coerce_i64)
                .filter(|id| *id > 0)
                .ok_or_else(|| {
                    WriteError::Api(format!(
                        "{} response did not include a record id",
                        E::KIND.label()
                    ))
                })?;
            tracing::warn!(
                "Server returned an unreadable {} record; keeping local copy with id {id}",
                E::KIND.label()
            );
            record.set_id(id);
            Ok(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Expense;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const FARM: i64 = 3;

    /// Scripted gateway: each call pops the next queued response.
    #[derive(Default)]
    struct ScriptedGateway {
        creates: Mutex<VecDeque<Result<Value, GatewayError>>>,
        updates: Mutex<VecDeque<Result<Value, GatewayError>>>,
        deletes: Mutex<VecDeque<Result<(), GatewayError>>>,
        lists: Mutex<VecDeque<Result<Vec<Value>, GatewayError>>>,
    }

    impl ScriptedGateway {
        fn on_create(self, response: Result<Value, GatewayError>) -> Self {
            self.creates.lock().unwrap().push_back(response);
            self
        }

        fn on_update(self, response: Result<Value, GatewayError>) -> Self {
            self.updates.lock().unwrap().push_back(response);
            self
        }

        fn on_delete(self, response: Result<(), GatewayError>) -> Self {
            self.deletes.lock().unwrap().push_back(response);
            self
        }

        fn on_list(self, response: Result<Vec<Value>, GatewayError>) -> Self {
            self.lists.lock().unwrap().push_back(response);
            self
        }
    }

    impl RemoteGateway for &ScriptedGateway {
        async fn check_connectivity(&self) -> bool {
            true
        }

        async fn list(&self, _kind: EntityKind) -> Result<Vec<Value>, GatewayError> {
            self.lists.lock().unwrap().pop_front().unwrap()
        }

        async fn create(&self, _kind: EntityKind, _payload: &Value) -> Result<Value, GatewayError> {
            self.creates.lock().unwrap().pop_front().unwrap()
        }

        async fn update(
            &self,
            _kind: EntityKind,
            _id: i64,
            _payload: &Value,
        ) -> Result<Value, GatewayError> {
            self.updates.lock().unwrap().pop_front().unwrap()
        }

        async fn delete(&self, _kind: EntityKind, _id: i64) -> Result<(), GatewayError> {
            self.deletes.lock().unwrap().pop_front().unwrap()
        }

        async fn export(
            &self,
            _kind: EntityKind,
            _range: DateRange,
        ) -> Result<Vec<u8>, GatewayError> {
            Ok(b"csv".to_vec())
        }
    }

    async fn coordinator(gateway: &ScriptedGateway) -> Coordinator<&ScriptedGateway> {
        let store = LocalStore::open_in_memory().await.unwrap();
        let session = Arc::new(Session::new("token", FARM, "USD"));
        Coordinator::new(store, gateway, session)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn confirmed_create_mirrors_server_record() {
        let gateway = ScriptedGateway::default().on_create(Ok(json!({
            "id": 42, "description": "Feed", "amount": 120.5, "farm_id": FARM,
        })));
        let coordinator = coordinator(&gateway).await;

        let outcome = coordinator.save(Expense::new("Feed", 120.5)).await.unwrap();
        let SaveOutcome::Confirmed(confirmed) = outcome else {
            panic!("expected confirmed save");
        };
        assert_eq!(confirmed.id, 42);

        let cached: Vec<Expense> = coordinator.cached().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, 42);
        assert!(coordinator.pending().await.unwrap().total() == 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_create_is_buffered_with_temp_id() {
        let gateway =
            ScriptedGateway::default().on_create(Err(GatewayError::NetworkUnreachable));
        let coordinator = coordinator(&gateway).await;

        let outcome = coordinator.save(Expense::new("Feed", 120.5)).await.unwrap();
        let SaveOutcome::SavedOffline(buffered) = outcome else {
            panic!("expected offline save");
        };
        assert!(buffered.id >= 1_000_000_000_000, "temp id should be a timestamp");
        assert_eq!(buffered.farm_id, FARM);
        assert_eq!(coordinator.pending().await.unwrap().total(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_create_is_not_buffered() {
        let gateway = ScriptedGateway::default().on_create(Err(
            GatewayError::ValidationRejected("amount must be positive".into()),
        ));
        let coordinator = coordinator(&gateway).await;

        let error = coordinator
            .save(Expense::new("Feed", 120.5))
            .await
            .unwrap_err();
        assert!(matches!(error, WriteError::Rejected(message) if message.contains("positive")));
        assert_eq!(coordinator.pending().await.unwrap().total(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unauthorized_save_invalidates_session() {
        let gateway = ScriptedGateway::default().on_create(Err(GatewayError::Unauthorized));
        let coordinator = coordinator(&gateway).await;

        let error = coordinator
            .save(Expense::new("Feed", 120.5))
            .await
            .unwrap_err();
        assert!(matches!(error, WriteError::Unauthorized));
        assert!(coordinator.session.is_invalidated());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn editing_buffered_create_rewrites_in_place() {
        let gateway =
            ScriptedGateway::default().on_create(Err(GatewayError::NetworkUnreachable));
        let coordinator = coordinator(&gateway).await;

        let buffered = coordinator
            .save(Expense::new("Feed", 120.5))
            .await
            .unwrap()
            .into_record();

        let mut edited = buffered.clone();
        edited.amount = 99.0;
        let outcome = coordinator.save(edited).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::SavedOffline(_)));

        let cached: Vec<Expense> = coordinator.cached().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, buffered.id);
        assert!((cached[0].amount - 99.0).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_update_buffers_the_edit() {
        let gateway =
            ScriptedGateway::default().on_update(Err(GatewayError::NetworkUnreachable));
        let coordinator = coordinator(&gateway).await;

        let mut expense = Expense::new("Feed", 120.5);
        expense.id = 7; // previously synced
        let outcome = coordinator.save(expense).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::SavedOffline(_)));

        let state = coordinator
            .store
            .row_state(EntityKind::Expense, 7)
            .await
            .unwrap();
        assert_eq!(state, Some(RowState::BufferedUpdate));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleting_buffered_create_needs_no_tombstone() {
        let gateway =
            ScriptedGateway::default().on_create(Err(GatewayError::NetworkUnreachable));
        let coordinator = coordinator(&gateway).await;

        let buffered = coordinator
            .save(Expense::new("Feed", 120.5))
            .await
            .unwrap()
            .into_record();

        let outcome = coordinator
            .delete(EntityKind::Expense, buffered.id)
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::RemovedLocal);
        assert_eq!(coordinator.pending().await.unwrap().total(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_delete_queues_tombstone_and_removes_locally() {
        let gateway =
            ScriptedGateway::default().on_delete(Err(GatewayError::NetworkUnreachable));
        let coordinator = coordinator(&gateway).await;

        let mut expense = Expense::new("Feed", 120.5);
        expense.id = 7;
        expense.farm_id = FARM;
        coordinator
            .store
            .put(&expense, RowState::Clean)
            .await
            .unwrap();

        let outcome = coordinator.delete(EntityKind::Expense, 7).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::QueuedOffline);

        let cached: Vec<Expense> = coordinator.cached().await.unwrap();
        assert!(cached.is_empty(), "optimistic removal from listings");
        assert_eq!(coordinator.pending().await.unwrap().deletions, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_refreshes_mirror_and_drops_malformed() {
        let gateway = ScriptedGateway::default().on_list(Ok(vec![
            json!({"id": 1, "description": "Feed", "amount": 10.0, "farm_id": FARM}),
            json!({"id": 2, "description": "Fuel", "amount": "not a number", "farm_id": FARM}),
        ]));
        let coordinator = coordinator(&gateway).await;

        let listed: Vec<Expense> = coordinator.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description, "Feed");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_serves_cache_when_unreachable() {
        let gateway =
            ScriptedGateway::default().on_list(Err(GatewayError::NetworkUnreachable));
        let coordinator = coordinator(&gateway).await;

        let mut expense = Expense::new("Feed", 120.5);
        expense.id = 7;
        expense.farm_id = FARM;
        coordinator
            .store
            .put(&expense, RowState::Clean)
            .await
            .unwrap();

        let listed: Vec<Expense> = coordinator.list().await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
