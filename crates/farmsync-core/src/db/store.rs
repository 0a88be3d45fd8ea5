//! Durable local store for mirrored and buffered records.
//!
//! One table per entity type plus a tombstone table. Rows are written only
//! by the write-path coordinator and the sync engine; all access funnels
//! through a single shared connection so concurrent writers to the same
//! entity type cannot race.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{Entity, EntityKind, PendingDeletion};

use super::connection::Database;

/// Pending state of a local row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    /// Mirrors a server-confirmed record.
    Clean,
    /// Holds an edit not yet acknowledged by the server.
    BufferedUpdate,
    /// Holds a create not yet acknowledged; the row id is temporary.
    BufferedCreate,
}

impl RowState {
    const fn as_i64(self) -> i64 {
        match self {
            Self::Clean => 0,
            Self::BufferedUpdate => 1,
            Self::BufferedCreate => 2,
        }
    }

    fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Clean),
            1 => Ok(Self::BufferedUpdate),
            2 => Ok(Self::BufferedCreate),
            other => Err(Error::Database(format!("unknown row state {other}"))),
        }
    }

    #[must_use]
    pub const fn is_buffered(self) -> bool {
        !matches!(self, Self::Clean)
    }
}

/// Counts of work still waiting for a sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingSummary {
    /// Buffered creates/updates per entity type (only non-zero entries).
    pub buffered: Vec<(EntityKind, usize)>,
    /// Queued deletion tombstones.
    pub deletions: usize,
}

impl PendingSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.buffered.iter().map(|(_, count)| count).sum::<usize>() + self.deletions
    }
}

/// Thread-safe handle to the durable local store.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
}

impl LocalStore {
    /// Open (or create) the store at the given filesystem path.
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Upsert one record with the given pending state.
    pub async fn put<E: Entity>(&self, record: &E, state: RowState) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let db = self.db.lock().await;
        db.connection().execute(
            &format!(
                "INSERT OR REPLACE INTO {} (id, farm_id, state, payload) VALUES (?1, ?2, ?3, ?4)",
                E::KIND.table()
            ),
            params![record.id(), record.farm_id(), state.as_i64(), payload],
        )?;
        Ok(())
    }

    /// Buffer an offline create: assign a fresh temporary id (creation
    /// timestamp in Unix milliseconds, bumped on collision) and persist the
    /// record as a buffered create.
    pub async fn buffer_create<E: Entity>(&self, record: &mut E) -> Result<i64> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let table = E::KIND.table();

        let mut id = Utc::now().timestamp_millis();
        loop {
            let taken: i32 = conn.query_row(
                &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
                params![id],
                |row| row.get(0),
            )?;
            if taken == 0 {
                break;
            }
            id += 1;
        }

        record.set_id(id);
        let payload = serde_json::to_string(record)?;
        conn.execute(
            &format!("INSERT INTO {table} (id, farm_id, state, payload) VALUES (?1, ?2, ?3, ?4)"),
            params![
                id,
                record.farm_id(),
                RowState::BufferedCreate.as_i64(),
                payload
            ],
        )?;
        tracing::debug!("Buffered offline {} create with temp id {id}", E::KIND);
        Ok(id)
    }

    /// Fetch one record scoped to a farm.
    pub async fn get<E: Entity>(&self, farm_id: i64, id: i64) -> Result<Option<E>> {
        let db = self.db.lock().await;
        let payload: Option<String> = db
            .connection()
            .query_row(
                &format!(
                    "SELECT payload FROM {} WHERE id = ?1 AND farm_id = ?2",
                    E::KIND.table()
                ),
                params![id, farm_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(payload.and_then(|payload| parse_row::<E>(&payload, id)))
    }

    /// List all records (mirrored and buffered) for a farm, oldest id first.
    ///
    /// Unreadable rows are skipped with a logged warning rather than failing
    /// the whole listing.
    pub async fn list<E: Entity>(&self, farm_id: i64) -> Result<Vec<E>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(&format!(
            "SELECT id, payload FROM {} WHERE farm_id = ?1 ORDER BY id",
            E::KIND.table()
        ))?;
        let rows = stmt
            .query_map(params![farm_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, payload)| parse_row::<E>(&payload, id))
            .collect())
    }

    /// List buffered creates and updates for a farm, oldest id first.
    pub async fn list_pending<E: Entity>(&self, farm_id: i64) -> Result<Vec<(RowState, E)>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(&format!(
            "SELECT id, state, payload FROM {} WHERE farm_id = ?1 AND state != 0 ORDER BY id",
            E::KIND.table()
        ))?;
        let rows = stmt
            .query_map(params![farm_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut pending = Vec::with_capacity(rows.len());
        for (id, state, payload) in rows {
            let state = RowState::from_i64(state)?;
            if let Some(record) = parse_row::<E>(&payload, id) {
                pending.push((state, record));
            }
        }
        Ok(pending)
    }

    /// Pending state of a row, `None` when the row does not exist.
    pub async fn row_state(&self, kind: EntityKind, id: i64) -> Result<Option<RowState>> {
        let db = self.db.lock().await;
        let state: Option<i64> = db
            .connection()
            .query_row(
                &format!("SELECT state FROM {} WHERE id = ?1", kind.table()),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        state.map(RowState::from_i64).transpose()
    }

    /// Delete one row. Deleting a missing row is not an error.
    pub async fn delete(&self, kind: EntityKind, id: i64) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
            params![id],
        )?;
        Ok(())
    }

    /// Drop every row of one entity type.
    pub async fn clear(&self, kind: EntityKind) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(&format!("DELETE FROM {}", kind.table()), [])?;
        Ok(())
    }

    /// Drop every row of every entity type plus all tombstones (logout
    /// teardown).
    pub async fn clear_all(&self) -> Result<()> {
        let db = self.db.lock().await;
        for kind in EntityKind::ALL {
            db.connection()
                .execute(&format!("DELETE FROM {}", kind.table()), [])?;
        }
        db.connection().execute("DELETE FROM pending_deletions", [])?;
        Ok(())
    }

    /// Replace a temporary-id row with its server-confirmed record.
    ///
    /// Runs in one transaction so the record is never present twice and
    /// never absent: either fully migrated or (on failure) fully retained.
    pub async fn promote<E: Entity>(&self, temp_id: i64, record: &E) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction()?;
        let table = E::KIND.table();
        tx.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![temp_id])?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {table} (id, farm_id, state, payload) VALUES (?1, ?2, 0, ?3)"
            ),
            params![record.id(), record.farm_id(), payload],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Refresh the mirrored (clean) rows for a farm from a server listing,
    /// leaving buffered rows untouched.
    ///
    /// Records with a pending tombstone are excluded: the server keeps
    /// returning them until the deletion syncs, and mirroring one would
    /// resurrect a record the user already deleted.
    pub async fn replace_mirror<E: Entity>(&self, farm_id: i64, records: &[E]) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction()?;
        let table = E::KIND.table();
        let tombstoned: HashSet<i64> = {
            let mut stmt = tx.prepare(
                "SELECT entity_id FROM pending_deletions WHERE entity_type = ?1 AND farm_id = ?2",
            )?;
            let ids = stmt
                .query_map(params![E::KIND.singular(), farm_id], |row| row.get(0))?
                .collect::<rusqlite::Result<HashSet<i64>>>()?;
            ids
        };
        tx.execute(
            &format!("DELETE FROM {table} WHERE farm_id = ?1 AND state = 0"),
            params![farm_id],
        )?;
        for record in records {
            if tombstoned.contains(&record.id()) {
                continue;
            }
            let payload = serde_json::to_string(record)?;
            // OR IGNORE keeps a buffered row that shares the server id (an
            // unsent local edit wins over the stale server copy)
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {table} (id, farm_id, state, payload) VALUES (?1, ?2, 0, ?3)"
                ),
                params![record.id(), record.farm_id(), payload],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Queue a server-side deletion still owed.
    pub async fn add_tombstone(&self, tombstone: &PendingDeletion) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "INSERT OR IGNORE INTO pending_deletions (entity_type, entity_id, farm_id)
             VALUES (?1, ?2, ?3)",
            params![
                tombstone.entity_type.singular(),
                tombstone.entity_id,
                tombstone.farm_id
            ],
        )?;
        Ok(())
    }

    /// List queued deletions for a farm in a stable order.
    pub async fn list_tombstones(&self, farm_id: i64) -> Result<Vec<PendingDeletion>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(
            "SELECT entity_type, entity_id, farm_id FROM pending_deletions
             WHERE farm_id = ?1 ORDER BY entity_type, entity_id",
        )?;
        let rows = stmt
            .query_map(params![farm_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tombstones = Vec::with_capacity(rows.len());
        for (tag, entity_id, farm_id) in rows {
            match EntityKind::from_singular(&tag) {
                Some(kind) => tombstones.push(PendingDeletion::new(kind, entity_id, farm_id)),
                None => tracing::warn!("Skipping tombstone with unknown entity type '{tag}'"),
            }
        }
        Ok(tombstones)
    }

    /// Remove one queued deletion after the server confirms it.
    pub async fn remove_tombstone(&self, kind: EntityKind, entity_id: i64) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "DELETE FROM pending_deletions WHERE entity_type = ?1 AND entity_id = ?2",
            params![kind.singular(), entity_id],
        )?;
        Ok(())
    }

    /// Summarize buffered work per entity type for status surfaces.
    pub async fn pending_summary(&self, farm_id: i64) -> Result<PendingSummary> {
        let db = self.db.lock().await;
        let mut buffered = Vec::new();
        for kind in EntityKind::ALL {
            let count: i64 = db.connection().query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE farm_id = ?1 AND state != 0",
                    kind.table()
                ),
                params![farm_id],
                |row| row.get(0),
            )?;
            if count > 0 {
                buffered.push((kind, usize::try_from(count).unwrap_or_default()));
            }
        }
        let deletions: i64 = db.connection().query_row(
            "SELECT COUNT(*) FROM pending_deletions WHERE farm_id = ?1",
            params![farm_id],
            |row| row.get(0),
        )?;

        Ok(PendingSummary {
            buffered,
            deletions: usize::try_from(deletions).unwrap_or_default(),
        })
    }
}

fn parse_row<E: Entity>(payload: &str, id: i64) -> Option<E> {
    match serde_json::from_str(payload) {
        Ok(record) => Some(record),
        Err(error) => {
            tracing::warn!(
                "Unreadable {} row {id} in local store: {error}",
                E::KIND.label()
            );
            None
        }
    }
}
