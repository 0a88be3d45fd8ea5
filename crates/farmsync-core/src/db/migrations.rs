//! Local store migrations

use std::fmt::Write as _;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::EntityKind;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0),
    )? != 0;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: one table per entity type plus tombstones.
///
/// Entity rows hold the canonical record as JSON alongside the columns the
/// store queries on (`farm_id`, pending `state`). Entity types are
/// independent; no cross-table constraints.
fn migrate_v1(conn: &Connection) -> Result<()> {
    let mut script = String::from(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );\n",
    );

    for kind in EntityKind::ALL {
        let table = kind.table();
        let _ = write!(
            script,
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY,
                farm_id INTEGER NOT NULL,
                state INTEGER NOT NULL DEFAULT 0,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_farm ON {table}(farm_id);
            CREATE INDEX IF NOT EXISTS idx_{table}_state ON {table}(state);\n"
        );
    }

    script.push_str(
        "CREATE TABLE IF NOT EXISTS pending_deletions (
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            farm_id INTEGER NOT NULL,
            PRIMARY KEY (entity_type, entity_id)
        );
        INSERT INTO schema_version (version) VALUES (1);
        COMMIT;",
    );

    conn.execute_batch(&script)?;

    tracing::info!("Migrated local store to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn creates_one_table_per_entity_type() {
        let conn = setup();
        run(&conn).unwrap();

        for kind in EntityKind::ALL {
            let exists: i32 = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                    [kind.table()],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "missing table for {kind}");
        }
    }
}
