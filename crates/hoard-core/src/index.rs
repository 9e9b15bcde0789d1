//! Derived full-text index over entity names, descriptions and tags.
//!
//! The index is an FTS5 table whose rowid is the entity id. It is never the
//! source of truth: the record store calls the synchronizer right after each
//! successful mutation, inside the same operation, and a failed index write
//! is logged and dropped rather than undoing the mutation. The row simply
//! searches worse until the next update or a [`IndexSynchronizer::rebuild`].
//!
//! FTS5 cannot update an indexed document in place, so an update retracts
//! the old document before inserting the new one.

use crate::error::Result;
use crate::store::{EntityRow, ENTITY_COLUMNS};
use crate::types::{Entity, EntityId};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

/// Name of the FTS5 table.
pub const FTS_TABLE: &str = "entities_fts";

const CREATE_FTS_SQL: &str =
    "CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(name, description, tags);";

/// Small key/value table for index bookkeeping that must survive restarts.
const CREATE_STATE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS index_state (key TEXT PRIMARY KEY, value TEXT NOT NULL);";

/// Set while the store runs without the synchronizer. Mutations made then
/// never reach the index, so the next install must rebuild it.
const SUSPENDED_KEY: &str = "suspended";

/// Trigger-based sync used by databases written before the synchronizer.
const DROP_LEGACY_TRIGGERS_SQL: &str = "
DROP TRIGGER IF EXISTS entities_ai;
DROP TRIGGER IF EXISTS entities_ad;
DROP TRIGGER IF EXISTS entities_au;
";

/// The searchable slice of an entity.
#[derive(Debug, Clone, Copy)]
pub struct IndexedFields<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub tags: Option<&'a str>,
}

impl<'a> From<&'a Entity> for IndexedFields<'a> {
    fn from(entity: &'a Entity) -> Self {
        IndexedFields {
            name: &entity.name,
            description: entity.description.as_deref(),
            tags: entity.tags.as_deref(),
        }
    }
}

/// What [`IndexSynchronizer::install`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexState {
    /// The table was already there with the expected layout
    Existing,
    /// The table did not exist and was created empty
    Created,
    /// An external-content table from an older layout was dropped and recreated
    Replaced,
}

impl IndexState {
    fn is_fresh(self) -> bool {
        !matches!(self, IndexState::Existing)
    }
}

/// Keeps the FTS5 table in step with the `entities` table.
///
/// Only constructed once full-text support has been verified, so holding one
/// means the index is live.
#[derive(Debug, Clone, Copy)]
pub struct IndexSynchronizer {
    _private: (),
}

impl IndexSynchronizer {
    /// Create the index table if needed and bring it up to date with the store.
    ///
    /// Fails only if the table itself cannot be created; the caller then
    /// treats full-text as unavailable.
    #[instrument(skip(conn))]
    pub(crate) fn install(conn: &Connection) -> Result<(Self, IndexState)> {
        let existing_sql: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![FTS_TABLE],
                |row| row.get(0),
            )
            .optional()?;

        conn.execute_batch(DROP_LEGACY_TRIGGERS_SQL)?;

        let state = match existing_sql {
            Some(sql) if sql.replace(' ', "").contains("content=") => {
                info!("Replacing trigger-maintained full-text table");
                conn.execute_batch("DROP TABLE IF EXISTS entities_fts;")?;
                conn.execute_batch(CREATE_FTS_SQL)?;
                IndexState::Replaced
            }
            Some(_) => IndexState::Existing,
            None => {
                conn.execute_batch(CREATE_FTS_SQL)?;
                IndexState::Created
            }
        };

        let sync = IndexSynchronizer { _private: () };
        let suspended = was_suspended(conn)?;
        if state.is_fresh() || suspended || sync.is_out_of_step(conn)? {
            let indexed = sync.rebuild(conn)?;
            info!(?state, suspended, indexed, "Full-text index populated");
        } else {
            debug!(?state, "Full-text index ready");
        }
        if suspended {
            conn.execute(
                "DELETE FROM index_state WHERE key = ?1",
                params![SUSPENDED_KEY],
            )?;
        }

        Ok((sync, state))
    }

    /// Index a newly created row.
    pub fn on_create(&self, conn: &Connection, id: EntityId, fields: IndexedFields<'_>) -> bool {
        report(id, "create", self.insert(conn, id, fields))
    }

    /// Retract the old document for `id`, then index its new content.
    pub fn on_update(&self, conn: &Connection, id: EntityId, fields: IndexedFields<'_>) -> bool {
        let result = self
            .retract(conn, id)
            .and_then(|()| self.insert(conn, id, fields));
        report(id, "update", result)
    }

    /// Retract the document for a deleted row.
    pub fn on_delete(&self, conn: &Connection, id: EntityId) -> bool {
        report(id, "delete", self.retract(conn, id))
    }

    /// Drop every indexed document and re-index the whole store.
    ///
    /// Runs in one transaction; returns the number of rows indexed.
    pub fn rebuild(&self, conn: &Connection) -> Result<usize> {
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM entities_fts", [])?;
        let indexed = tx.execute(
            "INSERT INTO entities_fts (rowid, name, description, tags)
             SELECT id, name, COALESCE(description, ''), COALESCE(tags, '') FROM entities",
            [],
        )?;
        tx.commit()?;
        Ok(indexed)
    }

    fn insert(&self, conn: &Connection, id: EntityId, fields: IndexedFields<'_>) -> Result<()> {
        conn.execute(
            "INSERT INTO entities_fts (rowid, name, description, tags) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.as_i64(),
                fields.name,
                fields.description.unwrap_or(""),
                fields.tags.unwrap_or("")
            ],
        )?;
        Ok(())
    }

    fn retract(&self, conn: &Connection, id: EntityId) -> Result<()> {
        conn.execute(
            "DELETE FROM entities_fts WHERE rowid = ?1",
            params![id.as_i64()],
        )?;
        Ok(())
    }

    fn is_out_of_step(&self, conn: &Connection) -> Result<bool> {
        let (records, documents): (i64, i64) = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM entities), (SELECT COUNT(*) FROM entities_fts)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(records != documents)
    }
}

/// Record that mutations are about to bypass the index.
///
/// Called whenever the store comes up without a synchronizer, so a later
/// install knows the index content cannot be trusted even if row counts agree.
pub(crate) fn suspend(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_STATE_SQL)?;
    conn.execute(
        "INSERT OR REPLACE INTO index_state (key, value) VALUES (?1, '1')",
        params![SUSPENDED_KEY],
    )?;
    Ok(())
}

fn was_suspended(conn: &Connection) -> Result<bool> {
    conn.execute_batch(CREATE_STATE_SQL)?;
    let flag: Option<String> = conn
        .query_row(
            "SELECT value FROM index_state WHERE key = ?1",
            params![SUSPENDED_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(flag.is_some())
}

/// Run a full-text match and join the hits back to their records, best
/// match first.
///
/// `query` is handed to FTS5 verbatim, so malformed syntax is an error here;
/// the search dispatcher decides what to do about it.
pub(crate) fn lookup(conn: &Connection, query: &str, limit: usize) -> Result<Vec<Entity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS}
         FROM entities_fts f
         JOIN entities e ON e.id = f.rowid
         WHERE entities_fts MATCH ?1
         ORDER BY f.rank
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![query, limit as i64], EntityRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(EntityRow::into_entity).collect()
}

fn report(id: EntityId, operation: &'static str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(id = %id, operation, error = %e, "Full-text index update failed; search for this entity may be stale");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStore;
    use crate::types::NewEntity;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> EntityStore {
        let mut store = EntityStore::open(dir.path().join("entities.db")).unwrap();
        store.init_schema().unwrap();
        store
    }

    fn open_store_at(path: &std::path::Path, full_text: bool) -> EntityStore {
        let mut store = EntityStore::open(path).unwrap();
        store.init_schema_with(full_text).unwrap();
        store
    }

    fn indexed_ids(store: &EntityStore, query: &str) -> Vec<i64> {
        lookup(store.conn(), query, 50)
            .unwrap()
            .iter()
            .map(|e| e.id.as_i64())
            .collect()
    }

    #[test]
    fn test_create_is_indexed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let id = store
            .create(NewEntity::new("person", "Ada Lovelace").with_tags("math, computing"))
            .unwrap();

        assert_eq!(indexed_ids(&store, "lovelace"), vec![id.as_i64()]);
        assert_eq!(indexed_ids(&store, "computing"), vec![id.as_i64()]);
    }

    #[test]
    fn test_update_retracts_old_content() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let id = store
            .create(NewEntity::new("person", "Ada").with_description("mathematician"))
            .unwrap();

        store
            .update(id, crate::types::EntityPatch::new().with_description("pioneer"))
            .unwrap();

        assert!(indexed_ids(&store, "mathematician").is_empty());
        assert_eq!(indexed_ids(&store, "pioneer"), vec![id.as_i64()]);

        let documents: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM entities_fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(documents, 1);
    }

    #[test]
    fn test_delete_retracts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let id = store.create(NewEntity::new("site", "Example Org")).unwrap();
        store.delete(id).unwrap();
        assert!(indexed_ids(&store, "example").is_empty());
    }

    #[test]
    fn test_index_failure_does_not_fail_mutation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .conn()
            .execute_batch("DROP TABLE entities_fts;")
            .unwrap();

        let id = store.create(NewEntity::new("person", "Grace Hopper")).unwrap();
        assert_eq!(store.get(id).unwrap().name, "Grace Hopper");
        store
            .update(id, crate::types::EntityPatch::new().with_tags("navy"))
            .unwrap();
        store.delete(id).unwrap();
    }

    #[test]
    fn test_install_rebuilds_over_existing_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.db");
        {
            let mut store = EntityStore::open(&path).unwrap();
            store.init_schema_with(false).unwrap();
            store.create(NewEntity::new("person", "Alan Turing")).unwrap();
            store.create(NewEntity::new("person", "Kurt Godel")).unwrap();
        }

        let mut store = EntityStore::open(&path).unwrap();
        let caps = store.init_schema().unwrap();
        assert!(caps.full_text);
        assert_eq!(indexed_ids(&store, "turing").len(), 1);
        assert_eq!(indexed_ids(&store, "godel").len(), 1);
    }

    #[test]
    fn test_reenabling_rebuilds_after_unindexed_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.db");
        let id = {
            let store = open_store_at(&path, true);
            store
                .create(NewEntity::new("person", "Ada").with_description("mathematician"))
                .unwrap()
        };

        // Same row count before and after, but different content
        {
            let store = open_store_at(&path, false);
            store
                .update(id, crate::types::EntityPatch::new().with_description("pioneer"))
                .unwrap();
            store.delete(store.create(NewEntity::new("person", "Temp")).unwrap()).unwrap();
        }

        let store = open_store_at(&path, true);
        assert!(indexed_ids(&store, "mathematician").is_empty());
        assert_eq!(indexed_ids(&store, "pioneer"), vec![id.as_i64()]);

        let flagged: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM index_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(flagged, 0);
    }

    #[test]
    fn test_create_while_disabled_is_indexed_on_return() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.db");
        {
            let store = open_store_at(&path, true);
            let old = store.create(NewEntity::new("person", "Alan Turing")).unwrap();
            store.delete(old).unwrap();
            store.create(NewEntity::new("person", "Kurt Godel")).unwrap();
        }
        {
            let store = open_store_at(&path, false);
            let godel = store.list_recent(1).unwrap().remove(0).id;
            store.delete(godel).unwrap();
            store.create(NewEntity::new("person", "Emmy Noether")).unwrap();
        }

        let store = open_store_at(&path, true);
        assert!(indexed_ids(&store, "godel").is_empty());
        assert_eq!(indexed_ids(&store, "noether").len(), 1);
    }

    #[test]
    fn test_install_replaces_legacy_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE entities (id INTEGER PRIMARY KEY AUTOINCREMENT, type TEXT NOT NULL,
                 name TEXT NOT NULL, slug TEXT UNIQUE, description TEXT, tags TEXT,
                 metadata TEXT, created_at TEXT NOT NULL, updated_at TEXT NOT NULL);
             CREATE VIRTUAL TABLE entities_fts USING fts5(name, description, tags,
                 content='entities', content_rowid='id');
             CREATE TRIGGER entities_ai AFTER INSERT ON entities BEGIN
                 INSERT INTO entities_fts(rowid, name, description, tags)
                 VALUES (new.id, new.name, new.description, new.tags);
             END;
             INSERT INTO entities (type, name, slug, created_at, updated_at)
             VALUES ('person', 'Edsger Dijkstra', 'edsger-dijkstra',
                     '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .unwrap();

        let (_, state) = IndexSynchronizer::install(&conn).unwrap();
        assert_eq!(state, IndexState::Replaced);

        let triggers: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(triggers, 0);
        assert_eq!(lookup(&conn, "dijkstra", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_query_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.create(NewEntity::new("person", "Ada")).unwrap();
        assert!(lookup(store.conn(), "\"unterminated", 10).is_err());
    }
}
