//! Durable entity storage.
//!
//! `EntityStore` owns the single SQLite connection for the process and the
//! `entities` table. Every mutating call runs as one autocommitted statement,
//! so a successful return means the change is on disk. The database runs in
//! WAL mode with `synchronous = NORMAL`: a crash never loses or tears a
//! committed write, though the last few commits before a power loss may roll
//! back.
//!
//! ## Schema
//!
//! ```text
//! entities(id INTEGER PRIMARY KEY AUTOINCREMENT,
//!          type, name, slug UNIQUE, description, tags, metadata,
//!          created_at, updated_at)
//! entities_fts(name, description, tags)   -- only with full-text support
//! ```
//!
//! Timestamps are stored as fixed-width RFC 3339 text, so ordering by the
//! column is chronological.

use crate::capabilities::Capabilities;
use crate::error::{HoardError, Result};
use crate::index::{self, IndexSynchronizer, IndexedFields};
use crate::types::{
    format_timestamp, parse_timestamp, Entity, EntityId, EntityPatch, NewEntity, StoredMetadata,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Default wait on a locked database.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Column list shared by every entity query. Tables are aliased `e`.
pub(crate) const ENTITY_COLUMNS: &str = "e.id, e.type, e.name, e.slug, e.description, e.tags, \
                                         e.metadata, e.created_at, e.updated_at";

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    slug TEXT UNIQUE,
    description TEXT,
    tags TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(type);
CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);
CREATE INDEX IF NOT EXISTS idx_entities_updated ON entities(updated_at);
";

/// Handle to the entity database.
///
/// Open once at startup and keep it for the life of the process. Dropping
/// the store closes the connection; [`EntityStore::close`] does the same but
/// reports a failed close.
///
/// ## Example
///
/// ```rust,ignore
/// use hoard_core::{EntityStore, NewEntity};
///
/// let mut store = EntityStore::open("entities.db")?;
/// let caps = store.init_schema()?;
///
/// let id = store.create(NewEntity::new("person", "Ada Lovelace"))?;
/// assert_eq!(store.get(id)?.slug, "ada-lovelace");
/// ```
pub struct EntityStore {
    /// The one connection
    conn: Connection,

    /// Database file location
    path: PathBuf,

    /// What `init_schema` found the engine able to do
    capabilities: Capabilities,

    /// Present while the full-text index is live
    sync: Option<IndexSynchronizer>,

    /// Last timestamp handed out, so consecutive writes never tie
    last_timestamp: Cell<Option<DateTime<Utc>>>,
}

impl EntityStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// Parent directories are created. Fails with
    /// [`HoardError::StorageUnavailable`] if the file cannot be created or
    /// written. The schema is not touched; call [`EntityStore::init_schema`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Open with an explicit busy timeout in milliseconds.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |reason: String| HoardError::StorageUnavailable {
            path: path.clone(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }

        let conn = Connection::open(&path).map_err(|e| unavailable(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))
            .map_err(|e| unavailable(e.to_string()))?;
        // journal_mode forces the first write, so an unwritable path fails here
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| unavailable(e.to_string()))?;

        info!(path = %path.display(), "Opened entity database");

        Ok(EntityStore {
            conn,
            path,
            capabilities: Capabilities::NONE,
            sync: None,
            last_timestamp: Cell::new(None),
        })
    }

    /// Create tables and probe capabilities. Safe to call repeatedly.
    pub fn init_schema(&mut self) -> Result<Capabilities> {
        self.init_schema_with(true)
    }

    /// Like [`EntityStore::init_schema`], with full-text indexing optionally
    /// switched off regardless of what the engine supports.
    #[instrument(skip(self))]
    pub fn init_schema_with(&mut self, allow_full_text: bool) -> Result<Capabilities> {
        self.conn.execute_batch(SCHEMA_SQL)?;

        let mut caps = Capabilities::detect(&self.conn);
        if !allow_full_text && caps.full_text {
            info!("Full-text search disabled by configuration");
            caps = caps.without_full_text();
        }

        self.sync = None;
        if caps.full_text {
            match IndexSynchronizer::install(&self.conn) {
                Ok((sync, _)) => self.sync = Some(sync),
                Err(e) => {
                    warn!(error = %e, "Full-text index could not be installed; using substring search");
                    caps = caps.without_full_text();
                }
            }
        } else {
            info!("Full-text search unavailable; using substring search");
        }
        if self.sync.is_none() {
            index::suspend(&self.conn)?;
        }

        let newest: Option<String> =
            self.conn
                .query_row("SELECT MAX(updated_at) FROM entities", [], |row| row.get(0))?;
        if let Some(ts) = newest.as_deref().and_then(parse_timestamp) {
            self.last_timestamp.set(Some(ts));
        }

        self.capabilities = caps;
        Ok(caps)
    }

    /// Capabilities found by the last `init_schema` call
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the underlying connection.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert a new entity and return its id.
    ///
    /// Fails with [`HoardError::ConstraintViolation`] if `type` or `name` is
    /// blank or the slug is already taken; nothing is written in that case.
    #[instrument(skip(self, entity), fields(name = %entity.name))]
    pub fn create(&self, entity: NewEntity) -> Result<EntityId> {
        let slug = entity.resolve_slug()?;
        let metadata = serde_json::to_string(&entity.metadata)?;
        let now = format_timestamp(&self.next_timestamp());

        self.conn
            .execute(
                "INSERT INTO entities
                     (type, name, slug, description, tags, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    entity.kind,
                    entity.name,
                    slug,
                    entity.description,
                    entity.tags,
                    metadata,
                    now
                ],
            )
            .map_err(|e| describe_slug_conflict(e, &slug))?;
        let id = EntityId(self.conn.last_insert_rowid());
        debug!(id = %id, slug = %slug, "Entity created");

        if let Some(sync) = &self.sync {
            sync.on_create(
                &self.conn,
                id,
                IndexedFields {
                    name: &entity.name,
                    description: entity.description.as_deref(),
                    tags: entity.tags.as_deref(),
                },
            );
        }

        Ok(id)
    }

    /// Apply the fields present in `patch` and refresh `updated_at`.
    ///
    /// A new `name` re-derives the slug unless the patch carries one.
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: EntityId, patch: EntityPatch) -> Result<()> {
        let slug = patch.resolve_slug()?;
        let metadata = patch
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut assignments: Vec<&'static str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        let mut set = |column: &'static str, value: Option<String>| {
            if let Some(value) = value {
                assignments.push(column);
                values.push(Box::new(value));
            }
        };
        set("type", patch.kind);
        set("name", patch.name);
        set("slug", slug.clone());
        set("description", patch.description);
        set("tags", patch.tags);
        set("metadata", metadata);
        set("updated_at", Some(format_timestamp(&self.next_timestamp())));

        let clauses: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect();
        values.push(Box::new(id.as_i64()));
        let sql = format!(
            "UPDATE entities SET {} WHERE id = ?{} RETURNING name, description, tags",
            clauses.join(", "),
            values.len()
        );

        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let indexed: Option<(String, Option<String>, Option<String>)> = self
            .conn
            .query_row(&sql, params.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()
            .map_err(|e| match &slug {
                Some(slug) => describe_slug_conflict(e, slug),
                None => HoardError::from(e),
            })?;

        let Some((name, description, tags)) = indexed else {
            return Err(HoardError::NotFound { id });
        };
        debug!(id = %id, "Entity updated");

        if let Some(sync) = &self.sync {
            sync.on_update(
                &self.conn,
                id,
                IndexedFields {
                    name: &name,
                    description: description.as_deref(),
                    tags: tags.as_deref(),
                },
            );
        }

        Ok(())
    }

    /// Remove an entity. Irreversible.
    #[instrument(skip(self))]
    pub fn delete(&self, id: EntityId) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM entities WHERE id = ?1", params![id.as_i64()])?;
        if removed == 0 {
            return Err(HoardError::NotFound { id });
        }
        debug!(id = %id, "Entity deleted");

        if let Some(sync) = &self.sync {
            sync.on_delete(&self.conn, id);
        }

        Ok(())
    }

    /// Fetch one entity.
    pub fn get(&self, id: EntityId) -> Result<Entity> {
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id.as_i64()], EntityRow::from_row)
            .optional()?;
        row.ok_or(HoardError::NotFound { id })?.into_entity()
    }

    /// The `limit` most recently updated entities, newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Entity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities e
             ORDER BY e.updated_at DESC, e.id DESC
             LIMIT ?1"
        );
        self.query_entities(&sql, params![limit as i64])
    }

    /// Entities whose name, description or tags contain `pattern`,
    /// ignoring case, newest first.
    ///
    /// `pattern` is matched literally; `%` and `_` have no special meaning.
    /// Case folding covers ASCII letters only.
    pub fn scan_text_match(&self, pattern: &str, limit: usize) -> Result<Vec<Entity>> {
        let like = format!("%{}%", escape_like(pattern));
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities e
             WHERE e.name LIKE ?1 ESCAPE '\\'
                OR e.description LIKE ?1 ESCAPE '\\'
                OR e.tags LIKE ?1 ESCAPE '\\'
             ORDER BY e.updated_at DESC, e.id DESC
             LIMIT ?2"
        );
        self.query_entities(&sql, params![like, limit as i64])
    }

    /// Number of stored entities
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Re-index every entity. Returns the number indexed, or `None` when
    /// full-text indexing is not active.
    pub fn rebuild_index(&self) -> Result<Option<usize>> {
        match &self.sync {
            Some(sync) => {
                let indexed = sync.rebuild(&self.conn)?;
                info!(indexed, "Full-text index rebuilt");
                Ok(Some(indexed))
            }
            None => Ok(None),
        }
    }

    /// Close the connection, reporting any failure.
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| HoardError::from(e))?;
        debug!(path = %path.display(), "Closed entity database");
        Ok(())
    }

    fn query_entities(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Entity>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, EntityRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    /// A timestamp strictly after every one this store has issued or loaded.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let next = match self.last_timestamp.get() {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp.set(Some(next));
        next
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("path", &self.path)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// An `entities` row before its text columns are decoded.
pub(crate) struct EntityRow {
    id: i64,
    kind: String,
    name: String,
    slug: Option<String>,
    description: Option<String>,
    tags: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl EntityRow {
    /// Read the columns in [`ENTITY_COLUMNS`] order.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(EntityRow {
            id: row.get(0)?,
            kind: row.get(1)?,
            name: row.get(2)?,
            slug: row.get(3)?,
            description: row.get(4)?,
            tags: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Decode timestamps and metadata.
    ///
    /// Bad timestamps fail the row; bad metadata is kept raw so the rest of
    /// the entity stays usable.
    pub(crate) fn into_entity(self) -> Result<Entity> {
        let id = EntityId(self.id);
        let timestamp = |field: &'static str, raw: &str| {
            parse_timestamp(raw).ok_or_else(|| HoardError::MalformedStoredData {
                id,
                field,
                reason: format!("not an RFC 3339 timestamp: {:?}", raw),
            })
        };

        Ok(Entity {
            id,
            created_at: timestamp("created_at", &self.created_at)?,
            updated_at: timestamp("updated_at", &self.updated_at)?,
            metadata: StoredMetadata::parse(self.metadata.as_deref()),
            kind: self.kind,
            name: self.name,
            slug: self.slug.unwrap_or_default(),
            description: self.description,
            tags: self.tags,
        })
    }
}

fn describe_slug_conflict(err: rusqlite::Error, slug: &str) -> HoardError {
    match HoardError::from(err) {
        HoardError::ConstraintViolation { reason } if reason.contains("slug") => {
            HoardError::constraint(format!("slug {:?} is already in use", slug))
        }
        other => other,
    }
}

fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
