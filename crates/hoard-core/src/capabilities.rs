//! Storage engine capability detection.
//!
//! The SQLite library linked into the process may or may not carry the FTS5
//! and JSON1 extensions. Detection runs once against an open connection and
//! the resulting [`Capabilities`] value is handed to every component that
//! branches on it. Nothing here ever fails: a probe that errors simply
//! reports the capability as unavailable.

use rusqlite::Connection;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Feature availability facts, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    /// A full-text index can be created and queried
    pub full_text: bool,

    /// Structured (JSON) document functions can be evaluated
    pub structured_value: bool,
}

impl Capabilities {
    /// Both capabilities off. The store still works, with degraded search.
    pub const NONE: Capabilities = Capabilities {
        full_text: false,
        structured_value: false,
    };

    /// Probe the engine behind `conn`.
    pub fn detect(conn: &Connection) -> Self {
        let caps = Capabilities {
            full_text: probe_full_text(conn),
            structured_value: probe_structured_value(conn),
        };
        info!(
            full_text = caps.full_text,
            structured_value = caps.structured_value,
            "Storage capabilities detected"
        );
        caps
    }

    /// Copy of these capabilities with full-text forced off
    pub fn without_full_text(self) -> Self {
        Capabilities {
            full_text: false,
            ..self
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool| if on { "enabled" } else { "unavailable" };
        write!(
            f,
            "full-text: {}, structured values: {}",
            flag(self.full_text),
            flag(self.structured_value)
        )
    }
}

/// Check the compile options, then prove it by building a throwaway table.
///
/// A library can advertise FTS5 and still refuse to create the table (or
/// load it as an extension without advertising it), so only the creation
/// result decides.
fn probe_full_text(conn: &Connection) -> bool {
    let advertised = compile_options(conn)
        .iter()
        .any(|opt| opt.to_uppercase().contains("FTS5"));
    debug!(advertised, "FTS5 compile option");

    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS temp.__hoard_fts_probe USING fts5(content);
         DROP TABLE IF EXISTS temp.__hoard_fts_probe;",
    )
    .map_err(|e| debug!(error = %e, "FTS5 probe table could not be created"))
    .is_ok()
}

fn probe_structured_value(conn: &Connection) -> bool {
    conn.query_row("SELECT json('{}')", [], |row| row.get::<_, String>(0))
        .map_err(|e| debug!(error = %e, "JSON1 probe failed"))
        .is_ok()
}

fn compile_options(conn: &Connection) -> Vec<String> {
    let Ok(mut stmt) = conn.prepare("PRAGMA compile_options") else {
        return Vec::new();
    };
    let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(0)) else {
        return Vec::new();
    };
    let options = rows.filter_map(|r| r.ok()).collect();
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_engine_has_both() {
        let conn = Connection::open_in_memory().unwrap();
        let caps = Capabilities::detect(&conn);
        assert!(caps.full_text);
        assert!(caps.structured_value);
    }

    #[test]
    fn test_probe_leaves_no_table_behind() {
        let conn = Connection::open_in_memory().unwrap();
        Capabilities::detect(&conn);
        let leftovers: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM temp.sqlite_master WHERE name LIKE '__hoard%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_without_full_text() {
        let caps = Capabilities {
            full_text: true,
            structured_value: true,
        }
        .without_full_text();
        assert!(!caps.full_text);
        assert!(caps.structured_value);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Capabilities::NONE.to_string(),
            "full-text: unavailable, structured values: unavailable"
        );
    }
}
