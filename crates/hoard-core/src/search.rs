//! Candidate retrieval.
//!
//! [`Searcher::search`] picks a retrieval path in a fixed preference order:
//! full-text lookup, then a substring scan, and for a blank query the plain
//! recency listing. Full-text problems never reach the caller; they are
//! logged and the next path is tried. Results are unscored, the ranking
//! engine orders them afterwards.

use crate::capabilities::Capabilities;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::index;
use crate::store::EntityStore;
use crate::types::Entity;
use tracing::debug;

/// Dispatcher behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Treat an empty full-text result like a failed one and scan instead
    pub fallback_on_empty: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            fallback_on_empty: true,
        }
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        SearchOptions {
            fallback_on_empty: config.fallback_on_empty,
        }
    }
}

/// Read-only query front end over an [`EntityStore`].
#[derive(Debug)]
pub struct Searcher<'a> {
    store: &'a EntityStore,
    capabilities: Capabilities,
    options: SearchOptions,
}

impl<'a> Searcher<'a> {
    pub fn new(store: &'a EntityStore, capabilities: Capabilities) -> Self {
        Searcher {
            store,
            capabilities,
            options: SearchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Up to `limit` candidates for `query`.
    ///
    /// Errors come only from the substring scan or the recency listing,
    /// which means the store itself is unusable.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Entity>> {
        let query = query.trim();
        if query.is_empty() {
            debug!(limit, "Blank query; listing recent entities");
            return self.store.list_recent(limit);
        }

        if self.capabilities.full_text {
            match index::lookup(self.store.conn(), query, limit) {
                Ok(hits) if !hits.is_empty() => {
                    debug!(query, hits = hits.len(), "Full-text search");
                    return Ok(hits);
                }
                Ok(hits) if !self.options.fallback_on_empty => return Ok(hits),
                Ok(_) => debug!(query, "Full-text search found nothing; scanning"),
                Err(e) => debug!(query, error = %e, "Full-text search failed; scanning"),
            }
        }

        let hits = self.store.scan_text_match(query, limit)?;
        debug!(query, hits = hits.len(), "Substring scan");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HoardError;
    use crate::types::{EntityId, EntityPatch, NewEntity};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> EntityStore {
        let mut store = EntityStore::open(dir.path().join("entities.db")).unwrap();
        store.init_schema().unwrap();
        store
    }

    fn ids(entities: &[Entity]) -> Vec<i64> {
        entities.iter().map(|e| e.id.as_i64()).collect()
    }

    fn seed(store: &EntityStore) {
        store
            .create(NewEntity::new("person", "Alice Smith").with_description("engineer"))
            .unwrap();
        store
            .create(NewEntity::new("person", "Bob Jones").with_tags("engineer,ops"))
            .unwrap();
        store
            .create(NewEntity::new("site", "Main Office").with_description("headquarters"))
            .unwrap();
    }

    #[test]
    fn test_blank_query_lists_recent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        seed(&store);

        let searcher = Searcher::new(&store, store.capabilities());
        let hits = searcher.search("   ", 2).unwrap();
        assert_eq!(ids(&hits), ids(&store.list_recent(2).unwrap()));
        assert_eq!(ids(&hits), vec![3, 2]);
    }

    #[test]
    fn test_full_text_lookup() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.capabilities().full_text);
        seed(&store);

        let searcher = Searcher::new(&store, store.capabilities());
        let mut hits = ids(&searcher.search("engineer", 10).unwrap());
        hits.sort();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn test_degraded_search_equals_scan() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        seed(&store);

        let searcher = Searcher::new(&store, Capabilities::NONE);
        for query in ["engineer", "o", "nothing here", "%"] {
            assert_eq!(
                ids(&searcher.search(query, 10).unwrap()),
                ids(&store.scan_text_match(query, 10).unwrap()),
                "query {:?}",
                query
            );
        }
    }

    #[test]
    fn test_malformed_query_falls_back() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .create(NewEntity::new("thing", "Quote \"Mark"))
            .unwrap();

        // An unbalanced quote is an FTS5 syntax error
        let searcher = Searcher::new(&store, store.capabilities());
        let hits = searcher.search("\"Mark", 10).unwrap();
        assert_eq!(ids(&hits), vec![1]);
    }

    #[test]
    fn test_empty_full_text_result() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.create(NewEntity::new("person", "Grace Hopper")).unwrap();

        // "ace" is a substring but not an indexed token
        let falls_back = Searcher::new(&store, store.capabilities());
        assert_eq!(ids(&falls_back.search("ace", 10).unwrap()), vec![1]);

        let strict = Searcher::new(&store, store.capabilities()).with_options(SearchOptions {
            fallback_on_empty: false,
        });
        assert!(strict.search("ace", 10).unwrap().is_empty());
    }

    #[test]
    fn test_limit_applies() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for i in 0..5 {
            store
                .create(NewEntity::new("thing", format!("widget {}", i)))
                .unwrap();
        }

        let searcher = Searcher::new(&store, store.capabilities());
        assert_eq!(searcher.search("widget", 3).unwrap().len(), 3);
        let scanning = Searcher::new(&store, Capabilities::NONE);
        assert_eq!(scanning.search("widget", 3).unwrap().len(), 3);
    }

    #[test]
    fn test_lifecycle_scenario() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let id = store
            .create(
                NewEntity::new("person", "Ada Lovelace").with_description("mathematician"),
            )
            .unwrap();
        assert_eq!(id, EntityId(1));
        assert_eq!(store.get(id).unwrap().slug, "ada-lovelace");

        let searcher = Searcher::new(&store, store.capabilities());
        assert_eq!(ids(&searcher.search("lovelace", 10).unwrap()), vec![1]);

        store
            .update(id, EntityPatch::default().with_description("pioneer"))
            .unwrap();
        let ada = store.get(id).unwrap();
        assert_eq!(ada.description.as_deref(), Some("pioneer"));
        assert_eq!(ada.name, "Ada Lovelace");
        assert_eq!(ids(&searcher.search("pioneer", 10).unwrap()), vec![1]);

        store.delete(id).unwrap();
        assert!(matches!(store.get(id), Err(HoardError::NotFound { .. })));
        assert!(searcher.search("lovelace", 10).unwrap().is_empty());
    }

    #[test]
    fn test_full_text_toggle_keeps_results_current() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.db");
        let reopen = |full_text: bool| {
            let mut store = EntityStore::open(&path).unwrap();
            store.init_schema_with(full_text).unwrap();
            store
        };

        let id = reopen(true)
            .create(NewEntity::new("person", "Ada Lovelace").with_description("mathematician"))
            .unwrap();
        reopen(false)
            .update(id, EntityPatch::default().with_description("pioneer"))
            .unwrap();

        let store = reopen(true);
        let strict = Searcher::new(&store, store.capabilities()).with_options(SearchOptions {
            fallback_on_empty: false,
        });
        assert!(strict.search("mathematician", 10).unwrap().is_empty());
        assert_eq!(ids(&strict.search("pioneer", 10).unwrap()), vec![1]);
    }

    #[test]
    fn test_search_does_not_mutate() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        seed(&store);
        let before: Vec<_> = store
            .list_recent(10)
            .unwrap()
            .into_iter()
            .map(|e| (e.id, e.updated_at))
            .collect();

        let searcher = Searcher::new(&store, store.capabilities());
        searcher.search("engineer", 10).unwrap();
        searcher.search("\"bad", 10).unwrap();
        searcher.search("", 10).unwrap();

        let after: Vec<_> = store
            .list_recent(10)
            .unwrap()
            .into_iter()
            .map(|e| (e.id, e.updated_at))
            .collect();
        assert_eq!(before, after);
    }
}
