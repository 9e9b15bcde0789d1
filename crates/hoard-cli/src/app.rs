//! Application state management.

use hoard_core::{Capabilities, Config, EntityStore, Ranker, SearchOptions, Searcher};
use tracing::info;

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// The entity database
    pub store: EntityStore,

    /// What the storage engine turned out to support
    pub capabilities: Capabilities,
}

impl App {
    /// Open the database and probe its capabilities.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let path = config.database_path()?;
        let mut store = EntityStore::open_with_timeout(&path, config.storage.busy_timeout_ms)?;
        let capabilities = store.init_schema_with(config.search.full_text)?;

        info!(
            path = %path.display(),
            entities = store.count()?,
            %capabilities,
            "Application initialized"
        );

        Ok(App {
            config,
            store,
            capabilities,
        })
    }

    /// Candidate retrieval over this app's store.
    pub fn searcher(&self) -> Searcher<'_> {
        Searcher::new(&self.store, self.capabilities)
            .with_options(SearchOptions::from(&self.config.search))
    }

    /// Ranker for the configured scorer.
    pub fn ranker(&self) -> Ranker {
        Ranker::from_choice(self.config.ranking.scorer)
            .with_parallel_threshold(self.config.ranking.parallel_threshold)
    }

    /// Close the database, surfacing any error.
    pub fn close(self) -> anyhow::Result<()> {
        self.store.close()?;
        Ok(())
    }
}
