//! # Hoard Core Library
//!
//! This crate provides the storage, search and ranking functionality for the
//! Hoard entity catalog. Entities (people, sites, features, anything worth
//! remembering) live in a single SQLite file; search degrades gracefully
//! when the linked engine lacks full-text support, and ranking degrades when
//! the fuzzy scorer is not compiled in.
//!
//! ## Architecture
//!
//! - **Store** (`store`): Durable entity records and their lifecycle
//! - **Capabilities** (`capabilities`): One-time probe of engine features
//! - **Index** (`index`): Derived full-text index, kept in step with the store
//! - **Search** (`search`): Full-text, substring or recency candidate retrieval
//! - **Rank** (`rank`): Fuzzy scoring and ordering of candidates
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use hoard_core::{EntityStore, NewEntity, Ranker, ScorerChoice, Searcher};
//!
//! let mut store = EntityStore::open("entities.db")?;
//! let caps = store.init_schema()?;
//! store.create(NewEntity::new("person", "Ada Lovelace").with_description("mathematician"))?;
//!
//! let candidates = Searcher::new(&store, caps).search("lovelace", 50)?;
//! for hit in Ranker::from_choice(ScorerChoice::Auto).rank("lovelace", candidates, 20) {
//!     println!("{:>6.1}  {}", hit.score, hit.entity.name);
//! }
//! ```

pub mod capabilities;
pub mod config;
pub mod error;
pub mod index;
pub mod rank;
pub mod search;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use capabilities::Capabilities;
pub use config::Config;
pub use error::{HoardError, Result};
pub use rank::{RankedEntity, Ranker, Scorer, ScorerChoice};
pub use search::{SearchOptions, Searcher};
pub use store::EntityStore;
pub use types::{Entity, EntityId, EntityPatch, Metadata, NewEntity, StoredMetadata};
