//! Reindex command - rebuild the full-text index.

use crate::app::App;
use hoard_core::Config;
use std::time::Instant;

/// Run the reindex command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let app = App::new(config)?;

    let start = Instant::now();
    match app.store.rebuild_index()? {
        Some(indexed) => println!(
            "Indexed {} entities in {:.2}s",
            indexed,
            start.elapsed().as_secs_f64()
        ),
        None => println!("Full-text search is unavailable or disabled; nothing to rebuild."),
    }

    app.close()
}
