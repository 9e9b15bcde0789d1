//! Update command - change some fields of an entity.

use super::{merge_meta_pairs, parse_meta_json, print_entity};
use crate::app::App;
use crate::FieldArgs;
use hoard_core::{Config, EntityId, EntityPatch};

/// Run the update command.
pub fn run(
    config: Config,
    id: i64,
    kind: Option<String>,
    name: Option<String>,
    fields: FieldArgs,
) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let id = EntityId::new(id);

    let metadata = if let Some(json) = &fields.meta_json {
        Some(parse_meta_json(json)?)
    } else if !fields.meta.is_empty() {
        // Pairs are merged into what is stored, so the current document must be readable
        let current = app.store.get(id)?;
        Some(merge_meta_pairs(current.metadata()?.clone(), &fields.meta)?)
    } else {
        None
    };

    let patch = EntityPatch {
        kind,
        name,
        slug: fields.slug,
        description: fields.description,
        tags: fields.tags,
        metadata,
    };

    if patch.is_empty() {
        eprintln!("No fields given; only the update time changes.");
    }

    app.store.update(id, patch)?;
    println!("Updated #{}", id);
    print_entity(&app.store.get(id)?);

    app.close()
}
