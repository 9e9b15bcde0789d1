//! Add command - create a new entity.

use super::{merge_meta_pairs, parse_meta_json, print_entity};
use crate::app::App;
use crate::{FieldArgs, OutputFormat};
use hoard_core::{Config, Metadata, NewEntity};

/// Run the add command.
pub fn run(
    config: Config,
    kind: String,
    name: String,
    fields: FieldArgs,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let app = App::new(config)?;

    let metadata = match &fields.meta_json {
        Some(json) => parse_meta_json(json)?,
        None => merge_meta_pairs(Metadata::new(), &fields.meta)?,
    };

    let mut entity = NewEntity::new(kind, name).with_metadata(metadata);
    if let Some(slug) = fields.slug {
        entity = entity.with_slug(slug);
    }
    if let Some(description) = fields.description {
        entity = entity.with_description(description);
    }
    if let Some(tags) = fields.tags {
        entity = entity.with_tags(tags);
    }

    let id = app.store.create(entity)?;
    let created = app.store.get(id)?;

    match output {
        OutputFormat::Text => {
            println!("Added #{} ({})", id, created.slug);
            print_entity(&created);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&created)?),
    }

    app.close()
}
