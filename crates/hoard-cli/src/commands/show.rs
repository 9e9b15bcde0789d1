//! Show command - print one entity.

use super::print_entity;
use crate::app::App;
use crate::OutputFormat;
use hoard_core::{Config, EntityId};

/// Run the show command.
pub fn run(config: Config, id: i64, output: OutputFormat) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let entity = app.store.get(EntityId::new(id))?;

    match output {
        OutputFormat::Text => print_entity(&entity),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entity)?),
    }

    app.close()
}
