//! Delete command - remove an entity for good.

use crate::app::App;
use hoard_core::{Config, EntityId};
use std::io::{self, Write};

/// Run the delete command.
pub fn run(config: Config, id: i64, skip_confirm: bool) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let id = EntityId::new(id);
    let entity = app.store.get(id)?;

    if !skip_confirm {
        print!("Delete #{} {} ({})? This cannot be undone. [y/N] ", id, entity.name, entity.kind);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return app.close();
        }
    }

    app.store.delete(id)?;
    println!("Deleted #{} {}.", id, entity.name);

    app.close()
}
