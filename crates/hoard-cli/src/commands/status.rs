//! Status command - show database status and capabilities.

use crate::app::App;
use crate::OutputFormat;
use hoard_core::Config;

/// Run the status command.
pub fn run(config: Config, output: OutputFormat) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let count = app.store.count()?;
    let scorer = app.ranker().scorer_name();
    let newest = app.store.list_recent(1)?.into_iter().next();

    match output {
        OutputFormat::Text => {
            println!("Hoard Status");
            println!("============");
            println!();
            println!("Database:        {}", app.store.path().display());
            println!("Entities:        {}", count);
            if let Some(entity) = &newest {
                println!(
                    "Last updated:    {} (#{} {})",
                    entity.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    entity.id,
                    entity.name
                );
            }
            println!();
            println!("Capabilities:");
            println!("  Full-text search:  {}", flag(app.capabilities.full_text));
            println!("  Structured values: {}", flag(app.capabilities.structured_value));
            println!("  Ranking scorer:    {}", scorer);

            if !app.capabilities.full_text {
                println!();
                println!("Searches use substring matching.");
            }
        }
        OutputFormat::Json => {
            let status = serde_json::json!({
                "database": app.store.path(),
                "entities": count,
                "last_updated": newest.as_ref().map(|e| e.updated_at),
                "capabilities": app.capabilities,
                "scorer": scorer,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    app.close()
}

fn flag(on: bool) -> &'static str {
    if on {
        "✓ enabled"
    } else {
        "✗ unavailable"
    }
}
