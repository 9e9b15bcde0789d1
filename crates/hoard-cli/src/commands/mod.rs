//! Subcommand implementations and the output helpers they share.

pub mod add;
pub mod config;
pub mod delete;
pub mod query;
pub mod reindex;
pub mod show;
pub mod status;
pub mod update;

use anyhow::{anyhow, bail, Context};
use hoard_core::{Entity, Metadata, StoredMetadata};
use serde_json::Value;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fold `key=value` pairs into `base`. Values that parse as JSON keep their
/// type (`born=1815` is a number); anything else is a string.
pub fn merge_meta_pairs(mut base: Metadata, pairs: &[String]) -> anyhow::Result<Metadata> {
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Metadata entry {:?} is not KEY=VALUE", pair))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Metadata entry {:?} has an empty key", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        base.insert(key.to_string(), value);
    }
    Ok(base)
}

/// Parse a whole metadata document. It must be a JSON object.
pub fn parse_meta_json(text: &str) -> anyhow::Result<Metadata> {
    let value: Value = serde_json::from_str(text).context("Metadata is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("Metadata must be a JSON object"),
    }
}

/// Print every field of an entity.
pub fn print_entity(entity: &Entity) {
    println!("#{} {} ({})", entity.id, entity.name, entity.kind);
    println!("  Slug:        {}", entity.slug);
    if let Some(tags) = entity.tags.as_deref().filter(|t| !t.is_empty()) {
        println!("  Tags:        {}", tags);
    }
    println!("  Created:     {}", entity.created_at.format(TIME_FORMAT));
    println!("  Updated:     {}", entity.updated_at.format(TIME_FORMAT));

    match &entity.metadata {
        StoredMetadata::Valid(map) if map.is_empty() => {}
        StoredMetadata::Valid(map) => {
            println!("  Metadata:");
            for (key, value) in map {
                println!("    {}: {}", key, value);
            }
        }
        StoredMetadata::Malformed { raw, reason } => {
            println!("  Metadata:    ⚠ unreadable ({})", reason);
            println!("    {}", raw);
        }
    }

    if let Some(description) = entity.description.as_deref().filter(|d| !d.is_empty()) {
        println!();
        for line in description.lines() {
            println!("  {}", line);
        }
    }
}

/// One-line form used in listings.
pub fn entity_line(entity: &Entity) -> String {
    let summary = entity.summary();
    if summary.is_empty() {
        format!("#{} {} ({})", entity.id, entity.name, entity.kind)
    } else {
        format!("#{} {} ({}) - {}", entity.id, entity.name, entity.kind, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_meta_pairs_types() {
        let meta = merge_meta_pairs(
            Metadata::new(),
            &pairs(&["born=1815", "alive=false", "field=mathematics", "note=a=b"]),
        )
        .unwrap();
        assert_eq!(meta["born"], Value::from(1815));
        assert_eq!(meta["alive"], Value::Bool(false));
        assert_eq!(meta["field"], Value::from("mathematics"));
        assert_eq!(meta["note"], Value::from("a=b"));
    }

    #[test]
    fn test_merge_meta_pairs_overrides_base() {
        let base = parse_meta_json(r#"{"born": 1815, "field": "poetry"}"#).unwrap();
        let meta = merge_meta_pairs(base, &pairs(&["field=mathematics"])).unwrap();
        assert_eq!(meta["born"], Value::from(1815));
        assert_eq!(meta["field"], Value::from("mathematics"));
    }

    #[test]
    fn test_merge_meta_pairs_rejects_bad_entries() {
        assert!(merge_meta_pairs(Metadata::new(), &pairs(&["no-equals"])).is_err());
        assert!(merge_meta_pairs(Metadata::new(), &pairs(&[" =1"])).is_err());
    }

    #[test]
    fn test_parse_meta_json() {
        assert_eq!(parse_meta_json("{}").unwrap().len(), 0);
        assert!(parse_meta_json("[1, 2]").is_err());
        assert!(parse_meta_json("{broken").is_err());
    }
}
