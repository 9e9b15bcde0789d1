//! Core data types for Hoard.
//!
//! This module defines the entity record and the field sets used to create
//! and patch it. These types are designed to be:
//!
//! - **Storage-agnostic**: No SQL details leak into these types
//! - **Serializable**: Entities render to JSON for the command-line front end
//! - **Lossless**: Undecodable metadata is kept verbatim rather than dropped

use crate::error::{HoardError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a derived slug, in characters.
pub const MAX_SLUG_LEN: usize = 200;

/// Open key/value document attached to every entity.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Unique identifier for an entity.
///
/// Assigned by the store on insert, monotonically increasing and never
/// reused within a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl EntityId {
    /// Create a new entity ID
    pub fn new(id: i64) -> Self {
        EntityId(id)
    }

    /// Get the raw ID value
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId(id)
    }
}

/// Metadata as read back from disk.
///
/// A value that fails to decode is kept as raw text so the rest of the
/// record stays usable and the bad value can still be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoredMetadata {
    /// A well-formed JSON object
    Valid(Metadata),

    /// Text that is not a JSON object
    Malformed { raw: String, reason: String },
}

impl StoredMetadata {
    /// Decode the stored column. A NULL column is an empty document.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return StoredMetadata::Valid(Metadata::new());
        };

        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => StoredMetadata::Valid(map),
            Ok(other) => StoredMetadata::Malformed {
                raw: raw.to_string(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            },
            Err(e) => StoredMetadata::Malformed {
                raw: raw.to_string(),
                reason: e.to_string(),
            },
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// A single catalog record.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    /// Store-assigned identifier
    pub id: EntityId,

    /// Category label (e.g. "person", "website")
    #[serde(rename = "type")]
    pub kind: String,

    /// Display name
    pub name: String,

    /// Unique URL-safe identifier derived from the name
    pub slug: String,

    /// Free-form, possibly multi-line description
    pub description: Option<String>,

    /// Comma-separated tags, stored verbatim
    pub tags: Option<String>,

    /// Open key/value document
    pub metadata: StoredMetadata,

    /// Set once at insert
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Borrow the decoded metadata, or report why it could not be decoded.
    pub fn metadata(&self) -> Result<&Metadata> {
        match &self.metadata {
            StoredMetadata::Valid(map) => Ok(map),
            StoredMetadata::Malformed { reason, .. } => Err(HoardError::MalformedStoredData {
                id: self.id,
                field: "metadata",
                reason: reason.clone(),
            }),
        }
    }

    /// First line of the description, for one-line listings
    pub fn summary(&self) -> &str {
        self.description
            .as_deref()
            .and_then(|d| d.lines().next())
            .unwrap_or("")
    }

    /// Name and description joined, the text fuzzy ranking runs against
    pub fn ranking_text(&self) -> String {
        [Some(self.name.as_str()), self.description.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

/// Field set for creating an entity.
#[derive(Debug, Clone, Default)]
pub struct NewEntity {
    pub kind: String,
    pub name: String,
    /// Explicit slug; derived from `name` when absent
    pub slug: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub metadata: Metadata,
}

impl NewEntity {
    /// Create a new field set with the required fields
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        NewEntity {
            kind: kind.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set an explicit slug
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the tags
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    /// Set the metadata document
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check required fields and resolve the slug to store.
    pub fn resolve_slug(&self) -> Result<String> {
        require_non_blank("type", &self.kind)?;
        require_non_blank("name", &self.name)?;
        resolve_slug(&self.name, self.slug.as_deref())
    }
}

/// Partial update. Only fields that are `Some` change.
#[derive(Debug, Clone, Default)]
pub struct EntityPatch {
    pub kind: Option<String>,
    pub name: Option<String>,
    /// Explicit slug; when absent and `name` changes, the slug is re-derived
    pub slug: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub metadata: Option<Metadata>,
}

impl EntityPatch {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// True if the patch changes no field (only `updated_at` would move)
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.name.is_none()
            && self.slug.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.metadata.is_none()
    }

    /// Check supplied fields and resolve the slug change, if any.
    pub fn resolve_slug(&self) -> Result<Option<String>> {
        if let Some(kind) = &self.kind {
            require_non_blank("type", kind)?;
        }
        if let Some(name) = &self.name {
            require_non_blank("name", name)?;
        }
        match (&self.slug, &self.name) {
            (Some(slug), _) => resolve_slug("", Some(slug)).map(Some),
            (None, Some(name)) => resolve_slug(name, None).map(Some),
            (None, None) => Ok(None),
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(HoardError::constraint(format!("{} is required", field)));
    }
    Ok(())
}

fn resolve_slug(name: &str, explicit: Option<&str>) -> Result<String> {
    let slug = match explicit {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => slugify(name),
    };
    if slug.is_empty() {
        return Err(HoardError::constraint(format!(
            "name {:?} does not produce a usable slug",
            name
        )));
    }
    Ok(slug)
}

/// Derive a URL-safe slug from a display name.
///
/// Lower-cases, turns every run of non-alphanumeric characters into a single
/// `-`, trims separators from both ends and truncates to [`MAX_SLUG_LEN`]
/// characters.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let trimmed: String = slug.trim_end_matches('-').chars().take(MAX_SLUG_LEN).collect();
    trimmed.trim_end_matches('-').to_string()
}

/// Render a timestamp the way it is stored: RFC 3339, microseconds, `Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Accepts any RFC 3339 offset form.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
