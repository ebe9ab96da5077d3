//! Stored text records and tag normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored text item with its tags and optional embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique opaque identifier
    pub id: String,
    pub created: DateTime<Utc>,
    pub text: String,
    /// Normalized, de-duplicated tags
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_updated: Option<DateTime<Utc>>,
}

impl Record {
    /// Create a record with a fresh v4 id, the current time and normalized tags
    pub fn new<I, S>(text: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_id(uuid::Uuid::new_v4().to_string(), text, tags)
    }

    pub fn with_id<I, S>(id: impl Into<String>, text: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id: id.into(),
            created: Utc::now(),
            text: text.into(),
            tags: normalize_tags(tags),
            embedding: None,
            embedding_model: None,
            embedding_updated: None,
        }
    }

    /// True when every tag in `required` is present (tags must already be normalized)
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|tag| self.tags.contains(tag))
    }

    /// True when the stored embedding was produced by `model`
    pub fn has_current_embedding(&self, model: &str) -> bool {
        self.embedding.is_some() && self.embedding_updated.is_some() && self.embedding_model.as_deref() == Some(model)
    }
}

/// Lowercase, trim, and turn spaces and underscores into dashes
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '_' { '-' } else { c })
        .collect()
}

/// Normalize a tag list, dropping empties and duplicates while keeping first-seen order
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = normalize_tag(tag.as_ref());
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  Rust Lang "), "rust-lang");
        assert_eq!(normalize_tag("snake_case"), "snake-case");
        assert_eq!(normalize_tag("UPPER"), "upper");
    }

    #[test]
    fn test_normalize_tags_dedup() {
        let tags = normalize_tags(["Python", "python", " ", "data_science", "Data Science"]);
        assert_eq!(tags, vec!["python".to_string(), "data-science".to_string()]);
    }

    #[test]
    fn test_record_new() {
        let record = Record::new("hello world", ["Greeting"]);
        assert!(!record.id.is_empty());
        assert_eq!(record.tags, vec!["greeting".to_string()]);
        assert!(record.embedding.is_none());

        let other = Record::new("hello world", Vec::<String>::new());
        assert_ne!(record.id, other.id);
    }

    #[test]
    fn test_has_all_tags() {
        let record = Record::with_id("r1", "text", ["a", "b"]);
        assert!(record.has_all_tags(&["a".to_string()]));
        assert!(record.has_all_tags(&[]));
        assert!(!record.has_all_tags(&["a".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_has_current_embedding() {
        let mut record = Record::with_id("r1", "text", Vec::<String>::new());
        assert!(!record.has_current_embedding("m1"));

        record.embedding = Some(vec![0.5, 0.5]);
        record.embedding_model = Some("m1".to_string());
        record.embedding_updated = Some(Utc::now());
        assert!(record.has_current_embedding("m1"));
        assert!(!record.has_current_embedding("m2"));
    }

    #[test]
    fn test_serialization_skips_missing_embedding() {
        let record = Record::with_id("r1", "text", ["tag"]);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("embedding"));

        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
