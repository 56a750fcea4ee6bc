//! Cleaned book record and the projection from the raw API payload.
//!
//! The remote API returns a denormalized Apollo cache object per product.
//! [`BookRecord::from_raw`] projects it onto the persisted schema below.
//! Absent source values are omitted from the record entirely rather than
//! stored as nulls; only the stats counters substitute a default.
//!
//! Projection table (raw key → field → when absent):
//!
//! | raw key              | field          | when absent |
//! |----------------------|----------------|-------------|
//! | `title`              | `title`        | omitted     |
//! | `subtitle`           | `subtitle`     | omitted     |
//! | `rating`             | `rating`       | omitted     |
//! | `yearOfProduction`   | `year`         | omitted     |
//! | `dateRelease`        | `release_date` | omitted     |
//! | `language`           | `language`     | omitted     |
//! | `synopsis`           | `synopsis`     | omitted     |
//! | `medias.picture`     | `cover_url`    | omitted     |
//! | `isbn` (str or list) | `isbn`         | empty list  |
//! | `stats.ratingCount`  | `stats.rating_count` | 0     |
//! | `stats.reviewCount`  | `stats.review_count` | 0     |
//! | `stats.wishCount`    | `stats.wish_count`   | 0     |
//! | `authors[]`          | `authors`      | empty list  |
//! | `publishers[]`       | `publishers`   | empty list  |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized book record as persisted in checkpoints and shards.
///
/// Constructed once from a raw response payload, immutable thereafter.
/// `id` is always present and equals the originating work item's id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BookRecord {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub isbn: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    #[serde(default)]
    pub stats: BookStats,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Contributor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publishers: Vec<Contributor>,
}

/// Popularity counters, zero when the source omits them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BookStats {
    #[serde(default)]
    pub rating_count: u64,

    #[serde(default)]
    pub review_count: u64,

    #[serde(default)]
    pub wish_count: u64,
}

/// Author or publisher reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Contributor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl BookRecord {
    /// Project a raw Apollo product object onto the persisted schema.
    pub fn from_raw(id: &str, raw: &Value) -> Self {
        Self {
            id: id.to_string(),
            title: string_field(raw, "title"),
            subtitle: string_field(raw, "subtitle"),
            rating: raw.get("rating").and_then(Value::as_f64),
            year: raw.get("yearOfProduction").and_then(Value::as_i64),
            release_date: string_field(raw, "dateRelease"),
            language: string_field(raw, "language"),
            synopsis: string_field(raw, "synopsis"),
            isbn: isbn_list(raw),
            cover_url: raw
                .get("medias")
                .and_then(|m| m.get("picture"))
                .and_then(Value::as_str)
                .map(str::to_string),
            stats: BookStats::from_raw(raw.get("stats")),
            authors: contributor_list(raw, "authors"),
            publishers: contributor_list(raw, "publishers"),
        }
    }
}

impl BookStats {
    fn from_raw(raw: Option<&Value>) -> Self {
        let count = |key: &str| {
            raw.and_then(|s| s.get(key))
                .and_then(Value::as_u64)
                .unwrap_or(0)
        };
        Self {
            rating_count: count("ratingCount"),
            review_count: count("reviewCount"),
            wish_count: count("wishCount"),
        }
    }
}

/// The source stores a single ISBN as a string and multiple as a list.
fn isbn_list(raw: &Value) -> Vec<String> {
    match raw.get("isbn") {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn contributor_list(raw: &Value, key: &str) -> Vec<Contributor> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| Contributor {
                    name: string_field(entry, "name"),
                    id: entry.get("id").map(id_string),
                    url: string_field(entry, "url"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Contributor ids appear both as numbers and strings in the wild.
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_payload() -> Value {
        json!({
            "title": "Jacaranda",
            "subtitle": "roman",
            "rating": 7.8,
            "yearOfProduction": 2024,
            "dateRelease": "2024-08-15",
            "language": "Français",
            "synopsis": "Une fresque familiale.",
            "isbn": ["9782246831457"],
            "medias": { "picture": "https://media.example/cover.jpg" },
            "stats": { "ratingCount": 1200, "reviewCount": 45, "wishCount": 300 },
            "authors": [
                { "name": "Gaël Faye", "id": 123, "url": "/auteur/gael_faye/123" }
            ],
            "publishers": [
                { "name": "Grasset", "id": "9", "url": "/editeur/grasset/9" }
            ]
        })
    }

    #[test]
    fn projects_full_payload() {
        let record = BookRecord::from_raw("42", &full_payload());
        assert_eq!(record.id, "42");
        assert_eq!(record.title.as_deref(), Some("Jacaranda"));
        assert_eq!(record.rating, Some(7.8));
        assert_eq!(record.year, Some(2024));
        assert_eq!(record.isbn, vec!["9782246831457"]);
        assert_eq!(record.cover_url.as_deref(), Some("https://media.example/cover.jpg"));
        assert_eq!(record.stats.rating_count, 1200);
        assert_eq!(record.authors.len(), 1);
        assert_eq!(record.authors[0].name.as_deref(), Some("Gaël Faye"));
        assert_eq!(record.authors[0].id.as_deref(), Some("123"));
        assert_eq!(record.publishers[0].id.as_deref(), Some("9"));
    }

    #[test]
    fn sparse_payload_omits_absent_fields() {
        let record = BookRecord::from_raw("7", &json!({ "title": "T" }));
        let serialized = serde_json::to_value(&record).unwrap();

        assert_eq!(serialized["id"], "7");
        assert_eq!(serialized["title"], "T");
        // Absent scalars are omitted, not null.
        assert!(serialized.get("subtitle").is_none());
        assert!(serialized.get("synopsis").is_none());
        assert!(serialized.get("isbn").is_none());
        assert!(serialized.get("authors").is_none());
        // Stats default to explicit zeros.
        assert_eq!(serialized["stats"]["rating_count"], 0);
        assert_eq!(serialized["stats"]["wish_count"], 0);
    }

    #[test]
    fn single_isbn_string_becomes_list() {
        let record = BookRecord::from_raw("1", &json!({ "isbn": "9781234567890" }));
        assert_eq!(record.isbn, vec!["9781234567890"]);
    }

    #[test]
    fn partial_stats_default_to_zero() {
        let record = BookRecord::from_raw("1", &json!({ "stats": { "ratingCount": 5 } }));
        assert_eq!(record.stats.rating_count, 5);
        assert_eq!(record.stats.review_count, 0);
    }

    #[test]
    fn serialized_record_round_trips() {
        let record = BookRecord::from_raw("42", &full_payload());
        let text = serde_json::to_string(&record).unwrap();
        let back: BookRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
