//! Note records as they travel between the store and the renderer.

use serde::{Deserialize, Serialize};

/// One result record. `row_id` is the store's stable key and the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "rowid")]
    pub row_id: i64,
    pub title: String,
    pub url: String,
    pub tags: String,
    pub description: String,
    pub comments: String,
    pub annotations: String,
    /// Display-only; never parsed by this crate.
    pub created_at: String,
    pub is_public: bool,
}

impl Item {
    /// Tags split on the store's `,` separator, empty segments dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags.split(',').filter(|tag| !tag.is_empty()).collect()
    }
}

/// Input for seeding a note into the reference store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    pub url: String,
    pub tags: String,
    pub description: String,
    pub comments: String,
    pub annotations: String,
    pub is_public: bool,
}
