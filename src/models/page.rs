use std::collections::HashSet;

use serde::Serialize;

use crate::protocol::DecodeError;

use super::Item;

/// A decoded page: the total match count plus the current window of items,
/// in the order the store ranked them.
///
/// Construction goes through [`PageResult::new`], so a value of this type never
/// holds two items with the same `row_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageResult {
    count: u64,
    #[serde(rename = "notes")]
    items: Vec<Item>,
}

impl PageResult {
    pub fn new(count: u64, items: Vec<Item>) -> Result<Self, DecodeError> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.row_id) {
                return Err(DecodeError::DuplicateRowId(item.row_id));
            }
        }

        Ok(Self { count, items })
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            items: Vec::new(),
        }
    }

    /// Total matches for the query, not the size of this page.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(row_id: i64) -> Item {
        Item {
            row_id,
            title: format!("note {row_id}"),
            url: String::new(),
            tags: String::new(),
            description: String::new(),
            comments: String::new(),
            annotations: String::new(),
            created_at: "2024-01-01 00:00:00 UTC".into(),
            is_public: false,
        }
    }

    #[test]
    fn rejects_duplicate_row_ids() {
        let err = PageResult::new(2, vec![item(4), item(4)]).unwrap_err();
        assert_eq!(err, DecodeError::DuplicateRowId(4));
    }

    #[test]
    fn serializes_items_under_notes_key() {
        let page = PageResult::new(12, vec![item(1)]).unwrap();
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["count"], 12);
        assert_eq!(value["notes"][0]["rowid"], 1);
        assert_eq!(value["notes"][0]["is_public"], false);
    }

    #[test]
    fn tag_list_skips_empty_segments() {
        let mut note = item(1);
        note.tags = "rust,,sqlite,".into();
        assert_eq!(note.tag_list(), vec!["rust", "sqlite"]);
    }
}
