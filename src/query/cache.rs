use std::{collections::HashMap, sync::Arc};

use crate::models::{Item, PageResult};

/// An immutable view of one page. Readers hold an `Arc` to it, so a
/// replacement never shows them a mix of old and new items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedPage {
    items: Vec<Item>,
    by_row_id: HashMap<i64, usize>,
    count: u64,
}

impl CachedPage {
    fn from_page(page: PageResult) -> Self {
        let count = page.count();
        let items = page.into_items();
        let by_row_id = items
            .iter()
            .enumerate()
            .map(|(position, item)| (item.row_id, position))
            .collect();

        Self {
            items,
            by_row_id,
            count,
        }
    }

    /// Items in store order.
    pub fn get_ordered(&self) -> &[Item] {
        &self.items
    }

    pub fn get_by_row_id(&self, row_id: i64) -> Option<&Item> {
        self.by_row_id
            .get(&row_id)
            .and_then(|position| self.items.get(*position))
    }

    pub fn contains(&self, row_id: i64) -> bool {
        self.by_row_id.contains_key(&row_id)
    }

    /// Total matches for the query that produced this page.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The current page, rebuilt wholesale from every successfully parsed
/// response. There is no incremental merge.
#[derive(Debug, Default)]
pub struct ResultCache {
    current: Arc<CachedPage>,
    loaded: bool,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in `page` in a single step and returns the new view.
    pub fn replace(&mut self, page: PageResult) -> Arc<CachedPage> {
        self.current = Arc::new(CachedPage::from_page(page));
        self.loaded = true;
        self.current.clone()
    }

    pub fn snapshot(&self) -> Arc<CachedPage> {
        self.current.clone()
    }

    pub fn get_ordered(&self) -> &[Item] {
        self.current.get_ordered()
    }

    pub fn get_by_row_id(&self, row_id: i64) -> Option<&Item> {
        self.current.get_by_row_id(row_id)
    }

    pub fn count(&self) -> u64 {
        self.current.count()
    }

    /// Whether any page has been installed yet.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}
