use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::PAGE_LIMIT;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// No page has been loaded yet.
    #[default]
    Uninitialized,
    /// Holds a valid page; ready for the next intent.
    Idle,
    /// A command is in flight.
    Awaiting,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Idle => "idle",
            SessionStatus::Awaiting => "awaiting",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a query lands on an empty page past the first one, which
/// happens after deleting the last row of the last page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EmptyPagePolicy {
    /// Show the empty page; the store decides what lives at that offset.
    #[default]
    Stay,
    /// Step back one page at a time until a non-empty page or offset 0.
    Retreat,
}

/// The query window a session is showing (or about to show).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    /// Empty text matches everything.
    pub query_text: String,
    pub limit: u32,
    pub offset: u32,
}

impl Default for QueryState {
    fn default() -> Self {
        Self::new(PAGE_LIMIT)
    }
}

impl QueryState {
    pub fn new(limit: u32) -> Self {
        Self {
            query_text: String::new(),
            limit,
            offset: 0,
        }
    }

    /// A new search always starts from the first page.
    pub fn with_search(&self, text: &str) -> Self {
        Self {
            query_text: text.to_string(),
            limit: self.limit,
            offset: 0,
        }
    }

    pub fn advanced(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            ..self.clone()
        }
    }

    /// Steps back one page, clamped at 0.
    pub fn retreated(&self) -> Self {
        Self {
            offset: self.offset.saturating_sub(self.limit),
            ..self.clone()
        }
    }

    pub fn has_next_page(&self, count: u64) -> bool {
        u64::from(self.offset) + u64::from(self.limit) < count
    }

    pub fn has_previous_page(&self) -> bool {
        self.offset > 0
    }

    /// `"{first}-{last} / {count}"` with a 1-based first row, e.g. `"11-20 / 25"`.
    /// A window with nothing in it renders as `"0-0 / {count}"`.
    pub fn pagination_label(&self, count: u64) -> String {
        let offset = u64::from(self.offset);
        if offset >= count {
            return format!("0-0 / {count}");
        }
        let end = (offset + u64::from(self.limit)).min(count);
        format!("{}-{} / {}", offset + 1, end, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_search_resets_offset() {
        let state = QueryState {
            query_text: "old".into(),
            limit: 10,
            offset: 40,
        };
        let next = state.with_search("foo");
        assert_eq!(next.offset, 0);
        assert_eq!(next.query_text, "foo");
        assert_eq!(next.limit, 10);
    }

    #[test]
    fn advancing_n_times_moves_n_pages() {
        let mut state = QueryState::default();
        for _ in 0..7 {
            state = state.advanced();
        }
        assert_eq!(state.offset, 70);
    }

    #[test]
    fn retreat_never_goes_below_zero() {
        let mut state = QueryState::default().advanced();
        for _ in 0..5 {
            state = state.retreated();
        }
        assert_eq!(state.offset, 0);
    }

    #[test]
    fn pagination_label_matches_window() {
        let mut state = QueryState::default();
        assert_eq!(state.pagination_label(0), "0-0 / 0");
        assert_eq!(state.pagination_label(25), "1-10 / 25");

        state.offset = 20;
        assert_eq!(state.pagination_label(25), "21-25 / 25");
        assert_eq!(state.pagination_label(20), "0-0 / 20");
    }

    #[test]
    fn page_flags_follow_count() {
        let mut state = QueryState::default();
        assert!(state.has_next_page(25));
        assert!(!state.has_previous_page());

        state.offset = 20;
        assert!(!state.has_next_page(25));
        assert!(state.has_previous_page());
    }

    #[test]
    fn policy_uses_lowercase_names() {
        let json = serde_json::to_string(&EmptyPagePolicy::Retreat).unwrap();
        assert_eq!(json, "\"retreat\"");
    }
}
