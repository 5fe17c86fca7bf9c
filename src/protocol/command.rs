use serde::{Deserialize, Serialize};

use super::CommandError;

/// Page size used by every query this crate issues.
pub const PAGE_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Select,
    Search,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Search => "search",
            Action::Delete => "delete",
        }
    }
}

/// A store command. The wire form is the JSON object produced by serde, so the
/// query text is always a properly escaped string value and can never add or
/// shadow fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Command {
    Select {
        limit: u32,
        offset: u32,
    },
    Search {
        query: String,
        limit: u32,
        offset: u32,
    },
    Delete {
        query: String,
        rowid: i64,
        limit: u32,
        offset: u32,
    },
}

/// Builds a command for `action`.
///
/// `select` ignores `query_text` and `row_id`; `search` ignores `row_id`;
/// `delete` requires `row_id` and carries the pagination window that the
/// follow-up refresh will use.
pub fn build(
    action: Action,
    query_text: &str,
    row_id: Option<i64>,
    limit: u32,
    offset: u32,
) -> Result<Command, CommandError> {
    if limit == 0 {
        return Err(CommandError::ZeroLimit);
    }

    let command = match action {
        Action::Select => Command::Select { limit, offset },
        Action::Search => Command::Search {
            query: query_text.to_string(),
            limit,
            offset,
        },
        Action::Delete => Command::Delete {
            query: query_text.to_string(),
            rowid: row_id.ok_or(CommandError::MissingRowId)?,
            limit,
            offset,
        },
    };

    Ok(command)
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Command::Select { .. } => Action::Select,
            Command::Search { .. } => Action::Search,
            Command::Delete { .. } => Action::Delete,
        }
    }

    pub fn limit(&self) -> u32 {
        match self {
            Command::Select { limit, .. }
            | Command::Search { limit, .. }
            | Command::Delete { limit, .. } => *limit,
        }
    }

    pub fn offset(&self) -> u32 {
        match self {
            Command::Select { offset, .. }
            | Command::Search { offset, .. }
            | Command::Delete { offset, .. } => *offset,
        }
    }

    /// Query text, empty for `select`.
    pub fn query(&self) -> &str {
        match self {
            Command::Select { .. } => "",
            Command::Search { query, .. } | Command::Delete { query, .. } => query,
        }
    }

    pub fn encode(&self) -> Result<String, CommandError> {
        serde_json::to_string(self).map_err(|err| CommandError::Encode(err.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn search_command_has_exact_wire_fields() {
        let command = build(Action::Search, "rust", None, PAGE_LIMIT, 20).unwrap();
        let value: Value = serde_json::from_str(&command.encode().unwrap()).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(object["action"], "search");
        assert_eq!(object["query"], "rust");
        assert_eq!(object["limit"], 10);
        assert_eq!(object["offset"], 20);
    }

    #[test]
    fn select_omits_query_and_rowid() {
        let command = build(Action::Select, "ignored", Some(3), PAGE_LIMIT, 0).unwrap();
        let value: Value = serde_json::from_str(&command.encode().unwrap()).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object["action"], "select");
        assert!(object.get("query").is_none());
        assert!(object.get("rowid").is_none());
    }

    #[test]
    fn delete_carries_rowid_and_window() {
        let command = build(Action::Delete, "tag", Some(7), PAGE_LIMIT, 10).unwrap();
        let value: Value = serde_json::from_str(&command.encode().unwrap()).unwrap();

        assert_eq!(value["action"], "delete");
        assert_eq!(value["rowid"], 7);
        assert_eq!(value["query"], "tag");
        assert_eq!(value["offset"], 10);
    }

    #[test]
    fn delete_without_rowid_is_rejected() {
        let err = build(Action::Delete, "", None, PAGE_LIMIT, 0).unwrap_err();
        assert_eq!(err, CommandError::MissingRowId);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = build(Action::Search, "x", None, 0, 0).unwrap_err();
        assert_eq!(err, CommandError::ZeroLimit);
    }

    #[test]
    fn hostile_query_text_survives_verbatim() {
        let hostile = r#"a "quoted" \ back\slash", "action": "delete", "rowid": 1, "x": "#;
        let with_controls = format!("{hostile}\n\t\u{0}\u{1b}end");

        let command = build(Action::Search, &with_controls, None, PAGE_LIMIT, 0).unwrap();
        let wire = command.encode().unwrap();

        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 4);
        assert_eq!(value["action"], "search");
        assert_eq!(value["query"].as_str().unwrap(), with_controls);
        assert!(value.get("rowid").is_none());
    }

    #[test]
    fn every_action_decodes_back_to_itself() {
        for action in [Action::Select, Action::Search, Action::Delete] {
            let command = build(action, "quote \" 日本語", Some(42), PAGE_LIMIT, 30).unwrap();
            let decoded = Command::decode(&command.encode().unwrap()).unwrap();
            assert_eq!(decoded, command);
            assert_eq!(decoded.action(), action);
        }
    }
}
