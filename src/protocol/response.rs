use serde_json::{Map, Value};

use crate::models::{Item, PageResult};

use super::DecodeError;

/// Decodes a store response into a [`PageResult`].
///
/// Every required field is checked for presence and type before any item is
/// built; nothing is defaulted.
pub fn parse(raw: &str) -> Result<PageResult, DecodeError> {
    let envelope = envelope(raw)?;

    if let Some(message) = store_error(&envelope) {
        return Err(DecodeError::StoreReported(message));
    }

    let count = required(&envelope, "count", "count")?
        .as_u64()
        .ok_or_else(|| DecodeError::TypeMismatch("count".into()))?;

    let notes = required(&envelope, "notes", "notes")?
        .as_array()
        .ok_or_else(|| DecodeError::TypeMismatch("notes".into()))?;

    let items = notes
        .iter()
        .enumerate()
        .map(|(index, note)| parse_item(index, note))
        .collect::<Result<Vec<_>, _>>()?;

    PageResult::new(count, items)
}

/// [`parse`] plus the page-size invariant for a request of `limit` items.
pub fn parse_page(raw: &str, limit: u32) -> Result<PageResult, DecodeError> {
    let page = parse(raw)?;
    if page.len() > limit as usize {
        return Err(DecodeError::PageOverflow {
            limit,
            received: page.len(),
        });
    }
    Ok(page)
}

/// Checks the reply to a command whose body is not consumed (delete).
///
/// Only the store's explicit error envelope counts as a failure; anything else,
/// including an empty reply, is accepted because the caller refreshes anyway.
pub fn check_ack(raw: &str) -> Result<(), DecodeError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(envelope)) => match store_error(&envelope) {
            Some(message) => Err(DecodeError::StoreReported(message)),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

fn envelope(raw: &str) -> Result<Map<String, Value>, DecodeError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| DecodeError::MalformedEnvelope(err.to_string()))?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::MalformedEnvelope(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

fn store_error(envelope: &Map<String, Value>) -> Option<String> {
    match envelope.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    }
}

fn required<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value, DecodeError> {
    match object.get(key) {
        Some(Value::Null) | None => Err(DecodeError::MissingField(path.to_string())),
        Some(value) => Ok(value),
    }
}

fn parse_item(index: usize, note: &Value) -> Result<Item, DecodeError> {
    let prefix = format!("notes[{index}]");
    let object = note
        .as_object()
        .ok_or_else(|| DecodeError::TypeMismatch(prefix.clone()))?;

    let row_id = item_field(object, &prefix, "rowid")?
        .as_i64()
        .ok_or_else(|| mismatch(&prefix, "rowid"))?;
    let is_public = item_field(object, &prefix, "is_public")?
        .as_bool()
        .ok_or_else(|| mismatch(&prefix, "is_public"))?;

    Ok(Item {
        row_id,
        title: item_text(object, &prefix, "title")?,
        url: item_text(object, &prefix, "url")?,
        tags: item_text(object, &prefix, "tags")?,
        description: item_text(object, &prefix, "description")?,
        comments: item_text(object, &prefix, "comments")?,
        annotations: item_text(object, &prefix, "annotations")?,
        created_at: item_text(object, &prefix, "created_at")?,
        is_public,
    })
}

fn item_field<'a>(
    object: &'a Map<String, Value>,
    prefix: &str,
    key: &str,
) -> Result<&'a Value, DecodeError> {
    required(object, key, &format!("{prefix}.{key}"))
}

fn item_text(object: &Map<String, Value>, prefix: &str, key: &str) -> Result<String, DecodeError> {
    item_field(object, prefix, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(prefix, key))
}

fn mismatch(prefix: &str, key: &str) -> DecodeError {
    DecodeError::TypeMismatch(format!("{prefix}.{key}"))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
