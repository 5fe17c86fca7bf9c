use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, types::Value, Connection, Row};
use uuid::Uuid;

use crate::models::{Item, NewNote, PageResult};

const ITEM_COLUMNS: &str =
    "rowid, title, url, tags, description, comments, annotations, created_at, is_public";

/// Each whitespace-separated word must appear in at least one of these.
const SEARCHED_COLUMNS: [&str; 4] = ["title", "url", "tags", "description"];

/// The page at `offset` for `query`, newest first, with the total match count.
/// An empty or all-whitespace query matches every note.
pub fn search(conn: &Connection, query: &str, limit: u32, offset: u32) -> Result<PageResult> {
    let words = like_patterns(query);
    let filter = where_clause(words.len());

    let count: i64 = conn
        .query_row(
            &format!("SELECT count(1) FROM note{filter}"),
            params_from_iter(words.iter()),
            |row| row.get(0),
        )
        .context("failed to count notes")?;

    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM note{filter}
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?{} OFFSET ?{}",
        words.len() + 1,
        words.len() + 2
    );
    let mut values: Vec<Value> = words.into_iter().map(Value::Text).collect();
    values.push(Value::Integer(i64::from(limit)));
    values.push(Value::Integer(i64::from(offset)));

    let mut stmt = conn.prepare(&sql).context("failed to prepare search")?;
    let items = stmt
        .query_map(params_from_iter(values.iter()), row_to_item)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to read notes")?;

    Ok(PageResult::new(to_u64(count, "count")?, items)?)
}

pub fn select(conn: &Connection, limit: u32, offset: u32) -> Result<PageResult> {
    search(conn, "", limit, offset)
}

/// Removes one note. Returns whether a row was deleted.
pub fn delete(conn: &Connection, row_id: i64) -> Result<bool> {
    let changed = conn
        .execute("DELETE FROM note WHERE rowid = ?1", params![row_id])
        .with_context(|| format!("failed to delete note {row_id}"))?;
    Ok(changed > 0)
}

/// Inserts `note` with a fresh uuid and timestamp and returns its row id.
pub fn insert_note(conn: &Connection, note: &NewNote) -> Result<i64> {
    conn.execute(
        "INSERT INTO note (uuid4, title, url, tags, description, comments, annotations, created_at, is_public)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            Uuid::new_v4().to_string(),
            note.title,
            note.url,
            make_tags(&note.tags),
            note.description,
            note.comments,
            note.annotations,
            created_at_now(),
            note.is_public,
        ],
    )
    .context("failed to insert note")?;

    Ok(conn.last_insert_rowid())
}

pub fn count_notes(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT count(1) FROM note", [], |row| row.get(0))
        .context("failed to count notes")?;
    to_u64(count, "count")
}

pub fn get_note(conn: &Connection, row_id: i64) -> Result<Option<Item>> {
    let mut stmt = conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM note WHERE rowid = ?1"))?;
    let mut rows = stmt.query(params![row_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_item(row)?)),
        None => Ok(None),
    }
}

/// Normalises user-typed tags: commas and whitespace both separate, empty
/// tags are dropped, and a repeated tag keeps only its last position.
pub fn make_tags(input: &str) -> String {
    let mut tags: Vec<&str> = Vec::new();
    for tag in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|tag| !tag.is_empty())
    {
        tags.retain(|seen| *seen != tag);
        tags.push(tag);
    }
    tags.join(",")
}

/// `%word%` for every word in `query`, with LIKE wildcards in the word escaped.
fn like_patterns(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|word| format!("%{}%", escape_like(word)))
        .collect()
}

fn escape_like(word: &str) -> String {
    let mut escaped = String::with_capacity(word.len());
    for c in word.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn where_clause(word_count: usize) -> String {
    if word_count == 0 {
        return String::new();
    }

    let groups: Vec<String> = (1..=word_count)
        .map(|n| {
            let columns: Vec<String> = SEARCHED_COLUMNS
                .iter()
                .map(|column| format!("{column} LIKE ?{n} ESCAPE '\\'"))
                .collect();
            format!("({})", columns.join(" OR "))
        })
        .collect();

    format!(" WHERE {}", groups.join(" AND "))
}

fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        row_id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        tags: row.get(3)?,
        description: row.get(4)?,
        comments: row.get(5)?,
        annotations: row.get(6)?,
        created_at: row.get(7)?,
        is_public: row.get(8)?,
    })
}

/// `2024-03-01 10:00:00:000000042 UTC`; nanoseconds are zero-padded so text
/// order matches time order.
fn created_at_now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S:%9f UTC").to_string()
}
