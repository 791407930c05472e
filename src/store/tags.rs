//! Tag Dictionary: the shared `name -> id` table and card associations.
//!
//! Tags are never deleted here; a tag with no cards left keeps appearing in
//! `list_tags` with a zero count.

use rusqlite::{params, Connection};

use super::Store;
use crate::error::StoreResult;
use crate::models::TagCount;

/// Canonical form of a tag name: trimmed and lower-cased. Blank names have none.
pub fn normalize(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Returns the id of `name`, inserting it first if needed. `name` must
/// already be normalized.
pub fn upsert_by_name(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "INSERT INTO tags (name) VALUES (?1)
         ON CONFLICT(name) DO UPDATE SET name = excluded.name
         RETURNING id",
        params![name],
        |row| row.get(0),
    )
}

pub fn associate(conn: &Connection, card_id: i64, tag_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO card_tags (card_id, tag_id) VALUES (?1, ?2)",
        params![card_id, tag_id],
    )?;
    Ok(())
}

/// Resolves every name and links it to the card. Runs on the caller's
/// transaction so a failure unwinds the new tags with everything else.
pub(crate) fn link_all(conn: &Connection, card_id: i64, names: &[String]) -> rusqlite::Result<()> {
    for name in names.iter().filter_map(|n| normalize(n)) {
        let tag_id = upsert_by_name(conn, &name)?;
        associate(conn, card_id, tag_id)?;
    }
    Ok(())
}

pub(crate) fn names_for_card(conn: &Connection, card_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.name FROM tags t
         JOIN card_tags ct ON ct.tag_id = t.id
         WHERE ct.card_id = ?1
         ORDER BY t.name",
    )?;
    let names = stmt
        .query_map(params![card_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

impl Store {
    /// Every tag with the number of cards using it, ordered by name.
    pub fn list_tags(&self) -> StoreResult<Vec<TagCount>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT t.name, COUNT(ct.card_id)
             FROM tags t
             LEFT JOIN card_tags ct ON ct.tag_id = t.id
             GROUP BY t.id, t.name
             ORDER BY t.name",
        )?;
        let tags = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    name: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }
}
