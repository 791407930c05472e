use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{tags, Store};
use crate::error::{StoreError, StoreResult};
use crate::models::{photo_url, Address, Card, CardInput, CardSummary, Email, Phone};

const SUMMARY_COLUMNS: &str =
    "c.id, c.name, c.title, c.company, c.website, c.notes, c.photo_path, c.created_at, c.updated_at";

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<CardSummary> {
    let photo_path: String = row.get(6)?;
    Ok(CardSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        title: row.get(2)?,
        company: row.get(3)?,
        website: row.get(4)?,
        notes: row.get(5)?,
        photo_url: photo_url(&photo_path),
        tags: Vec::new(),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Escapes LIKE wildcards so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn required_name(input: &CardInput) -> StoreResult<String> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("name is required".to_string()));
    }
    Ok(name.to_string())
}

fn insert_children(conn: &Connection, card_id: i64, input: &CardInput) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO card_phones (card_id, label, number) VALUES (?1, ?2, ?3)",
    )?;
    for p in input.phones.iter().filter(|p| p.is_storable()) {
        stmt.execute(params![card_id, p.label, p.number])?;
    }

    let mut stmt = conn.prepare_cached(
        "INSERT INTO card_emails (card_id, label, address) VALUES (?1, ?2, ?3)",
    )?;
    for e in input.emails.iter().filter(|e| e.is_storable()) {
        stmt.execute(params![card_id, e.label, e.address])?;
    }

    let mut stmt = conn.prepare_cached(
        "INSERT INTO card_addresses (card_id, label, street, city, country, postal)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for a in input.addresses.iter().filter(|a| a.is_storable()) {
        stmt.execute(params![card_id, a.label, a.street, a.city, a.country, a.postal])?;
    }

    tags::link_all(conn, card_id, &input.tags)
}

fn load_card(conn: &Connection, id: i64) -> rusqlite::Result<Option<Card>> {
    let summary = conn
        .query_row(
            &format!("SELECT {SUMMARY_COLUMNS} FROM cards c WHERE c.id = ?1"),
            params![id],
            summary_from_row,
        )
        .optional()?;
    let Some(summary) = summary else {
        return Ok(None);
    };

    let mut stmt =
        conn.prepare_cached("SELECT id, label, number FROM card_phones WHERE card_id = ?1 ORDER BY id")?;
    let phones = stmt
        .query_map(params![id], |row| {
            Ok(Phone {
                id: row.get(0)?,
                label: row.get(1)?,
                number: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt =
        conn.prepare_cached("SELECT id, label, address FROM card_emails WHERE card_id = ?1 ORDER BY id")?;
    let emails = stmt
        .query_map(params![id], |row| {
            Ok(Email {
                id: row.get(0)?,
                label: row.get(1)?,
                address: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT id, label, street, city, country, postal
         FROM card_addresses WHERE card_id = ?1 ORDER BY id",
    )?;
    let addresses = stmt
        .query_map(params![id], |row| {
            Ok(Address {
                id: row.get(0)?,
                label: row.get(1)?,
                street: row.get(2)?,
                city: row.get(3)?,
                country: row.get(4)?,
                postal: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(Card {
        id: summary.id,
        name: summary.name,
        title: summary.title,
        company: summary.company,
        website: summary.website,
        notes: summary.notes,
        photo_url: summary.photo_url,
        phones,
        emails,
        addresses,
        tags: tags::names_for_card(conn, id)?,
        created_at: summary.created_at,
        updated_at: summary.updated_at,
    }))
}

fn stored_photo_path(conn: &Connection, id: i64) -> StoreResult<String> {
    conn.query_row("SELECT photo_path FROM cards WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?
        .ok_or(StoreError::NotFound(id))
}

impl Store {
    /// Lists cards, most recently updated first.
    ///
    /// `search` matches name, company or any email address, case-insensitively.
    /// `tag` restricts the result to cards carrying that one tag. Both filters
    /// combine with AND; blank values are ignored.
    pub fn list(&self, search: Option<&str>, tag: Option<&str>) -> StoreResult<Vec<CardSummary>> {
        let mut sql = format!("SELECT {SUMMARY_COLUMNS} FROM cards c");
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if let Some(tag) = tag.and_then(tags::normalize) {
            args.push(tag);
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM card_tags ct JOIN tags t ON t.id = ct.tag_id
                         WHERE ct.card_id = c.id AND t.name = ?{})",
                args.len()
            ));
        }
        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            args.push(format!("%{}%", escape_like(term)));
            let n = args.len();
            clauses.push(format!(
                r"(c.name LIKE ?{n} ESCAPE '\' OR c.company LIKE ?{n} ESCAPE '\'
                   OR EXISTS (SELECT 1 FROM card_emails e
                              WHERE e.card_id = c.id AND e.address LIKE ?{n} ESCAPE '\'))"
            ));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY c.updated_at DESC, c.id DESC");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut cards = stmt
            .query_map(params_from_iter(args.iter()), summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for card in &mut cards {
            card.tags = tags::names_for_card(&conn, card.id)?;
        }
        Ok(cards)
    }

    /// The fully hydrated card, or `None` if no such id exists.
    pub fn get(&self, id: i64) -> StoreResult<Option<Card>> {
        let conn = self.lock();
        Ok(load_card(&conn, id)?)
    }

    pub fn exists(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock();
        let found = conn
            .query_row("SELECT 1 FROM cards WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Inserts the card, its children and its tag links in one transaction.
    pub fn create(&self, input: &CardInput) -> StoreResult<i64> {
        let name = required_name(input)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO cards (name, title, company, website, notes) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, input.title, input.company, input.website, input.notes],
        )?;
        let id = tx.last_insert_rowid();
        insert_children(&tx, id, input)?;
        tx.commit()?;
        debug!(card_id = id, "card created");
        Ok(id)
    }

    /// Replaces the scalar fields and every child collection of a card.
    /// Fails with `NotFound` (and writes nothing) if the card is missing.
    pub fn update(&self, id: i64, input: &CardInput) -> StoreResult<()> {
        let name = required_name(input)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE cards
             SET name = ?1, title = ?2, company = ?3, website = ?4, notes = ?5,
                 updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
             WHERE id = ?6",
            params![name, input.title, input.company, input.website, input.notes, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        for table in ["card_phones", "card_emails", "card_addresses", "card_tags"] {
            tx.execute(&format!("DELETE FROM {table} WHERE card_id = ?1"), params![id])?;
        }
        insert_children(&tx, id, input)?;
        tx.commit()?;
        debug!(card_id = id, "card replaced");
        Ok(())
    }

    /// Deletes the card (children and tag links cascade) and hands back the
    /// photo path it held so the caller can remove the file.
    pub fn delete(&self, id: i64) -> StoreResult<String> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let photo_path = stored_photo_path(&tx, id)?;
        tx.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
        tx.commit()?;
        debug!(card_id = id, "card deleted");
        Ok(photo_path)
    }

    /// Points the card at a new photo; returns the path it replaced.
    pub fn update_photo_path(&self, id: i64, path: &str) -> StoreResult<String> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let previous = stored_photo_path(&tx, id)?;
        tx.execute(
            "UPDATE cards SET photo_path = ?1, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
             WHERE id = ?2",
            params![path, id],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    /// Unlinks the card's photo; returns the path it held (possibly empty).
    pub fn clear_photo_path(&self, id: i64) -> StoreResult<String> {
        self.update_photo_path(id, "")
    }
}
