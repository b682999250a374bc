use crate::error::Result;
use crate::models::{Contact, ContactUpdate, NewContact};
use crate::schema::{Schema, SchemaReport};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, ToSql};
use std::path::Path;

pub(crate) const CONTACT_COLUMNS: &str = "id, name, organization, job_title, email, phone,
    twitter, linkedin, notes, archived, created_at, updated_at";

/// Database handle. Holds the single connection for the process lifetime.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open database connection
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Database { conn })
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Database { conn })
    }

    /// Create or migrate the schema
    pub fn init(&self) -> Result<SchemaReport> {
        Schema::init(&self.conn)
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Schema::is_initialized(&self.conn)
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    // ==================== Contact Operations ====================

    pub fn create_contact(&self, contact: &NewContact) -> Result<i64> {
        let now = now_str();

        self.conn.execute(
            "INSERT INTO contacts (name, organization, job_title, email, phone,
                                   twitter, linkedin, notes, archived, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
            (
                &contact.name,
                &contact.organization,
                &contact.job_title,
                &contact.email,
                &contact.phone,
                &contact.twitter,
                &contact.linkedin,
                &contact.notes,
                &now,
            ),
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        self.conn
            .query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                [id],
                contact_from_row,
            )
            .optional()
            .map_err(|e| e.into())
    }

    pub fn list_contacts(&self, include_archived: bool) -> Result<Vec<Contact>> {
        let sql = if include_archived {
            format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY name COLLATE NOCASE, id")
        } else {
            format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE archived = 0
                 ORDER BY name COLLATE NOCASE, id"
            )
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let contacts = stmt.query_map([], contact_from_row)?;
        contacts
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.into())
    }

    /// Case-insensitive substring match over the identifying fields of
    /// non-archived contacts.
    pub fn search_contacts(&self, query: &str) -> Result<Vec<Contact>> {
        let pattern = like_pattern(query);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE archived = 0 AND (
                name LIKE ?1 ESCAPE '\\'
                OR organization LIKE ?1 ESCAPE '\\'
                OR job_title LIKE ?1 ESCAPE '\\'
                OR email LIKE ?1 ESCAPE '\\'
                OR twitter LIKE ?1 ESCAPE '\\'
                OR linkedin LIKE ?1 ESCAPE '\\'
             )
             ORDER BY name COLLATE NOCASE, id"
        ))?;

        let contacts = stmt.query_map([&pattern], contact_from_row)?;
        contacts
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.into())
    }

    pub fn list_by_organization(&self, organization: &str) -> Result<Vec<Contact>> {
        let pattern = like_pattern(organization);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE archived = 0 AND organization LIKE ?1 ESCAPE '\\'
             ORDER BY name COLLATE NOCASE, id"
        ))?;

        let contacts = stmt.query_map([&pattern], contact_from_row)?;
        contacts
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.into())
    }

    /// Apply the supplied fields. Returns whether a row changed.
    pub fn update_contact(&self, id: i64, update: &ContactUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let now = now_str();
        let mut sets: Vec<(&str, &dyn ToSql)> = Vec::new();
        if let Some(ref v) = update.name {
            sets.push(("name", v));
        }
        if let Some(ref v) = update.organization {
            sets.push(("organization", v));
        }
        if let Some(ref v) = update.job_title {
            sets.push(("job_title", v));
        }
        if let Some(ref v) = update.email {
            sets.push(("email", v));
        }
        if let Some(ref v) = update.phone {
            sets.push(("phone", v));
        }
        if let Some(ref v) = update.twitter {
            sets.push(("twitter", v));
        }
        if let Some(ref v) = update.linkedin {
            sets.push(("linkedin", v));
        }
        if let Some(ref v) = update.notes {
            sets.push(("notes", v));
        }
        sets.push(("updated_at", &now));

        self.update_row("contacts", id, &sets)
    }

    /// Archive a contact. Returns false when it was already archived or absent.
    pub fn archive_contact(&self, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE contacts SET archived = 1, updated_at = ?1 WHERE id = ?2 AND archived = 0",
            (now_str(), id),
        )?;
        Ok(rows > 0)
    }

    /// Build and run `UPDATE table SET a = ?, b = ? WHERE id = ?`.
    pub(crate) fn update_row(
        &self,
        table: &str,
        id: i64,
        sets: &[(&str, &dyn ToSql)],
    ) -> Result<bool> {
        let assignments = sets
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {table} SET {assignments} WHERE id = ?{}",
            sets.len() + 1
        );

        let mut params: Vec<&dyn ToSql> = sets.iter().map(|(_, v)| *v).collect();
        params.push(&id);

        let rows = self.conn.execute(&sql, params.as_slice())?;
        Ok(rows > 0)
    }
}

// ==================== Helpers ====================

pub(crate) fn now_str() -> String {
    Utc::now().to_rfc3339()
}

/// `%query%` with LIKE wildcards in the query matched literally
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

// ==================== Row Parsers ====================

pub(crate) fn contact_from_row(row: &Row) -> std::result::Result<Contact, rusqlite::Error> {
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        organization: row.get(2)?,
        job_title: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        twitter: row.get(6)?,
        linkedin: row.get(7)?,
        notes: row.get(8)?,
        archived: row.get(9)?,
        created_at: parse_datetime(row.get(10)?)?,
        updated_at: parse_datetime(row.get(11)?)?,
    })
}

pub(crate) fn parse_datetime(s: String) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Naive formats are assumed to be UTC
    if let Ok(ndt) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
    }
    Err(rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Cannot parse datetime: {s}"),
        )),
    ))
}
