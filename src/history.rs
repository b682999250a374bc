//! Interaction log and task list storage, scoped by contact.

use crate::db::{Database, now_str, parse_datetime};
use crate::error::Result;
use crate::models::{
    ContactEntry, ContactTodo, EntryKind, EntryUpdate, NewEntry, NewTodo, RecentEntry,
    TodoFilter, TodoUpdate,
};
use rusqlite::{OptionalExtension, Row, ToSql};

/// Limit used by [`Database::get_recent`] when the caller gives none
pub const DEFAULT_RECENT_LIMIT: u32 = 10;

const ENTRY_COLUMNS: &str = "e.id, e.contact_id, e.kind, e.subject, e.content,
    e.interaction_date, e.created_at";

const TODO_COLUMNS: &str = "id, contact_id, text, target_date, completed, created_at, updated_at";

/// Sort direction over interaction dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chronology {
    OldestFirst,
    NewestFirst,
}

impl Chronology {
    fn order_by(self) -> &'static str {
        match self {
            Chronology::OldestFirst => "e.interaction_date ASC, e.id ASC",
            Chronology::NewestFirst => "e.interaction_date DESC, e.id DESC",
        }
    }
}

impl Database {
    // ==================== Entry Operations ====================

    /// Insert an entry. The owning contact id is stored as given.
    pub fn add_entry(&self, entry: &NewEntry) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO contact_entries (contact_id, kind, subject, content, interaction_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                entry.contact_id,
                entry.kind.as_str(),
                &entry.subject,
                &entry.content,
                &entry.interaction_date,
                now_str(),
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_entry(&self, id: i64) -> Result<Option<ContactEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM contact_entries e WHERE e.id = ?1"),
                [id],
                entry_from_row,
            )
            .optional()
            .map_err(|e| e.into())
    }

    /// Entries for one contact, newest interaction first
    pub fn get_history(&self, contact_id: i64, limit: Option<u32>) -> Result<Vec<ContactEntry>> {
        self.entries_for(Some(contact_id), Chronology::NewestFirst, limit)
    }

    /// Entries in the given order, optionally scoped to one contact
    pub fn entries_for(
        &self,
        contact_id: Option<i64>,
        order: Chronology,
        limit: Option<u32>,
    ) -> Result<Vec<ContactEntry>> {
        let limit = limit.map(i64::from).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM contact_entries e
             WHERE (?1 IS NULL OR e.contact_id = ?1)
             ORDER BY {}
             LIMIT ?2",
            order.order_by()
        ))?;

        let entries = stmt.query_map((contact_id, limit), entry_from_row)?;
        entries
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.into())
    }

    /// All entries joined with contact names. Archived contacts included.
    pub fn entries_with_names(&self, order: Chronology) -> Result<Vec<RecentEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS}, COALESCE(c.name, '') FROM contact_entries e
             LEFT JOIN contacts c ON c.id = e.contact_id
             ORDER BY {}",
            order.order_by()
        ))?;

        let entries = stmt.query_map([], recent_from_row)?;
        entries
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.into())
    }

    /// Most recent entries across all non-archived contacts
    pub fn get_recent(&self, limit: Option<u32>) -> Result<Vec<RecentEntry>> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS}, c.name FROM contact_entries e
             JOIN contacts c ON c.id = e.contact_id
             WHERE c.archived = 0
             ORDER BY {}
             LIMIT ?1",
            Chronology::NewestFirst.order_by()
        ))?;

        let entries = stmt.query_map([limit], recent_from_row)?;
        entries
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.into())
    }

    pub fn update_entry(&self, id: i64, update: &EntryUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let kind = update.kind.map(|k| k.as_str());
        let mut sets: Vec<(&str, &dyn ToSql)> = Vec::new();
        if let Some(ref v) = kind {
            sets.push(("kind", v));
        }
        if let Some(ref v) = update.subject {
            sets.push(("subject", v));
        }
        if let Some(ref v) = update.content {
            sets.push(("content", v));
        }
        if let Some(ref v) = update.interaction_date {
            sets.push(("interaction_date", v));
        }

        self.update_row("contact_entries", id, &sets)
    }

    pub fn delete_entry(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM contact_entries WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    // ==================== Todo Operations ====================

    pub fn add_todo(&self, todo: &NewTodo) -> Result<i64> {
        let now = now_str();
        self.conn.execute(
            "INSERT INTO contact_todos (contact_id, text, target_date, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            (todo.contact_id, &todo.text, &todo.target_date, &now),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_todo(&self, id: i64) -> Result<Option<ContactTodo>> {
        self.conn
            .query_row(
                &format!("SELECT {TODO_COLUMNS} FROM contact_todos WHERE id = ?1"),
                [id],
                todo_from_row,
            )
            .optional()
            .map_err(|e| e.into())
    }

    /// Todos matching every supplied filter. Ordered by target date with
    /// undated todos last, then by creation time.
    pub fn get_todos(&self, filter: &TodoFilter) -> Result<Vec<ContactTodo>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<&dyn ToSql> = Vec::new();

        if let Some(ref id) = filter.contact_id {
            clauses.push("contact_id = ?");
            params.push(id);
        }
        if !filter.include_completed {
            clauses.push("completed = 0");
        }
        // Bounds compare on their own width, so a bare date covers that whole day.
        let bounds = [
            ("substr(target_date, 1, length(?)) <= ?", &filter.target_before),
            ("substr(target_date, 1, length(?)) >= ?", &filter.target_after),
            ("substr(created_at, 1, length(?)) <= ?", &filter.created_before),
            ("substr(created_at, 1, length(?)) >= ?", &filter.created_after),
        ];
        for (clause, bound) in bounds {
            if let Some(v) = bound {
                clauses.push(clause);
                params.push(v);
                params.push(v);
            }
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM contact_todos {where_clause}
             ORDER BY target_date IS NULL, target_date ASC, created_at ASC, id ASC"
        ))?;

        let todos = stmt.query_map(params.as_slice(), todo_from_row)?;
        todos
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.into())
    }

    pub fn update_todo(&self, id: i64, update: &TodoUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let now = now_str();
        let mut sets: Vec<(&str, &dyn ToSql)> = Vec::new();
        if let Some(ref v) = update.text {
            sets.push(("text", v));
        }
        if let Some(ref v) = update.target_date {
            sets.push(("target_date", v));
        }
        if let Some(ref v) = update.completed {
            sets.push(("completed", v));
        }
        sets.push(("updated_at", &now));

        self.update_row("contact_todos", id, &sets)
    }

    pub fn delete_todo(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM contact_todos WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }
}

// ==================== Row Parsers ====================

fn entry_from_row(row: &Row) -> std::result::Result<ContactEntry, rusqlite::Error> {
    let kind_str: String = row.get(2)?;
    let kind = EntryKind::try_from(kind_str.as_str()).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid entry kind: {e}"),
            )),
        )
    })?;

    Ok(ContactEntry {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        kind,
        subject: row.get(3)?,
        content: row.get(4)?,
        interaction_date: row.get(5)?,
        created_at: parse_datetime(row.get(6)?)?,
    })
}

fn recent_from_row(row: &Row) -> std::result::Result<RecentEntry, rusqlite::Error> {
    Ok(RecentEntry {
        entry: entry_from_row(row)?,
        contact_name: row.get(7)?,
    })
}

fn todo_from_row(row: &Row) -> std::result::Result<ContactTodo, rusqlite::Error> {
    Ok(ContactTodo {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        text: row.get(2)?,
        target_date: row.get(3)?,
        completed: row.get(4)?,
        created_at: parse_datetime(row.get(5)?)?,
        updated_at: parse_datetime(row.get(6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewContact;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let id = db
            .create_contact(&NewContact {
                name: "Ada Lovelace".to_string(),
                ..Default::default()
            })
            .unwrap();
        (db, id)
    }

    fn entry(contact_id: i64, kind: EntryKind, subject: &str, date: &str) -> NewEntry {
        NewEntry {
            contact_id,
            kind,
            subject: subject.to_string(),
            content: None,
            interaction_date: date.to_string(),
        }
    }

    fn todo(contact_id: i64, text: &str, target_date: Option<&str>) -> NewTodo {
        NewTodo {
            contact_id,
            text: text.to_string(),
            target_date: target_date.map(str::to_string),
        }
    }

    #[test]
    fn test_history_newest_first() {
        let (db, ada) = setup();

        db.add_entry(&entry(ada, EntryKind::Note, "intro", "2023-01-01T00:00:00Z"))
            .unwrap();
        db.add_entry(&entry(ada, EntryKind::Call, "follow-up", "2023-02-01T00:00:00Z"))
            .unwrap();

        let history = db.get_history(ada, None).unwrap();
        let subjects: Vec<&str> = history.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["follow-up", "intro"]);
        assert_eq!(history[0].kind, EntryKind::Call);
    }

    #[test]
    fn test_backdated_entry_keeps_caller_date() {
        let (db, ada) = setup();

        let id = db
            .add_entry(&entry(ada, EntryKind::Meeting, "old", "1843-09-01"))
            .unwrap();
        let stored = db.get_entry(id).unwrap().unwrap();
        assert_eq!(stored.interaction_date, "1843-09-01");
    }

    #[test]
    fn test_history_limit_is_prefix() {
        let (db, ada) = setup();

        for day in 1..=6 {
            db.add_entry(&entry(
                ada,
                EntryKind::Email,
                &format!("mail {day}"),
                &format!("2024-03-0{day}"),
            ))
            .unwrap();
        }

        let all = db.get_history(ada, None).unwrap();
        for n in 0..=8u32 {
            let limited = db.get_history(ada, Some(n)).unwrap();
            assert!(limited.len() <= n as usize);
            assert_eq!(limited[..], all[..limited.len()]);
        }
    }

    #[test]
    fn test_history_scoped_to_contact() {
        let (db, ada) = setup();
        let other = db
            .create_contact(&NewContact {
                name: "Charles Babbage".to_string(),
                ..Default::default()
            })
            .unwrap();

        db.add_entry(&entry(ada, EntryKind::Note, "mine", "2023-01-01"))
            .unwrap();
        db.add_entry(&entry(other, EntryKind::Note, "theirs", "2023-01-02"))
            .unwrap();

        let history = db.get_history(ada, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].subject, "mine");
    }

    #[test]
    fn test_recent_skips_archived_and_defaults_to_ten() {
        let (db, ada) = setup();
        let gone = db
            .create_contact(&NewContact {
                name: "Archived Person".to_string(),
                ..Default::default()
            })
            .unwrap();

        for i in 0..12 {
            let date = format!("2024-01-{:02}", i + 1);
            db.add_entry(&entry(ada, EntryKind::Note, &format!("n{i}"), &date))
                .unwrap();
        }
        db.add_entry(&entry(gone, EntryKind::Note, "hidden", "2030-01-01"))
            .unwrap();
        db.archive_contact(gone).unwrap();

        let recent = db.get_recent(None).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].entry.subject, "n11");
        assert!(recent.iter().all(|r| r.contact_name == "Ada Lovelace"));

        assert_eq!(db.get_recent(Some(3)).unwrap().len(), 3);
    }

    #[test]
    fn test_update_entry_changes_only_named_fields() {
        let (db, ada) = setup();

        let id = db
            .add_entry(&NewEntry {
                content: Some("original body".to_string()),
                ..entry(ada, EntryKind::Note, "draft", "2023-05-05")
            })
            .unwrap();
        let before = db.get_entry(id).unwrap().unwrap();

        assert!(!db.update_entry(id, &EntryUpdate::default()).unwrap());
        assert_eq!(db.get_entry(id).unwrap().unwrap(), before);

        let changed = db
            .update_entry(
                id,
                &EntryUpdate {
                    kind: Some(EntryKind::Meeting),
                    subject: Some("final".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(changed);

        let after = db.get_entry(id).unwrap().unwrap();
        assert_eq!(after.kind, EntryKind::Meeting);
        assert_eq!(after.subject, "final");
        assert_eq!(after.content, before.content);
        assert_eq!(after.interaction_date, before.interaction_date);
        assert_eq!(after.created_at, before.created_at);
    }

    #[test]
    fn test_update_entry_clears_content() {
        let (db, ada) = setup();

        let id = db
            .add_entry(&NewEntry {
                content: Some("typo".to_string()),
                ..entry(ada, EntryKind::Email, "sent", "2023-05-05")
            })
            .unwrap();

        let update = EntryUpdate {
            content: Some(None),
            ..Default::default()
        };
        assert!(db.update_entry(id, &update).unwrap());

        let after = db.get_entry(id).unwrap().unwrap();
        assert_eq!(after.content, None);
        assert_eq!(after.subject, "sent");
    }

    #[test]
    fn test_update_missing_entry() {
        let (db, _ada) = setup();
        let update = EntryUpdate {
            subject: Some("nothing".to_string()),
            ..Default::default()
        };
        assert!(!db.update_entry(404, &update).unwrap());
    }

    #[test]
    fn test_delete_entry() {
        let (db, ada) = setup();

        let id = db
            .add_entry(&entry(ada, EntryKind::Task, "temp", "2023-01-01"))
            .unwrap();
        assert!(db.delete_entry(id).unwrap());
        assert!(!db.delete_entry(id).unwrap());
        assert!(db.get_entry(id).unwrap().is_none());
        assert!(db.get_contact(ada).unwrap().is_some());
    }

    #[test]
    fn test_todo_ordering_puts_undated_last() {
        let (db, ada) = setup();

        db.add_todo(&todo(ada, "no date", None)).unwrap();
        db.add_todo(&todo(ada, "later", Some("2024-06-01"))).unwrap();
        db.add_todo(&todo(ada, "sooner", Some("2024-01-01"))).unwrap();

        let texts: Vec<String> = db
            .get_todos(&TodoFilter::default())
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["sooner", "later", "no date"]);
    }

    #[test]
    fn test_todo_filters_combine() {
        let (db, ada) = setup();
        let other = db
            .create_contact(&NewContact {
                name: "Other".to_string(),
                ..Default::default()
            })
            .unwrap();

        let done = db.add_todo(&todo(ada, "done", Some("2024-02-01"))).unwrap();
        db.add_todo(&todo(ada, "feb", Some("2024-02-15"))).unwrap();
        db.add_todo(&todo(ada, "dec", Some("2024-12-01"))).unwrap();
        db.add_todo(&todo(other, "theirs", Some("2024-02-10"))).unwrap();
        db.update_todo(
            done,
            &TodoUpdate {
                completed: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let filter = TodoFilter {
            contact_id: Some(ada),
            target_after: Some("2024-02-01".to_string()),
            target_before: Some("2024-03-01".to_string()),
            ..Default::default()
        };
        let texts: Vec<String> = db
            .get_todos(&filter)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["feb"]);

        let with_completed = TodoFilter {
            include_completed: true,
            ..filter
        };
        assert_eq!(db.get_todos(&with_completed).unwrap().len(), 2);
    }

    #[test]
    fn test_todo_created_bounds() {
        let (db, ada) = setup();

        db.add_todo(&todo(ada, "now", None)).unwrap();

        let past = TodoFilter {
            created_before: Some("2000-01-01".to_string()),
            ..Default::default()
        };
        assert!(db.get_todos(&past).unwrap().is_empty());

        let since = TodoFilter {
            created_after: Some("2000-01-01".to_string()),
            ..Default::default()
        };
        assert_eq!(db.get_todos(&since).unwrap().len(), 1);
    }

    #[test]
    fn test_todo_created_bounds_include_same_day() {
        let (db, ada) = setup();

        let id = db.add_todo(&todo(ada, "today", None)).unwrap();
        let created = db.get_todo(id).unwrap().unwrap().created_at;
        let day = created.format("%Y-%m-%d").to_string();

        let up_to_today = TodoFilter {
            created_before: Some(day.clone()),
            ..Default::default()
        };
        assert_eq!(db.get_todos(&up_to_today).unwrap().len(), 1);

        let from_today = TodoFilter {
            created_after: Some(day.clone()),
            ..Default::default()
        };
        assert_eq!(db.get_todos(&from_today).unwrap().len(), 1);

        let same_day = TodoFilter {
            created_after: Some(day.clone()),
            created_before: Some(day),
            ..Default::default()
        };
        assert_eq!(db.get_todos(&same_day).unwrap().len(), 1);
    }

    #[test]
    fn test_target_bounds_include_timed_dates() {
        let (db, ada) = setup();

        db.add_todo(&todo(ada, "afternoon", Some("2024-03-01T15:00:00Z")))
            .unwrap();
        db.add_todo(&todo(ada, "next day", Some("2024-03-02"))).unwrap();

        let filter = TodoFilter {
            target_before: Some("2024-03-01".to_string()),
            ..Default::default()
        };
        let texts: Vec<String> = db
            .get_todos(&filter)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["afternoon"]);
    }

    #[test]
    fn test_update_and_delete_todo() {
        let (db, ada) = setup();

        let id = db.add_todo(&todo(ada, "call back", None)).unwrap();
        let before = db.get_todo(id).unwrap().unwrap();
        assert!(!before.completed);
        assert_eq!(before.created_at, before.updated_at);

        assert!(!db.update_todo(id, &TodoUpdate::default()).unwrap());

        let changed = db
            .update_todo(
                id,
                &TodoUpdate {
                    target_date: Some(Some("2025-01-01".to_string())),
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(changed);

        let after = db.get_todo(id).unwrap().unwrap();
        assert_eq!(after.text, "call back");
        assert_eq!(after.target_date.as_deref(), Some("2025-01-01"));
        assert!(after.completed);

        let undated = TodoUpdate {
            target_date: Some(None),
            ..Default::default()
        };
        assert!(db.update_todo(id, &undated).unwrap());
        assert_eq!(db.get_todo(id).unwrap().unwrap().target_date, None);

        assert!(db.delete_todo(id).unwrap());
        assert!(!db.delete_todo(id).unwrap());
    }
}
