//! CSV rendering of contacts and their history.
//!
//! Every text cell is quoted with embedded quotes doubled, including empty
//! cells. Ids are written as bare decimals. Header rows are plain.

use crate::db::Database;
use crate::error::{CrmError, Result};
use crate::history::Chronology;
use crate::models::{Contact, ContactEntry, CsvExport, RecentEntry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Separator between entries in the history cell of a full export
pub const HISTORY_SEPARATOR: &str = " | ";

const CONTACT_HEADER: &[&str] = &[
    "ID",
    "Name",
    "Organization",
    "Job Title",
    "Email",
    "Phone",
    "Twitter",
    "LinkedIn",
    "Notes",
    "Archived",
    "Created At",
    "Updated At",
];

const HISTORY_HEADER: &[&str] = &[
    "Entry ID",
    "Contact ID",
    "Contact Name",
    "Date",
    "Type",
    "Subject",
    "Content",
    "Created At",
];

/// Quote a text cell, doubling embedded quotes
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Row-at-a-time CSV builder
#[derive(Debug, Default)]
pub struct CsvWriter {
    out: String,
    row: Vec<String>,
    rows: usize,
}

impl CsvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&mut self, columns: &[&str]) {
        self.out.push_str(&columns.join(","));
        self.out.push('\n');
    }

    pub fn text(&mut self, value: &str) -> &mut Self {
        self.row.push(quote(value));
        self
    }

    pub fn opt(&mut self, value: Option<&str>) -> &mut Self {
        self.text(value.unwrap_or(""))
    }

    pub fn number(&mut self, value: i64) -> &mut Self {
        self.row.push(value.to_string());
        self
    }

    pub fn time(&mut self, value: &DateTime<Utc>) -> &mut Self {
        self.text(&value.to_rfc3339())
    }

    /// Finish the current data row
    pub fn end_row(&mut self) {
        self.out.push_str(&self.row.join(","));
        self.out.push('\n');
        self.row.clear();
        self.rows += 1;
    }

    pub fn blank_line(&mut self) {
        self.out.push('\n');
    }

    pub fn finish(self) -> CsvExport {
        CsvExport {
            csv: self.out,
            rows: self.rows,
        }
    }
}

/// One row per contact, ordered by name
pub fn export_contacts(db: &Database, include_archived: bool) -> Result<CsvExport> {
    let contacts = db.list_contacts(include_archived)?;

    let mut w = CsvWriter::new();
    w.header(CONTACT_HEADER);
    for contact in &contacts {
        write_contact(&mut w, contact);
        w.end_row();
    }
    Ok(w.finish())
}

/// History oldest first. With a contact id the rows are preceded by a
/// key/value block describing the contact and a blank line.
pub fn export_history(db: &Database, contact_id: Option<i64>) -> Result<CsvExport> {
    let mut w = CsvWriter::new();

    let entries: Vec<RecentEntry> = match contact_id {
        Some(id) => {
            let contact = db.get_contact(id)?.ok_or(CrmError::ContactNotFound(id))?;
            write_contact_block(&mut w, &contact);
            w.blank_line();

            db.entries_for(Some(id), Chronology::OldestFirst, None)?
                .into_iter()
                .map(|entry| RecentEntry {
                    entry,
                    contact_name: contact.name.clone(),
                })
                .collect()
        }
        None => db.entries_with_names(Chronology::OldestFirst)?,
    };

    // Only history rows count toward the export size
    let mut history = CsvWriter::new();
    history.header(HISTORY_HEADER);
    for item in &entries {
        let e = &item.entry;
        history
            .number(e.id)
            .number(e.contact_id)
            .text(&item.contact_name)
            .text(&e.interaction_date)
            .text(e.kind.as_str())
            .text(&e.subject)
            .opt(e.content.as_deref())
            .time(&e.created_at);
        history.end_row();
    }

    let block = w.finish();
    let history = history.finish();
    Ok(CsvExport {
        csv: block.csv + &history.csv,
        rows: history.rows,
    })
}

/// Every contact, archived included, with its full history in one cell
pub fn export_full(db: &Database) -> Result<CsvExport> {
    let contacts = db.list_contacts(true)?;

    let mut by_contact: HashMap<i64, Vec<ContactEntry>> = HashMap::new();
    for entry in db.entries_for(None, Chronology::OldestFirst, None)? {
        by_contact.entry(entry.contact_id).or_default().push(entry);
    }

    let mut header = CONTACT_HEADER.to_vec();
    header.push("History");

    let mut w = CsvWriter::new();
    w.header(&header);
    for contact in &contacts {
        let history = by_contact
            .get(&contact.id)
            .map(Vec::as_slice)
            .map(format_history_cell)
            .unwrap_or_default();

        write_contact(&mut w, contact);
        w.text(&history);
        w.end_row();
    }
    Ok(w.finish())
}

/// `date [kind] subject: content` per entry, joined by [`HISTORY_SEPARATOR`]
pub fn format_history_cell(entries: &[ContactEntry]) -> String {
    entries
        .iter()
        .map(|e| match e.content.as_deref() {
            Some(content) => format!(
                "{} [{}] {}: {}",
                e.interaction_date, e.kind, e.subject, content
            ),
            None => format!("{} [{}] {}", e.interaction_date, e.kind, e.subject),
        })
        .collect::<Vec<_>>()
        .join(HISTORY_SEPARATOR)
}

fn write_contact(w: &mut CsvWriter, c: &Contact) {
    w.number(c.id)
        .text(&c.name)
        .opt(c.organization.as_deref())
        .opt(c.job_title.as_deref())
        .opt(c.email.as_deref())
        .opt(c.phone.as_deref())
        .opt(c.twitter.as_deref())
        .opt(c.linkedin.as_deref())
        .opt(c.notes.as_deref())
        .text(yes_no(c.archived))
        .time(&c.created_at)
        .time(&c.updated_at);
}

fn write_contact_block(w: &mut CsvWriter, c: &Contact) {
    w.header(&["Field", "Value"]);

    w.text("ID").number(c.id);
    w.end_row();

    let fields: [(&str, Option<&str>); 9] = [
        ("Name", Some(c.name.as_str())),
        ("Organization", c.organization.as_deref()),
        ("Job Title", c.job_title.as_deref()),
        ("Email", c.email.as_deref()),
        ("Phone", c.phone.as_deref()),
        ("Twitter", c.twitter.as_deref()),
        ("LinkedIn", c.linkedin.as_deref()),
        ("Notes", c.notes.as_deref()),
        ("Archived", Some(yes_no(c.archived))),
    ];
    for (key, value) in fields {
        w.text(key).opt(value);
        w.end_row();
    }

    w.text("Created At").time(&c.created_at);
    w.end_row();
    w.text("Updated At").time(&c.updated_at);
    w.end_row();
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryKind, NewContact, NewEntry};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn add_contact(db: &Database, name: &str) -> i64 {
        db.create_contact(&NewContact {
            name: name.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn log(
        db: &Database,
        contact_id: i64,
        kind: EntryKind,
        subject: &str,
        content: Option<&str>,
        date: &str,
    ) {
        db.add_entry(&NewEntry {
            contact_id,
            kind,
            subject: subject.to_string(),
            content: content.map(str::to_string),
            interaction_date: date.to_string(),
        })
        .unwrap();
    }

    #[test]
    fn test_quote_doubles_quotes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_empty_contacts_export_has_header() {
        let db = setup();

        let export = export_contacts(&db, false).unwrap();
        assert_eq!(export.rows, 0);
        assert_eq!(
            export.csv,
            "ID,Name,Organization,Job Title,Email,Phone,Twitter,LinkedIn,Notes,Archived,Created At,Updated At\n"
        );
    }

    #[test]
    fn test_contact_row_quotes_every_text_field() {
        let db = setup();
        let id = add_contact(&db, "Ada");

        let export = export_contacts(&db, false).unwrap();
        let row = export.csv.lines().nth(1).unwrap();
        let expected = format!("{id},\"Ada\",\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"No\",\"");
        assert!(row.starts_with(&expected));
    }

    #[test]
    fn test_contacts_export_respects_archive_flag() {
        let db = setup();
        add_contact(&db, "Active");
        let gone = add_contact(&db, "Archived");
        db.archive_contact(gone).unwrap();

        assert_eq!(export_contacts(&db, false).unwrap().rows, 1);
        let all = export_contacts(&db, true).unwrap();
        assert_eq!(all.rows, 2);
        assert!(all.csv.contains("\"Yes\""));
    }

    #[test]
    fn test_history_export_for_contact() {
        let db = setup();
        let ada = add_contact(&db, "Ada Lovelace");
        log(&db, ada, EntryKind::Call, "follow-up", None, "2023-02-01T00:00:00Z");
        log(&db, ada, EntryKind::Note, "intro", Some("met at salon"), "2023-01-01T00:00:00Z");

        let export = export_history(&db, Some(ada)).unwrap();
        assert_eq!(export.rows, 2);

        let lines: Vec<&str> = export.csv.lines().collect();
        assert_eq!(lines[0], "Field,Value");
        assert_eq!(lines[1], format!("\"ID\",{ada}"));
        assert_eq!(lines[2], "\"Name\",\"Ada Lovelace\"");

        let blank = lines.iter().position(|l| l.is_empty()).unwrap();
        assert_eq!(lines[blank + 1], HISTORY_HEADER.join(","));
        assert!(lines[blank + 2].contains("\"intro\""));
        assert!(lines[blank + 3].contains("\"follow-up\""));
    }

    #[test]
    fn test_history_export_unknown_contact() {
        let db = setup();
        assert!(matches!(
            export_history(&db, Some(99)),
            Err(CrmError::ContactNotFound(99))
        ));
    }

    #[test]
    fn test_history_export_all_contacts() {
        let db = setup();
        let a = add_contact(&db, "A");
        let b = add_contact(&db, "B");
        log(&db, a, EntryKind::Email, "second", None, "2023-03-01");
        log(&db, b, EntryKind::Meeting, "first", None, "2023-01-01");
        db.archive_contact(b).unwrap();

        let export = export_history(&db, None).unwrap();
        assert_eq!(export.rows, 2);

        let lines: Vec<&str> = export.csv.lines().collect();
        assert_eq!(lines[0], HISTORY_HEADER.join(","));
        assert!(lines[1].contains("\"B\"") && lines[1].contains("\"first\""));
        assert!(lines[2].contains("\"A\"") && lines[2].contains("\"second\""));
    }

    #[test]
    fn test_full_export_history_cell() {
        let db = setup();
        let ada = add_contact(&db, "Ada");
        let idle = add_contact(&db, "Idle");
        db.archive_contact(idle).unwrap();
        log(&db, ada, EntryKind::Call, "later", Some("said \"yes\""), "2023-02-01");
        log(&db, ada, EntryKind::Note, "first", None, "2023-01-01");

        let export = export_full(&db).unwrap();
        assert_eq!(export.rows, 2);

        let lines: Vec<&str> = export.csv.lines().collect();
        assert!(lines[0].ends_with(",Updated At,History"));
        assert!(lines[1].ends_with(
            ",\"2023-01-01 [note] first | 2023-02-01 [call] later: said \"\"yes\"\"\""
        ));
        assert!(lines[2].ends_with(",\"\""));
    }

    #[test]
    fn test_format_history_cell_empty() {
        assert_eq!(format_history_cell(&[]), "");
    }
}
