use crate::cli::{ClearContactArgs, ContactArgs, ExportKind, TodoCommands};
use crate::core::ContactBook;
use crate::error::{CrmError, Result};
use crate::models::{
    Contact, ContactUpdate, EntryUpdate, NewContact, NewEntry, NewTodo, TodoFilter, TodoUpdate,
    parse_kind,
};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Open the store and bring its schema up to date
fn open(db: &str) -> Result<ContactBook> {
    let book = ContactBook::open_at(db)?;
    book.init()?;
    Ok(book)
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Handle the init command
pub fn handle_init(db: &str) -> Result<()> {
    let book = ContactBook::open_at(db)?;
    let report = book.init()?;

    println!("Initialized contact store at {db}");
    for column in &report.added {
        println!("  - Added column: {column}");
    }
    for column in &report.failed {
        println!("  - Skipped column: {column}");
    }

    Ok(())
}

/// Handle the add command
pub fn handle_add(db: &str, name: &str, fields: ContactArgs) -> Result<()> {
    let book = open(db)?;

    let id = book.create_contact(&NewContact {
        name: name.to_string(),
        organization: fields.org,
        job_title: fields.title,
        email: fields.email,
        phone: fields.phone,
        twitter: fields.twitter,
        linkedin: fields.linkedin,
        notes: fields.notes,
    })?;

    println!("Created contact #{id}: {name}");
    Ok(())
}

/// Handle the show command
pub fn handle_show(db: &str, id: i64) -> Result<()> {
    let book = open(db)?;
    let contact = book.get_contact(id)?.ok_or(CrmError::ContactNotFound(id))?;

    println!("[#{}] {}", contact.id, contact.name);
    print_field("Organization", contact.organization.as_deref());
    print_field("Title", contact.job_title.as_deref());
    print_field("Email", contact.email.as_deref());
    print_field("Phone", contact.phone.as_deref());
    print_field("Twitter", contact.twitter.as_deref());
    print_field("LinkedIn", contact.linkedin.as_deref());
    print_field("Notes", contact.notes.as_deref());
    if contact.archived {
        println!("Archived:     yes");
    }
    println!("Created:      {}", contact.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated:      {}", contact.updated_at.format("%Y-%m-%d %H:%M"));

    let history = book.get_history(id, Some(5))?;
    if history.is_empty() {
        println!("History:      (none)");
    } else {
        println!("History:");
        for entry in &history {
            println!(
                "  #{} {} [{}] {}",
                entry.id, entry.interaction_date, entry.kind, entry.subject
            );
        }
    }

    let todos = book.get_todos(&TodoFilter {
        contact_id: Some(id),
        ..Default::default()
    })?;
    if !todos.is_empty() {
        println!("Todos:");
        for todo in &todos {
            println!(
                "  #{} {} {}",
                todo.id,
                todo.target_date.as_deref().unwrap_or("-"),
                todo.text
            );
        }
    }

    Ok(())
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(v) = value {
        println!("{:<14}{v}", format!("{label}:"));
    }
}

fn print_contacts(contacts: &[Contact]) {
    if contacts.is_empty() {
        println!("No contacts found.");
        return;
    }
    for c in contacts {
        let org = c
            .organization
            .as_deref()
            .map(|o| format!(" ({o})"))
            .unwrap_or_default();
        let archived = if c.archived { " [archived]" } else { "" };
        println!("#{:<4} {}{org}{archived}", c.id, c.name);
    }
}

/// Handle the list command
pub fn handle_list(db: &str, all: bool) -> Result<()> {
    let book = open(db)?;
    print_contacts(&book.list_contacts(all)?);
    Ok(())
}

/// Handle the search command
pub fn handle_search(db: &str, query: &str) -> Result<()> {
    let book = open(db)?;
    print_contacts(&book.search_contacts(query)?);
    Ok(())
}

/// Handle the org command
pub fn handle_org(db: &str, organization: &str) -> Result<()> {
    let book = open(db)?;
    print_contacts(&book.list_by_organization(organization)?);
    Ok(())
}

/// Handle the edit command
pub fn handle_edit(
    db: &str,
    id: i64,
    name: Option<String>,
    fields: ContactArgs,
    clear: ClearContactArgs,
) -> Result<()> {
    let book = open(db)?;

    let update = ContactUpdate {
        name,
        organization: clearable(fields.org, clear.no_org),
        job_title: clearable(fields.title, clear.no_title),
        email: clearable(fields.email, clear.no_email),
        phone: clearable(fields.phone, clear.no_phone),
        twitter: clearable(fields.twitter, clear.no_twitter),
        linkedin: clearable(fields.linkedin, clear.no_linkedin),
        notes: clearable(fields.notes, clear.no_notes),
    };
    if book.update_contact(id, &update)? {
        println!("Updated contact #{id}");
    } else {
        println!("No changes made to contact #{id}");
    }
    Ok(())
}

/// A clear flag wins over a new value
fn clearable(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear { Some(None) } else { value.map(Some) }
}

/// Handle the archive command
pub fn handle_archive(db: &str, id: i64) -> Result<()> {
    let book = open(db)?;

    if book.archive_contact(id)? {
        println!("Archived contact #{id}");
    } else if book.get_contact(id)?.is_some() {
        println!("Contact #{id} is already archived");
    } else {
        return Err(CrmError::ContactNotFound(id));
    }
    Ok(())
}

/// Handle the log command
pub fn handle_log(
    db: &str,
    contact_id: i64,
    kind: &str,
    subject: &str,
    date: &str,
    content: Option<String>,
) -> Result<()> {
    let book = open(db)?;

    let id = book.add_entry(&NewEntry {
        contact_id,
        kind: parse_kind(kind)?,
        subject: subject.to_string(),
        content,
        interaction_date: date.to_string(),
    })?;

    println!("Logged entry #{id} for contact #{contact_id}");
    Ok(())
}

/// Handle the history command
pub fn handle_history(db: &str, contact_id: i64, limit: Option<u32>) -> Result<()> {
    let book = open(db)?;
    let entries = book.get_history(contact_id, limit)?;

    if entries.is_empty() {
        println!("No history for contact #{contact_id}");
    }
    for e in &entries {
        println!("#{} {} [{}] {}", e.id, e.interaction_date, e.kind, e.subject);
        if let Some(ref content) = e.content {
            println!("    {content}");
        }
    }
    Ok(())
}

/// Handle the recent command
pub fn handle_recent(db: &str, limit: Option<u32>) -> Result<()> {
    let book = open(db)?;

    for r in &book.get_recent(limit)? {
        println!(
            "#{} {} {} [{}] {}",
            r.entry.id, r.entry.interaction_date, r.contact_name, r.entry.kind, r.entry.subject
        );
    }
    Ok(())
}

/// Handle the edit-entry command
pub fn handle_edit_entry(
    db: &str,
    id: i64,
    kind: Option<&str>,
    subject: Option<String>,
    content: Option<String>,
    no_content: bool,
    date: Option<String>,
) -> Result<()> {
    let book = open(db)?;

    let update = EntryUpdate {
        kind: kind.map(parse_kind).transpose()?,
        subject,
        content: clearable(content, no_content),
        interaction_date: date,
    };
    if book.update_entry(id, &update)? {
        println!("Updated entry #{id}");
    } else {
        println!("No changes made to entry #{id}");
    }
    Ok(())
}

/// Handle the delete-entry command
pub fn handle_delete_entry(db: &str, id: i64) -> Result<()> {
    let book = open(db)?;

    if book.delete_entry(id)? {
        println!("Deleted entry #{id}");
    } else {
        println!("Entry #{id} not found");
    }
    Ok(())
}

/// Handle the todo subcommands
pub fn handle_todo(db: &str, command: TodoCommands) -> Result<()> {
    let book = open(db)?;

    match command {
        TodoCommands::Add {
            contact_id,
            text,
            due,
        } => {
            let id = book.add_todo(&NewTodo {
                contact_id,
                text,
                target_date: due,
            })?;
            println!("Created todo #{id} for contact #{contact_id}");
        }
        TodoCommands::List {
            contact,
            all,
            due_before,
            due_after,
        } => {
            let todos = book.get_todos(&TodoFilter {
                contact_id: contact,
                include_completed: all,
                target_before: due_before,
                target_after: due_after,
                ..Default::default()
            })?;
            if todos.is_empty() {
                println!("No todos found.");
            }
            for t in &todos {
                let mark = if t.completed { "✓" } else { "○" };
                println!(
                    "{mark} #{} contact #{} {} {}",
                    t.id,
                    t.contact_id,
                    t.target_date.as_deref().unwrap_or("-"),
                    t.text
                );
            }
        }
        TodoCommands::Done { id } => {
            let update = TodoUpdate {
                completed: Some(true),
                ..Default::default()
            };
            report_todo_change(book.update_todo(id, &update)?, id, "Completed");
        }
        TodoCommands::Edit {
            id,
            text,
            due,
            no_due,
        } => {
            let update = TodoUpdate {
                text,
                target_date: clearable(due, no_due),
                completed: None,
            };
            report_todo_change(book.update_todo(id, &update)?, id, "Updated");
        }
        TodoCommands::Delete { id } => {
            report_todo_change(book.delete_todo(id)?, id, "Deleted");
        }
    }
    Ok(())
}

fn report_todo_change(changed: bool, id: i64, verb: &str) {
    if changed {
        println!("{verb} todo #{id}");
    } else {
        println!("No changes made to todo #{id}");
    }
}

/// Handle the export command
pub fn handle_export(
    db: &str,
    kind: ExportKind,
    contact: Option<i64>,
    all: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let book = open(db)?;

    let export = match kind {
        ExportKind::Contacts => book.export_contacts(all)?,
        ExportKind::History => book.export_history(contact)?,
        ExportKind::Full => book.export_full()?,
    };

    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!("{}-export-{}.csv", kind.as_str(), timestamp()))
    });
    fs::write(&path, &export.csv)?;

    println!(
        "Exported {} rows to {} ({} bytes)",
        export.rows,
        path.display(),
        export.csv.len()
    );
    Ok(())
}

/// Handle the backup command
pub fn handle_backup(db: &str, dir: Option<PathBuf>) -> Result<()> {
    let destination = backup_store(Path::new(db), dir.as_deref())?;
    println!("Backed up {db} to {}", destination.display());
    Ok(())
}

/// Copy the store file to `<stem>-backup-<timestamp>.db`
pub fn backup_store(db: &Path, dir: Option<&Path>) -> Result<PathBuf> {
    if !db.exists() {
        return Err(CrmError::StoreMissing(db.display().to_string()));
    }

    // Fold the WAL into the main file so the copy is complete
    {
        let book = ContactBook::open_at(db)?;
        book.checkpoint()?;
    }

    let stem = db
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "crm".to_string());
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => db
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    fs::create_dir_all(&dir)?;

    let destination = dir.join(format!("{stem}-backup-{}.db", timestamp()));
    fs::copy(db, &destination)?;
    Ok(destination)
}
