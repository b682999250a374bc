use crate::db::Database;
use crate::error::{CrmError, Result};
use crate::export;
use crate::models::{
    Contact, ContactEntry, ContactTodo, ContactUpdate, CsvExport, EntryUpdate, NewContact,
    NewEntry, NewTodo, RecentEntry, TodoFilter, TodoUpdate,
};
use crate::schema::SchemaReport;
use std::path::Path;
use tracing::debug;

/// Operations callable by the CLI and the MCP server
pub struct ContactBook {
    db: Database,
}

impl ContactBook {
    /// Open the store at the given target. The path is not validated.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Database::open(path)?;
        Ok(ContactBook { db })
    }

    /// Open a throwaway in-memory store, already initialized
    pub fn open_in_memory() -> Result<Self> {
        let book = ContactBook {
            db: Database::open_in_memory()?,
        };
        book.init()?;
        Ok(book)
    }

    pub fn is_initialized(&self) -> Result<bool> {
        self.db.is_initialized()
    }

    /// Flush the write-ahead log into the main store file
    pub fn checkpoint(&self) -> Result<()> {
        self.db.checkpoint()
    }

    /// Create or migrate the schema. Call once before anything else.
    pub fn init(&self) -> Result<SchemaReport> {
        self.db.init()
    }

    // ==================== Contacts ====================

    pub fn create_contact(&self, contact: &NewContact) -> Result<i64> {
        if contact.name.trim().is_empty() {
            return Err(CrmError::EmptyName);
        }
        let id = self.db.create_contact(contact)?;
        debug!(id, "created contact");
        Ok(id)
    }

    pub fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        self.db.get_contact(id)
    }

    pub fn list_contacts(&self, include_archived: bool) -> Result<Vec<Contact>> {
        self.db.list_contacts(include_archived)
    }

    pub fn search_contacts(&self, query: &str) -> Result<Vec<Contact>> {
        self.db.search_contacts(query)
    }

    pub fn list_by_organization(&self, organization: &str) -> Result<Vec<Contact>> {
        self.db.list_by_organization(organization)
    }

    pub fn update_contact(&self, id: i64, update: &ContactUpdate) -> Result<bool> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CrmError::EmptyName);
        }
        let changed = self.db.update_contact(id, update)?;
        debug!(id, changed, "updated contact");
        Ok(changed)
    }

    pub fn archive_contact(&self, id: i64) -> Result<bool> {
        let changed = self.db.archive_contact(id)?;
        debug!(id, changed, "archived contact");
        Ok(changed)
    }

    // ==================== History ====================

    pub fn add_entry(&self, entry: &NewEntry) -> Result<i64> {
        if entry.subject.trim().is_empty() {
            return Err(CrmError::EmptySubject);
        }
        self.require_contact(entry.contact_id)?;
        let id = self.db.add_entry(entry)?;
        debug!(id, contact_id = entry.contact_id, "added entry");
        Ok(id)
    }

    pub fn get_entry(&self, id: i64) -> Result<Option<ContactEntry>> {
        self.db.get_entry(id)
    }

    pub fn get_history(&self, contact_id: i64, limit: Option<u32>) -> Result<Vec<ContactEntry>> {
        self.db.get_history(contact_id, limit)
    }

    pub fn get_recent(&self, limit: Option<u32>) -> Result<Vec<RecentEntry>> {
        self.db.get_recent(limit)
    }

    pub fn update_entry(&self, id: i64, update: &EntryUpdate) -> Result<bool> {
        if update.subject.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(CrmError::EmptySubject);
        }
        let changed = self.db.update_entry(id, update)?;
        debug!(id, changed, "updated entry");
        Ok(changed)
    }

    pub fn delete_entry(&self, id: i64) -> Result<bool> {
        let changed = self.db.delete_entry(id)?;
        debug!(id, changed, "deleted entry");
        Ok(changed)
    }

    // ==================== Todos ====================

    pub fn add_todo(&self, todo: &NewTodo) -> Result<i64> {
        if todo.text.trim().is_empty() {
            return Err(CrmError::EmptyTodoText);
        }
        self.require_contact(todo.contact_id)?;
        let id = self.db.add_todo(todo)?;
        debug!(id, contact_id = todo.contact_id, "added todo");
        Ok(id)
    }

    pub fn get_todo(&self, id: i64) -> Result<Option<ContactTodo>> {
        self.db.get_todo(id)
    }

    pub fn get_todos(&self, filter: &TodoFilter) -> Result<Vec<ContactTodo>> {
        self.db.get_todos(filter)
    }

    pub fn update_todo(&self, id: i64, update: &TodoUpdate) -> Result<bool> {
        if update.text.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(CrmError::EmptyTodoText);
        }
        let changed = self.db.update_todo(id, update)?;
        debug!(id, changed, "updated todo");
        Ok(changed)
    }

    pub fn delete_todo(&self, id: i64) -> Result<bool> {
        let changed = self.db.delete_todo(id)?;
        debug!(id, changed, "deleted todo");
        Ok(changed)
    }

    // ==================== Export ====================

    pub fn export_contacts(&self, include_archived: bool) -> Result<CsvExport> {
        export::export_contacts(&self.db, include_archived)
    }

    pub fn export_history(&self, contact_id: Option<i64>) -> Result<CsvExport> {
        export::export_history(&self.db, contact_id)
    }

    pub fn export_full(&self) -> Result<CsvExport> {
        export::export_full(&self.db)
    }

    fn require_contact(&self, id: i64) -> Result<()> {
        match self.db.get_contact(id)? {
            Some(_) => Ok(()),
            None => Err(CrmError::ContactNotFound(id)),
        }
    }
}
