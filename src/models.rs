use crate::error::CrmError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a logged interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Call,
    Email,
    Meeting,
    Note,
    Task,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Call => "call",
            EntryKind::Email => "email",
            EntryKind::Meeting => "meeting",
            EntryKind::Note => "note",
            EntryKind::Task => "task",
        }
    }
}

/// Parse a caller-supplied kind name
pub fn parse_kind(kind: &str) -> Result<EntryKind, CrmError> {
    EntryKind::try_from(kind).map_err(CrmError::InvalidEntryKind)
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for EntryKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "call" => Ok(EntryKind::Call),
            "email" => Ok(EntryKind::Email),
            "meeting" => Ok(EntryKind::Meeting),
            "note" => Ok(EntryKind::Note),
            "task" => Ok(EntryKind::Task),
            _ => Err(s.to_string()),
        }
    }
}

/// A person or organization record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub twitter: Option<String>,
    pub linkedin: Option<String>,
    pub notes: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dated interaction belonging to one contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub id: i64,
    pub contact_id: i64,
    pub kind: EntryKind,
    pub subject: String,
    pub content: Option<String>,
    pub interaction_date: String,
    pub created_at: DateTime<Utc>,
}

/// An entry joined with the name of its contact
#[derive(Debug, Clone, Serialize)]
pub struct RecentEntry {
    #[serde(flatten)]
    pub entry: ContactEntry,
    pub contact_name: String,
}

/// A task attached to one contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactTodo {
    pub id: i64,
    pub contact_id: i64,
    pub text: String,
    pub target_date: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New contact input
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub name: String,
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub twitter: Option<String>,
    pub linkedin: Option<String>,
    pub notes: Option<String>,
}

/// Contact update input. `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub organization: Option<Option<String>>,
    pub job_title: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub twitter: Option<Option<String>>,
    pub linkedin: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.organization.is_none()
            && self.job_title.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.twitter.is_none()
            && self.linkedin.is_none()
            && self.notes.is_none()
    }
}

/// New entry input. The interaction date is always supplied by the caller.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub contact_id: i64,
    pub kind: EntryKind,
    pub subject: String,
    pub content: Option<String>,
    pub interaction_date: String,
}

/// Entry update input
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub kind: Option<EntryKind>,
    pub subject: Option<String>,
    pub content: Option<Option<String>>,
    pub interaction_date: Option<String>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.subject.is_none()
            && self.content.is_none()
            && self.interaction_date.is_none()
    }
}

/// New todo input
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub contact_id: i64,
    pub text: String,
    pub target_date: Option<String>,
}

/// Todo update input
#[derive(Debug, Clone, Default)]
pub struct TodoUpdate {
    pub text: Option<String>,
    pub target_date: Option<Option<String>>,
    pub completed: Option<bool>,
}

impl TodoUpdate {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.target_date.is_none() && self.completed.is_none()
    }
}

/// Filters for listing todos, combined with AND. Date bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    pub contact_id: Option<i64>,
    pub include_completed: bool,
    pub target_before: Option<String>,
    pub target_after: Option<String>,
    pub created_before: Option<String>,
    pub created_after: Option<String>,
}

/// Rendered CSV text and the number of data rows it holds
#[derive(Debug, Clone, Serialize)]
pub struct CsvExport {
    pub csv: String,
    pub rows: usize,
}
