use thiserror::Error;

/// All possible errors in the contact store
#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Contact #{0} not found")]
    ContactNotFound(i64),

    #[error("Contact name must not be empty")]
    EmptyName,

    #[error("Entry subject must not be empty")]
    EmptySubject,

    #[error("Todo text must not be empty")]
    EmptyTodoText,

    #[error("Invalid entry kind: {0} (expected call, email, meeting, note or task)")]
    InvalidEntryKind(String),

    #[error("Field {0} cannot be cleared")]
    UnclearableField(String),

    #[error("{0} column migration(s) still outstanding")]
    MigrationIncomplete(usize),

    #[error("Store file {0} does not exist. Run `crm init` first.")]
    StoreMissing(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrmError {
    /// Stable machine-readable code for tool responses
    pub fn code(&self) -> &'static str {
        match self {
            CrmError::ContactNotFound(_) => "contact_not_found",
            CrmError::EmptyName => "empty_name",
            CrmError::EmptySubject => "empty_subject",
            CrmError::EmptyTodoText => "empty_todo_text",
            CrmError::InvalidEntryKind(_) => "invalid_entry_kind",
            CrmError::UnclearableField(_) => "unclearable_field",
            CrmError::MigrationIncomplete(_) => "migration_incomplete",
            CrmError::StoreMissing(_) => "store_missing",
            CrmError::Db(_) => "storage",
            CrmError::Io(_) => "io",
            CrmError::Json(_) => "json",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CrmError>;
