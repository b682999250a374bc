use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Default store file, relative to the working directory
pub const DEFAULT_DB_PATH: &str = "crm.db";

#[derive(Parser)]
#[command(name = "crm")]
#[command(about = "Contact relationship store")]
#[command(version)]
pub struct Cli {
    /// Store file to open
    #[arg(long, global = true, env = "CRM_DB", default_value = DEFAULT_DB_PATH)]
    pub db: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Contact fields shared by `add` and `edit`
#[derive(clap::Args, Debug, Default)]
pub struct ContactArgs {
    #[arg(long)]
    pub org: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub twitter: Option<String>,
    #[arg(long)]
    pub linkedin: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

/// Flags that clear optional contact fields on `edit`
#[derive(clap::Args, Debug, Default)]
pub struct ClearContactArgs {
    /// Clear organization
    #[arg(long)]
    pub no_org: bool,
    /// Clear job title
    #[arg(long)]
    pub no_title: bool,
    /// Clear email
    #[arg(long)]
    pub no_email: bool,
    /// Clear phone
    #[arg(long)]
    pub no_phone: bool,
    /// Clear twitter handle
    #[arg(long)]
    pub no_twitter: bool,
    /// Clear linkedin handle
    #[arg(long)]
    pub no_linkedin: bool,
    /// Clear notes
    #[arg(long)]
    pub no_notes: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or migrate the store
    Init,

    /// Add a new contact
    Add {
        /// Contact name
        name: String,
        #[command(flatten)]
        fields: ContactArgs,
    },

    /// Show a contact with its recent history and open todos
    Show {
        /// Contact ID
        id: i64,
    },

    /// List contacts
    List {
        /// Include archived contacts
        #[arg(long)]
        all: bool,
    },

    /// Search contacts by name, organization, title, email or handles
    Search {
        query: String,
    },

    /// List contacts of an organization
    Org {
        organization: String,
    },

    /// Edit an existing contact
    Edit {
        /// Contact ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: ContactArgs,
        #[command(flatten)]
        clear: ClearContactArgs,
    },

    /// Archive a contact
    Archive {
        /// Contact ID
        id: i64,
    },

    /// Log an interaction with a contact
    Log {
        /// Contact ID
        contact_id: i64,
        /// call, email, meeting, note or task
        kind: String,
        /// Subject line
        subject: String,
        /// When the interaction happened (e.g. 2024-05-01 or 2024-05-01T14:00:00Z)
        #[arg(long)]
        date: String,
        /// Longer content
        #[arg(long)]
        content: Option<String>,
    },

    /// Show a contact's history, newest first
    History {
        /// Contact ID
        contact_id: i64,
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show the latest interactions across active contacts
    Recent {
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Edit an interaction entry
    EditEntry {
        /// Entry ID
        id: i64,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Remove the entry's content
        #[arg(long)]
        no_content: bool,
        #[arg(long)]
        date: Option<String>,
    },

    /// Delete an interaction entry
    DeleteEntry {
        /// Entry ID
        id: i64,
    },

    /// Manage todos
    Todo {
        #[command(subcommand)]
        command: TodoCommands,
    },

    /// Export data as CSV
    Export {
        kind: ExportKind,
        /// Limit a history export to one contact
        #[arg(long)]
        contact: Option<i64>,
        /// Include archived contacts in a contacts export
        #[arg(long)]
        all: bool,
        /// Output file (defaults to a timestamped name in the current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Copy the store to a timestamped backup file
    Backup {
        /// Directory for the backup (defaults to the store's directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Start MCP server
    Mcp,
}

#[derive(Subcommand)]
pub enum TodoCommands {
    /// Add a todo for a contact
    Add {
        contact_id: i64,
        text: String,
        /// Target date
        #[arg(long)]
        due: Option<String>,
    },

    /// List open todos
    List {
        #[arg(long)]
        contact: Option<i64>,
        /// Include completed todos
        #[arg(long)]
        all: bool,
        /// Target date on or before
        #[arg(long)]
        due_before: Option<String>,
        /// Target date on or after
        #[arg(long)]
        due_after: Option<String>,
    },

    /// Mark a todo completed
    Done { id: i64 },

    /// Edit a todo
    Edit {
        id: i64,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        due: Option<String>,
        /// Remove the target date
        #[arg(long)]
        no_due: bool,
    },

    /// Delete a todo
    Delete { id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    Contacts,
    History,
    Full,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Contacts => "contacts",
            ExportKind::History => "history",
            ExportKind::Full => "full",
        }
    }
}
