use crate::core::ContactBook;
use crate::error::CrmError;
use crate::models::{
    ContactUpdate, EntryUpdate, NewContact, NewEntry, NewTodo, TodoFilter, TodoUpdate, parse_kind,
};
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt, handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters, model::*, schemars, tool, tool_handler, tool_router,
    transport::stdio,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Contact store MCP server
#[derive(Clone)]
pub struct ContactBookMcp {
    book: Arc<Mutex<ContactBook>>,
    tool_router: ToolRouter<Self>,
}

// Input types for tools
#[derive(Debug, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ContactFieldsInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CreateContactInput {
    pub name: String,
    #[serde(flatten)]
    pub fields: ContactFieldsInput,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct UpdateContactInput {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: ContactFieldsInput,
    /// Optional fields to reset to empty, e.g. ["email", "phone"]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clear: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct IdInput {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListContactsInput {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchInput {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct OrganizationInput {
    pub organization: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AddEntryInput {
    pub contact_id: i64,
    /// One of call, email, meeting, note, task
    pub kind: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// When the interaction happened, e.g. 2024-05-01T14:00:00Z
    pub interaction_date: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HistoryInput {
    pub contact_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RecentInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct UpdateEntryInput {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_date: Option<String>,
    /// Set to ["content"] to remove the entry's content
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clear: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AddTodoInput {
    pub contact_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetTodosInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<i64>,
    #[serde(default)]
    pub include_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct UpdateTodoInput {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// Set to ["target_date"] to make the todo undated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clear: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExportHistoryInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<i64>,
}

const CLEARABLE_CONTACT_FIELDS: &[&str] = &[
    "organization",
    "job_title",
    "email",
    "phone",
    "twitter",
    "linkedin",
    "notes",
];

/// Reject any `clear` entry outside `allowed`
fn check_clear(clear: &[String], allowed: &[&str]) -> Result<(), CrmError> {
    match clear.iter().find(|f| !allowed.contains(&f.as_str())) {
        Some(field) => Err(CrmError::UnclearableField(field.clone())),
        None => Ok(()),
    }
}

/// `Some(None)` when the field is listed in `clear`, otherwise the provided value
fn clearable(value: Option<String>, field: &str, clear: &[String]) -> Option<Option<String>> {
    if clear.iter().any(|f| f == field) {
        Some(None)
    } else {
        value.map(Some)
    }
}

impl TryFrom<UpdateContactInput> for ContactUpdate {
    type Error = CrmError;

    fn try_from(input: UpdateContactInput) -> Result<Self, Self::Error> {
        check_clear(&input.clear, CLEARABLE_CONTACT_FIELDS)?;
        let clear = &input.clear;
        let f = input.fields;
        Ok(ContactUpdate {
            name: input.name,
            organization: clearable(f.organization, "organization", clear),
            job_title: clearable(f.job_title, "job_title", clear),
            email: clearable(f.email, "email", clear),
            phone: clearable(f.phone, "phone", clear),
            twitter: clearable(f.twitter, "twitter", clear),
            linkedin: clearable(f.linkedin, "linkedin", clear),
            notes: clearable(f.notes, "notes", clear),
        })
    }
}

impl TryFrom<UpdateEntryInput> for EntryUpdate {
    type Error = CrmError;

    fn try_from(input: UpdateEntryInput) -> Result<Self, Self::Error> {
        check_clear(&input.clear, &["content"])?;
        Ok(EntryUpdate {
            kind: input.kind.as_deref().map(parse_kind).transpose()?,
            subject: input.subject,
            content: clearable(input.content, "content", &input.clear),
            interaction_date: input.interaction_date,
        })
    }
}

impl TryFrom<UpdateTodoInput> for TodoUpdate {
    type Error = CrmError;

    fn try_from(input: UpdateTodoInput) -> Result<Self, Self::Error> {
        check_clear(&input.clear, &["target_date"])?;
        Ok(TodoUpdate {
            text: input.text,
            target_date: clearable(input.target_date, "target_date", &input.clear),
            completed: input.completed,
        })
    }
}

impl From<CreateContactInput> for NewContact {
    fn from(input: CreateContactInput) -> Self {
        let f = input.fields;
        NewContact {
            name: input.name,
            organization: f.organization,
            job_title: f.job_title,
            email: f.email,
            phone: f.phone,
            twitter: f.twitter,
            linkedin: f.linkedin,
            notes: f.notes,
        }
    }
}

impl From<GetTodosInput> for TodoFilter {
    fn from(input: GetTodosInput) -> Self {
        TodoFilter {
            contact_id: input.contact_id,
            include_completed: input.include_completed,
            target_before: input.target_before,
            target_after: input.target_after,
            created_before: input.created_before,
            created_after: input.created_after,
        }
    }
}

impl TryFrom<AddEntryInput> for NewEntry {
    type Error = CrmError;

    fn try_from(input: AddEntryInput) -> Result<Self, Self::Error> {
        Ok(NewEntry {
            contact_id: input.contact_id,
            kind: parse_kind(&input.kind)?,
            subject: input.subject,
            content: input.content,
            interaction_date: input.interaction_date,
        })
    }
}

// Response type
#[derive(Debug, Serialize)]
pub struct McpResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> McpResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "ok",
            data: Some(data),
            error_code: None,
            message: None,
        }
    }

    pub fn error(error_code: &str, message: &str) -> Self {
        Self {
            status: "error",
            data: None,
            error_code: Some(error_code.to_string()),
            message: Some(message.to_string()),
        }
    }
}

fn to_json<T: Serialize>(response: McpResponse<T>) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string(&response)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn error_to_response(tool: &str, e: CrmError) -> McpResponse<serde_json::Value> {
    error!(tool, error = %e, "tool call failed");
    McpResponse::error(e.code(), &format!("{tool}: {e}"))
}

/// Render the outcome of one tool call as a JSON envelope
pub fn respond<T: Serialize>(
    tool: &str,
    result: Result<T, CrmError>,
) -> Result<CallToolResult, McpError> {
    match result {
        Ok(data) => to_json(McpResponse::success(data)),
        Err(e) => to_json(error_to_response(tool, e)),
    }
}

fn changed(changed: bool) -> serde_json::Value {
    serde_json::json!({ "changed": changed })
}

#[tool_router]
impl ContactBookMcp {
    /// Open and initialize the store at `db_path`
    pub fn new(db_path: &str) -> Result<Self, CrmError> {
        let book = ContactBook::open_at(db_path)?;
        let report = book.init()?;
        if !report.added.is_empty() {
            info!(columns = ?report.added, "migrated contacts table");
        }
        Ok(Self::with_book(book))
    }

    pub fn with_book(book: ContactBook) -> Self {
        Self {
            book: Arc::new(Mutex::new(book)),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Create a contact. Only name is required. Returns the new contact id.")]
    async fn create_contact(
        &self,
        params: Parameters<CreateContactInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        let contact = NewContact::from(params.0);

        respond(
            "create_contact",
            book.create_contact(&contact)
                .map(|id| serde_json::json!({ "id": id })),
        )
    }

    #[tool(description = "Get a contact by id. Returns null data when the contact does not exist.")]
    async fn get_contact(&self, params: Parameters<IdInput>) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("get_contact", book.get_contact(params.0.id))
    }

    #[tool(description = "List contacts ordered by name. Archived contacts are hidden unless include_archived is true.")]
    async fn list_contacts(
        &self,
        params: Parameters<ListContactsInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("list_contacts", book.list_contacts(params.0.include_archived))
    }

    #[tool(description = "Search non-archived contacts by name, organization, job title, email, twitter or linkedin (case-insensitive substring).")]
    async fn search_contacts(
        &self,
        params: Parameters<SearchInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("search_contacts", book.search_contacts(&params.0.query))
    }

    #[tool(description = "List non-archived contacts whose organization contains the given text.")]
    async fn list_contacts_by_organization(
        &self,
        params: Parameters<OrganizationInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond(
            "list_contacts_by_organization",
            book.list_by_organization(&params.0.organization),
        )
    }

    #[tool(description = "Update a contact. Only the fields you provide will be changed. List optional fields in clear to empty them.")]
    async fn update_contact(
        &self,
        params: Parameters<UpdateContactInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        let id = params.0.id;
        let result =
            ContactUpdate::try_from(params.0).and_then(|update| book.update_contact(id, &update));

        respond("update_contact", result.map(changed))
    }

    #[tool(description = "Archive a contact, hiding it from default listings and search. History is kept.")]
    async fn archive_contact(
        &self,
        params: Parameters<IdInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("archive_contact", book.archive_contact(params.0.id).map(changed))
    }

    #[tool(description = "Log an interaction with a contact. interaction_date is required and should be when the interaction actually happened.")]
    async fn add_entry(
        &self,
        params: Parameters<AddEntryInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        let result = NewEntry::try_from(params.0).and_then(|entry| book.add_entry(&entry));

        respond("add_entry", result.map(|id| serde_json::json!({ "id": id })))
    }

    #[tool(description = "Get a contact's interaction history, newest first. limit caps the number of entries.")]
    async fn get_history(
        &self,
        params: Parameters<HistoryInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        let p = params.0;
        respond("get_history", book.get_history(p.contact_id, p.limit))
    }

    #[tool(description = "Get the most recent interactions across all active contacts (default 10).")]
    async fn get_recent(
        &self,
        params: Parameters<RecentInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("get_recent", book.get_recent(params.0.limit))
    }

    #[tool(description = "Update an interaction entry's kind, subject, content or interaction_date.")]
    async fn update_entry(
        &self,
        params: Parameters<UpdateEntryInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        let id = params.0.id;
        let result =
            EntryUpdate::try_from(params.0).and_then(|update| book.update_entry(id, &update));
        respond("update_entry", result.map(changed))
    }

    #[tool(description = "Delete an interaction entry.")]
    async fn delete_entry(&self, params: Parameters<IdInput>) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("delete_entry", book.delete_entry(params.0.id).map(changed))
    }

    #[tool(description = "Add a todo for a contact, with an optional target date.")]
    async fn add_todo(&self, params: Parameters<AddTodoInput>) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        let p = params.0;
        let todo = NewTodo {
            contact_id: p.contact_id,
            text: p.text,
            target_date: p.target_date,
        };

        respond(
            "add_todo",
            book.add_todo(&todo).map(|id| serde_json::json!({ "id": id })),
        )
    }

    #[tool(description = "List todos ordered by target date. Completed todos are excluded unless include_completed is true. Date bounds are inclusive.")]
    async fn get_todos(
        &self,
        params: Parameters<GetTodosInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        let filter = TodoFilter::from(params.0);
        respond("get_todos", book.get_todos(&filter))
    }

    #[tool(description = "Update a todo's text, target date or completion state.")]
    async fn update_todo(
        &self,
        params: Parameters<UpdateTodoInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        let id = params.0.id;
        let result =
            TodoUpdate::try_from(params.0).and_then(|update| book.update_todo(id, &update));
        respond("update_todo", result.map(changed))
    }

    #[tool(description = "Delete a todo.")]
    async fn delete_todo(&self, params: Parameters<IdInput>) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("delete_todo", book.delete_todo(params.0.id).map(changed))
    }

    #[tool(description = "Export contacts as CSV text.")]
    async fn export_contacts(
        &self,
        params: Parameters<ListContactsInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("export_contacts", book.export_contacts(params.0.include_archived))
    }

    #[tool(description = "Export interaction history as CSV text, oldest first. With contact_id the export starts with that contact's details.")]
    async fn export_history(
        &self,
        params: Parameters<ExportHistoryInput>,
    ) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("export_history", book.export_history(params.0.contact_id))
    }

    #[tool(description = "Export every contact, archived included, with its full history in the last column.")]
    async fn export_full(&self) -> Result<CallToolResult, McpError> {
        let book = self.book.lock().await;
        respond("export_full", book.export_full())
    }
}

#[tool_handler]
impl ServerHandler for ContactBookMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Contact relationship store. Use create_contact and search_contacts to find people, \
                 add_entry to log calls, emails, meetings and notes with the date they happened, \
                 add_todo for follow-ups, and the export_* tools to get CSV snapshots.".to_string()
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub async fn run_mcp_server(db_path: &str) -> anyhow::Result<()> {
    let mcp = ContactBookMcp::new(db_path).inspect_err(|e| {
        error!(error = %e, "failed to initialize MCP server");
    })?;

    info!(db = db_path, "serving MCP over stdio");
    let service = mcp.serve(stdio()).await.inspect_err(|e| {
        error!(error = %e, "error starting MCP server");
    })?;

    service.waiting().await?;
    Ok(())
}
