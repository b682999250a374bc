use clap::Parser;
use crm::cli::{Cli, Commands};
use crm::cli_handlers;
use crm::mcp::run_mcp_server;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr so the MCP stdio channel stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = cli.db.as_str();

    let result = match cli.command {
        Commands::Init => cli_handlers::handle_init(db),
        Commands::Add { name, fields } => cli_handlers::handle_add(db, &name, fields),
        Commands::Show { id } => cli_handlers::handle_show(db, id),
        Commands::List { all } => cli_handlers::handle_list(db, all),
        Commands::Search { query } => cli_handlers::handle_search(db, &query),
        Commands::Org { organization } => cli_handlers::handle_org(db, &organization),
        Commands::Edit {
            id,
            name,
            fields,
            clear,
        } => cli_handlers::handle_edit(db, id, name, fields, clear),
        Commands::Archive { id } => cli_handlers::handle_archive(db, id),
        Commands::Log {
            contact_id,
            kind,
            subject,
            date,
            content,
        } => cli_handlers::handle_log(db, contact_id, &kind, &subject, &date, content),
        Commands::History { contact_id, limit } => {
            cli_handlers::handle_history(db, contact_id, limit)
        }
        Commands::Recent { limit } => cli_handlers::handle_recent(db, limit),
        Commands::EditEntry {
            id,
            kind,
            subject,
            content,
            no_content,
            date,
        } => cli_handlers::handle_edit_entry(
            db,
            id,
            kind.as_deref(),
            subject,
            content,
            no_content,
            date,
        ),
        Commands::DeleteEntry { id } => cli_handlers::handle_delete_entry(db, id),
        Commands::Todo { command } => cli_handlers::handle_todo(db, command),
        Commands::Export {
            kind,
            contact,
            all,
            output,
        } => cli_handlers::handle_export(db, kind, contact, all, output),
        Commands::Backup { dir } => cli_handlers::handle_backup(db, dir),
        Commands::Mcp => {
            if let Err(e) = run_mcp_server(db).await {
                eprintln!("MCP server error: {e}");
                process::exit(1);
            }
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
