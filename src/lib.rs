pub mod cli;
pub mod cli_handlers;
pub mod core;
pub mod db;
pub mod error;
pub mod export;
pub mod history;
pub mod mcp;
pub mod models;
pub mod schema;

pub use error::{CrmError, Result};
pub use models::*;
