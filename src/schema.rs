//! Table definitions and additive column migrations.

use crate::error::{CrmError, Result};
use rusqlite::Connection;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a migration step waits for another writer to release the store
const MIGRATION_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// A column added to `contacts` after the initial release, paired with the
/// statement that adds it.
pub type ColumnMigration = (&'static str, &'static str);

/// Columns added after the initial release, in the order they were introduced.
pub const CONTACT_COLUMN_MIGRATIONS: &[ColumnMigration] = &[
    ("twitter", "ALTER TABLE contacts ADD COLUMN twitter TEXT DEFAULT NULL"),
    ("linkedin", "ALTER TABLE contacts ADD COLUMN linkedin TEXT DEFAULT NULL"),
];

/// Result of one column step, tagged with its position in the migration list
#[derive(Debug)]
struct StepOutcome {
    index: usize,
    column: &'static str,
    result: rusqlite::Result<()>,
}

/// Outcome of a schema initialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Columns added by this run
    pub added: Vec<String>,
    /// Columns whose migration failed and was skipped
    pub failed: Vec<String>,
}

/// Counts migration steps needed against steps completed. Child tables are
/// only created once the barrier has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationBarrier {
    needed: usize,
    completed: usize,
}

impl MigrationBarrier {
    pub fn new(needed: usize) -> Self {
        Self {
            needed,
            completed: 0,
        }
    }

    /// Mark one step finished, whether it succeeded or failed.
    pub fn complete(&mut self) {
        if self.completed < self.needed {
            self.completed += 1;
        }
    }

    pub fn remaining(&self) -> usize {
        self.needed - self.completed
    }

    pub fn is_settled(&self) -> bool {
        self.completed == self.needed
    }
}

/// Schema management
pub struct Schema;

impl Schema {
    /// Bring the store up to the current schema. Idempotent.
    pub fn init(conn: &Connection) -> Result<SchemaReport> {
        Self::init_with(conn, CONTACT_COLUMN_MIGRATIONS)
    }

    /// Same as [`Schema::init`] over an explicit migration list.
    ///
    /// On a file-backed store each pending step runs on its own connection,
    /// all at once. An in-memory store is private to `conn`, so its steps run
    /// in order on it. Either way every step reports to a [`MigrationBarrier`],
    /// and the dependent tables are only created once it has settled.
    pub fn init_with(conn: &Connection, migrations: &[ColumnMigration]) -> Result<SchemaReport> {
        Self::create_contacts_table(conn)?;

        let existing = Self::contact_columns(conn)?;
        let pending: Vec<&ColumnMigration> = migrations
            .iter()
            .filter(|(column, _)| !existing.iter().any(|c| c == column))
            .collect();

        let mut barrier = MigrationBarrier::new(pending.len());
        let mut outcomes = match Self::store_path(conn) {
            Some(path) if pending.len() > 1 => Self::run_concurrent(&path, &pending, &mut barrier),
            _ => Self::run_serial(conn, &pending, &mut barrier),
        };
        outcomes.sort_by_key(|o| o.index);

        let mut report = SchemaReport::default();
        for StepOutcome { column, result, .. } in outcomes {
            match result {
                Ok(()) => {
                    info!(column, "added contacts column");
                    report.added.push(column.to_string());
                }
                Err(e) => {
                    warn!(column, error = %e, "column migration failed, continuing");
                    report.failed.push(column.to_string());
                }
            }
        }

        Self::create_dependents(conn, &barrier)?;

        debug!(
            added = report.added.len(),
            failed = report.failed.len(),
            "schema ready"
        );
        Ok(report)
    }

    /// Path of the store file, or `None` for an in-memory store
    fn store_path(conn: &Connection) -> Option<String> {
        conn.path()
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }

    fn run_serial(
        conn: &Connection,
        pending: &[&ColumnMigration],
        barrier: &mut MigrationBarrier,
    ) -> Vec<StepOutcome> {
        pending
            .iter()
            .enumerate()
            .map(|(index, &&(column, statement))| {
                let result = conn.execute(statement, []).map(|_| ());
                barrier.complete();
                StepOutcome {
                    index,
                    column,
                    result,
                }
            })
            .collect()
    }

    fn run_concurrent(
        path: &str,
        pending: &[&ColumnMigration],
        barrier: &mut MigrationBarrier,
    ) -> Vec<StepOutcome> {
        let (tx, rx) = mpsc::channel();
        let mut outcomes = Vec::with_capacity(pending.len());

        thread::scope(|scope| {
            for (index, &&(column, statement)) in pending.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move || {
                    let result = Connection::open(path)
                        .and_then(|step_conn| {
                            step_conn.busy_timeout(MIGRATION_BUSY_TIMEOUT)?;
                            step_conn.execute(statement, [])
                        })
                        .map(|_| ());
                    let _ = tx.send(StepOutcome {
                        index,
                        column,
                        result,
                    });
                });
            }
            drop(tx);

            for outcome in rx {
                barrier.complete();
                debug!(
                    column = outcome.column,
                    remaining = barrier.remaining(),
                    "column step finished"
                );
                outcomes.push(outcome);
            }
        });

        outcomes
    }

    /// Create the tables and indexes that depend on `contacts`. Fails while
    /// any migration step is still outstanding.
    pub(crate) fn create_dependents(conn: &Connection, barrier: &MigrationBarrier) -> Result<()> {
        if !barrier.is_settled() {
            return Err(CrmError::MigrationIncomplete(barrier.remaining()));
        }
        Self::create_child_tables(conn)?;
        Self::create_indexes(conn)
    }

    /// Column names of the `contacts` table, in table order
    pub fn contact_columns(conn: &Connection) -> Result<Vec<String>> {
        Self::table_columns(conn, "contacts")
    }

    pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        names
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.into())
    }

    /// Check if the three tables are present
    pub fn is_initialized(conn: &Connection) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
             AND name IN ('contacts', 'contact_entries', 'contact_todos')",
            [],
            |row| row.get(0),
        )?;
        Ok(count == 3)
    }

    fn create_contacts_table(conn: &Connection) -> Result<()> {
        // Initial column set; later columns arrive through migrations.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                organization TEXT,
                job_title TEXT,
                email TEXT,
                phone TEXT,
                notes TEXT,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn create_child_tables(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS contact_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contact_id INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('call', 'email', 'meeting', 'note', 'task')),
                subject TEXT NOT NULL,
                content TEXT,
                interaction_date TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS contact_todos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contact_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                target_date TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn create_indexes(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(name)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_contact_date
             ON contact_entries(contact_id, interaction_date)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_todos_contact_id ON contact_todos(contact_id)",
            [],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::TempDir;

    fn create_legacy_contacts(conn: &Connection) {
        conn.execute(
            "CREATE TABLE contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                organization TEXT,
                job_title TEXT,
                email TEXT,
                phone TEXT,
                notes TEXT,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO contacts (name, created_at, updated_at)
             VALUES ('Grace Hopper', '2020-01-01T00:00:00+00:00', '2020-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
    }

    fn legacy_store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_legacy_contacts(&conn);
        conn
    }

    fn legacy_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("legacy.db");
        create_legacy_contacts(&Connection::open(&path).unwrap());
        path
    }

    fn table_count(conn: &Connection, name: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_init_fresh_store() {
        let conn = Connection::open_in_memory().unwrap();
        let report = Schema::init(&conn).unwrap();

        assert_eq!(report.added, vec!["twitter", "linkedin"]);
        assert!(report.failed.is_empty());
        assert!(Schema::is_initialized(&conn).unwrap());
    }

    #[test]
    fn test_init_twice_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        Schema::init(&conn).unwrap();
        let columns = Schema::contact_columns(&conn).unwrap();

        let report = Schema::init(&conn).unwrap();
        assert_eq!(report, SchemaReport::default());
        assert_eq!(Schema::contact_columns(&conn).unwrap(), columns);
    }

    #[test]
    fn test_legacy_store_gains_columns_and_keeps_rows() {
        let conn = legacy_store();
        assert!(!Schema::is_initialized(&conn).unwrap());

        let report = Schema::init(&conn).unwrap();
        assert_eq!(report.added, vec!["twitter", "linkedin"]);

        let columns = Schema::contact_columns(&conn).unwrap();
        assert!(columns.contains(&"twitter".to_string()));
        assert!(columns.contains(&"linkedin".to_string()));

        let name: String = conn
            .query_row("SELECT name FROM contacts WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Grace Hopper");
        assert!(Schema::is_initialized(&conn).unwrap());
    }

    #[test]
    fn test_partially_migrated_store() {
        let conn = legacy_store();
        conn.execute("ALTER TABLE contacts ADD COLUMN twitter TEXT", [])
            .unwrap();

        let report = Schema::init(&conn).unwrap();
        assert_eq!(report.added, vec!["linkedin"]);
    }

    #[test]
    fn test_failed_migration_is_not_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        let migrations: &[ColumnMigration] = &[
            ("broken", "ALTER TABLE no_such_table ADD COLUMN broken TEXT"),
            ("twitter", "ALTER TABLE contacts ADD COLUMN twitter TEXT"),
        ];

        let report = Schema::init_with(&conn, migrations).unwrap();
        assert_eq!(report.failed, vec!["broken"]);
        assert_eq!(report.added, vec!["twitter"]);
        assert!(Schema::is_initialized(&conn).unwrap());
    }

    #[test]
    fn test_file_store_runs_steps_together() {
        let temp = TempDir::new().unwrap();
        let conn = Connection::open(legacy_file(&temp)).unwrap();
        let migrations: &[ColumnMigration] = &[
            ("twitter", "ALTER TABLE contacts ADD COLUMN twitter TEXT DEFAULT NULL"),
            ("broken", "ALTER TABLE no_such_table ADD COLUMN broken TEXT"),
            ("linkedin", "ALTER TABLE contacts ADD COLUMN linkedin TEXT DEFAULT NULL"),
            ("mastodon", "ALTER TABLE contacts ADD COLUMN mastodon TEXT DEFAULT NULL"),
        ];

        let report = Schema::init_with(&conn, migrations).unwrap();
        assert_eq!(report.added, vec!["twitter", "linkedin", "mastodon"]);
        assert_eq!(report.failed, vec!["broken"]);

        let columns = Schema::contact_columns(&conn).unwrap();
        assert!(columns.contains(&"mastodon".to_string()));
        assert!(Schema::is_initialized(&conn).unwrap());
        assert_eq!(table_count(&conn, "contact_entries"), 1);
        assert_eq!(table_count(&conn, "contact_todos"), 1);
    }

    #[test]
    fn test_child_tables_wait_for_steps_held_by_another_writer() {
        let temp = TempDir::new().unwrap();
        let path = legacy_file(&temp);

        let writer = Connection::open(&path).unwrap();
        writer.execute_batch("BEGIN IMMEDIATE").unwrap();
        let release = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            writer.execute_batch("COMMIT").unwrap();
        });

        let conn = Connection::open(&path).unwrap();
        let started = Instant::now();
        let report = Schema::init(&conn).unwrap();
        release.join().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(report.added, vec!["twitter", "linkedin"]);
        assert!(report.failed.is_empty());
        assert_eq!(table_count(&conn, "contact_entries"), 1);
        assert_eq!(table_count(&conn, "contact_todos"), 1);

        let again = Schema::init(&conn).unwrap();
        assert_eq!(again, SchemaReport::default());
        assert_eq!(table_count(&conn, "contact_entries"), 1);
    }

    #[test]
    fn test_unsettled_barrier_blocks_child_tables() {
        let conn = legacy_store();
        let mut barrier = MigrationBarrier::new(2);
        barrier.complete();

        assert!(matches!(
            Schema::create_dependents(&conn, &barrier),
            Err(CrmError::MigrationIncomplete(1))
        ));
        assert_eq!(table_count(&conn, "contact_entries"), 0);
        assert_eq!(table_count(&conn, "contact_todos"), 0);

        barrier.complete();
        Schema::create_dependents(&conn, &barrier).unwrap();
        Schema::create_dependents(&conn, &barrier).unwrap();
        assert_eq!(table_count(&conn, "contact_entries"), 1);
        assert_eq!(table_count(&conn, "contact_todos"), 1);
    }

    #[test]
    fn test_barrier_settles_with_zero_steps() {
        let barrier = MigrationBarrier::new(0);
        assert!(barrier.is_settled());
        assert_eq!(barrier.remaining(), 0);
    }

    #[test]
    fn test_barrier_counts_steps() {
        let mut barrier = MigrationBarrier::new(2);
        assert!(!barrier.is_settled());
        barrier.complete();
        assert_eq!(barrier.remaining(), 1);
        barrier.complete();
        barrier.complete();
        assert!(barrier.is_settled());
    }
}
