//! Schema versioning for the PromptLab database.
//!
//! Each migration is a forward-only step recorded in `schema_migrations`
//! once it has run. Step 1 is the base schema from
//! [`init_sqlite_schema`](crate::init_sqlite_schema); later steps alter it.

use crate::{PromptLabError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::info;

struct Migration {
    version: i64,
    description: &'static str,
    apply: fn(&Connection) -> Result<()>,
}

/// Known steps, oldest first. Versions are never reused.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Base schema",
    apply: crate::init_sqlite_schema,
}];

/// A row of `schema_migrations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
    pub applied_at: String,
}

/// Version of the newest known step.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

fn has_version_table(conn: &Connection) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Apply every step that is not recorded yet and return how many ran.
///
/// Everything runs in one IMMEDIATE transaction: a second process migrating
/// the same file blocks until the first commits, then finds nothing pending.
/// A failing step rolls back the whole run.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
           version INTEGER PRIMARY KEY,
           description TEXT NOT NULL,
           applied_at TEXT NOT NULL
         );",
    )?;

    let current = schema_version(&tx)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    for migration in &pending {
        info!(
            version = migration.version,
            description = migration.description,
            "Applying migration"
        );
        (migration.apply)(&tx).map_err(|e| {
            PromptLabError::Other(format!("Migration {} failed: {}", migration.version, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.description, Utc::now()],
        )?;
    }

    tx.commit()?;
    Ok(pending.len())
}

/// Highest recorded version; 0 for a database that was never migrated.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    if !has_version_table(conn)? {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Recorded steps, oldest first.
pub fn get_migration_history(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    if !has_version_table(conn)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT version, description, applied_at FROM schema_migrations ORDER BY version",
    )?;
    let history = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                description: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(history)
}
