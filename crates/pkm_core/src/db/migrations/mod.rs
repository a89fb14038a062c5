//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register workflow schema migrations in strictly increasing order.
//! - Apply pending migrations atomically and record the applied version.
//!
//! # Invariants
//! - `version` values must remain monotonic and never be renumbered.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A database newer than this binary is never touched.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "reference",
        sql: include_str!("0001_reference.sql"),
    },
    Migration {
        version: 2,
        name: "submissions",
        sql: include_str!("0002_submissions.sql"),
    },
    Migration {
        version: 3,
        name: "reviews",
        sql: include_str!("0003_reviews.sql"),
    },
    Migration {
        version: 4,
        name: "active_views",
        sql: include_str!("0004_active_views.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    // Immediate: two processes opening a fresh file must not both migrate.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current_version = current_user_version(&tx)?;
    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(())
}

/// Reads the schema version recorded on the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
