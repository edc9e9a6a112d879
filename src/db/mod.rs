pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::config::Config;
use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// The document store backing posts and like records.
///
/// `Unconfigured` stands in for a deployment with no database: every
/// operation that needs the store sees it explicitly instead of probing for
/// a missing handle.
#[derive(Clone)]
pub enum DocumentStore {
    Configured(DbPool),
    Unconfigured,
}

impl DocumentStore {
    /// Opens and migrates the configured database, or returns `Unconfigured`
    /// when the database is disabled.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        match (config.database.enabled, config.db_path()) {
            (true, Some(path)) => {
                let pool = create_pool(path)?;
                run_migrations(&pool)?;
                Ok(DocumentStore::Configured(pool))
            }
            _ => {
                tracing::warn!("Document store is not configured; posts and likes fall back");
                Ok(DocumentStore::Unconfigured)
            }
        }
    }

    pub fn pool(&self) -> Option<&DbPool> {
        match self {
            DocumentStore::Configured(pool) => Some(pool),
            DocumentStore::Unconfigured => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, DocumentStore::Configured(_))
    }
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(pool)
}

/// Single-connection in-memory pool, for tests and throwaway runs.
pub fn memory_pool() -> anyhow::Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager)?;
    run_migrations(&pool)?;
    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}
