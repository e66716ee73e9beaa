//! Database module for the cadenza catalog.
//!
//! This module provides SQLite access with connection pooling. Connections
//! are checked out per operation and never held across a whole scan, so UI
//! readers are not blocked by a long-running sync.

pub mod catalog;
pub mod models;
pub mod orphans;
pub mod schema;
pub mod upsert;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use models::*;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl DbError {
    /// Whether a retry of the whole write may succeed.
    ///
    /// Unique-constraint violations come from a concurrent writer inserting
    /// the same row; busy/locked come from SQLite's single-writer lock.
    pub fn is_write_conflict(&self) -> bool {
        match self {
            DbError::Constraint(_) => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => match err.code {
                rusqlite::ErrorCode::ConstraintViolation => {
                    err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                }
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => true,
                _ => false,
            },
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection pool type alias
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    schema::register_collations(conn)
}

/// Main database interface with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: Arc<DbPool>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("Database")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl Database {
    /// Open (or create) the catalog at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> DbResult<Self> {
        let manager = SqliteConnectionManager::file(db_path).with_init(init_connection);
        let pool = Pool::builder()
            .max_size(10)
            .min_idle(Some(2))
            .build(manager)?;

        let db = Self {
            pool: Arc::new(pool),
        };

        db.init()?;

        Ok(db)
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// The pool holds exactly one connection that is never recycled, since
    /// every new in-memory connection is a fresh, empty database.
    pub fn new_in_memory() -> DbResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        let db = Self {
            pool: Arc::new(pool),
        };

        db.init()?;

        Ok(db)
    }

    /// Initialize the database schema and run migrations
    fn init(&self) -> DbResult<()> {
        let conn = self.pool.get()?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            ",
        )?;

        schema::create_tables(&conn)?;
        schema::run_migrations(&conn)?;

        Ok(())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> DbResult<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Execute a function with a connection
    pub fn with_conn<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        let conn = self.conn()?;
        f(&conn)
    }

    /// Execute a function within a transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise.
    pub fn transaction<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;

        Ok(result)
    }

    /// Run `f` with a pooled connection on the blocking thread pool
    pub async fn call<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| DbError::Task(e.to_string()))?
    }

    /// Run `f` inside a transaction on the blocking thread pool
    pub async fn call_tx<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.transaction(f))
            .await
            .map_err(|e| DbError::Task(e.to_string()))?
    }
}
