//! Censo Database Layer
//!
//! Provides `SQLite` storage for subjects, their validation records and the
//! durable job queue. Uses `SQLx` with embedded migrations.
//!
//! # Architecture
//!
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Connection Pooling**: Configurable pool; `:memory:` for tests
//! - **Timestamps**: Fixed-width RFC 3339 UTC text, so they compare as strings
//! - **Job Queue**: [`SqliteJobQueue`] implements the scheduler's `JobQueue`
//!
//! # Example
//!
//! ```ignore
//! use censo_db::Database;
//!
//! let db = Database::new("censo.db", 5).await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
/// Durable job queue.
pub mod jobs;
pub mod migrations;
pub mod subjects;
pub mod validation_records;

// Re-export commonly used types
pub use connection::DbPool;
pub use error::{DatabaseError, Result};
pub use jobs::SqliteJobQueue;
pub use subjects::Subject;

use std::path::Path;

/// High-level database handle.
///
/// Wraps the pool and exposes migrations; data access goes through the
/// module functions, which take the raw `SQLx` pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the database at `path` (or `:memory:`).
    pub async fn new(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let pool = DbPool::new(path, max_connections).await?;
        Ok(Self { pool })
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Job queue over this database.
    #[must_use]
    pub fn job_queue(&self) -> SqliteJobQueue {
        SqliteJobQueue::new(self.pool.pool().clone())
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
