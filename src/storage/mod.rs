//! SQLite persistence for jobs, comments, and accounts
//!
//! A single [`Database`] wraps one `rusqlite` connection behind a mutex.
//! Writes are individually committed (autocommit), which gives acquisition
//! runs their durable-prefix property: anything inserted before a failure
//! stays inserted.
//!
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text so range filters can
//! use plain string comparison.

mod comments;
mod jobs;
mod users;

pub use jobs::JobListing;
pub use users::{User, ADMIN_LEVEL};

use crate::error::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Stored timestamp format
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite-backed store shared across the server and the engine
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// In-memory database for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS crawl_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bv TEXT NOT NULL,
                title TEXT NOT NULL,
                mode INTEGER NOT NULL,
                is_second INTEGER NOT NULL,
                comment_count INTEGER NOT NULL DEFAULT 0,
                start_time TEXT NOT NULL,
                end_time TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                error_message TEXT,
                user_id INTEGER REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crawl_id INTEGER NOT NULL REFERENCES crawl_records(id) ON DELETE CASCADE,
                comment_index INTEGER NOT NULL,
                parent_id INTEGER NOT NULL,
                comment_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                user_level INTEGER NOT NULL,
                gender TEXT NOT NULL,
                content TEXT NOT NULL,
                comment_time TEXT NOT NULL,
                reply_count INTEGER NOT NULL,
                like_count INTEGER NOT NULL,
                signature TEXT NOT NULL,
                ip_location TEXT NOT NULL,
                is_vip TEXT NOT NULL,
                avatar TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_comments_crawl ON comments(crawl_id);

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS verification_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                code TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Run a closure against the locked connection
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        Ok(f(&conn)?)
    }
}

/// Format a timestamp for storage
pub(crate) fn format_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a stored timestamp, tolerating nothing but the stored format
pub(crate) fn parse_time(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}
