//! Account persistence and email verification codes

use super::{format_time, parse_time, Database};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

/// Verification codes expire after this many minutes
const CODE_TTL_MINUTES: i64 = 3;

/// Privilege level of administrator accounts
pub const ADMIN_LEVEL: i64 = 2;

/// A registered account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub level: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this account sees every job, not just its own
    pub fn is_admin(&self) -> bool {
        self.level >= ADMIN_LEVEL
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get("created_at")?;
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        level: row.get("level")?,
        created_at: parse_time(&created_at),
    })
}

impl Database {
    /// Insert a new account, returning its id
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        level: i64,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password_hash, level, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![username, email, password_hash, level, format_time(Utc::now())],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], user_from_row)
                .optional()
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()
        })
    }

    /// Look up an account by username or email, for login
    pub fn find_user_by_login(&self, identifier: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM users WHERE username = ?1 OR email = ?1",
                params![identifier],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn username_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn email_exists(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Whether any administrator account exists
    pub fn has_admin(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE level >= ?1",
                params![ADMIN_LEVEL],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Store a fresh verification code for an address, replacing any
    /// previous one
    pub fn store_verification_code(&self, email: &str, code: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM verification_codes WHERE email = ?1",
                params![email],
            )?;
            conn.execute(
                "INSERT INTO verification_codes (email, code, created_at) VALUES (?1, ?2, ?3)",
                params![email, code, format_time(Utc::now())],
            )?;
            Ok(())
        })
    }

    /// Check a verification code and consume it on success.
    ///
    /// Codes are single-use and expire after [`CODE_TTL_MINUTES`].
    pub fn consume_verification_code(&self, email: &str, code: &str) -> Result<bool> {
        let oldest_valid = format_time(Utc::now() - Duration::minutes(CODE_TTL_MINUTES));
        self.with_conn(|conn| {
            let matched: i64 = conn.query_row(
                "SELECT COUNT(*) FROM verification_codes
                 WHERE email = ?1 AND code = ?2 AND created_at >= ?3",
                params![email, code, oldest_valid],
                |row| row.get(0),
            )?;

            if matched > 0 {
                conn.execute(
                    "DELETE FROM verification_codes WHERE email = ?1",
                    params![email],
                )?;
            }
            Ok(matched > 0)
        })
    }
}
