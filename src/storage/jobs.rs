//! Job persistence: lifecycle transitions and listings

use super::{format_time, parse_time, Database};
use crate::error::Result;
use crate::models::{CrawlJob, JobStatus, SortMode};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

/// A job joined with its owner's username, for admin listings
#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    #[serde(flatten)]
    pub job: CrawlJob,
    pub owner_username: Option<String>,
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlJob> {
    let mode: u8 = row.get("mode")?;
    let status: String = row.get("status")?;
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;

    Ok(CrawlJob {
        id: row.get("id")?,
        bv: row.get("bv")?,
        title: row.get("title")?,
        mode: SortMode::from_mode(mode),
        is_second: row.get("is_second")?,
        comment_count: row.get("comment_count")?,
        start_time: parse_time(&start_time),
        end_time: end_time.as_deref().map(parse_time),
        status: status.parse().unwrap_or(JobStatus::Failed),
        error_message: row.get("error_message")?,
        user_id: row.get("user_id")?,
    })
}

impl Database {
    /// Insert a new job in `pending` status, returning its id
    pub fn create_job(
        &self,
        bv: &str,
        title: &str,
        mode: SortMode,
        is_second: bool,
        user_id: Option<i64>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO crawl_records (bv, title, mode, is_second, comment_count, start_time, status, user_id)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)",
                params![
                    bv,
                    title,
                    mode.mode(),
                    is_second,
                    format_time(Utc::now()),
                    JobStatus::Pending.as_str(),
                    user_id,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Transition a job to `running`
    pub fn set_job_running(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE crawl_records SET status = ?1 WHERE id = ?2",
                params![JobStatus::Running.as_str(), id],
            )?;
            Ok(())
        })
    }

    /// Record acquisition progress on a running job
    pub fn update_job_progress(&self, id: i64, count: u32) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE crawl_records SET comment_count = ?1 WHERE id = ?2",
                params![count, id],
            )?;
            Ok(())
        })
    }

    /// Transition a job to `done`, recording the final count and end time
    pub fn finish_job(&self, id: i64, count: u32) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE crawl_records SET status = ?1, comment_count = ?2, end_time = ?3 WHERE id = ?4",
                params![
                    JobStatus::Done.as_str(),
                    count,
                    format_time(Utc::now()),
                    id,
                ],
            )?;
            Ok(())
        })
    }

    /// Transition a job to `failed`, keeping the partial count and recording
    /// the failure reason
    pub fn fail_job(&self, id: i64, count: u32, message: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE crawl_records SET status = ?1, comment_count = ?2, end_time = ?3, error_message = ?4
                 WHERE id = ?5",
                params![
                    JobStatus::Failed.as_str(),
                    count,
                    format_time(Utc::now()),
                    message,
                    id,
                ],
            )?;
            Ok(())
        })
    }

    /// Fetch one job by id
    pub fn get_job(&self, id: i64) -> Result<Option<CrawlJob>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM crawl_records WHERE id = ?1",
                params![id],
                job_from_row,
            )
            .optional()
        })
    }

    /// List jobs owned by one account, most recent first
    pub fn list_jobs_for_user(&self, user_id: i64) -> Result<Vec<JobListing>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM crawl_records WHERE user_id = ?1 ORDER BY id DESC",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok(JobListing {
                    job: job_from_row(row)?,
                    owner_username: None,
                })
            })?;
            rows.collect()
        })
    }

    /// List every job with its owner's username, most recent first
    pub fn list_all_jobs(&self) -> Result<Vec<JobListing>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT j.*, u.username AS owner_username
                 FROM crawl_records j LEFT JOIN users u ON j.user_id = u.id
                 ORDER BY j.id DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(JobListing {
                    job: job_from_row(row)?,
                    owner_username: row.get("owner_username")?,
                })
            })?;
            rows.collect()
        })
    }

    /// Delete a job and, via the foreign key cascade, its comments.
    ///
    /// Returns whether a row was deleted.
    pub fn delete_job(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM crawl_records WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lifecycle() {
        let db = Database::in_memory().unwrap();
        let id = db
            .create_job("BV1xx411c7mD", "标题", SortMode::Hot, true, None)
            .unwrap();

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.comment_count, 0);
        assert!(job.end_time.is_none());

        db.set_job_running(id).unwrap();
        db.update_job_progress(id, 20).unwrap();
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.comment_count, 20);

        db.finish_job(id, 42).unwrap();
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.comment_count, 42);
        assert!(job.end_time.is_some());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_failed_job_keeps_partial_count_and_message() {
        let db = Database::in_memory().unwrap();
        let id = db
            .create_job("BV1xx411c7mD", "标题", SortMode::Latest, false, None)
            .unwrap();

        db.set_job_running(id).unwrap();
        db.fail_job(id, 7, "Request timeout").unwrap();

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.comment_count, 7);
        assert_eq!(job.error_message.as_deref(), Some("Request timeout"));
        assert!(job.end_time.is_some());
    }

    #[test]
    fn test_listings_are_owner_scoped() {
        let db = Database::in_memory().unwrap();
        let alice = db.create_user("alice", "alice@example.com", "hash", 1).unwrap();
        let bob = db.create_user("bob", "bob@example.com", "hash", 1).unwrap();

        db.create_job("BV1", "a", SortMode::Hot, true, Some(alice)).unwrap();
        db.create_job("BV2", "b", SortMode::Hot, true, Some(bob)).unwrap();
        db.create_job("BV3", "c", SortMode::Hot, true, Some(alice)).unwrap();

        let mine = db.list_jobs_for_user(alice).unwrap();
        assert_eq!(mine.len(), 2);
        // Most recent first
        assert_eq!(mine[0].job.bv, "BV3");

        let all = db.list_all_jobs().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].owner_username.as_deref(), Some("alice"));
        assert_eq!(all[1].owner_username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_delete_missing_job_returns_false() {
        let db = Database::in_memory().unwrap();
        assert!(!db.delete_job(999).unwrap());
    }
}
