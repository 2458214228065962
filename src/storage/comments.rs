//! Comment persistence and filtered queries
//!
//! Read queries share one dynamically built WHERE clause so the count, the
//! paginated listing, and the export all agree on what a filter matches.

use super::{format_time, parse_time, Database};
use crate::error::Result;
use crate::models::{CommentFilter, CommentPage, CommentRecord};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    let comment_time: String = row.get("comment_time")?;
    Ok(CommentRecord {
        comment_index: row.get("comment_index")?,
        parent_id: row.get("parent_id")?,
        comment_id: row.get("comment_id")?,
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        user_level: row.get("user_level")?,
        gender: row.get("gender")?,
        content: row.get("content")?,
        comment_time: parse_time(&comment_time),
        reply_count: row.get("reply_count")?,
        like_count: row.get("like_count")?,
        signature: row.get("signature")?,
        ip_location: row.get("ip_location")?,
        is_vip: row.get("is_vip")?,
        avatar: row.get("avatar")?,
    })
}

/// Build the WHERE clause for a filtered query.
///
/// Always constrains by job id; each active filter field appends one
/// condition and, where applicable, one bound parameter.
fn build_where(job_id: i64, filter: &CommentFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["crawl_id = ?".to_string()];
    let mut values: Vec<Value> = vec![Value::Integer(job_id)];

    if let Some(username) = &filter.username {
        clauses.push("username LIKE ?".to_string());
        values.push(Value::Text(format!("%{username}%")));
    }
    if let Some(keyword) = &filter.keyword {
        clauses.push("content LIKE ?".to_string());
        values.push(Value::Text(format!("%{keyword}%")));
    }
    if let Some(gender) = &filter.gender {
        clauses.push("gender = ?".to_string());
        values.push(Value::Text(gender.clone()));
    }
    if let Some(level) = filter.user_level {
        clauses.push("user_level = ?".to_string());
        values.push(Value::Integer(level as i64));
    }
    if let Some(is_vip) = &filter.is_vip {
        clauses.push("is_vip = ?".to_string());
        values.push(Value::Text(is_vip.clone()));
    }
    if let Some(min) = filter.min_reply_count {
        clauses.push("reply_count >= ?".to_string());
        values.push(Value::Integer(min as i64));
    }
    if let Some(max) = filter.max_reply_count {
        clauses.push("reply_count <= ?".to_string());
        values.push(Value::Integer(max as i64));
    }
    if let Some(min) = filter.min_like_count {
        clauses.push("like_count >= ?".to_string());
        values.push(Value::Integer(min));
    }
    if let Some(max) = filter.max_like_count {
        clauses.push("like_count <= ?".to_string());
        values.push(Value::Integer(max));
    }
    if filter.show_second_level == Some(false) {
        clauses.push("parent_id = 0".to_string());
    }
    if let Some(start) = &filter.start_time {
        clauses.push("comment_time >= ?".to_string());
        values.push(Value::Text(start.clone()));
    }
    if let Some(end) = &filter.end_time {
        clauses.push("comment_time <= ?".to_string());
        values.push(Value::Text(end.clone()));
    }

    (clauses.join(" AND "), values)
}

impl Database {
    /// Persist one normalized comment under a job.
    ///
    /// Autocommit: each insert is durable on its own.
    pub fn insert_comment(&self, job_id: i64, record: &CommentRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (
                    crawl_id, comment_index, parent_id, comment_id, user_id,
                    username, user_level, gender, content, comment_time,
                    reply_count, like_count, signature, ip_location, is_vip, avatar
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    job_id,
                    record.comment_index,
                    record.parent_id,
                    record.comment_id,
                    record.user_id,
                    record.username,
                    record.user_level,
                    record.gender,
                    record.content,
                    format_time(record.comment_time),
                    record.reply_count,
                    record.like_count,
                    record.signature,
                    record.ip_location,
                    record.is_vip,
                    record.avatar,
                ],
            )?;
            Ok(())
        })
    }

    /// Count the comments a filter matches under one job
    pub fn count_comments(&self, job_id: i64, filter: &CommentFilter) -> Result<u32> {
        let (where_clause, values) = build_where(job_id, filter);
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM comments WHERE {where_clause}"),
                params_from_iter(values),
                |row| row.get(0),
            )
        })
    }

    /// One page of filtered comments, in acquisition order
    pub fn list_comments(
        &self,
        job_id: i64,
        filter: &CommentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<CommentRecord>> {
        let (where_clause, mut values) = build_where(job_id, filter);
        let offset = (page.saturating_sub(1)) * page_size;
        values.push(Value::Integer(page_size as i64));
        values.push(Value::Integer(offset as i64));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM comments WHERE {where_clause}
                 ORDER BY comment_index ASC LIMIT ? OFFSET ?"
            ))?;
            let rows = stmt.query_map(params_from_iter(values), comment_from_row)?;
            rows.collect()
        })
    }

    /// Every filtered comment under one job, in acquisition order (export)
    pub fn list_all_comments(
        &self,
        job_id: i64,
        filter: &CommentFilter,
    ) -> Result<Vec<CommentRecord>> {
        let (where_clause, values) = build_where(job_id, filter);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM comments WHERE {where_clause} ORDER BY comment_index ASC"
            ))?;
            let rows = stmt.query_map(params_from_iter(values), comment_from_row)?;
            rows.collect()
        })
    }

    /// Filtered listing with pagination metadata
    pub fn query_comments(
        &self,
        job_id: i64,
        filter: &CommentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<CommentPage> {
        let total = self.count_comments(job_id, filter)?;
        let comments = self.list_comments(job_id, filter, page, page_size)?;
        let total_pages = total.div_ceil(page_size.max(1));

        Ok(CommentPage {
            comments,
            total,
            page,
            page_size,
            total_pages,
        })
    }
}
