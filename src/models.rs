// Core data structures for the pinglun service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one acquisition run.
///
/// Transitions are monotonic: `Pending -> Running -> {Done, Failed}`.
/// Terminal states are final; a new run requires a new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// Convert to string representation (persisted form)
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether this status ends the job lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "done" => JobStatus::Done,
            _ => JobStatus::Failed,
        })
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remote sort mode for the main comment listing.
///
/// The numeric values are the remote API's `mode` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMode {
    /// Most recent first (mode 2)
    Latest = 2,
    /// By popularity (mode 3)
    Hot = 3,
}

impl SortMode {
    /// Remote `mode` query parameter value
    pub fn mode(&self) -> u8 {
        *self as u8
    }

    /// Create from the remote mode number; unknown values fall back to Hot,
    /// matching the original service's default
    pub fn from_mode(mode: u8) -> Self {
        match mode {
            2 => SortMode::Latest,
            _ => SortMode::Hot,
        }
    }
}

/// One acquisition run and its persisted progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    /// Store-assigned id
    pub id: i64,

    /// Public video handle (BV identifier)
    pub bv: String,

    /// Resolved display title
    pub title: String,

    /// Sort mode used for the run
    pub mode: SortMode,

    /// Whether second-level replies are traversed
    pub is_second: bool,

    /// Number of comments acquired so far (never exceeds the budget)
    pub comment_count: u32,

    /// When the job was created
    pub start_time: DateTime<Utc>,

    /// Set exactly when the job reaches a terminal status
    pub end_time: Option<DateTime<Utc>>,

    /// Lifecycle status
    pub status: JobStatus,

    /// Failure reason, set iff status is Failed
    pub error_message: Option<String>,

    /// Owning account id; None for unattributed jobs
    pub user_id: Option<i64>,
}

/// One normalized comment, as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    /// 1-based sequence index within the job, assigned in acquisition order
    /// across both levels
    pub comment_index: u32,

    /// Remote id of the root comment; 0 for top-level comments
    pub parent_id: i64,

    /// Remote comment id (rpid)
    pub comment_id: i64,

    /// Remote author id (mid)
    pub user_id: i64,

    /// Author display name
    pub username: String,

    /// Author level (0-6)
    pub user_level: u8,

    /// Author gender tag as reported by the remote ("男" / "女" / "保密")
    pub gender: String,

    /// Message text
    pub content: String,

    /// Comment creation time (remote epoch seconds, normalized to UTC)
    pub comment_time: DateTime<Utc>,

    /// Reported sub-reply count ("N more replies" text, parsed)
    pub reply_count: u32,

    /// Like count
    pub like_count: i64,

    /// Author profile signature; empty when absent
    pub signature: String,

    /// IP location label with the remote prefix stripped; "未知" when absent
    pub ip_location: String,

    /// VIP membership label: "是" or "否"
    pub is_vip: String,

    /// Avatar URL
    pub avatar: String,
}

impl CommentRecord {
    /// Whether this is a top-level comment (attached directly to the video)
    pub fn is_top_level(&self) -> bool {
        self.parent_id == 0
    }
}

/// Read-side filters over persisted comments.
///
/// All fields are optional; unset fields do not constrain the result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentFilter {
    /// Username substring match
    pub username: Option<String>,

    /// Content keyword substring match
    pub keyword: Option<String>,

    /// Exact gender match
    pub gender: Option<String>,

    /// Exact user level match
    pub user_level: Option<u8>,

    /// Exact VIP label match ("是" / "否")
    pub is_vip: Option<String>,

    /// Reply count range
    pub min_reply_count: Option<u32>,
    pub max_reply_count: Option<u32>,

    /// Like count range
    pub min_like_count: Option<i64>,
    pub max_like_count: Option<i64>,

    /// When Some(false), restrict to top-level comments only
    pub show_second_level: Option<bool>,

    /// Comment time range (inclusive, RFC 3339)
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl CommentFilter {
    /// Whether any filter is active
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.keyword.is_none()
            && self.gender.is_none()
            && self.user_level.is_none()
            && self.is_vip.is_none()
            && self.min_reply_count.is_none()
            && self.max_reply_count.is_none()
            && self.min_like_count.is_none()
            && self.max_like_count.is_none()
            && self.show_second_level.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }
}

/// One page of a filtered comment listing
#[derive(Debug, Clone, Serialize)]
pub struct CommentPage {
    pub comments: Vec<CommentRecord>,
    pub total: u32,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_unknown_status_is_failed() {
        let parsed: JobStatus = "exploded".parse().unwrap();
        assert_eq!(parsed, JobStatus::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_sort_mode_values() {
        assert_eq!(SortMode::Latest.mode(), 2);
        assert_eq!(SortMode::Hot.mode(), 3);
        assert_eq!(SortMode::from_mode(2), SortMode::Latest);
        assert_eq!(SortMode::from_mode(3), SortMode::Hot);
        // Unknown modes fall back to Hot
        assert_eq!(SortMode::from_mode(7), SortMode::Hot);
    }

    #[test]
    fn test_filter_is_empty() {
        let filter = CommentFilter::default();
        assert!(filter.is_empty());

        let filter = CommentFilter {
            keyword: Some("测试".to_string()),
            ..Default::default()
        };
        assert!(!filter.is_empty());
    }
}
