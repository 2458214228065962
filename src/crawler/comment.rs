//! Remote comment API envelope types and record normalization
//!
//! The remote returns a JSON envelope with a `data.replies` array and, for
//! the main listing, a pagination cursor. An absent `data`, absent `replies`,
//! or empty array signals end-of-data rather than an error, so page parsing
//! is surfaced as a tagged [`PageOutcome`] and callers never confuse "no more
//! comments" with a failed request.

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::models::CommentRecord;

/// Label for members without an IP location
const UNKNOWN_LOCATION: &str = "未知";

/// Number of prefix characters ("IP属地：") stripped from the location field
const LOCATION_PREFIX_CHARS: usize = 5;

// ============================================================================
// API Response Structures
// ============================================================================

/// Root response envelope from both listing endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub data: Option<EnvelopeData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeData {
    #[serde(default)]
    pub replies: Option<Vec<RawReply>>,

    #[serde(default)]
    pub cursor: Option<EnvelopeCursor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeCursor {
    #[serde(default)]
    pub pagination_reply: Option<PaginationReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationReply {
    /// String cursor, or numeric 0 meaning "no more pages"
    #[serde(default)]
    pub next_offset: Option<serde_json::Value>,
}

/// Raw comment record as returned by the remote
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReply {
    /// Remote comment id
    #[serde(default)]
    pub rpid: i64,

    /// Root comment id; 0 for top-level comments
    #[serde(default)]
    pub parent: i64,

    /// Author id
    #[serde(default)]
    pub mid: i64,

    #[serde(default)]
    pub member: RawMember,

    #[serde(default)]
    pub content: RawContent,

    /// Creation time, epoch seconds
    #[serde(default)]
    pub ctime: i64,

    /// Like count
    #[serde(default)]
    pub like: i64,

    #[serde(default)]
    pub reply_control: Option<RawReplyControl>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMember {
    #[serde(default)]
    pub uname: String,

    #[serde(default)]
    pub sex: String,

    #[serde(default)]
    pub avatar: String,

    #[serde(default)]
    pub sign: Option<String>,

    #[serde(default)]
    pub level_info: RawLevelInfo,

    #[serde(default)]
    pub vip: RawVip,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLevelInfo {
    #[serde(default)]
    pub current_level: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVip {
    /// 0 = not a member, nonzero = member
    #[serde(default, rename = "vipStatus")]
    pub vip_status: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawContent {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReplyControl {
    /// "IP属地：xx" label
    #[serde(default)]
    pub location: Option<String>,

    /// "共N条回复" entry text, carries the reported sub-reply count
    #[serde(default)]
    pub sub_reply_entry_text: Option<String>,
}

impl RawReply {
    /// Reported sub-reply count, parsed from the "共N条回复" entry text
    pub fn reported_reply_count(&self) -> u32 {
        self.reply_control
            .as_ref()
            .and_then(|rc| rc.sub_reply_entry_text.as_deref())
            .and_then(parse_reported_count)
            .unwrap_or(0)
    }
}

// ============================================================================
// Tagged page results
// ============================================================================

/// Cursor threading one main-listing fetch to the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// More pages remain; pass this cursor to the next request
    Next(String),
    /// The remote signalled the last page
    End,
}

/// One successfully parsed page of raw records
#[derive(Debug, Clone)]
pub struct ReplyPage {
    pub replies: Vec<RawReply>,
    pub next: PageCursor,
}

/// Outcome of one page fetch: records, or a graceful end of the stream
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Records(ReplyPage),
    EndOfData,
}

impl Envelope {
    /// Collapse the envelope into a tagged page outcome.
    ///
    /// Missing `data`, missing `replies`, or an empty list all mean the
    /// stream is exhausted.
    pub fn into_outcome(self) -> PageOutcome {
        let Some(data) = self.data else {
            return PageOutcome::EndOfData;
        };

        let next = next_cursor(data.cursor.as_ref());

        match data.replies {
            Some(replies) if !replies.is_empty() => {
                PageOutcome::Records(ReplyPage { replies, next })
            }
            _ => PageOutcome::EndOfData,
        }
    }
}

/// Extract the next-page cursor from the envelope.
///
/// Only a non-empty JSON string continues the stream; the remote's numeric 0
/// sentinel, an empty string, or an absent field all end it.
fn next_cursor(cursor: Option<&EnvelopeCursor>) -> PageCursor {
    let offset = cursor
        .and_then(|c| c.pagination_reply.as_ref())
        .and_then(|p| p.next_offset.as_ref());

    match offset {
        Some(serde_json::Value::String(s)) if !s.is_empty() => PageCursor::Next(s.clone()),
        _ => PageCursor::End,
    }
}

// ============================================================================
// Normalization
// ============================================================================

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Map a raw remote record into the persisted comment shape.
///
/// Pure and infallible: every optional field has a defined default.
pub fn normalize(raw: &RawReply, comment_index: u32) -> CommentRecord {
    let is_vip = if raw.member.vip.vip_status == 0 {
        "否".to_string()
    } else {
        "是".to_string()
    };

    let ip_location = raw
        .reply_control
        .as_ref()
        .and_then(|rc| rc.location.as_deref())
        .map(strip_location_prefix)
        .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());

    let reply_count = raw.reported_reply_count();

    CommentRecord {
        comment_index,
        parent_id: raw.parent,
        comment_id: raw.rpid,
        user_id: raw.mid,
        username: raw.member.uname.clone(),
        user_level: raw.member.level_info.current_level,
        gender: raw.member.sex.clone(),
        content: raw.content.message.clone(),
        comment_time: epoch_to_datetime(raw.ctime),
        reply_count,
        like_count: raw.like,
        signature: raw.member.sign.clone().unwrap_or_default(),
        ip_location,
        is_vip,
        avatar: raw.member.avatar.clone(),
    }
}

/// Strip the fixed "IP属地：" prefix (character-wise, not byte-wise)
fn strip_location_prefix(location: &str) -> String {
    location.chars().skip(LOCATION_PREFIX_CHARS).collect()
}

/// Pull the first run of digits out of the "共N条回复" entry text
fn parse_reported_count(text: &str) -> Option<u32> {
    DIGIT_RUN.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Convert remote epoch seconds to a UTC timestamp
fn epoch_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with(f: impl FnOnce(&mut RawReply)) -> RawReply {
        let mut raw = RawReply {
            rpid: 1001,
            parent: 0,
            mid: 42,
            ctime: 1_700_000_000,
            like: 7,
            ..Default::default()
        };
        raw.member.uname = "观众甲".to_string();
        raw.member.sex = "男".to_string();
        raw.content.message = "前排".to_string();
        f(&mut raw);
        raw
    }

    #[test]
    fn test_normalize_basic_fields() {
        let raw = raw_with(|_| {});
        let comment = normalize(&raw, 3);

        assert_eq!(comment.comment_index, 3);
        assert_eq!(comment.comment_id, 1001);
        assert_eq!(comment.parent_id, 0);
        assert_eq!(comment.user_id, 42);
        assert_eq!(comment.username, "观众甲");
        assert_eq!(comment.content, "前排");
        assert_eq!(comment.like_count, 7);
        assert_eq!(comment.comment_time.timestamp(), 1_700_000_000);
        assert!(comment.is_top_level());
    }

    #[test]
    fn test_vip_label() {
        let raw = raw_with(|r| r.member.vip.vip_status = 0);
        assert_eq!(normalize(&raw, 1).is_vip, "否");

        let raw = raw_with(|r| r.member.vip.vip_status = 2);
        assert_eq!(normalize(&raw, 1).is_vip, "是");
    }

    #[test]
    fn test_ip_location_prefix_stripped() {
        let raw = raw_with(|r| {
            r.reply_control = Some(RawReplyControl {
                location: Some("IP属地：广东".to_string()),
                sub_reply_entry_text: None,
            });
        });
        assert_eq!(normalize(&raw, 1).ip_location, "广东");
    }

    #[test]
    fn test_ip_location_defaults_to_unknown() {
        let raw = raw_with(|_| {});
        assert_eq!(normalize(&raw, 1).ip_location, "未知");

        let raw = raw_with(|r| {
            r.reply_control = Some(RawReplyControl::default());
        });
        assert_eq!(normalize(&raw, 1).ip_location, "未知");
    }

    #[test]
    fn test_reported_count_parsed_from_entry_text() {
        let raw = raw_with(|r| {
            r.reply_control = Some(RawReplyControl {
                location: None,
                sub_reply_entry_text: Some("共25条回复".to_string()),
            });
        });
        assert_eq!(normalize(&raw, 1).reply_count, 25);
    }

    #[test]
    fn test_reported_count_defaults_to_zero() {
        let raw = raw_with(|_| {});
        assert_eq!(normalize(&raw, 1).reply_count, 0);

        let raw = raw_with(|r| {
            r.reply_control = Some(RawReplyControl {
                location: None,
                sub_reply_entry_text: Some("查看全部回复".to_string()),
            });
        });
        assert_eq!(normalize(&raw, 1).reply_count, 0);
    }

    #[test]
    fn test_signature_defaults_to_empty() {
        let raw = raw_with(|_| {});
        assert_eq!(normalize(&raw, 1).signature, "");

        let raw = raw_with(|r| r.member.sign = Some("签名".to_string()));
        assert_eq!(normalize(&raw, 1).signature, "签名");
    }

    #[test]
    fn test_envelope_missing_data_is_end() {
        let envelope: Envelope = serde_json::from_str(r#"{"code":0}"#).unwrap();
        assert!(matches!(envelope.into_outcome(), PageOutcome::EndOfData));
    }

    #[test]
    fn test_envelope_empty_replies_is_end() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"data":{"replies":[]}}"#).unwrap();
        assert!(matches!(envelope.into_outcome(), PageOutcome::EndOfData));
    }

    #[test]
    fn test_envelope_with_records_and_string_cursor() {
        let json = r#"{
            "data": {
                "replies": [
                    {"rpid": 1, "parent": 0, "mid": 9,
                     "member": {"uname": "a", "sex": "保密",
                                "level_info": {"current_level": 5},
                                "vip": {"vipStatus": 1}},
                     "content": {"message": "hello"},
                     "ctime": 1700000000, "like": 2}
                ],
                "cursor": {"pagination_reply": {"next_offset": "tok_2"}}
            }
        }"#;

        let envelope: Envelope = serde_json::from_str(json).unwrap();
        let PageOutcome::Records(page) = envelope.into_outcome() else {
            panic!("expected records");
        };
        assert_eq!(page.replies.len(), 1);
        assert_eq!(page.replies[0].member.level_info.current_level, 5);
        assert_eq!(page.next, PageCursor::Next("tok_2".to_string()));
    }

    #[test]
    fn test_envelope_numeric_zero_cursor_is_end() {
        let json = r#"{
            "data": {
                "replies": [{"rpid": 1}],
                "cursor": {"pagination_reply": {"next_offset": 0}}
            }
        }"#;

        let envelope: Envelope = serde_json::from_str(json).unwrap();
        let PageOutcome::Records(page) = envelope.into_outcome() else {
            panic!("expected records");
        };
        assert_eq!(page.next, PageCursor::End);
    }

    #[test]
    fn test_envelope_empty_string_cursor_is_end() {
        let json = r#"{
            "data": {
                "replies": [{"rpid": 1}],
                "cursor": {"pagination_reply": {"next_offset": ""}}
            }
        }"#;

        let envelope: Envelope = serde_json::from_str(json).unwrap();
        let PageOutcome::Records(page) = envelope.into_outcome() else {
            panic!("expected records");
        };
        assert_eq!(page.next, PageCursor::End);
    }
}
