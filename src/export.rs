//! CSV projection of persisted comments
//!
//! The column order and Chinese header names are fixed; downstream
//! spreadsheets key on them. Output is prefixed with a UTF-8 BOM so Excel
//! detects the encoding.

use crate::error::Result;
use crate::models::{CommentFilter, CommentRecord};
use std::io::Write;

/// Fixed export header, in column order
const HEADERS: [&str; 15] = [
    "评论序号",
    "父评论ID",
    "评论ID",
    "用户ID",
    "用户名",
    "用户等级",
    "性别",
    "评论内容",
    "评论时间",
    "回复数",
    "点赞数",
    "个性签名",
    "IP属地",
    "是否大会员",
    "头像链接",
];

/// UTF-8 byte order mark, for spreadsheet encoding detection
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Write comments as CSV to any writer
pub fn write_csv<W: Write>(writer: W, records: &[CommentRecord]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(HEADERS)?;

    for record in records {
        csv.write_record([
            record.comment_index.to_string(),
            record.parent_id.to_string(),
            record.comment_id.to_string(),
            record.user_id.to_string(),
            record.username.clone(),
            record.user_level.to_string(),
            record.gender.clone(),
            record.content.clone(),
            record.comment_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.reply_count.to_string(),
            record.like_count.to_string(),
            record.signature.clone(),
            record.ip_location.clone(),
            record.is_vip.clone(),
            record.avatar.clone(),
        ])?;
    }

    csv.flush().map_err(crate::error::Error::Io)?;
    Ok(())
}

/// Render comments to a BOM-prefixed CSV byte buffer
pub fn to_csv_bytes(records: &[CommentRecord]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(UTF8_BOM);
    write_csv(&mut buf, records)?;
    Ok(buf)
}

/// Derive the download filename from the video title and active filters.
///
/// Filesystem-hostile characters in the title are replaced, and each active
/// filter contributes a tag so differently filtered exports do not collide.
pub fn export_filename(title: &str, filter: &CommentFilter) -> String {
    let mut name = sanitize(title);

    if let Some(username) = &filter.username {
        name.push_str(&format!("_用户名{}", sanitize(username)));
    }
    if let Some(keyword) = &filter.keyword {
        name.push_str(&format!("_关键词{}", sanitize(keyword)));
    }
    if let Some(gender) = &filter.gender {
        name.push_str(&format!("_性别{gender}"));
    }
    if let Some(level) = filter.user_level {
        name.push_str(&format!("_等级{level}"));
    }
    if let Some(is_vip) = &filter.is_vip {
        name.push_str(&format!("_大会员{is_vip}"));
    }
    if filter.min_reply_count.is_some() || filter.max_reply_count.is_some() {
        name.push_str(&format!(
            "_回复数{}-{}",
            filter.min_reply_count.map_or(String::new(), |v| v.to_string()),
            filter.max_reply_count.map_or(String::new(), |v| v.to_string()),
        ));
    }
    if filter.min_like_count.is_some() || filter.max_like_count.is_some() {
        name.push_str(&format!(
            "_点赞数{}-{}",
            filter.min_like_count.map_or(String::new(), |v| v.to_string()),
            filter.max_like_count.map_or(String::new(), |v| v.to_string()),
        ));
    }
    if filter.show_second_level == Some(false) {
        name.push_str("_仅一级评论");
    }
    if filter.start_time.is_some() || filter.end_time.is_some() {
        name.push_str("_时间筛选");
    }

    name.push_str(".csv");
    name
}

/// Replace characters that are unsafe in filenames or HTTP headers
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\n' | '\r' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> CommentRecord {
        CommentRecord {
            comment_index: 1,
            parent_id: 0,
            comment_id: 1001,
            user_id: 42,
            username: "观众甲".to_string(),
            user_level: 5,
            gender: "男".to_string(),
            content: "前排, 带逗号".to_string(),
            comment_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            reply_count: 3,
            like_count: 7,
            signature: String::new(),
            ip_location: "广东".to_string(),
            is_vip: "否".to_string(),
            avatar: "https://example.com/a.png".to_string(),
        }
    }

    #[test]
    fn test_csv_shape() {
        let bytes = to_csv_bytes(&[sample()]).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let body = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = body.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("评论序号,父评论ID,评论ID"));
        assert!(header.ends_with("头像链接"));

        let row = lines.next().unwrap();
        // Comma inside a field must be quoted
        assert!(row.contains("\"前排, 带逗号\""));
        assert!(row.contains("2024-06-01 12:00:00"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_filename_reflects_filters() {
        let title = "测试视频";
        assert_eq!(
            export_filename(title, &CommentFilter::default()),
            "测试视频.csv"
        );

        let filter = CommentFilter {
            keyword: Some("弹幕".to_string()),
            show_second_level: Some(false),
            min_like_count: Some(10),
            ..Default::default()
        };
        let name = export_filename(title, &filter);
        assert!(name.contains("关键词弹幕"));
        assert!(name.contains("点赞数10-"));
        assert!(name.contains("仅一级评论"));
        assert!(name.ends_with(".csv"));
    }

    #[test]
    fn test_filename_sanitizes_title() {
        let name = export_filename("a/b:c?", &CommentFilter::default());
        assert_eq!(name, "a_b_c_.csv");
    }
}
