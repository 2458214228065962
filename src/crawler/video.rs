//! BV handle resolution
//!
//! The comment endpoints address a video by its numeric object id (`aid`),
//! while users hand us the public BV identifier. The video page embeds both
//! in its initial-state JSON, so resolution is one page fetch plus two
//! scrapes: the aid (required) and the display title (best effort).

use crate::crawler::fetcher::BiliFetcher;
use crate::error::ResolveError;
use regex::Regex;

/// Title fallback when the page markup does not carry one
const UNRESOLVED_TITLE: &str = "未识别";

/// A resolved video: numeric object id plus display title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVideo {
    pub oid: i64,
    pub title: String,
}

/// Resolve a BV identifier against the video page.
///
/// # Errors
///
/// Returns `ResolveError::Fetch` if the page cannot be fetched and
/// `ResolveError::ObjectIdNotFound` if the page does not pair an aid with
/// the requested BV. A missing title is not an error.
pub async fn resolve(fetcher: &BiliFetcher, bv: &str) -> Result<ResolvedVideo, ResolveError> {
    let html = fetcher.fetch_video_page(bv).await?;
    resolve_from_html(&html, bv)
}

/// Scrape the object id and title out of a video page body
pub fn resolve_from_html(html: &str, bv: &str) -> Result<ResolvedVideo, ResolveError> {
    let oid = extract_oid(html, bv)
        .ok_or_else(|| ResolveError::ObjectIdNotFound(bv.to_string()))?;

    let title = extract_title(html).unwrap_or_else(|| UNRESOLVED_TITLE.to_string());

    Ok(ResolvedVideo { oid, title })
}

/// Find the aid paired with this exact BV in the embedded state JSON
fn extract_oid(html: &str, bv: &str) -> Option<i64> {
    let pattern = format!(r#""aid":(\d+),"bvid":"{}""#, regex::escape(bv));
    let re = Regex::new(&pattern).ok()?;
    re.captures(html)?.get(1)?.as_str().parse().ok()
}

/// Pull the display title from the page's meta title tag
fn extract_title(html: &str) -> Option<String> {
    let re = Regex::new(r#"<title data-vue-meta="true">(.*?)</title>"#).ok()?;
    let title = re.captures(html)?.get(1)?.as_str().trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title data-vue-meta="true">测试视频标题_哔哩哔哩_bilibili</title>
        </head><body>
        <script>window.__INITIAL_STATE__={"aid":170001,"bvid":"BV1xx411c7mD","videoData":{}}</script>
        </body></html>"#;

    #[test]
    fn test_resolves_oid_and_title() {
        let video = resolve_from_html(PAGE, "BV1xx411c7mD").unwrap();
        assert_eq!(video.oid, 170001);
        assert_eq!(video.title, "测试视频标题_哔哩哔哩_bilibili");
    }

    #[test]
    fn test_oid_must_pair_with_requested_bv() {
        // The page embeds a different BV, so the aid must not be trusted
        let err = resolve_from_html(PAGE, "BV1yy411c7mE").unwrap_err();
        assert!(matches!(err, ResolveError::ObjectIdNotFound(bv) if bv == "BV1yy411c7mE"));
    }

    #[test]
    fn test_missing_title_falls_back() {
        let page = r#"<html><body>{"aid":42,"bvid":"BV1xx411c7mD"}</body></html>"#;
        let video = resolve_from_html(page, "BV1xx411c7mD").unwrap();
        assert_eq!(video.oid, 42);
        assert_eq!(video.title, "未识别");
    }

    #[test]
    fn test_missing_oid_is_error() {
        let page = "<html><body>nothing here</body></html>";
        assert!(resolve_from_html(page, "BV1xx411c7mD").is_err());
    }
}
