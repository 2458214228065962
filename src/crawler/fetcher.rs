//! Rate-limited HTTP fetcher for the Bilibili comment endpoints
//!
//! This module provides the HTTP layer for acquisition runs:
//! - User-Agent rotation
//! - Rate limiting with governor
//! - WBI signing for the main comment listing
//! - Optional session cookie loaded from a local file
//!
//! Transport failures are surfaced immediately; the acquisition engine
//! treats them as fatal for the run, so there is no retry loop here.

use crate::config::CrawlerConfig;
use crate::crawler::comment::{Envelope, PageOutcome};
use crate::crawler::sign;
use crate::error::FetchError;
use crate::models::SortMode;
use chrono::Utc;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT},
    Client,
};
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Production API host for both comment endpoints
const API_HOST: &str = "https://api.bilibili.com";

/// Production host serving video pages (used for BV resolution)
const WWW_HOST: &str = "https://www.bilibili.com";

/// Sub-reply page size fixed by the remote endpoint
const REPLY_PAGE_SIZE: u32 = 10;

/// Bilibili comment API fetcher
///
/// Owns the HTTP client, the request rate limiter, and the optional session
/// cookie. All URL construction and request signing lives here so callers
/// only see parsed [`PageOutcome`]s.
pub struct BiliFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Session cookie contents, if a cookie file was present
    cookie: Option<String>,

    /// Optional host override for testing with mock servers
    base_url: Option<String>,
}

impl BiliFetcher {
    /// Create a fetcher from crawler configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &CrawlerConfig) -> Result<Self, FetchError> {
        let cookie = load_cookie(&config.cookie_path);
        Self::with_settings(config.rate_limit, config.request_timeout(), cookie)
    }

    /// Create a fetcher with explicit settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_settings(
        requests_per_second: u32,
        timeout: Duration,
        cookie: Option<String>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::new(1).unwrap());
        let quota = Quota::per_second(rate);
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            cookie,
            base_url: None,
        })
    }

    /// Create a fetcher pointed at a mock server, for testing
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_base_url(base_url: &str, requests_per_second: u32) -> Result<Self, FetchError> {
        let mut fetcher =
            Self::with_settings(requests_per_second, Duration::from_secs(30), None)?;
        fetcher.base_url = Some(base_url.to_string());
        Ok(fetcher)
    }

    /// Fetch one page of the main comment listing
    ///
    /// Signs the request with the current timestamp. An empty `cursor`
    /// requests the first page.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport failure, non-2xx status, or a body
    /// that is not the expected JSON envelope
    pub async fn fetch_main_page(
        &self,
        oid: i64,
        sort: SortMode,
        cursor: &str,
    ) -> Result<PageOutcome, FetchError> {
        let url = self.main_page_url(oid, sort, cursor, Utc::now().timestamp());
        let envelope = self.get_envelope(&url).await?;
        Ok(envelope.into_outcome())
    }

    /// Fetch one page of second-level replies under a root comment
    ///
    /// This endpoint is unsigned; `page` is 1-based.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport failure, non-2xx status, or a body
    /// that is not the expected JSON envelope
    pub async fn fetch_reply_page(
        &self,
        oid: i64,
        root: i64,
        page: u32,
    ) -> Result<PageOutcome, FetchError> {
        let url = format!(
            "{}/x/v2/reply/reply?oid={oid}&type={}&root={root}&ps={REPLY_PAGE_SIZE}&pn={page}&web_location=333.788",
            self.api_host(),
            sign::REPLY_TYPE,
        );
        let envelope = self.get_envelope(&url).await?;
        Ok(envelope.into_outcome())
    }

    /// Fetch the HTML of a video page, for BV-to-oid resolution
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport failure or non-2xx status
    pub async fn fetch_video_page(&self, bv: &str) -> Result<String, FetchError> {
        let url = format!("{}/video/{bv}/", self.www_host());
        let response = self.get(&url).await?;
        Ok(response.text().await?)
    }

    /// Build the signed main-listing URL for one page
    ///
    /// The first page (empty cursor) carries an extra `seek_rpid=` parameter,
    /// matching the canonical string it was signed with.
    fn main_page_url(&self, oid: i64, sort: SortMode, cursor: &str, wts: i64) -> String {
        let mode = sort.mode();
        let w_rid = sign::sign_page(oid, mode, cursor, wts);
        let pagination = sign::encode_query(&sign::pagination_str(cursor));
        let host = self.api_host();

        if cursor.is_empty() {
            format!(
                "{host}/x/v2/reply/wbi/main?oid={oid}&type={}&mode={mode}&pagination_str={pagination}&plat={}&seek_rpid=&web_location={}&w_rid={w_rid}&wts={wts}",
                sign::REPLY_TYPE,
                sign::PLAT,
                sign::WEB_LOCATION,
            )
        } else {
            format!(
                "{host}/x/v2/reply/wbi/main?oid={oid}&type={}&mode={mode}&pagination_str={pagination}&plat={}&web_location={}&w_rid={w_rid}&wts={wts}",
                sign::REPLY_TYPE,
                sign::PLAT,
                sign::WEB_LOCATION,
            )
        }
    }

    /// Issue a rate-limited GET and check the status code
    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.rate_limiter.until_ready().await;

        let headers = self.build_headers();
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServerError(status.as_u16()));
        }

        Ok(response)
    }

    /// GET a URL and parse the body as a comment API envelope
    async fn get_envelope(&self, url: &str) -> Result<Envelope, FetchError> {
        let response = self.get(url).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }

    /// Build request headers with a rotated User-Agent and session cookie
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let user_agent = self.random_user_agent();
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(REFERER, HeaderValue::from_static("https://www.bilibili.com/"));

        if let Some(cookie) = &self.cookie {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.insert(COOKIE, value);
            }
        }

        headers
    }

    /// Get a random user agent from the pool
    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])
    }

    fn api_host(&self) -> &str {
        self.base_url.as_deref().unwrap_or(API_HOST)
    }

    fn www_host(&self) -> &str {
        self.base_url.as_deref().unwrap_or(WWW_HOST)
    }
}

/// Read a session cookie from disk, if the file exists and is non-empty
fn load_cookie(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fetcher() -> BiliFetcher {
        BiliFetcher::with_settings(10, Duration::from_secs(5), None).unwrap()
    }

    #[test]
    fn test_user_agent_rotation() {
        let fetcher = test_fetcher();

        let mut agents = std::collections::HashSet::new();
        for _ in 0..100 {
            let agent = fetcher.random_user_agent();
            assert!(USER_AGENTS.contains(&agent));
            agents.insert(agent);
        }

        assert!(agents.len() > 1, "User agents should rotate");
    }

    #[test]
    fn test_first_page_url_carries_seek_rpid() {
        let fetcher = test_fetcher();
        let url = fetcher.main_page_url(170001, SortMode::Hot, "", 1_700_000_000);

        assert!(url.starts_with("https://api.bilibili.com/x/v2/reply/wbi/main?"));
        assert!(url.contains("oid=170001"));
        assert!(url.contains("mode=3"));
        assert!(url.contains("&seek_rpid=&"));
        assert!(url.contains("wts=1700000000"));
        // URL encoding keeps ':' literal inside the pagination envelope
        assert!(url.contains("pagination_str=%7B%22offset%22:%22%22%7D"));
    }

    #[test]
    fn test_next_page_url_omits_seek_rpid() {
        let fetcher = test_fetcher();
        let url = fetcher.main_page_url(170001, SortMode::Latest, "tok_2", 1_700_000_000);

        assert!(url.contains("mode=2"));
        assert!(!url.contains("seek_rpid"));
        assert!(url.contains("pagination_str=%7B%22offset%22:%22tok_2%22%7D"));
    }

    #[test]
    fn test_signature_present_and_hex() {
        let fetcher = test_fetcher();
        let url = fetcher.main_page_url(99, SortMode::Hot, "", 1);

        let w_rid = url
            .split("w_rid=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap();
        assert_eq!(w_rid.len(), 32);
        assert!(w_rid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_base_url_override() {
        let fetcher = BiliFetcher::with_base_url("http://localhost:8080", 10).unwrap();
        let url = fetcher.main_page_url(1, SortMode::Hot, "", 1);
        assert!(url.starts_with("http://localhost:8080/x/v2/reply/wbi/main?"));
    }

    #[test]
    fn test_headers_include_cookie_when_present() {
        let fetcher = BiliFetcher::with_settings(
            10,
            Duration::from_secs(5),
            Some("SESSDATA=abc123".to_string()),
        )
        .unwrap();

        let headers = fetcher.build_headers();
        assert_eq!(headers.get(COOKIE).unwrap(), "SESSDATA=abc123");
        assert!(headers.contains_key(USER_AGENT));
        assert!(headers.contains_key(REFERER));
    }

    #[test]
    fn test_missing_cookie_file_is_none() {
        assert!(load_cookie(Path::new("/nonexistent/cookie.txt")).is_none());
    }
}
