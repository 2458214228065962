//! Comment acquisition: request signing, fetching, resolution, and the engine
//!
//! - [`sign`] - WBI signing and the two percent-encodings it depends on
//! - [`fetcher`] - Rate-limited HTTP client for the remote endpoints
//! - [`comment`] - Envelope parsing and record normalization
//! - [`video`] - BV handle to object id resolution
//! - [`engine`] - The per-job acquisition loop

pub mod comment;
pub mod engine;
pub mod fetcher;
pub mod sign;
pub mod video;

pub use comment::{PageCursor, PageOutcome, RawReply, ReplyPage};
pub use engine::{AcquisitionEngine, CrawlParams};
pub use fetcher::BiliFetcher;
pub use video::{resolve, ResolvedVideo};
