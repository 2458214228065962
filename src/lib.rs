//! pinglun - Bilibili video comment acquisition and query service
//!
//! Given a video BV identifier, pinglun pages through the Bilibili comment
//! API (including second-level replies), normalizes the records into SQLite,
//! and exposes them through a filterable, paginated REST interface with CSV
//! export. Account registration with email verification and token sessions
//! gates access to acquisition runs by ownership and privilege level.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Request signing, page fetching, and the acquisition engine
//! - [`models`] - Core data structures and types
//! - [`storage`] - SQLite persistence for jobs, comments, and accounts
//! - [`server`] - REST API and authentication
//! - [`export`] - CSV projection of persisted comments
//!
//! # Example
//!
//! ```no_run
//! use pinglun::config::Config;
//! use pinglun::crawler::BiliFetcher;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let fetcher = BiliFetcher::new(&config.crawler)?;
//! # let _ = fetcher;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod export;
pub mod models;
pub mod server;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{AcquisitionEngine, BiliFetcher, CrawlParams};
    pub use crate::error::{Error, FetchError, Result};
    pub use crate::models::{CommentFilter, CommentRecord, CrawlJob, JobStatus, SortMode};
    pub use crate::storage::Database;
}

pub use models::{CommentRecord, CrawlJob, JobStatus, SortMode};
