//! Acquisition engine
//!
//! Drives one job from `pending` to a terminal status: pages through the
//! main listing, optionally descends into second-level replies, normalizes
//! every record, and persists each one individually so a failed run keeps
//! its durable prefix.
//!
//! Accounting invariant: a record is persisted and counted only while the
//! acquired total is below the item budget, so the stored count never
//! exceeds the budget and sequence indices stay contiguous from 1.

use crate::config::CrawlerConfig;
use crate::crawler::comment::{self, PageCursor, PageOutcome, RawReply};
use crate::crawler::fetcher::BiliFetcher;
use crate::error::Result;
use crate::models::SortMode;
use crate::storage::Database;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameters of one acquisition run
#[derive(Debug, Clone)]
pub struct CrawlParams {
    /// Numeric object id of the video
    pub oid: i64,

    /// Main listing sort mode
    pub sort: SortMode,

    /// Whether to descend into second-level replies
    pub include_replies: bool,

    /// Maximum number of records to persist
    pub budget: u32,

    /// Starting cursor for the main listing; empty means the first page
    pub initial_cursor: String,
}

/// Runs acquisition jobs against the remote comment API
pub struct AcquisitionEngine {
    fetcher: Arc<BiliFetcher>,
    db: Arc<Database>,
    page_delay: Duration,
}

impl AcquisitionEngine {
    pub fn new(fetcher: Arc<BiliFetcher>, db: Arc<Database>, config: &CrawlerConfig) -> Self {
        Self {
            fetcher,
            db,
            page_delay: config.page_delay(),
        }
    }

    /// Engine with no inter-page delay, for tests against a mock server
    pub fn without_delay(fetcher: Arc<BiliFetcher>, db: Arc<Database>) -> Self {
        Self {
            fetcher,
            db,
            page_delay: Duration::ZERO,
        }
    }

    /// Run one job to a terminal status.
    ///
    /// Marks the job running, acquires until the budget is met or the stream
    /// ends, and finishes the job as `done`. Any fetch error is fatal: the
    /// job is marked `failed` with the error text, keeping every record
    /// persisted before the failure.
    ///
    /// Returns the number of records persisted.
    pub async fn run(&self, job_id: i64, params: &CrawlParams) -> Result<u32> {
        info!(
            job_id,
            oid = params.oid,
            budget = params.budget,
            include_replies = params.include_replies,
            "starting acquisition run"
        );

        self.db.set_job_running(job_id)?;

        let mut acquired: u32 = 0;
        match self.crawl(job_id, params, &mut acquired).await {
            Ok(()) => {
                self.db.finish_job(job_id, acquired)?;
                info!(job_id, acquired, "acquisition run done");
                Ok(acquired)
            }
            Err(err) => {
                warn!(job_id, acquired, error = %err, "acquisition run failed");
                self.db.fail_job(job_id, acquired, &err.to_string())?;
                Err(err)
            }
        }
    }

    /// Page through the main listing, persisting as we go
    async fn crawl(&self, job_id: i64, params: &CrawlParams, acquired: &mut u32) -> Result<()> {
        let mut cursor = params.initial_cursor.clone();
        let mut page_num = 0u32;

        loop {
            page_num += 1;
            let outcome = self
                .fetcher
                .fetch_main_page(params.oid, params.sort, &cursor)
                .await?;

            let page = match outcome {
                PageOutcome::Records(page) => page,
                PageOutcome::EndOfData => {
                    debug!(job_id, page_num, "main listing exhausted");
                    return Ok(());
                }
            };

            debug!(job_id, page_num, records = page.replies.len(), "main page fetched");

            for raw in &page.replies {
                if *acquired >= params.budget {
                    break;
                }
                self.persist(job_id, raw, acquired)?;

                if params.include_replies {
                    let reported = raw.reported_reply_count();
                    if reported > 0 && *acquired < params.budget {
                        self.crawl_replies(job_id, params, raw.rpid, reported, acquired)
                            .await?;
                    }
                }
            }

            self.db.update_job_progress(job_id, *acquired)?;

            if *acquired >= params.budget {
                debug!(job_id, acquired = *acquired, "item budget reached");
                return Ok(());
            }

            match page.next {
                PageCursor::Next(next) => cursor = next,
                PageCursor::End => return Ok(()),
            }

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }
    }

    /// Page through the replies under one root comment.
    ///
    /// The remote reports the sub-reply total in display text, so the page
    /// range is derived from that count at 10 records per page, with one
    /// extra page to absorb drift. An end-of-data page stops early.
    async fn crawl_replies(
        &self,
        job_id: i64,
        params: &CrawlParams,
        root: i64,
        reported: u32,
        acquired: &mut u32,
    ) -> Result<()> {
        for page in 1..(reported / 10 + 2) {
            if *acquired >= params.budget {
                return Ok(());
            }

            let outcome = self.fetcher.fetch_reply_page(params.oid, root, page).await?;
            let reply_page = match outcome {
                PageOutcome::Records(reply_page) => reply_page,
                PageOutcome::EndOfData => return Ok(()),
            };

            debug!(
                job_id,
                root,
                page,
                records = reply_page.replies.len(),
                "reply page fetched"
            );

            for raw in &reply_page.replies {
                if *acquired >= params.budget {
                    return Ok(());
                }
                self.persist(job_id, raw, acquired)?;
            }
        }

        Ok(())
    }

    /// Normalize one raw record, persist it, and advance the counter.
    ///
    /// Each insert commits on its own, so everything persisted so far
    /// survives a later failure.
    fn persist(&self, job_id: i64, raw: &RawReply, acquired: &mut u32) -> Result<()> {
        let record = comment::normalize(raw, *acquired + 1);
        self.db.insert_comment(job_id, &record)?;
        *acquired += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_reply_page_range_covers_reported_count() {
        // 25 reported replies at 10 per page: pages 1, 2 and one extra
        let reported = 25u32;
        let pages: Vec<u32> = (1..(reported / 10 + 2)).collect();
        assert_eq!(pages, vec![1, 2, 3]);

        // A count below one full page still fetches page 1
        let reported = 3u32;
        let pages: Vec<u32> = (1..(reported / 10 + 2)).collect();
        assert_eq!(pages, vec![1]);
    }
}
