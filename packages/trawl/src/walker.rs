//! Pagination walks: one bounded fetch-extract loop per seed URL.
//!
//! Each seed walks independently and concurrently; the fetch client's
//! permits and pacing keep the target's limits honored across walks. A walk
//! ends when pagination runs out, the page bound is hit, a URL repeats, a
//! fetch fails terminally, robots.txt disallows the page, or the run is
//! cancelled.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CompiledTarget, ScrapePolicy};
use crate::fetch::{FetchClient, FetchRequest, RobotsGuard};
use crate::types::{ErrorSummary, RawRecord, WalkSummary, WalkTerminal};

/// Tracks position within one seed's walk and the URLs already seen.
struct PageCursor {
    url: Url,
    page_number: usize,
    visited: HashSet<String>,
}

impl PageCursor {
    fn start(seed: Url) -> Self {
        let mut visited = HashSet::new();
        visited.insert(seed.as_str().to_string());
        Self {
            url: seed,
            page_number: 1,
            visited,
        }
    }

    /// Move to the next page. Returns false when the URL was already
    /// visited (a pagination cycle).
    fn advance(&mut self, next: Url) -> bool {
        if !self.visited.insert(next.as_str().to_string()) {
            return false;
        }
        self.url = next;
        self.page_number += 1;
        true
    }
}

/// Everything one seed's walk produced.
pub struct SeedWalk {
    pub records: Vec<RawRecord>,
    pub summary: WalkSummary,
    pub error: Option<ErrorSummary>,
}

/// Walks every seed of one target, collecting records and per-seed
/// summaries.
pub struct PaginationWalker<'a> {
    target: &'a CompiledTarget,
    client: Arc<FetchClient>,
    robots: Arc<RobotsGuard>,
    policy: &'a ScrapePolicy,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(
        target: &'a CompiledTarget,
        client: Arc<FetchClient>,
        robots: Arc<RobotsGuard>,
        policy: &'a ScrapePolicy,
    ) -> Self {
        Self {
            target,
            client,
            robots,
            policy,
        }
    }

    /// Walk all seeds concurrently.
    pub async fn walk(&self, cancel: &CancellationToken) -> Vec<SeedWalk> {
        let walks = self
            .target
            .seeds
            .iter()
            .map(|seed| self.walk_seed(seed.clone(), cancel));
        join_all(walks).await
    }

    async fn walk_seed(&self, seed: Url, cancel: &CancellationToken) -> SeedWalk {
        let mut summary = WalkSummary::new(seed.as_str());
        let mut records = Vec::new();
        let mut error = None;
        let mut cursor = PageCursor::start(seed);
        let pagination = &self.target.config.pagination;

        loop {
            if cancel.is_cancelled() {
                summary.terminal = WalkTerminal::Cancelled;
                break;
            }

            if self.policy.respect_robots
                && !self
                    .robots
                    .is_allowed(&cursor.url, &self.policy.user_agent)
                    .await
            {
                info!(
                    target = self.target.name(),
                    url = %cursor.url,
                    "disallowed by robots.txt, skipping"
                );
                summary.pages_skipped += 1;
                summary.terminal = WalkTerminal::Skipped;
                break;
            }

            let request = self.page_request(&cursor.url);
            let page = match self.client.fetch(request, self.target.name(), cancel).await {
                Ok(page) => page,
                Err(err) if err.is_cancelled() => {
                    summary.terminal = WalkTerminal::Cancelled;
                    break;
                }
                Err(err) => {
                    warn!(
                        target = self.target.name(),
                        url = %cursor.url,
                        error = %err,
                        "page fetch failed, ending walk"
                    );
                    summary.pages_failed += 1;
                    summary.terminal = WalkTerminal::Failed;
                    error = Some(ErrorSummary::network(err.url(), err.to_string()));
                    break;
                }
            };
            summary.pages_fetched += 1;

            // Resolve relative links against the redirected URL, not the
            // one we asked for.
            let final_url = Url::parse(&page.final_url).unwrap_or_else(|_| cursor.url.clone());
            let (page_records, next) = self.target.extractor.extract(
                self.target.name(),
                &final_url,
                &page.body,
                cursor.page_number,
            );
            summary.records += page_records.len();
            records.extend(page_records);

            if !pagination.enabled {
                break;
            }
            if cursor.page_number >= pagination.max_pages {
                debug!(
                    target = self.target.name(),
                    seed = %summary.seed_url,
                    max_pages = pagination.max_pages,
                    "page bound reached"
                );
                break;
            }
            let Some(next) = next else {
                break;
            };
            if !cursor.advance(next) {
                debug!(
                    target = self.target.name(),
                    seed = %summary.seed_url,
                    "pagination cycle detected, ending walk"
                );
                break;
            }
        }

        SeedWalk {
            records,
            summary,
            error,
        }
    }

    fn page_request(&self, url: &Url) -> FetchRequest {
        let mut request = FetchRequest::get(url.as_str()).with_timeout(self.policy.timeout());
        for (name, value) in &self.policy.headers {
            request = request.with_header(name, value);
        }
        for (name, value) in &self.target.config.headers {
            request = request.with_header(name, value);
        }
        request
    }
}
