//! Orchestration of one collection run: resolve the page count, fan out
//! one gated fetch unit per page, join them all, rank the tally.

use std::sync::Arc;

use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::CollectorConfig;
use crate::error::{CollectError, SourceError};
use crate::feed;
use crate::pool::TokenPool;
use crate::rank::rank;
use crate::source::ListingSource;
use crate::tally::AgentTally;
use crate::types::{CollectReport, ListingQuery, PageCount, PageOutcome};

/// Runs the fetch-aggregate pipeline for one listing query at a time.
///
/// Mutable run state (tally, join set) is created per `collect` call.
/// The token pool is the one exception: it belongs to the collector, so
/// concurrent `collect` calls stay within a single capacity gate against
/// the upstream instead of multiplying it per run.
pub struct Collector<S> {
    source: Arc<S>,
    pool: TokenPool,
    config: CollectorConfig,
}

impl<S: ListingSource + 'static> Collector<S> {
    pub fn new(source: S, config: CollectorConfig) -> Self {
        Self {
            source: Arc::new(source),
            pool: TokenPool::new(config.concurrency),
            config,
        }
    }

    /// Collect every page of `query` and rank agents by listing count.
    ///
    /// A failed page-count resolution aborts the run before any fetch is
    /// scheduled. Individual page failures never abort the run; they are
    /// reported as `pages_dropped` on the final report.
    pub async fn collect(&self, query: &ListingQuery) -> Result<CollectReport, CollectError> {
        let run_id = Uuid::new_v4();
        let pages = self.resolve_page_count(query).await?;
        tracing::info!(
            %run_id,
            location = query.location(),
            pages = pages.get(),
            "starting collection run"
        );

        let tally = Arc::new(AgentTally::new());
        let mut units = JoinSet::new();
        for page in 1..=pages.get() {
            units.spawn(run_page_unit(
                self.source.clone(),
                query.clone(),
                page,
                self.pool.clone(),
                tally.clone(),
                self.config.clone(),
            ));
        }

        // Completion barrier: every unit resolves to exactly one outcome
        // on every exit path, so the join cannot hang on a dropped page.
        let mut fetched = 0u32;
        let mut dropped = 0u32;
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(PageOutcome::Fetched) => fetched += 1,
                Ok(PageOutcome::Dropped) => dropped += 1,
                Err(err) => {
                    tracing::error!(%run_id, error = %err, "page unit panicked");
                    dropped += 1;
                }
            }
        }

        let counts = tally.snapshot();
        let report = CollectReport {
            ranking: rank(&counts),
            pages_total: pages.get(),
            pages_fetched: fetched,
            pages_dropped: dropped,
        };
        tracing::info!(
            %run_id,
            pages_fetched = report.pages_fetched,
            pages_dropped = report.pages_dropped,
            agents = report.ranking.len(),
            "collection run finished"
        );
        Ok(report)
    }

    /// Probe page 1 for the total page count.
    ///
    /// The probe's listings are not aggregated; the fan-out fetches page
    /// 1 again under the token pool like every other page.
    async fn resolve_page_count(&self, query: &ListingQuery) -> Result<PageCount, CollectError> {
        let body = self
            .source
            .fetch_page(query, 1)
            .await
            .map_err(|source| CollectError::Resolve { source })?;
        let response = feed::decode(&body).map_err(|source| CollectError::Resolve { source })?;
        response
            .paging
            .and_then(|paging| PageCount::new(paging.total_pages))
            .ok_or(CollectError::MissingPageCount)
    }
}

/// One page's fetch-and-aggregate unit.
///
/// The token is held across the pacing delay and the network call only;
/// decoding, aggregation, and backoff sleeps all happen without it.
async fn run_page_unit<S: ListingSource>(
    source: Arc<S>,
    query: ListingQuery,
    page: u32,
    pool: TokenPool,
    tally: Arc<AgentTally>,
    config: CollectorConfig,
) -> PageOutcome {
    for attempt in 1..=config.max_attempts {
        let permit = pool.acquire().await;
        tokio::time::sleep(config.pace).await;
        let result = source.fetch_page(&query, page).await;
        drop(permit);

        match result {
            Ok(body) => match feed::decode(&body) {
                Ok(response) => {
                    let batch = response.into_batch();
                    tracing::debug!(page, listings = batch.len(), "page aggregated");
                    tally.apply(batch);
                    return PageOutcome::Fetched;
                }
                Err(err) => {
                    tracing::warn!(page, error = %err, "dropping page with malformed body");
                    return PageOutcome::Dropped;
                }
            },
            Err(SourceError::Status { code }) if attempt < config.max_attempts => {
                let delay = config.backoff.delay(attempt);
                tracing::warn!(
                    page,
                    code,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "upstream refused page, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(SourceError::Status { code }) => {
                tracing::warn!(
                    page,
                    code,
                    attempts = config.max_attempts,
                    "retry budget exhausted, dropping page"
                );
                return PageOutcome::Dropped;
            }
            Err(err) => {
                tracing::warn!(page, error = %err, "dropping page after transport failure");
                return PageOutcome::Dropped;
            }
        }
    }
    PageOutcome::Dropped
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::config::BackoffPolicy;
    use crate::types::RankedEntry;

    #[derive(Clone)]
    enum Reply {
        Body(String),
        Status(u16),
        Transport,
    }

    /// Mock source: per-page reply scripts (the last reply repeats),
    /// call recording, and in-flight instrumentation.
    struct ScriptedSource {
        scripts: Mutex<HashMap<u32, (Vec<Reply>, usize)>>,
        calls: Mutex<Vec<(u32, Instant)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay_fn: fn(u32) -> Duration,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay_fn: |_| Duration::ZERO,
            }
        }

        fn with_delay_fn(mut self, delay_fn: fn(u32) -> Duration) -> Self {
            self.delay_fn = delay_fn;
            self
        }

        fn page(self, page: u32, replies: Vec<Reply>) -> Self {
            self.scripts.lock().unwrap().insert(page, (replies, 0));
            self
        }

        fn calls_for(&self, page: u32) -> Vec<Instant> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| *p == page)
                .map(|(_, at)| *at)
                .collect()
        }

        fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn next_reply(&self, page: u32) -> Reply {
            let mut scripts = self.scripts.lock().unwrap();
            let (replies, served) = scripts
                .get_mut(&page)
                .unwrap_or_else(|| panic!("no script for page {page}"));
            let reply = replies[(*served).min(replies.len() - 1)].clone();
            *served += 1;
            reply
        }
    }

    #[async_trait]
    impl ListingSource for ScriptedSource {
        async fn fetch_page(
            &self,
            _query: &ListingQuery,
            page: u32,
        ) -> Result<String, SourceError> {
            self.calls.lock().unwrap().push((page, Instant::now()));
            let live = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(live, Ordering::SeqCst);
            tokio::time::sleep((self.delay_fn)(page)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.next_reply(page) {
                Reply::Body(body) => Ok(body),
                Reply::Status(code) => Err(SourceError::Status { code }),
                Reply::Transport => Err(SourceError::transport(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))),
            }
        }
    }

    fn feed_body(agents: &[&str], total_pages: Option<u32>) -> String {
        let objects: Vec<serde_json::Value> = agents
            .iter()
            .map(|agent| serde_json::json!({ "MakelaarNaam": agent, "IsVerkocht": false }))
            .collect();
        let mut body = serde_json::json!({
            "AccountStatus": 0,
            "EmailNotConfirmed": false,
            "ValidationFailed": false,
            "Objects": objects,
        });
        if let Some(pages) = total_pages {
            body["Paging"] = serde_json::json!({ "AantalPaginas": pages });
        }
        body.to_string()
    }

    fn first_page(agents: &[&str], total_pages: u32) -> Reply {
        Reply::Body(feed_body(agents, Some(total_pages)))
    }

    fn ok_page(agents: &[&str]) -> Reply {
        Reply::Body(feed_body(agents, None))
    }

    fn query() -> ListingQuery {
        let base = Url::parse("http://feed.test/json/key/").unwrap();
        ListingQuery::new(base, "/amsterdam/")
    }

    fn entry(agent: &str, count: u64) -> RankedEntry {
        RankedEntry {
            agent_name: agent.to_string(),
            count,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_ranking() {
        let source = Arc::new(
            ScriptedSource::new()
                .page(1, vec![first_page(&["A", "A", "B"], 3)])
                .page(2, vec![ok_page(&["A", "A", "B"])])
                .page(3, vec![ok_page(&["A", "A", "B"])]),
        );
        let collector = Collector::new(source.clone(), CollectorConfig::immediate());

        let report = collector.collect(&query()).await.unwrap();
        assert_eq!(report.ranking, vec![entry("A", 6), entry("B", 3)]);
        assert_eq!(report.top(1), &[entry("A", 6)]);
        assert_eq!(report.pages_total, 3);
        assert_eq!(report.pages_fetched, 3);
        assert_eq!(report.pages_dropped, 0);
    }

    #[tokio::test]
    async fn test_identical_pages_multiply_per_page_counts() {
        let mut source = ScriptedSource::new().page(1, vec![first_page(&["A", "B"], 4)]);
        for page in 2..=4 {
            source = source.page(page, vec![ok_page(&["A", "B"])]);
        }
        let collector = Collector::new(source, CollectorConfig::immediate());

        let report = collector.collect(&query()).await.unwrap();
        // 4 pages x 1 listing per agent, ties broken by name
        assert_eq!(report.ranking, vec![entry("A", 4), entry("B", 4)]);
    }

    #[tokio::test]
    async fn test_rate_limited_page_retries_after_backoff() {
        let backoff = Duration::from_millis(50);
        let source = Arc::new(
            ScriptedSource::new()
                .page(1, vec![first_page(&["A"], 2)])
                .page(2, vec![Reply::Status(429), ok_page(&["B"])]),
        );
        let config = CollectorConfig::immediate()
            .with_backoff(BackoffPolicy::Fixed(backoff))
            .with_max_attempts(3);
        let collector = Collector::new(source.clone(), config);

        let report = collector.collect(&query()).await.unwrap();
        assert_eq!(report.ranking, vec![entry("A", 1), entry("B", 1)]);
        assert_eq!(report.pages_dropped, 0);

        let attempts = source.calls_for(2);
        assert_eq!(attempts.len(), 2);
        assert!(
            attempts[1] - attempts[0] >= backoff,
            "second attempt fired before the backoff interval elapsed"
        );
    }

    #[tokio::test]
    async fn test_transport_failure_drops_page_without_stalling_the_run() {
        let source = Arc::new(
            ScriptedSource::new()
                .page(1, vec![first_page(&["A"], 3)])
                .page(2, vec![Reply::Transport])
                .page(3, vec![ok_page(&["A"])]),
        );
        let collector = Collector::new(source.clone(), CollectorConfig::immediate());

        // Completing at all proves the dropped page still signalled the barrier
        let report = collector.collect(&query()).await.unwrap();
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(report.pages_dropped, 1);
        assert_eq!(report.ranking, vec![entry("A", 2)]);
        // Transport failures are not retried
        assert_eq!(source.calls_for(2).len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_terminal_for_the_page() {
        let source = Arc::new(
            ScriptedSource::new()
                .page(1, vec![first_page(&["A"], 2)])
                .page(2, vec![Reply::Body("<html>maintenance</html>".into())]),
        );
        let collector = Collector::new(source.clone(), CollectorConfig::immediate());

        let report = collector.collect(&query()).await.unwrap();
        assert_eq!(report.pages_dropped, 1);
        assert_eq!(report.ranking, vec![entry("A", 1)]);
        assert_eq!(source.calls_for(2).len(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_drops_the_page() {
        let source = Arc::new(
            ScriptedSource::new()
                .page(1, vec![first_page(&["A"], 2)])
                .page(2, vec![Reply::Status(401)]),
        );
        let config = CollectorConfig::immediate().with_max_attempts(2);
        let collector = Collector::new(source.clone(), config);

        let report = collector.collect(&query()).await.unwrap();
        assert_eq!(report.pages_dropped, 1);
        assert_eq!(report.pages_fetched, 1);
        assert_eq!(source.calls_for(2).len(), 2);
    }

    #[tokio::test]
    async fn test_resolver_failure_aborts_the_run() {
        let source = Arc::new(ScriptedSource::new().page(1, vec![Reply::Transport]));
        let collector = Collector::new(source.clone(), CollectorConfig::immediate());

        let err = collector.collect(&query()).await.unwrap_err();
        assert!(matches!(err, CollectError::Resolve { .. }));
        // No fetch fan-out was scheduled after the failed probe
        assert_eq!(source.calls_for(1).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_paging_metadata_aborts_the_run() {
        let source = Arc::new(
            ScriptedSource::new().page(1, vec![Reply::Body(feed_body(&["A"], None))]),
        );
        let collector = Collector::new(source, CollectorConfig::immediate());

        let err = collector.collect(&query()).await.unwrap_err();
        assert!(matches!(err, CollectError::MissingPageCount));
    }

    #[tokio::test]
    async fn test_in_flight_fetches_never_exceed_pool_capacity() {
        let mut source =
            ScriptedSource::new().with_delay_fn(|_| Duration::from_millis(10));
        source = source.page(1, vec![first_page(&["A"], 20)]);
        for page in 2..=20 {
            source = source.page(page, vec![ok_page(&["A"])]);
        }
        let source = Arc::new(source);
        let config = CollectorConfig::immediate().with_concurrency(3);
        let collector = Collector::new(source.clone(), config);

        let report = collector.collect(&query()).await.unwrap();
        assert_eq!(report.ranking, vec![entry("A", 20)]);
        assert!(
            source.max_in_flight() <= 3,
            "observed {} concurrent fetches with capacity 3",
            source.max_in_flight()
        );
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_one_pool_capacity() {
        let mut source = ScriptedSource::new().with_delay_fn(|_| Duration::from_millis(10));
        source = source.page(1, vec![first_page(&["A"], 10)]);
        for page in 2..=10 {
            source = source.page(page, vec![ok_page(&["A"])]);
        }
        let source = Arc::new(source);
        let config = CollectorConfig::immediate().with_concurrency(3);
        let collector = Collector::new(source.clone(), config);

        // Two queries collected concurrently, as the CLI composes them
        let (query_a, query_b) = (query(), query());
        let (all, garden) = tokio::join!(collector.collect(&query_a), collector.collect(&query_b));
        assert_eq!(all.unwrap().ranking, vec![entry("A", 10)]);
        assert_eq!(garden.unwrap().ranking, vec![entry("A", 10)]);
        assert!(
            source.max_in_flight() <= 3,
            "capacity 3 but observed {} concurrent fetches across the two runs",
            source.max_in_flight()
        );
    }

    #[tokio::test]
    async fn test_completion_order_does_not_change_the_ranking() {
        async fn run(delay_fn: fn(u32) -> Duration) -> Vec<RankedEntry> {
            let mut source = ScriptedSource::new().with_delay_fn(delay_fn);
            source = source.page(1, vec![first_page(&["A", "C"], 6)]);
            for page in 2..=6 {
                let agents: &[&str] = if page % 2 == 0 { &["A", "B"] } else { &["C"] };
                source = source.page(page, vec![ok_page(agents)]);
            }
            let collector =
                Collector::new(source, CollectorConfig::immediate().with_concurrency(6));
            collector.collect(&query()).await.unwrap().ranking
        }

        let slow_early_pages = run(|page| Duration::from_millis(12u64.saturating_sub(page as u64 * 2))).await;
        let slow_late_pages = run(|page| Duration::from_millis(page as u64 * 2)).await;
        assert_eq!(slow_early_pages, slow_late_pages);
    }
}
