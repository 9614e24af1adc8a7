use serde::{Deserialize, Serialize};
use url::Url;

// ============================================================================
// CORE TYPES
// ============================================================================

/// One listing record as the pipeline sees it, decoded from a feed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub agent_name: String,
    pub is_sold: bool,
}

/// The unordered batch of listings carried by a single feed page,
/// transient between fetch and aggregation.
pub type PageBatch = Vec<Listing>;

/// One row of the final ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub agent_name: String,
    pub count: u64,
}

/// Total page count resolved from the feed's paging metadata.
///
/// Guaranteed to be at least 1 by construction; a failed resolution is a
/// [`CollectError`](crate::error::CollectError), never a sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCount(u32);

impl PageCount {
    pub fn new(pages: u32) -> Option<Self> {
        (pages > 0).then_some(Self(pages))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// How one scheduled page unit ended. Every unit reports exactly one
/// outcome on every exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Fetched, decoded, and merged into the tally.
    Fetched,
    /// Permanently dropped (transport failure, malformed body, or retry
    /// budget exhausted); its listings are absent from the ranking.
    Dropped,
}

// ============================================================================
// QUERY & REPORT
// ============================================================================

/// Describes one feed query: the feed base URL plus the location path
/// that selects the listing set.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    base: Url,
    location: String,
}

impl ListingQuery {
    pub fn new(base: Url, location: impl Into<String>) -> Self {
        Self {
            base,
            location: location.into(),
        }
    }

    /// Narrow the query to garden listings, the feed's secondary
    /// filtered set (`/{location}/tuin/`).
    pub fn with_garden_filter(mut self) -> Self {
        if !self.location.ends_with('/') {
            self.location.push('/');
        }
        self.location.push_str("tuin/");
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Full URL for one page of this query. The feed expects the `zo`
    /// path verbatim, so the query string is assembled by hand rather
    /// than through a percent-encoding serializer.
    pub fn page_url(&self, page: u32) -> String {
        format!(
            "{}?type=koop&zo={}&page={}",
            self.base, self.location, page
        )
    }
}

/// Result of one collection run: the full ranking plus page accounting,
/// so callers can see how much data the ranking silently omits.
#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    /// All agents, sorted by count descending, ties by name ascending.
    pub ranking: Vec<RankedEntry>,
    pub pages_total: u32,
    pub pages_fetched: u32,
    pub pages_dropped: u32,
}

impl CollectReport {
    /// Leading slice of the ranking; truncation policy lives with the
    /// caller, not the ranker.
    pub fn top(&self, k: usize) -> &[RankedEntry] {
        &self.ranking[..self.ranking.len().min(k)]
    }
}
