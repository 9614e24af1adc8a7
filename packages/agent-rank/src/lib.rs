//! Concurrent fetch-aggregate pipeline for paginated listing feeds.
//!
//! The collector resolves the total page count from the feed's paging
//! metadata, fans out one bounded-concurrency fetch unit per page, merges
//! every decoded batch into a shared per-agent tally, and produces a
//! ranked snapshot once all pages are accounted for.

pub mod collector;
pub mod config;
pub mod error;
pub mod feed;
pub mod pool;
pub mod rank;
pub mod source;
pub mod tally;
pub mod types;

// Re-exports for clean API
pub use collector::Collector;
pub use config::{BackoffPolicy, CollectorConfig};
pub use error::{CollectError, SourceError};
pub use feed::FeedResponse;
pub use rank::rank;
pub use source::{HttpListingSource, ListingSource};
pub use tally::AgentTally;
pub use types::{CollectReport, Listing, ListingQuery, PageBatch, PageCount, RankedEntry};
