//! Wire schema of the upstream listing feed, treated as a fixed external
//! contract. Field names mirror the feed's JSON exactly via serde renames.

use serde::Deserialize;

use crate::error::SourceError;
use crate::types::{Listing, PageBatch};

/// Envelope of one feed page.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedResponse {
    #[serde(rename = "AccountStatus", default)]
    pub account_status: i32,
    #[serde(rename = "EmailNotConfirmed", default)]
    pub email_not_confirmed: bool,
    #[serde(rename = "ValidationFailed", default)]
    pub validation_failed: bool,
    #[serde(rename = "Objects", default)]
    pub objects: Vec<FeedListing>,
    /// Only the first page is guaranteed to carry paging metadata.
    #[serde(rename = "Paging", default)]
    pub paging: Option<FeedPaging>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedListing {
    #[serde(rename = "MakelaarNaam")]
    pub agent_name: String,
    #[serde(rename = "IsVerkocht")]
    pub is_sold: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeedPaging {
    #[serde(rename = "AantalPaginas")]
    pub total_pages: u32,
}

impl FeedResponse {
    /// Convert this page's listings into the batch handed to the tally.
    pub fn into_batch(self) -> PageBatch {
        self.objects.into_iter().map(Into::into).collect()
    }
}

impl From<FeedListing> for Listing {
    fn from(listing: FeedListing) -> Self {
        Self {
            agent_name: listing.agent_name,
            is_sold: listing.is_sold,
        }
    }
}

/// Decode one page body. A failure here is terminal for the page; partial
/// or garbage data is never aggregated.
pub fn decode(body: &str) -> Result<FeedResponse, SourceError> {
    serde_json::from_str(body).map_err(SourceError::decode)
}
