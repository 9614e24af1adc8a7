use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::ListingQuery;

/// Network seam of the pipeline (to allow mocking).
///
/// Implementations return the raw page body on success; decoding happens
/// in the collector, after the concurrency token has been released.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch one page of the feed.
    ///
    /// `Err(Status)` reports a non-success response and is the only
    /// retryable outcome; `Err(Transport)` means the request itself
    /// failed and the page will be dropped.
    async fn fetch_page(&self, query: &ListingQuery, page: u32) -> Result<String, SourceError>;
}

#[async_trait]
impl<S: ListingSource + ?Sized> ListingSource for std::sync::Arc<S> {
    async fn fetch_page(&self, query: &ListingQuery, page: u32) -> Result<String, SourceError> {
        (**self).fetch_page(query, page).await
    }
}

/// `reqwest` implementation of [`ListingSource`].
///
/// A single shared client carries connection pooling and the per-request
/// timeout; the upstream feed has no timeout of its own, so an unbounded
/// request would otherwise hang a page unit forever.
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    client: reqwest::Client,
}

impl HttpListingSource {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_page(&self, query: &ListingQuery, page: u32) -> Result<String, SourceError> {
        let url = query.page_url(page);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(SourceError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                code: status.as_u16(),
            });
        }

        response.text().await.map_err(SourceError::transport)
    }
}
