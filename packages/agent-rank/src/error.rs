use thiserror::Error;

/// Boxed error for wrapping transport-layer failures without leaking the
/// underlying client type through the [`ListingSource`] seam.
///
/// [`ListingSource`]: crate::source::ListingSource
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure modes of a single page fetch.
///
/// `Status` is the only retryable variant; `Transport` and `Decode` are
/// terminal for the page they occurred on.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level failure before a response was obtained.
    #[error("transport failure: {source}")]
    Transport {
        #[source]
        source: BoxError,
    },

    /// Upstream answered with a non-success status (rate limiting shows
    /// up here as 401/429 depending on the feed).
    #[error("upstream returned status {code}")]
    Status { code: u16 },

    /// The response body did not match the feed schema.
    #[error("malformed feed body: {source}")]
    Decode {
        #[source]
        source: BoxError,
    },
}

impl SourceError {
    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport {
            source: source.into(),
        }
    }

    pub fn decode(source: impl Into<BoxError>) -> Self {
        Self::Decode {
            source: source.into(),
        }
    }

    /// True when the fetch may be retried against the same page.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

/// Failure modes of a whole collection run.
///
/// Per-page fetch failures are not escalated here; they surface as drop
/// counts on the final report instead.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The page-count probe failed, so no fetches were scheduled.
    #[error("could not resolve page count: {source}")]
    Resolve {
        #[source]
        source: SourceError,
    },

    /// The probe succeeded but the response carried no usable paging
    /// metadata (absent, or a zero page count).
    #[error("feed response carried no usable paging metadata")]
    MissingPageCount,
}
