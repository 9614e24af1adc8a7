use anyhow::{Context, Result};
use std::env;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Feed base URL, including the partner key path segment.
    pub feed_url: String,
    /// Location path selecting the listing set, e.g. `/amsterdam/`.
    pub location: String,
    /// How many ranking rows to print per query.
    pub top_k: usize,
    /// Optional override of the collector's concurrency cap.
    pub concurrency: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        Ok(Self {
            feed_url: env::var("FEED_URL").context("FEED_URL must be set")?,
            location: env::var("FEED_LOCATION").unwrap_or_else(|_| "/amsterdam/".to_string()),
            top_k: env::var("TOP_K")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("TOP_K must be a valid number")?,
            concurrency: match env::var("FETCH_CONCURRENCY") {
                Ok(value) => Some(
                    value
                        .parse()
                        .context("FETCH_CONCURRENCY must be a valid number")?,
                ),
                Err(_) => None,
            },
        })
    }
}
