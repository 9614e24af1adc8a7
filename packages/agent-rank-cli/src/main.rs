//! Printing collaborator for the agent-rank pipeline.
//!
//! Runs the collector for the configured location, once for all listings
//! and once for the garden-filtered set, and prints both top-K rankings.

mod config;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use agent_rank::{CollectReport, Collector, CollectorConfig, HttpListingSource, ListingQuery};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agent_rank=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config = Config::from_env()?;
    let base = Url::parse(&config.feed_url).context("FEED_URL is not a valid URL")?;
    tracing::info!(location = %config.location, top_k = config.top_k, "starting agent-rank");

    let mut collector_config = CollectorConfig::default();
    if let Some(concurrency) = config.concurrency {
        collector_config = collector_config.with_concurrency(concurrency);
    }

    let source = HttpListingSource::new(collector_config.request_timeout)?;
    let collector = Collector::new(source, collector_config);

    let all_listings = ListingQuery::new(base, config.location.clone());
    let with_garden = all_listings.clone().with_garden_filter();

    let (all_report, garden_report) = tokio::try_join!(
        collector.collect(&all_listings),
        collector.collect(&with_garden),
    )?;

    if all_report.pages_dropped > 0 || garden_report.pages_dropped > 0 {
        tracing::warn!(
            all_dropped = all_report.pages_dropped,
            garden_dropped = garden_report.pages_dropped,
            "some pages were dropped; rankings understate the feed"
        );
    }

    print_ranking("All listings", &all_report, config.top_k);
    print_ranking("Listings with garden", &garden_report, config.top_k);

    Ok(())
}

fn print_ranking(title: &str, report: &CollectReport, top_k: usize) {
    println!();
    println!("{title}: top {top_k} agents by listing count");
    println!("{:-<60}", "");
    for (position, entry) in report.top(top_k).iter().enumerate() {
        println!("{:>3}. {:<45} {:>8}", position + 1, entry.agent_name, entry.count);
    }
    if report.pages_dropped > 0 {
        println!(
            "(counts understate the feed: {}/{} pages dropped)",
            report.pages_dropped, report.pages_total
        );
    }
}
