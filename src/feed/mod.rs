pub mod fetcher;
pub mod parser;

use serde::{Deserialize, Serialize};

/// Sentinel title for entries that carry none.
pub const NO_TITLE: &str = "No Title";
/// Sentinel link for entries that carry none.
pub const NO_LINK: &str = "No Link";

/// A configured feed: display name plus URL. Loaded once per run, immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

/// A normalized news item. `link` is the sole deduplication key: unique
/// within a run's aggregate and within the persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub source: String,
    /// ISO calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub description: String,
}

/// Record of a failed feed fetch or parse. Collected per run, forwarded to
/// the error table, never persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFailure {
    pub source_name: String,
    pub source_url: String,
    pub error_message: String,
}

/// Outcome of fetching a single feed. A failed feed yields an empty item
/// list and exactly one failure record.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub items: Vec<NewsItem>,
    pub failure: Option<FeedFailure>,
}
