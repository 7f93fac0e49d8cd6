use crate::config::FilterConfig;
use crate::error::{Error, Result};
use crate::feed::parser::{self, FeedParser, ParsedEntry};
use crate::feed::{FeedFailure, FeedSource, FetchReport, NewsItem, NO_LINK, NO_TITLE};
use chrono::{DateTime, Duration as TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hard timeout per request; no feed may stall the run.
pub const FETCH_TIMEOUT_SECS: u64 = 10;
/// At most this many entries are considered per feed, in document order.
pub const MAX_ENTRIES_PER_FEED: usize = 10;
/// Bounded worker pool for multi-feed fetches.
pub const DEFAULT_CONCURRENT_FETCHES: usize = 20;

// Some feed hosts reject non-browser clients outright.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    concurrency: usize,
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedFetcher {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            concurrency: DEFAULT_CONCURRENT_FETCHES,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetch one feed and normalize its matching entries. Never fails: any
    /// fetch or parse error is folded into the report as a single
    /// `FeedFailure` with an empty item list.
    pub async fn fetch(&self, source: &FeedSource, filter: &FilterConfig) -> FetchReport {
        info!("Fetching news from {}", source.name);

        match self.fetch_items(source, filter).await {
            Ok(items) => FetchReport { items, failure: None },
            Err(e) => {
                warn!("Error fetching {}: {}", source.name, e);
                FetchReport {
                    items: Vec::new(),
                    failure: Some(FeedFailure {
                        source_name: source.name.clone(),
                        source_url: source.url.clone(),
                        error_message: e.to_string(),
                    }),
                }
            }
        }
    }

    /// Fetch every source through a bounded worker pool, collecting results
    /// as they complete. Feeds are independent; one failure never affects
    /// the others.
    pub async fn fetch_all(
        &self,
        sources: &[FeedSource],
        filter: &FilterConfig,
    ) -> (Vec<NewsItem>, Vec<FeedFailure>) {
        let reports = stream::iter(sources)
            .map(|source| self.fetch(source, filter))
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut items = Vec::new();
        let mut failures = Vec::new();
        for report in reports {
            items.extend(report.items);
            if let Some(failure) = report.failure {
                failures.push(failure);
            }
        }
        (items, failures)
    }

    async fn fetch_items(
        &self,
        source: &FeedSource,
        filter: &FilterConfig,
    ) -> Result<Vec<NewsItem>> {
        let feed_parser = FeedParser::new();
        feed_parser.validate_feed_url(&source.url)?;

        let response = self
            .client
            .get(&source.url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", ACCEPT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Request to {} timed out", source.url))
                } else {
                    Error::Http(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "HTTP {} for {}",
                response.status().as_u16(),
                source.url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response body: {}", e)))?;

        let entries = feed_parser.parse_entries(std::io::Cursor::new(body))?;
        if entries.is_empty() {
            debug!("No entries found for {}", source.name);
            return Ok(Vec::new());
        }

        Ok(normalize_entries(entries, source, filter, Utc::now()))
    }
}

/// Apply the entry cap and the keyword/recency filters, producing canonical
/// items. `now` is injected so the recency window is testable.
pub fn normalize_entries(
    entries: Vec<ParsedEntry>,
    source: &FeedSource,
    filter: &FilterConfig,
    now: DateTime<Utc>,
) -> Vec<NewsItem> {
    let mut items = Vec::new();
    let mut skipped = 0usize;

    for entry in entries.into_iter().take(MAX_ENTRIES_PER_FEED) {
        let title = entry.title.unwrap_or_else(|| NO_TITLE.to_string());
        let link = entry.link.unwrap_or_else(|| NO_LINK.to_string());

        if !filter.matches_title(&title) {
            skipped += 1;
            continue;
        }

        // Entries without a structured timestamp are kept: there is no
        // reliable basis to age them out, so they get the current date.
        let date = match entry.published {
            Some(published) => {
                let age = now.signed_duration_since(published);
                if age > TimeDelta::hours(i64::from(filter.max_lookback_hours)) {
                    skipped += 1;
                    continue;
                }
                published.format("%Y-%m-%d").to_string()
            }
            None => now.format("%Y-%m-%d").to_string(),
        };

        let description =
            parser::truncate_description(&parser::strip_html(entry.summary.as_deref().unwrap_or("")));

        items.push(NewsItem {
            title,
            link,
            source: source.name.clone(),
            date,
            description,
        });
    }

    if skipped > 0 {
        debug!("{}: skipped {} entries not matching filters", source.name, skipped);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(name: &str, url: &str) -> FeedSource {
        FeedSource {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    fn filter(keywords: &[&str], max_lookback_hours: u32) -> FilterConfig {
        FilterConfig {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            max_lookback_hours,
        }
    }

    fn entry(
        title: Option<&str>,
        link: Option<&str>,
        published: Option<DateTime<Utc>>,
    ) -> ParsedEntry {
        ParsedEntry {
            title: title.map(str::to_string),
            link: link.map(str::to_string),
            summary: None,
            published,
        }
    }

    #[test]
    fn test_keyword_filter_keeps_and_skips() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let entries = vec![
            entry(Some("contains A here"), Some("http://a/1"), Some(now)),
            entry(Some("unrelated"), Some("http://a/2"), Some(now)),
        ];

        let items = normalize_entries(entries, &source("X", "http://x"), &filter(&["A", "B"], 24), now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "http://a/1");
    }

    #[test]
    fn test_recency_filter_drops_old_structured_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let entries = vec![
            entry(Some("A old"), Some("http://a/old"), Some(now - TimeDelta::hours(25))),
            entry(Some("A fresh"), Some("http://a/fresh"), Some(now - TimeDelta::hours(1))),
        ];

        let items = normalize_entries(entries, &source("X", "http://x"), &filter(&["A"], 24), now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "http://a/fresh");
    }

    #[test]
    fn test_missing_timestamp_skips_recency_filter() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let entries = vec![entry(Some("A undated"), Some("http://a/undated"), None)];

        let items = normalize_entries(entries, &source("X", "http://x"), &filter(&["A"], 24), now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].date, "2024-01-02");
    }

    #[test]
    fn test_missing_title_and_link_use_sentinels() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let entries = vec![entry(None, None, Some(now))];

        let items = normalize_entries(entries, &source("X", "http://x"), &filter(&["No Title"], 24), now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, NO_TITLE);
        assert_eq!(items[0].link, NO_LINK);
    }

    #[test]
    fn test_entry_cap_considers_first_ten() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let entries: Vec<_> = (0..25)
            .map(|i| {
                entry(
                    Some(&format!("A {}", i)),
                    Some(&format!("http://a/{}", i)),
                    Some(now),
                )
            })
            .collect();

        let items = normalize_entries(entries, &source("X", "http://x"), &filter(&["A"], 24), now);
        assert_eq!(items.len(), MAX_ENTRIES_PER_FEED);
        assert_eq!(items[0].link, "http://a/0");
        assert_eq!(items[9].link, "http://a/9");
    }

    #[test]
    fn test_deposit_rules_scenario() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let published = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entries = vec![entry(Some("存款新规发布"), Some("http://a/1"), Some(published))];

        let items = normalize_entries(entries, &source("X", "http://x"), &filter(&["存款"], 8760), now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "存款新规发布");
        assert_eq!(items[0].link, "http://a/1");
        assert_eq!(items[0].date, "2024-01-01");
        assert_eq!(items[0].source, "X");
    }

    fn rss_body(items: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
    <channel>
        <title>Feed</title>
        <link>https://example.com</link>
        {}
    </channel>
</rss>"#,
            items
        )
    }

    #[tokio::test]
    async fn test_fetch_filters_and_normalizes() {
        let mock_server = MockServer::start().await;
        let recent = (Utc::now() - TimeDelta::hours(1)).to_rfc2822();
        let body = rss_body(&format!(
            r#"<item>
            <title>Alpha update</title>
            <link>https://example.com/alpha</link>
            <description>&lt;p&gt;Alpha &lt;b&gt;news&lt;/b&gt;&lt;/p&gt;</description>
            <pubDate>{recent}</pubDate>
        </item>
        <item>
            <title>off topic</title>
            <link>https://example.com/other</link>
            <pubDate>{recent}</pubDate>
        </item>"#
        ));

        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("content-type", "application/rss+xml"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new();
        let src = source("Alpha Feed", &format!("{}/feed.xml", mock_server.uri()));
        let report = fetcher.fetch(&src, &filter(&["Alpha"], 24)).await;

        assert!(report.failure.is_none());
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].title, "Alpha update");
        assert_eq!(report.items[0].source, "Alpha Feed");
        assert_eq!(report.items[0].description, "Alpha news");
    }

    #[tokio::test]
    async fn test_fetch_http_error_yields_failure_record() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new();
        let src = source("Gone", &format!("{}/missing.xml", mock_server.uri()));
        let report = fetcher.fetch(&src, &filter(&["A"], 24)).await;

        assert!(report.items.is_empty());
        let failure = report.failure.expect("expected a failure record");
        assert_eq!(failure.source_name, "Gone");
        assert!(failure.error_message.contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_malformed_feed_yields_failure_record() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not xml at all"))
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new();
        let src = source("Broken", &format!("{}/broken.xml", mock_server.uri()));
        let report = fetcher.fetch(&src, &filter(&["A"], 24)).await;

        assert!(report.items.is_empty());
        assert!(report.failure.is_some());
    }

    #[tokio::test]
    async fn test_fetch_empty_feed_is_not_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_body("")))
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new();
        let src = source("Empty", &format!("{}/empty.xml", mock_server.uri()));
        let report = fetcher.fetch(&src, &filter(&["A"], 24)).await;

        assert!(report.items.is_empty());
        assert!(report.failure.is_none());
    }

    #[tokio::test]
    async fn test_fetch_timeout_yields_failure_record() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_string(rss_body("")),
            )
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::with_timeout(Duration::from_millis(100));
        let src = source("Slow", &format!("{}/slow.xml", mock_server.uri()));
        let report = fetcher.fetch(&src, &filter(&["A"], 24)).await;

        let failure = report.failure.expect("expected a failure record");
        assert!(failure.error_message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_fetch_all_tolerates_partial_failure() {
        let mock_server = MockServer::start().await;
        let recent = (Utc::now() - TimeDelta::hours(1)).to_rfc2822();
        let ok_body = |link: &str| {
            rss_body(&format!(
                r#"<item><title>A story</title><link>{link}</link><pubDate>{recent}</pubDate></item>"#
            ))
        };

        Mock::given(method("GET"))
            .and(path("/one.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ok_body("https://example.com/1")))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/two.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ok_body("https://example.com/2")))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/three.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let sources = vec![
            source("One", &format!("{}/one.xml", mock_server.uri())),
            source("Two", &format!("{}/two.xml", mock_server.uri())),
            source("Three", &format!("{}/three.xml", mock_server.uri())),
        ];

        let fetcher = FeedFetcher::new();
        let (items, failures) = fetcher.fetch_all(&sources, &filter(&["A"], 24)).await;

        assert_eq!(items.len(), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].source_name, "Three");
    }
}
