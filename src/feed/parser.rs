use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use feed_rs::parser as feed_parser;
use regex::Regex;
use std::io::BufRead;
use std::sync::OnceLock;

/// Descriptions are bounded so downstream table cells stay reasonable.
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

/// One feed entry with every field optional. Feeds omit fields freely;
/// callers resolve the gaps (sentinel strings, current-date fallback) instead
/// of erroring on absence.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    /// Structured publish time, falling back to the update time. `None` when
    /// the feed carries no parseable timestamp.
    pub published: Option<DateTime<Utc>>,
}

pub struct FeedParser;

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a feed document into entries. RSS and Atom are both accepted;
    /// a document with no entries parses to an empty list, not an error.
    pub fn parse_entries<R: BufRead>(&self, reader: R) -> Result<Vec<ParsedEntry>> {
        let feed = feed_parser::parse(reader)
            .map_err(|e| Error::FeedParse(format!("Failed to parse feed: {}", e)))?;

        Ok(feed
            .entries
            .into_iter()
            .map(|entry| ParsedEntry {
                title: entry.title.map(|t| t.content),
                link: entry.links.first().map(|l| l.href.clone()),
                summary: entry.summary.map(|s| s.content),
                published: entry.published.or(entry.updated),
            })
            .collect())
    }

    pub fn validate_feed_url(&self, url: &str) -> Result<()> {
        let parsed_url =
            url::Url::parse(url).map_err(|e| Error::InvalidUrl(format!("Invalid URL: {}", e)))?;

        match parsed_url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(Error::InvalidUrl(format!("Unsupported scheme: {}", scheme))),
        }
    }
}

/// Strip HTML tags from a summary. Entities are left as-is; the goal is a
/// plain-text excerpt, not a faithful rendering.
pub fn strip_html(raw: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new("<[^>]*>").expect("tag pattern is valid"));
    re.replace_all(raw, "").trim().to_string()
}

/// Bound a description to MAX_DESCRIPTION_CHARS, marking the cut with an
/// ellipsis. Counts chars, not bytes, so CJK text is never split mid-glyph.
pub fn truncate_description(text: &str) -> String {
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
