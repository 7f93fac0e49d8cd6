use crate::error::{Error, Result};
use crate::feed::FeedSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_SOURCES_FILE: &str = "rss_config.json";
pub const DEFAULT_FILTER_FILE: &str = "filter_config.json";
pub const DEFAULT_CREDENTIALS_FILE: &str = "feishu_config.json";

/// Load the feed source list: a JSON object mapping display name to URL.
/// Sources without a URL are skipped with a warning.
pub fn load_sources<P: AsRef<Path>>(path: P) -> Result<Vec<FeedSource>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|_| Error::Config(format!("{} not found", path.display())))?;
    let map: BTreeMap<String, String> = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to decode {}: {}", path.display(), e)))?;

    Ok(map
        .into_iter()
        .filter(|(name, url)| {
            if url.is_empty() {
                warn!("Skipping source {}: no URL provided", name);
                return false;
            }
            true
        })
        .map(|(name, url)| FeedSource { name, url })
        .collect())
}

/// Keyword and recency filters applied to every fetched entry. Immutable for
/// the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(rename = "filter_keywords", default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_max_lookback_hours")]
    pub max_lookback_hours: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            max_lookback_hours: default_max_lookback_hours(),
        }
    }
}

impl FilterConfig {
    /// Load the filter configuration. A missing file means defaults; a
    /// malformed file falls back to defaults with a warning rather than
    /// aborting the run.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to decode {}: {}; using default filters", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Literal, case-sensitive substring match against the configured
    /// keywords. No tokenization or stemming.
    pub fn matches_title(&self, title: &str) -> bool {
        self.keywords.iter().any(|kw| title.contains(kw.as_str()))
    }
}

fn default_keywords() -> Vec<String> {
    vec!["存款".to_string(), "理财".to_string(), "经济".to_string()]
}

fn default_max_lookback_hours() -> u32 {
    24
}

/// Feishu credentials, each field individually optional until resolution
/// completes. Environment variables win; a local credentials file fills any
/// gaps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub app_token: Option<String>,
    pub table_id: Option<String>,
    pub error_table_id: Option<String>,
    pub error_app_token: Option<String>,
}

/// Fully-resolved publish configuration. Existence of this struct is the
/// "credentials are complete" predicate: it can only be built when the four
/// core fields are present.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub app_id: String,
    pub app_secret: String,
    pub app_token: String,
    pub table_id: String,
    /// Error-table push is skipped entirely when unset.
    pub error_table_id: Option<String>,
    /// Falls back to the main app token when no dedicated one is configured.
    pub error_app_token: String,
}

impl Credentials {
    /// Resolve credentials: environment first, then the fallback file for
    /// any field the environment left empty.
    pub fn resolve<P: AsRef<Path>>(fallback_file: P) -> Self {
        let mut creds = Self::from_env();
        if !creds.is_complete() {
            if let Some(file_creds) = Self::from_file(fallback_file) {
                creds.fill_missing(file_creds);
            }
        }
        creds
    }

    fn from_env() -> Self {
        Self {
            app_id: env_var("FEISHU_APP_ID"),
            app_secret: env_var("FEISHU_APP_SECRET"),
            app_token: env_var("FEISHU_APP_TOKEN"),
            table_id: env_var("FEISHU_TABLE_ID"),
            error_table_id: env_var("FEISHU_ERROR_TABLE_ID"),
            error_app_token: env_var("FEISHU_ERROR_APP_TOKEN"),
        }
    }

    fn from_file<P: AsRef<Path>>(path: P) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn fill_missing(&mut self, other: Self) {
        self.app_id = self.app_id.take().or(other.app_id);
        self.app_secret = self.app_secret.take().or(other.app_secret);
        self.app_token = self.app_token.take().or(other.app_token);
        self.table_id = self.table_id.take().or(other.table_id);
        self.error_table_id = self.error_table_id.take().or(other.error_table_id);
        self.error_app_token = self.error_app_token.take().or(other.error_app_token);
    }

    /// Publishing requires the four core fields. The error-table fields stay
    /// optional: without them only the error push is skipped.
    pub fn is_complete(&self) -> bool {
        self.app_id.is_some()
            && self.app_secret.is_some()
            && self.app_token.is_some()
            && self.table_id.is_some()
    }

    /// Convert into a concrete publish configuration, or `None` when the
    /// core fields are incomplete.
    pub fn into_publish_config(self) -> Option<PublishConfig> {
        let app_id = self.app_id?;
        let app_secret = self.app_secret?;
        let app_token = self.app_token?;
        let table_id = self.table_id?;
        let error_app_token = self.error_app_token.unwrap_or_else(|| app_token.clone());

        Some(PublishConfig {
            app_id,
            app_secret,
            app_token,
            table_id,
            error_table_id: self.error_table_id,
            error_app_token,
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
