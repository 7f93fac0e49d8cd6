pub mod auth;
pub mod publisher;

use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// HTTP client for the Feishu open API. The base URL is injectable so tests
/// can point it at a mock server.
#[derive(Debug, Clone)]
pub struct BitableClient {
    http: Client,
    base_url: String,
}

impl Default for BitableClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BitableClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
