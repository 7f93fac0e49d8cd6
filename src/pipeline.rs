use crate::bitable::auth::{TokenCache, DEFAULT_TOKEN_FILE};
use crate::bitable::publisher::{Destination, Publisher};
use crate::bitable::BitableClient;
use crate::config::{self, Credentials, FilterConfig};
use crate::error::Result;
use crate::feed::fetcher::FeedFetcher;
use crate::storage::news_db::{NewsDb, DEFAULT_DB_FILE};
use std::path::PathBuf;
use tracing::{info, warn};

/// File locations for one run. Defaults mirror the conventional working-tree
/// layout; tests point them into a temp directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub sources: PathBuf,
    pub filter: PathBuf,
    pub credentials: PathBuf,
    pub db: PathBuf,
    pub token_cache: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self {
            sources: PathBuf::from(config::DEFAULT_SOURCES_FILE),
            filter: PathBuf::from(config::DEFAULT_FILTER_FILE),
            credentials: PathBuf::from(config::DEFAULT_CREDENTIALS_FILE),
            db: PathBuf::from(DEFAULT_DB_FILE),
            token_cache: PathBuf::from(DEFAULT_TOKEN_FILE),
        }
    }
}

/// Counters for one completed run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items that survived the per-feed filters, before deduplication.
    pub fetched: usize,
    /// Items the store had not seen before.
    pub added: usize,
    /// Records the remote store reports inserted.
    pub published: usize,
    /// Feeds that failed to fetch or parse.
    pub failed_feeds: usize,
}

/// Execute one ingestion run end to end: fetch and filter every feed, merge
/// into the persistent store, then publish the newly observed items and any
/// fetch failures.
///
/// Per-feed and publish errors are absorbed into logs; the run itself always
/// terminates normally. Publishing only what the merge added keeps repeat
/// runs from re-sending items the store already holds.
pub async fn run(paths: &RunPaths, client: &BitableClient) -> Result<RunSummary> {
    let sources = match config::load_sources(&paths.sources) {
        Ok(sources) if !sources.is_empty() => sources,
        Ok(_) => {
            warn!("No RSS sources configured. Exiting.");
            return Ok(RunSummary::default());
        }
        Err(e) => {
            warn!("No RSS sources loaded: {}. Exiting.", e);
            return Ok(RunSummary::default());
        }
    };

    let filter = FilterConfig::load(&paths.filter);
    info!(
        "Fetching {} feeds ({} keywords, {}h lookback)",
        sources.len(),
        filter.keywords.len(),
        filter.max_lookback_hours
    );

    let fetcher = FeedFetcher::new();
    let (items, failures) = fetcher.fetch_all(&sources, &filter).await;
    info!("Collected {} items, {} feed failures", items.len(), failures.len());

    let mut summary = RunSummary {
        fetched: items.len(),
        failed_feeds: failures.len(),
        ..Default::default()
    };

    let mut db = NewsDb::load(&paths.db);
    let outcome = db.merge(items);
    summary.added = outcome.added_count();
    if outcome.added_count() > 0 {
        match db.save() {
            Ok(()) => info!(
                "Database updated. Added {} items. Total: {}",
                outcome.added_count(),
                db.len()
            ),
            Err(e) => warn!("Error saving database: {}", e),
        }
    } else {
        info!("No new items to add to database.");
    }

    let publish_config = match Credentials::resolve(&paths.credentials).into_publish_config() {
        Some(config) => config,
        None => {
            info!("Feishu config missing. Skipping upload.");
            return Ok(summary);
        }
    };

    let token_cache = TokenCache::new(&paths.token_cache);
    let token = match token_cache
        .get_token(client, &publish_config.app_id, &publish_config.app_secret)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            warn!("{}; skipping upload", e);
            return Ok(summary);
        }
    };

    let publisher = Publisher::new(client);
    let dest = Destination {
        app_token: publish_config.app_token.clone(),
        table_id: publish_config.table_id.clone(),
    };
    match publisher.publish(&token, &dest, &outcome.added).await {
        Ok(count) => summary.published = count,
        Err(e) => warn!("{}", e),
    }

    if !failures.is_empty() {
        if let Some(error_table_id) = publish_config.error_table_id {
            let error_dest = Destination {
                app_token: publish_config.error_app_token,
                table_id: error_table_id,
            };
            if let Err(e) = publisher.publish_failures(&token, &error_dest, &failures).await {
                warn!("{}", e);
            }
        }
    }

    Ok(summary)
}
