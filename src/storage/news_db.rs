use crate::error::Result;
use crate::feed::NewsItem;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Retention bound: only the newest entries are kept so the file never
/// bloats.
pub const MAX_DB_SIZE: usize = 1000;

pub const DEFAULT_DB_FILE: &str = "data/news_db.json";

/// Link-keyed deduplication store, persisted as a pretty-printed JSON array
/// ordered newest-first. Read once per run, merged once, written at most
/// once; concurrent runs would need external locking.
#[derive(Debug)]
pub struct NewsDb {
    path: PathBuf,
    items: Vec<NewsItem>,
}

/// What a merge changed: the items whose links were not already stored.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub added: Vec<NewsItem>,
}

impl MergeOutcome {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }
}

impl NewsDb {
    /// Open the store at `path`. A missing or unreadable file yields an
    /// empty store rather than failing the run.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let items = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(items) => items,
                Err(e) => {
                    warn!("Failed to decode {}: {}; starting with an empty store", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self { path, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[NewsItem] {
        &self.items
    }

    /// Merge new items into the store. An item whose link is already present
    /// is silently dropped; the stored copy wins. After the merge the store
    /// is re-sorted by date descending (stable, so ties keep their prior
    /// relative order) and trimmed to `MAX_DB_SIZE`, oldest first out.
    pub fn merge(&mut self, new_items: Vec<NewsItem>) -> MergeOutcome {
        let mut seen: HashSet<String> =
            self.items.iter().map(|item| item.link.clone()).collect();

        let mut added = Vec::new();
        for item in new_items {
            if seen.insert(item.link.clone()) {
                self.items.push(item.clone());
                added.push(item);
            }
        }

        if added.is_empty() {
            debug!("No new items to add to the store");
            return MergeOutcome::default();
        }

        // Lexicographic order on YYYY-MM-DD strings is date order.
        self.items.sort_by(|a, b| b.date.cmp(&a.date));
        self.items.truncate(MAX_DB_SIZE);

        MergeOutcome { added }
    }

    /// Persist the store: write to a temp file in the same directory, then
    /// rename over the target so a crash cannot leave a corrupt file behind.
    /// Callers skip this entirely when the merge added nothing.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.items)?;
        let temp_file = self.path.with_extension("tmp");
        fs::write(&temp_file, json)?;
        fs::rename(&temp_file, &self.path)?;

        debug!("Store saved: {} items at {}", self.items.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
