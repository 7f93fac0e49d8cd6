pub mod news_db;

pub use news_db::{MergeOutcome, NewsDb, MAX_DB_SIZE};
