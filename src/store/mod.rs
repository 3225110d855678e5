// =============================================================================
// Persistence interface (spec §6)
// =============================================================================
//
// The scheduler depends on this trait abstractly; `sqlite` provides the only
// implementation shipped. Every operation here must be safe to call
// concurrently — the `SqliteStore` impl guards its single connection with a
// mutex, matching `original_source/backend/src/db.c`'s
// single-`sqlite3*`-behind-one-`pthread_mutex_t` discipline.
// =============================================================================

pub mod sqlite;

use crate::error::CoreError;
use crate::models::{Category, DataPoint, NewsItem, SourceKind};

pub use sqlite::SqliteStore;

/// A source's last-attempt outcome, as exposed via `/api/v1/sources`.
#[derive(Debug, Clone)]
pub struct SourceStatusRow {
    pub source_name: String,
    pub source_kind: SourceKind,
    pub last_fetched: Option<i64>,
    pub last_error: Option<String>,
    pub error_count: i64,
}

pub trait Store: Send + Sync {
    fn insert_data_point(&self, dp: &DataPoint) -> Result<(), CoreError>;
    fn insert_news(&self, item: &NewsItem) -> Result<(), CoreError>;
    fn latest_data_points(&self, category: Category, limit: usize) -> Result<Vec<DataPoint>, CoreError>;
    fn all_latest_news(&self, limit: usize) -> Result<Vec<NewsItem>, CoreError>;
    fn news_by_category(&self, category: Category, limit: usize) -> Result<Vec<NewsItem>, CoreError>;
    fn history(&self, symbol: &str, limit: usize) -> Result<Vec<DataPoint>, CoreError>;
    fn upsert_source_status(
        &self,
        name: &str,
        kind: SourceKind,
        error: Option<&str>,
    ) -> Result<(), CoreError>;
    fn source_statuses(&self) -> Result<Vec<SourceStatusRow>, CoreError>;
    fn prune_older_than(&self, age_seconds: i64) -> Result<(), CoreError>;
    fn count_entries(&self) -> Result<i64, CoreError>;
}
