// =============================================================================
// SqliteStore — the only `Store` implementation shipped
// =============================================================================
//
// Schema and queries are a direct translation of
// `original_source/backend/src/db.c`'s `SCHEMA_SQL` and prepared statements:
// WAL mode, the same three tables and indexes, `INSERT OR IGNORE` for news
// dedup by `url`, the same latest-per-(symbol,source_name) self-join, and the
// same `ON CONFLICT(source_name) DO UPDATE` source-status upsert with its
// reset-to-0-on-success / increment-on-failure `error_count` expression.
// =============================================================================

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::CoreError;
use crate::models::{Category, DataPoint, NewsItem, SourceKind};

use super::{SourceStatusRow, Store};

const SCHEMA_SQL: &str = "
PRAGMA journal_mode=WAL;
PRAGMA foreign_keys=ON;

CREATE TABLE IF NOT EXISTS data_entries (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  source_name  TEXT NOT NULL,
  source_type  INTEGER NOT NULL,
  category     INTEGER NOT NULL,
  symbol       TEXT NOT NULL,
  display_name TEXT,
  value        REAL,
  currency     TEXT,
  change_pct   REAL,
  volume       REAL,
  timestamp    INTEGER NOT NULL,
  fetched_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_symbol ON data_entries(symbol);
CREATE INDEX IF NOT EXISTS idx_entries_source ON data_entries(source_name);
CREATE INDEX IF NOT EXISTS idx_entries_ts     ON data_entries(timestamp DESC);

CREATE TABLE IF NOT EXISTS news_items (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  title        TEXT NOT NULL,
  source       TEXT NOT NULL,
  url          TEXT UNIQUE,
  summary      TEXT,
  category     INTEGER NOT NULL,
  published_at INTEGER,
  fetched_at   INTEGER NOT NULL,
  score        REAL NOT NULL DEFAULT 0,
  region       TEXT,
  country      TEXT
);

CREATE INDEX IF NOT EXISTS idx_news_pub ON news_items(published_at DESC);
CREATE INDEX IF NOT EXISTS idx_news_src ON news_items(source);

CREATE TABLE IF NOT EXISTS source_status (
  source_name  TEXT PRIMARY KEY,
  source_type  INTEGER NOT NULL,
  last_fetched INTEGER,
  last_error   TEXT,
  error_count  INTEGER DEFAULT 0
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn to_epoch(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, CoreError> {
        let conn = Connection::open(path)
            .map_err(|e| CoreError::Storage(format!("failed to open {path}: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        info!(path, "database opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), CoreError> {
        self.conn
            .lock()
            .execute_batch(SCHEMA_SQL)
            .map_err(|e| CoreError::Storage(format!("migration failed: {e}")))?;
        Ok(())
    }

    fn read_entries(
        stmt: &mut rusqlite::Statement<'_>,
        params: impl rusqlite::Params,
    ) -> Result<Vec<DataPoint>, CoreError> {
        let rows = stmt.query_map(params, |row| {
            Ok(DataPoint {
                id: row.get(0)?,
                source_name: row.get(1)?,
                source_kind: SourceKind::from_db_code(row.get(2)?),
                category: Category::from_db_code(row.get(3)?),
                symbol: row.get(4)?,
                display_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                value: row.get(6)?,
                currency: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                change_pct: row.get(8)?,
                volume: row.get(9)?,
                timestamp: from_epoch(row.get(10)?),
                ingested_at: from_epoch(row.get(11)?),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl Store for SqliteStore {
    fn insert_data_point(&self, dp: &DataPoint) -> Result<(), CoreError> {
        self.conn.lock().execute(
            "INSERT INTO data_entries \
             (source_name,source_type,category,symbol,display_name,\
              value,currency,change_pct,volume,timestamp,fetched_at) \
             VALUES (?,?,?,?,?,?,?,?,?,?,?)",
            params![
                dp.source_name,
                dp.source_kind.as_db_code(),
                dp.category.as_db_code(),
                dp.symbol,
                dp.display_name,
                dp.value,
                dp.currency,
                dp.change_pct,
                dp.volume,
                to_epoch(dp.timestamp),
                to_epoch(dp.ingested_at),
            ],
        )?;
        Ok(())
    }

    fn insert_news(&self, item: &NewsItem) -> Result<(), CoreError> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO news_items \
             (title,source,url,summary,category,published_at,fetched_at,score,region,country) \
             VALUES (?,?,?,?,?,?,?,?,?,?)",
            params![
                item.title,
                item.source,
                item.url,
                item.summary,
                item.category.as_db_code(),
                item.published_at.map(to_epoch),
                to_epoch(item.ingested_at),
                item.score,
                item.region,
                item.country,
            ],
        )?;
        Ok(())
    }

    fn latest_data_points(&self, category: Category, limit: usize) -> Result<Vec<DataPoint>, CoreError> {
        let conn = self.conn.lock();
        // Latest-per-(symbol,source_name): group on MAX(id) rather than
        // MAX(fetched_at) — id is strictly increasing with insert order under
        // the single-writer-mutex discipline, so it picks the same row the
        // original's fetched_at comparison intends without a wall-clock tie
        // when two inserts for the same pair land in the same second.
        let mut stmt = conn.prepare(
            "SELECT d.id,d.source_name,d.source_type,d.category,d.symbol,\
                    d.display_name,d.value,d.currency,d.change_pct,d.volume,\
                    d.timestamp,d.fetched_at \
             FROM data_entries d \
             INNER JOIN (SELECT symbol,source_name,MAX(id) AS max_id \
               FROM data_entries WHERE category=? \
               GROUP BY symbol,source_name) g \
             ON d.symbol=g.symbol AND d.source_name=g.source_name \
               AND d.id=g.max_id \
             ORDER BY d.symbol ASC LIMIT ?",
        )?;
        Self::read_entries(&mut stmt, params![category.as_db_code(), limit as i64])
    }

    fn all_latest_news(&self, limit: usize) -> Result<Vec<NewsItem>, CoreError> {
        self.query_news("SELECT id,title,source,url,summary,category,published_at,fetched_at,score,region,country FROM news_items ORDER BY published_at DESC LIMIT ?", params![limit as i64])
    }

    fn news_by_category(&self, category: Category, limit: usize) -> Result<Vec<NewsItem>, CoreError> {
        self.query_news(
            "SELECT id,title,source,url,summary,category,published_at,fetched_at,score,region,country \
             FROM news_items WHERE category=? ORDER BY published_at DESC LIMIT ?",
            params![category.as_db_code(), limit as i64],
        )
    }

    fn history(&self, symbol: &str, limit: usize) -> Result<Vec<DataPoint>, CoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id,source_name,source_type,category,symbol,display_name,\
                    value,currency,change_pct,volume,timestamp,fetched_at \
             FROM data_entries WHERE symbol=? ORDER BY timestamp DESC LIMIT ?",
        )?;
        Self::read_entries(&mut stmt, params![symbol, limit as i64])
    }

    fn upsert_source_status(
        &self,
        name: &str,
        kind: SourceKind,
        error: Option<&str>,
    ) -> Result<(), CoreError> {
        self.conn.lock().execute(
            "INSERT INTO source_status (source_name,source_type,last_fetched,last_error,error_count) \
             VALUES (?,?,?,?,?) \
             ON CONFLICT(source_name) DO UPDATE SET \
               last_fetched=excluded.last_fetched, \
               last_error=excluded.last_error, \
               error_count=CASE WHEN excluded.last_error IS NULL THEN 0 \
                 ELSE source_status.error_count+1 END",
            params![name, kind.as_db_code(), Utc::now().timestamp(), error, error.is_some() as i64],
        )?;
        Ok(())
    }

    fn source_statuses(&self) -> Result<Vec<SourceStatusRow>, CoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT source_name,source_type,last_fetched,last_error,error_count FROM source_status",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SourceStatusRow {
                source_name: row.get(0)?,
                source_kind: SourceKind::from_db_code(row.get(1)?),
                last_fetched: row.get(2)?,
                last_error: row.get(3)?,
                error_count: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn prune_older_than(&self, age_seconds: i64) -> Result<(), CoreError> {
        let cutoff = Utc::now().timestamp() - age_seconds;
        let conn = self.conn.lock();
        conn.execute("DELETE FROM data_entries WHERE fetched_at < ?", params![cutoff])?;
        conn.execute("DELETE FROM news_items WHERE fetched_at < ?", params![cutoff])?;
        Ok(())
    }

    fn count_entries(&self) -> Result<i64, CoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM data_entries", [], |row| row.get(0))
            .optional()?
            .unwrap_or(0);
        Ok(count)
    }
}

impl SqliteStore {
    fn query_news(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<NewsItem>, CoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(NewsItem {
                id: row.get(0)?,
                title: row.get(1)?,
                source: row.get(2)?,
                url: row.get(3)?,
                summary: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                category: Category::from_db_code(row.get(5)?),
                published_at: row.get::<_, Option<i64>>(6)?.map(from_epoch),
                ingested_at: from_epoch(row.get(7)?),
                score: row.get(8)?,
                region: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                country: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point(symbol: &str, source: &str) -> DataPoint {
        DataPoint {
            id: 0,
            source_name: source.to_string(),
            source_kind: SourceKind::Rest,
            category: Category::Crypto,
            symbol: symbol.to_string(),
            display_name: String::new(),
            value: 100.0,
            currency: "USD".to_string(),
            change_pct: 1.0,
            volume: 10.0,
            timestamp: Utc::now(),
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn latest_data_points_dedupes_per_symbol_and_source() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_data_point(&sample_point("BTC", "a")).unwrap();
        let mut newer = sample_point("BTC", "a");
        newer.value = 200.0;
        store.insert_data_point(&newer).unwrap();
        store.insert_data_point(&sample_point("ETH", "a")).unwrap();

        let points = store.latest_data_points(Category::Crypto, 100).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].symbol, "BTC");
        assert_eq!(points[0].value, 200.0);
    }

    #[test]
    fn insert_news_ignores_duplicate_url() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut item = NewsItem {
            id: 0,
            title: "Title".to_string(),
            source: "src".to_string(),
            url: "https://example.com/a".to_string(),
            summary: "s".to_string(),
            category: Category::News,
            published_at: Some(Utc::now()),
            ingested_at: Utc::now(),
            score: 10.0,
            region: String::new(),
            country: String::new(),
        };
        store.insert_news(&item).unwrap();
        item.title = "Different title".to_string();
        store.insert_news(&item).unwrap();

        let news = store.all_latest_news(100).unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "Title");
    }

    #[test]
    fn source_status_resets_error_count_on_success() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_source_status("src-a", SourceKind::Rest, Some("boom"))
            .unwrap();
        store
            .upsert_source_status("src-a", SourceKind::Rest, Some("boom again"))
            .unwrap();
        let rows = store.source_statuses().unwrap();
        assert_eq!(rows[0].error_count, 2);

        store.upsert_source_status("src-a", SourceKind::Rest, None).unwrap();
        let rows = store.source_statuses().unwrap();
        assert_eq!(rows[0].error_count, 0);
        assert!(rows[0].last_error.is_none());
    }

    #[test]
    fn prune_older_than_deletes_stale_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut old = sample_point("BTC", "a");
        old.ingested_at = Utc::now() - chrono::Duration::seconds(3600);
        store.insert_data_point(&old).unwrap();
        store.insert_data_point(&sample_point("ETH", "a")).unwrap();

        store.prune_older_than(1800).unwrap();
        assert_eq!(store.count_entries().unwrap(), 1);
    }
}
