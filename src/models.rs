// =============================================================================
// Core record types — DataPoint and NewsItem
// =============================================================================
//
// These are the two uniform shapes every ingested source is normalized into.
// Both are append-only: DataPoint rows are superseded (never mutated) by a
// newer insert for the same (symbol, source_name); NewsItem rows are
// deduplicated by `url` at the store layer and never modified after insert.
// =============================================================================

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a record's source pulls or pushes data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Rest,
    Stream,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rss => write!(f, "rss"),
            Self::Rest => write!(f, "rest"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

impl SourceKind {
    pub fn as_db_code(self) -> i64 {
        match self {
            Self::Rss => 0,
            Self::Rest => 1,
            Self::Stream => 2,
        }
    }

    pub fn from_db_code(code: i64) -> Self {
        match code {
            0 => Self::Rss,
            2 => Self::Stream,
            _ => Self::Rest,
        }
    }
}

/// The closed set of categories a record may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Crypto,
    StockIndex,
    Commodity,
    Forex,
    News,
    Custom,
    CryptoExchange,
    FinancialNews,
    OfficialPub,
}

impl Category {
    /// Categories considered "data-bearing" for the snapshot builder (§4.6).
    pub const DATA_BEARING: [Category; 7] = [
        Category::Crypto,
        Category::StockIndex,
        Category::Commodity,
        Category::Forex,
        Category::News,
        Category::Custom,
        Category::CryptoExchange,
    ];

    pub fn as_db_code(self) -> i64 {
        match self {
            Self::Crypto => 0,
            Self::StockIndex => 1,
            Self::Commodity => 2,
            Self::Forex => 3,
            Self::News => 4,
            Self::Custom => 5,
            Self::CryptoExchange => 6,
            Self::FinancialNews => 7,
            Self::OfficialPub => 8,
        }
    }

    pub fn from_db_code(code: i64) -> Self {
        match code {
            1 => Self::StockIndex,
            2 => Self::Commodity,
            3 => Self::Forex,
            4 => Self::News,
            5 => Self::Custom,
            6 => Self::CryptoExchange,
            7 => Self::FinancialNews,
            8 => Self::OfficialPub,
            _ => Self::Crypto,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Crypto => "crypto",
            Self::StockIndex => "stock_index",
            Self::Commodity => "commodity",
            Self::Forex => "forex",
            Self::News => "news",
            Self::Custom => "custom",
            Self::CryptoExchange => "crypto_exchange",
            Self::FinancialNews => "financial_news",
            Self::OfficialPub => "official_pub",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "crypto" => Self::Crypto,
            "stock_index" => Self::StockIndex,
            "commodity" => Self::Commodity,
            "forex" => Self::Forex,
            "news" => Self::News,
            "custom" => Self::Custom,
            "crypto_exchange" => Self::CryptoExchange,
            "financial_news" => Self::FinancialNews,
            "official_pub" => Self::OfficialPub,
            _ => return Err(()),
        })
    }
}

/// One quoted instrument observation, normalized from any source kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub id: i64,
    pub source_name: String,
    pub source_kind: SourceKind,
    pub category: Category,
    pub symbol: String,
    pub display_name: String,
    pub value: f64,
    pub currency: String,
    pub change_pct: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl DataPoint {
    /// §3 invariant: symbol or display_name non-empty, value finite.
    pub fn is_valid(&self) -> bool {
        (!self.symbol.is_empty() || !self.display_name.is_empty()) && self.value.is_finite()
    }
}

/// Maximum bytes retained for a news summary before truncation (§9 Design Notes).
pub const MAX_SUMMARY_BYTES: usize = 4096;

/// One article/event record, deduplicated by `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub source: String,
    pub url: String,
    pub summary: String,
    pub category: Category,
    pub published_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    pub score: f64,
    pub region: String,
    pub country: String,
}

impl NewsItem {
    pub fn is_valid(&self) -> bool {
        !self.title.is_empty() && self.score >= 0.0
    }

    /// Truncate `summary` to [`MAX_SUMMARY_BYTES`] on a char boundary.
    /// Content fields may be truncated (§9); keys like `url` never are.
    pub fn truncate_summary(&mut self) {
        if self.summary.len() <= MAX_SUMMARY_BYTES {
            return;
        }
        let mut end = MAX_SUMMARY_BYTES;
        while !self.summary.is_char_boundary(end) {
            end -= 1;
        }
        self.summary.truncate(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_db_code() {
        for cat in Category::DATA_BEARING {
            assert_eq!(Category::from_db_code(cat.as_db_code()), cat);
        }
        assert_eq!(
            Category::from_db_code(Category::FinancialNews.as_db_code()),
            Category::FinancialNews
        );
    }

    #[test]
    fn data_point_invalid_when_nan_value() {
        let dp = DataPoint {
            id: 0,
            source_name: "x".into(),
            source_kind: SourceKind::Rest,
            category: Category::Crypto,
            symbol: "BTC".into(),
            display_name: String::new(),
            value: f64::NAN,
            currency: "USD".into(),
            change_pct: f64::NAN,
            volume: f64::NAN,
            timestamp: Utc::now(),
            ingested_at: Utc::now(),
        };
        assert!(!dp.is_valid());
    }

    #[test]
    fn news_item_truncates_long_summary() {
        let mut item = NewsItem {
            id: 0,
            title: "t".into(),
            source: "s".into(),
            url: "u".into(),
            summary: "x".repeat(MAX_SUMMARY_BYTES + 100),
            category: Category::News,
            published_at: None,
            ingested_at: Utc::now(),
            score: 1.0,
            region: String::new(),
            country: String::new(),
        };
        item.truncate_summary();
        assert_eq!(item.summary.len(), MAX_SUMMARY_BYTES);
    }
}
