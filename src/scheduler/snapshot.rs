// =============================================================================
// Snapshot builder (spec §4.6)
// =============================================================================

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::CoreError;
use crate::models::{Category, DataPoint, NewsItem};
use crate::store::Store;

pub const MAX_ENTRIES: usize = 2048;
pub const MAX_NEWS: usize = 2048;
const THROTTLE_SECONDS: i64 = 5;

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub entries: Vec<DataPoint>,
    pub news: Vec<NewsItem>,
}

/// Step-function age decay applied to a NewsItem's base score.
fn decay(published_at: Option<chrono::DateTime<Utc>>) -> f64 {
    let Some(published_at) = published_at else {
        return 0.10;
    };
    let age = Utc::now().signed_duration_since(published_at);
    if age < chrono::Duration::hours(1) {
        1.00
    } else if age < chrono::Duration::hours(3) {
        0.85
    } else if age < chrono::Duration::hours(6) {
        0.65
    } else if age < chrono::Duration::hours(12) {
        0.45
    } else if age < chrono::Duration::hours(24) {
        0.25
    } else {
        0.10
    }
}

/// Wall-clock throttle guarding snapshot rebuilds; shared across all
/// trigger paths (dispatcher tick, RSS tick, streaming on-data callback,
/// prune loop).
pub struct SnapshotThrottle {
    last_rebuild_epoch_ms: AtomicI64,
}

impl Default for SnapshotThrottle {
    fn default() -> Self {
        Self {
            last_rebuild_epoch_ms: AtomicI64::new(0),
        }
    }
}

impl SnapshotThrottle {
    /// Returns true if a rebuild should proceed now, atomically claiming the slot.
    pub fn try_claim(&self) -> bool {
        let now_ms = Utc::now().timestamp_millis();
        let prev = self.last_rebuild_epoch_ms.load(Ordering::Acquire);
        if now_ms - prev < THROTTLE_SECONDS * 1000 {
            return false;
        }
        self.last_rebuild_epoch_ms
            .compare_exchange(prev, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Rebuild the snapshot from the store without holding any lock, then swap
/// it into `target` under its writer lock. Returns `Ok(false)` if the
/// throttle suppressed the rebuild.
pub fn rebuild_snapshot(
    store: &dyn Store,
    throttle: &SnapshotThrottle,
    target: &RwLock<Snapshot>,
) -> Result<bool, CoreError> {
    if !throttle.try_claim() {
        return Ok(false);
    }

    let mut entries = Vec::with_capacity(MAX_ENTRIES);
    for category in Category::DATA_BEARING {
        if entries.len() >= MAX_ENTRIES {
            break;
        }
        let remaining = MAX_ENTRIES - entries.len();
        entries.extend(store.latest_data_points(category, remaining)?);
    }

    let mut news = store.all_latest_news(MAX_NEWS)?;
    let mut scored: Vec<(f64, NewsItem)> = news
        .drain(..)
        .map(|item| {
            let final_score = item.score * decay(item.published_at);
            (final_score, item)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.published_at.cmp(&a.1.published_at))
            .then_with(|| b.1.id.cmp(&a.1.id))
    });
    let news: Vec<NewsItem> = scored.into_iter().map(|(_, item)| item).collect();

    let mut guard = target.write();
    guard.entries = entries;
    guard.news = news;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_table_matches_spec_boundaries() {
        let now = Utc::now();
        assert_eq!(decay(Some(now - chrono::Duration::minutes(30))), 1.00);
        assert_eq!(decay(Some(now - chrono::Duration::hours(2))), 0.85);
        assert_eq!(decay(Some(now - chrono::Duration::hours(5))), 0.65);
        assert_eq!(decay(Some(now - chrono::Duration::hours(10))), 0.45);
        assert_eq!(decay(Some(now - chrono::Duration::hours(20))), 0.25);
        assert_eq!(decay(Some(now - chrono::Duration::hours(48))), 0.10);
        assert_eq!(decay(None), 0.10);
    }

    #[test]
    fn throttle_blocks_second_call_within_window() {
        let throttle = SnapshotThrottle::default();
        assert!(throttle.try_claim());
        assert!(!throttle.try_claim());
    }

    #[test]
    fn news_ranking_orders_by_final_score_then_recency_then_id() {
        let now = Utc::now();
        let mk = |id, score, age_min| NewsItem {
            id,
            title: "t".into(),
            source: "s".into(),
            url: format!("u{id}"),
            summary: String::new(),
            category: Category::News,
            published_at: Some(now - chrono::Duration::minutes(age_min)),
            ingested_at: now,
            score,
            region: String::new(),
            country: String::new(),
        };
        let a = mk(1, 100.0, 30);
        let b = mk(2, 100.0, 240);
        let c = mk(3, 50.0, 30);
        let mut scored: Vec<(f64, NewsItem)> = vec![a, b, c]
            .into_iter()
            .map(|item| (item.score * decay(item.published_at), item))
            .collect();
        scored.sort_by(|x, y| {
            y.0.partial_cmp(&x.0)
                .unwrap()
                .then_with(|| y.1.published_at.cmp(&x.1.published_at))
                .then_with(|| y.1.id.cmp(&x.1.id))
        });
        // Final scores: a=100*1.00=100, b=100*0.65=65, c=50*1.00=50 — strictly
        // descending by final score places b ahead of c.
        let order: Vec<i64> = scored.iter().map(|(_, item)| item.id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
