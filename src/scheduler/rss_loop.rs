// =============================================================================
// RSS loop (spec §4.4)
// =============================================================================
//
// A single dedicated task, independent of the REST worker pool — serialized
// deliberately per spec's own rationale (lower volume, CPU-light parser).
// Feed parsing via `feed_rs`, matching the corpus's
// `other_examples/.../bitvia-news.rs.rs` use of the same crate for RSS.
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::models::{Category, NewsItem, SourceKind};

use super::{interruptible_sleep, Scheduler};

const RSS_TICK: Duration = Duration::from_secs(5);
const MAX_ITEMS_PER_SOURCE: usize = 64;

pub async fn run(scheduler: Arc<Scheduler>) {
    loop {
        if scheduler.cancel.is_cancelled() {
            return;
        }

        let force = scheduler.force_refresh.load(Ordering::Acquire);
        let mut any_fetched = false;

        for src in scheduler.config.rss_sources.clone() {
            if scheduler.cancel.is_cancelled() {
                return;
            }

            let now = Instant::now();
            let eligible = {
                let mut health = scheduler.rss_health.lock();
                let h = health.entry(src.name.clone()).or_default();
                let interval = Duration::from_secs(src.refresh_interval_sec);
                !h.skipped(force, now) && h.due(interval, force, now)
            };
            if !eligible {
                continue;
            }

            let outcome = fetch_and_parse(&scheduler, &src).await;
            let now = Instant::now();
            let mut health = scheduler.rss_health.lock();
            let h = health.entry(src.name.clone()).or_default();

            match outcome {
                Ok(items) => {
                    h.record_success(now);
                    let _ = scheduler
                        .store
                        .upsert_source_status(&src.name, SourceKind::Rss, None);
                    let mut count = 0;
                    for mut item in items.into_iter().take(MAX_ITEMS_PER_SOURCE) {
                        item.truncate_summary();
                        if item.is_valid() {
                            if let Err(e) = scheduler.store.insert_news(&item) {
                                warn!(source = %src.name, error = %e, "storage error inserting rss item");
                            }
                            count += 1;
                        }
                    }
                    debug!(source = %src.name, count, "rss source processed");
                    any_fetched = true;
                }
                Err(e) => {
                    if e.counts_as_failure() {
                        h.record_failure(now);
                    }
                    let _ = scheduler.store.upsert_source_status(
                        &src.name,
                        SourceKind::Rss,
                        Some(&e.to_string()),
                    );
                    warn!(source = %src.name, error = %e, "rss fetch failed");
                }
            }
        }

        if any_fetched {
            if let Err(e) = scheduler.rebuild_snapshot() {
                warn!(error = %e, "snapshot rebuild failed after rss tick");
            }
        }

        scheduler.force_refresh.store(false, Ordering::Release);

        if interruptible_sleep(&scheduler.cancel, RSS_TICK).await {
            return;
        }
    }
}

async fn fetch_and_parse(
    scheduler: &Scheduler,
    src: &crate::config::RssSourceConfig,
) -> Result<Vec<NewsItem>, crate::error::CoreError> {
    let resp = scheduler.http.get(&src.url).send().await?;
    if !resp.status().is_success() {
        return Err(crate::error::CoreError::Transport(format!(
            "http status {}",
            resp.status()
        )));
    }
    let bytes = resp.bytes().await?;
    let feed = feed_rs::parser::parse(&bytes[..])
        .map_err(|e| crate::error::CoreError::Parse(e.to_string()))?;

    let now = chrono::Utc::now();
    let base_score = src.base_score();
    let items: Vec<NewsItem> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            if title.is_empty() || url.is_empty() {
                return None;
            }
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            Some(NewsItem {
                id: 0,
                title,
                source: src.name.clone(),
                url,
                summary,
                category: if src.category == Category::News || src.category == Category::FinancialNews {
                    src.category
                } else {
                    Category::News
                },
                published_at: entry.published.or(entry.updated),
                ingested_at: now,
                score: base_score,
                region: src.region.clone(),
                country: src.country.clone(),
            })
        })
        .collect();

    if items.is_empty() {
        return Err(crate::error::CoreError::Parse(
            "feed decoded to zero entries".to_string(),
        ));
    }
    Ok(items)
}
