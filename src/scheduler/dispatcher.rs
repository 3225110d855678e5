// =============================================================================
// Worker pool and dispatcher (spec §4.3)
// =============================================================================
//
// The original's queue-mutex/jobs-ready-condvar plus done-mutex/batch-done-
// condvar pair (§9 Design Notes) is realized with `parking_lot::Mutex` guarding
// plain claim state and `tokio::sync::Notify` standing in for the two
// condition variables, since `Notify` is the async-aware primitive the
// teacher's own stack reaches for wherever a condvar would block a thread.
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::models::Category;
use crate::rest_mapping;

use super::Scheduler;

const DISPATCH_TICK: Duration = Duration::from_secs(5);
const BATCH_POLL: Duration = Duration::from_secs(3);

struct JobQueue {
    indices: Mutex<Vec<usize>>,
    next_claim: AtomicUsize,
    jobs_ready: Notify,
}

struct BatchDone {
    pending: AtomicUsize,
    notify: Notify,
}

pub async fn run(scheduler: Arc<Scheduler>) {
    let worker_count = scheduler.config.rest_sources.len().min(8);
    let queue = Arc::new(JobQueue {
        indices: Mutex::new(Vec::new()),
        next_claim: AtomicUsize::new(0),
        jobs_ready: Notify::new(),
    });
    let done = Arc::new(BatchDone {
        pending: AtomicUsize::new(0),
        notify: Notify::new(),
    });

    let mut workers = Vec::new();
    for _ in 0..worker_count {
        workers.push(tokio::spawn(worker_loop(
            Arc::clone(&scheduler),
            Arc::clone(&queue),
            Arc::clone(&done),
        )));
    }

    loop {
        if scheduler.cancel.is_cancelled() {
            break;
        }

        let force = scheduler.force_refresh.load(Ordering::Acquire);
        let batch: Vec<usize> = {
            let mut health = scheduler.rest_health.lock();
            let now = Instant::now();
            scheduler
                .config
                .rest_sources
                .iter()
                .enumerate()
                .filter(|(_, src)| {
                    let h = health.entry(src.name.clone()).or_default();
                    let interval = Duration::from_secs(src.refresh_interval_sec);
                    !h.skipped(force, now) && h.due(interval, force, now)
                })
                .map(|(i, _)| i)
                .collect()
        };
        let batch_size = batch.len();

        *queue.indices.lock() = batch;
        queue.next_claim.store(0, Ordering::Release);
        done.pending.store(batch_size, Ordering::Release);

        if batch_size > 0 {
            queue.jobs_ready.notify_waiters();

            loop {
                if done.pending.load(Ordering::Acquire) == 0 {
                    break;
                }
                tokio::select! {
                    _ = done.notify.notified() => {}
                    _ = tokio::time::sleep(BATCH_POLL) => {}
                    _ = scheduler.cancel.cancelled() => break,
                }
                if scheduler.cancel.is_cancelled() {
                    break;
                }
            }

            if let Err(e) = scheduler.rebuild_snapshot() {
                warn!(error = %e, "snapshot rebuild failed after dispatch batch");
            }
        }

        scheduler.force_refresh.store(false, Ordering::Release);

        tokio::select! {
            _ = tokio::time::sleep(DISPATCH_TICK) => {}
            _ = scheduler.cancel.cancelled() => break,
            _ = scheduler.refresh_notify.notified() => {}
        }
    }

    queue.jobs_ready.notify_waiters();
    done.notify.notify_waiters();
    for w in workers {
        let _ = w.await;
    }
}

async fn worker_loop(scheduler: Arc<Scheduler>, queue: Arc<JobQueue>, done: Arc<BatchDone>) {
    loop {
        let idx = loop {
            let count = queue.indices.lock().len();
            let claim = queue.next_claim.load(Ordering::Acquire);
            if claim < count {
                let claimed = queue.next_claim.fetch_add(1, Ordering::AcqRel);
                if claimed < count {
                    break Some(claimed);
                }
                continue;
            }
            if scheduler.cancel.is_cancelled() {
                break None;
            }
            tokio::select! {
                _ = queue.jobs_ready.notified() => {}
                _ = scheduler.cancel.cancelled() => {}
            }
            if scheduler.cancel.is_cancelled() {
                break None;
            }
        };

        let Some(idx) = idx else { return };
        let source_index = {
            let indices = queue.indices.lock();
            match indices.get(idx).copied() {
                Some(i) => i,
                None => continue,
            }
        };

        process_source(&scheduler, source_index).await;

        if done.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            done.notify.notify_waiters();
        }
    }
}

async fn process_source(scheduler: &Arc<Scheduler>, source_index: usize) {
    let Some(cfg) = scheduler.config.rest_sources.get(source_index).cloned() else {
        return;
    };

    let result = fetch_body(scheduler, &cfg).await;

    let outcome = match result {
        Ok(body) => {
            if cfg.category == Category::FinancialNews {
                match rest_mapping::map_response_news(&cfg, &body) {
                    Ok(items) => {
                        let mut count = 0;
                        for item in items {
                            if item.is_valid() {
                                if let Err(e) = scheduler.store.insert_news(&item) {
                                    warn!(source = %cfg.name, error = %e, "storage error inserting news");
                                }
                                count += 1;
                            }
                        }
                        debug!(source = %cfg.name, count, "rest calendar source processed");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            } else {
                match rest_mapping::map_response(&cfg, &body) {
                    Ok(points) => {
                        let mut count = 0;
                        for point in points {
                            if point.is_valid() {
                                if let Err(e) = scheduler.store.insert_data_point(&point) {
                                    warn!(source = %cfg.name, error = %e, "storage error inserting data point");
                                }
                                count += 1;
                            }
                        }
                        debug!(source = %cfg.name, count, "rest source processed");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        }
        Err(e) => Err(e),
    };

    let now = Instant::now();
    let mut health = scheduler.rest_health.lock();
    let h = health.entry(cfg.name.clone()).or_default();

    match &outcome {
        Ok(()) => {
            h.record_success(now);
            let _ = scheduler
                .store
                .upsert_source_status(&cfg.name, crate::models::SourceKind::Rest, None);
        }
        Err(e) => {
            if e.counts_as_failure() {
                h.record_failure(now);
            } else {
                // parse errors advance last_attempt only; a successful probe
                // that legitimately decoded zero records is not "down".
            }
            let _ = scheduler.store.upsert_source_status(
                &cfg.name,
                crate::models::SourceKind::Rest,
                Some(&e.to_string()),
            );
            warn!(source = %cfg.name, error = %e, "rest source fetch failed");
        }
    }
}

async fn fetch_body(
    scheduler: &Scheduler,
    cfg: &crate::config::RestSourceConfig,
) -> Result<String, crate::error::CoreError> {
    let mut builder = match cfg.method.as_str() {
        "POST" => scheduler.http.post(cfg.url()).body(cfg.post_body.clone()),
        _ => scheduler.http.get(cfg.url()),
    };
    if !cfg.api_key_header.is_empty() && !cfg.api_key.is_empty() {
        builder = builder.header(cfg.api_key_header.as_str(), cfg.api_key.as_str());
    }
    let resp = builder.send().await?;
    if !resp.status().is_success() {
        return Err(crate::error::CoreError::Transport(format!(
            "http status {}",
            resp.status()
        )));
    }
    Ok(resp.text().await?)
}
