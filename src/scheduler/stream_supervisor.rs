// =============================================================================
// Streaming supervisor (spec §4.5)
// =============================================================================
//
// One supervised task per streaming source, state machine
// connecting -> connected -> receiving -> closed. Grounded directly in the
// teacher's `market_data/trade_stream.rs` (`connect_async` + `StreamExt`
// read loop, reconnect on any error), generalized from one hardcoded
// Binance aggTrade stream to N configured sources, with the `{s,c/p,P,v}`
// field mapping from `original_source/backend/src/fetch_ws.c`.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::config::StreamSourceConfig;
use crate::models::{DataPoint, SourceKind};

use super::{interruptible_sleep, Scheduler};

pub async fn run(scheduler: Arc<Scheduler>, cfg: StreamSourceConfig) {
    loop {
        if scheduler.cancel.is_cancelled() {
            return;
        }

        debug!(source = %cfg.name, url = %cfg.url, "stream connecting");
        match connect_async(&cfg.url).await {
            Ok((ws_stream, _response)) => {
                let (mut write, mut read) = ws_stream.split();

                if let Some(payload) = &cfg.subscribe_message {
                    use futures_util::SinkExt;
                    if let Err(e) = write.send(Message::Text(payload.clone())).await {
                        warn!(source = %cfg.name, error = %e, "stream subscribe send failed");
                    }
                }

                debug!(source = %cfg.name, "stream receiving");
                loop {
                    tokio::select! {
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    handle_frame(&scheduler, &cfg, &text);
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!(source = %cfg.name, error = %e, "stream transport error");
                                    break;
                                }
                                None => {
                                    debug!(source = %cfg.name, "stream closed by peer");
                                    break;
                                }
                            }
                        }
                        _ = scheduler.cancel.cancelled() => return,
                    }
                }
            }
            Err(e) => {
                warn!(source = %cfg.name, error = %e, "stream connect failed");
            }
        }

        if interruptible_sleep(
            &scheduler.cancel,
            Duration::from_secs(cfg.reconnect_interval_sec),
        )
        .await
        {
            return;
        }
    }
}

fn handle_frame(scheduler: &Arc<Scheduler>, cfg: &StreamSourceConfig, text: &str) {
    let Ok(v) = serde_json::from_str::<Value>(text) else {
        return;
    };

    let symbol = v.get("s").and_then(Value::as_str).unwrap_or("").to_string();
    let value = v
        .get("c")
        .or_else(|| v.get("p"))
        .and_then(value_as_f64)
        .unwrap_or(f64::NAN);
    let change_pct = v.get("P").and_then(value_as_f64).unwrap_or(f64::NAN);
    let volume = v.get("v").and_then(value_as_f64).unwrap_or(f64::NAN);

    if symbol.is_empty() || value.is_nan() || value <= 0.0 {
        return;
    }

    let now = chrono::Utc::now();
    let point = DataPoint {
        id: 0,
        source_name: cfg.name.clone(),
        source_kind: SourceKind::Stream,
        category: cfg.category,
        symbol,
        display_name: String::new(),
        value,
        currency: "USDT".to_string(),
        change_pct,
        volume,
        timestamp: now,
        ingested_at: now,
    };

    if let Err(e) = scheduler.store.insert_data_point(&point) {
        warn!(source = %cfg.name, error = %e, "storage error inserting stream data point");
        return;
    }

    if let Err(e) = scheduler.rebuild_snapshot() {
        warn!(error = %e, "snapshot rebuild failed after stream data");
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}
