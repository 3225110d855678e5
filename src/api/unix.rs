// =============================================================================
// Local-socket API (spec §6)
// =============================================================================
//
// Length-delimited JSON over a Unix domain socket, mirroring
// `original_source/backend/src/api_unix.c`'s `handle_client`: accept, read
// one request with a deadline, dispatch by `path`, write one JSON response
// followed by a newline, close. Stale socket file unlinked before bind.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::scheduler::Scheduler;

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Debug, Deserialize)]
struct Request {
    path: String,
}

pub async fn serve(scheduler: Arc<Scheduler>, socket_path: &str) -> std::io::Result<()> {
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    debug!(path = socket_path, "unix socket listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(scheduler, stream).await {
                        warn!(error = %e, "unix client error");
                    }
                });
            }
            _ = scheduler.cancel.cancelled() => {
                let _ = std::fs::remove_file(socket_path);
                return Ok(());
            }
        }
    }
}

async fn handle_client(scheduler: Arc<Scheduler>, mut stream: UnixStream) -> std::io::Result<()> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let n = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "read timeout"))??;

    let response = match serde_json::from_slice::<Request>(&buf[..n]) {
        Ok(req) => dispatch(&scheduler, &req.path),
        Err(_) => json!({ "error": "bad_request" }),
    };

    let mut body = serde_json::to_vec(&response)?;
    body.push(b'\n');
    stream.write_all(&body).await?;
    Ok(())
}

fn dispatch(scheduler: &Scheduler, path: &str) -> Value {
    match path {
        "/api/v1/entries" => {
            let snapshot = scheduler.snapshot.read();
            json!({ "data": snapshot.entries, "count": snapshot.entries.len() })
        }
        "/api/v1/news" => {
            let snapshot = scheduler.snapshot.read();
            json!({ "data": snapshot.news, "count": snapshot.news.len() })
        }
        "/api/v1/status" => {
            let snapshot = scheduler.snapshot.read();
            json!({
                "status": "ok",
                "entry_count": snapshot.entries.len(),
                "news_count": snapshot.news.len(),
            })
        }
        "/api/v1/refresh" => {
            scheduler.trigger_refresh();
            json!({ "ok": true })
        }
        _ => json!({ "error": "not_found" }),
    }
}
