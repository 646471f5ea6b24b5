//! JSON-lines worker for the simulation engine
//!
//! Reads one request per line on stdin and writes every event as one JSON line
//! on stdout. Requests run concurrently; events of different ids interleave.

use anyhow::Result;
use log::{info, warn};
use portfolio_simulation::service::{Engine, EngineConfig, Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Engine settings taken from the environment
fn engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(chunk_size) = std::env::var("SIM_CHUNK_SIZE").ok().and_then(|v| v.parse().ok()) {
        config.chunk_size = chunk_size;
    }
    config
}

/// Error line for input that never became a request
///
/// `id` and `task` echo the input's `id` and `type` when they can be recovered.
fn rejection(line: &str, error: &serde_json::Error) -> String {
    let raw = serde_json::from_str::<serde_json::Value>(line).ok();
    let field = |key: &str| {
        raw.as_ref()
            .and_then(|v| v.get(key).cloned())
            .unwrap_or(serde_json::Value::Null)
    };
    serde_json::json!({
        "type": "error",
        "data": {
            "message": format!("invalid request: {}", error),
            "task": field("type"),
        },
        "id": field("id"),
    })
    .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let engine = Engine::new(engine_config());
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut forwarders = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("rejecting input line: {}", e);
                if out_tx.send(rejection(line, &e)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        info!("request {} ({:?})", request.id, request.kind);
        let mut handle = engine.submit(request);
        let out = out_tx.clone();
        forwarders.push(tokio::spawn(async move {
            while let Some(event) = handle.next_event().await {
                let line = encode(&event);
                if out.send(line).await.is_err() {
                    handle.cancel();
                    break;
                }
            }
        }));
    }

    // stdin closed: let running tasks finish and flush their events
    for forwarder in forwarders {
        if let Err(e) = forwarder.await {
            warn!("event forwarder failed: {}", e);
        }
    }
    drop(out_tx);
    writer.await??;
    Ok(())
}

fn encode(event: &Response) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        serde_json::json!({
            "type": "error",
            "data": { "message": format!("failed to encode event: {}", e), "task": null },
            "id": event.id,
        })
        .to_string()
    })
}
