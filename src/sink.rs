//! JSONL Sink
//!
//! Consumes a stream of serializable records and appends one JSON object per
//! line to a file, each with an injected `received_at` (ms since epoch).
//!
//! Stamping happens on the consumer side, before the line is queued, so the
//! timestamp is taken as close to receipt as possible. Disk IO is done by:
//! - a writer task draining the line channel into a 32KB buffered writer
//! - a flush task flushing that writer once per second
//!
//! Both share the writer behind one mutex. Each line is written together with
//! its newline, so a flush never leaves half a line behind.
//!
//! Created: 2026-02-05

use crate::config::{SINK_BUFFER_BYTES, SINK_CHANNEL_CAPACITY, SINK_FLUSH_INTERVAL};
use anyhow::{Context, Result};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

/// Injected receipt timestamp field
pub const RECEIVED_AT: &str = "received_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub records: u64,
    pub skipped: u64,
}

/// Serialize a record and inject `received_at`.
/// Non-object records are wrapped as `{"value": ...}`.
pub fn stamp<T: Serialize>(record: &T, received_at: i64) -> serde_json::Result<String> {
    let mut map = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    map.insert(RECEIVED_AT.to_string(), json!(received_at));
    serde_json::to_string(&Value::Object(map))
}

/// Record `input` into `path` (append, create) until the stream ends.
/// Returns after the last line is flushed and synced.
pub async fn run<S, T>(input: S, path: impl AsRef<Path>) -> Result<SinkStats>
where
    S: Stream<Item = T>,
    T: Serialize,
{
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open output file: {:?}", path))?;
    info!("Recording to {:?}", path);

    let writer = Arc::new(Mutex::new(BufWriter::with_capacity(SINK_BUFFER_BYTES, file)));
    let (line_tx, line_rx) = mpsc::channel::<String>(SINK_CHANNEL_CAPACITY);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let write_task = tokio::spawn(write_lines(writer.clone(), line_rx));
    let flush_task = tokio::spawn(flush_periodically(writer.clone(), stop_rx));

    let mut stats = SinkStats::default();
    let mut input = Box::pin(input);
    while let Some(record) = input.next().await {
        match stamp(&record, Utc::now().timestamp_millis()) {
            Ok(mut line) => {
                line.push('\n');
                if line_tx.send(line).await.is_err() {
                    warn!("Sink writer stopped early");
                    break;
                }
                stats.records += 1;
            }
            Err(e) => {
                warn!("Record skipped, serialization failed: {}", e);
                stats.skipped += 1;
            }
        }
    }

    // drain, stop the ticker, final flush
    drop(line_tx);
    let written = write_task.await.context("Sink writer task panicked")?;
    let _ = stop_tx.send(());
    let _ = flush_task.await;

    let mut w = writer.lock().await;
    w.flush().await.context("Final flush failed")?;
    w.get_ref().sync_all().await.context("Output sync failed")?;
    written.context("Output write failed")?;

    info!(
        "Recorded {} lines to {:?} ({} skipped)",
        stats.records, path, stats.skipped
    );
    Ok(stats)
}

async fn write_lines(
    writer: Arc<Mutex<BufWriter<File>>>,
    mut lines: mpsc::Receiver<String>,
) -> std::io::Result<()> {
    while let Some(line) = lines.recv().await {
        writer.lock().await.write_all(line.as_bytes()).await?;
    }
    Ok(())
}

async fn flush_periodically(writer: Arc<Mutex<BufWriter<File>>>, mut stop: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(SINK_FLUSH_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                if let Err(e) = writer.lock().await.flush().await {
                    warn!("Periodic flush failed: {}", e);
                }
            }
        }
    }
}
