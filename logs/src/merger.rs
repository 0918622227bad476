//! C6: low-watermark k-way merge of per-container log streams (§4.6).
//!
//! Scheduling model mirrors the teacher's `subscribe_to_updates` shape
//! (`client/core/rs/src/ws/update.rs`): a `tokio::spawn`'d task per
//! concurrent activity, a `CancellationToken` the caller holds to tear it
//! all down, and a channel handed back to the caller as the public
//! interface. Here there are N reader tasks (one per input), one
//! processor task owning the heap and watermark exclusively, and one
//! ticker task when stall detection is enabled.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use cluster_client::{LogEntry, LogMetadata, LogPayload, LogStreamKind, Timestamp};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::MergeError;

/// Depth of each stream's flow-control semaphore (§4.6 "Flow control").
pub const DEFAULT_MAX_IN_FLIGHT_PER_STREAM: usize = 100;

#[derive(Debug, Clone)]
pub struct MergeOptions {
  pub max_in_flight_per_stream: usize,
  /// `None` disables stall detection entirely (§4.6 "Stall detection
  /// (optional)").
  pub stall_timeout: Option<Duration>,
  pub stall_check_interval: Duration,
}

impl Default for MergeOptions {
  fn default() -> Self {
    MergeOptions {
      max_in_flight_per_stream: DEFAULT_MAX_IN_FLIGHT_PER_STREAM,
      stall_timeout: None,
      stall_check_interval: Duration::from_secs(5),
    }
  }
}

/// One input to the merger: the metadata a caller already knows about the
/// container before its first log line arrives (needed to label a
/// synthetic stall entry even if the stream has been silent since open),
/// plus the raw per-container channel.
pub struct LogSource {
  pub metadata: LogMetadata,
  pub receiver: mpsc::Receiver<LogEntry>,
}

pub struct LogMerger {
  sources: Vec<LogSource>,
  opts: MergeOptions,
}

impl LogMerger {
  pub fn new(
    sources: Vec<LogSource>,
    opts: MergeOptions,
  ) -> Result<Self, MergeError> {
    if sources.is_empty() {
      return Err(MergeError::NoStreams);
    }
    Ok(LogMerger { sources, opts })
  }

  /// `LogMerger(streams, opts).Stream()` (§6): spawns the reader/processor/
  /// ticker tasks and returns the merged output channel. Dropping `cancel`
  /// (calling `.cancel()` on it) terminates every task promptly at its
  /// next suspension point (§5 "Cancellation").
  pub fn stream(self, cancel: CancellationToken) -> mpsc::Receiver<LogEntry> {
    let n = self.sources.len();
    let (fan_in_tx, fan_in_rx) = mpsc::unbounded_channel::<ReaderEvent>();
    let (out_tx, out_rx) = mpsc::channel::<LogEntry>(n * self.opts.max_in_flight_per_stream);

    let mut metadata = Vec::with_capacity(n);
    for (stream, source) in self.sources.into_iter().enumerate() {
      metadata.push(source.metadata);
      let semaphore = Arc::new(Semaphore::new(self.opts.max_in_flight_per_stream));
      tokio::spawn(read_stream(
        stream,
        source.receiver,
        semaphore,
        fan_in_tx.clone(),
        cancel.clone(),
      ));
    }
    drop(fan_in_tx);

    tokio::spawn(process(
      fan_in_rx,
      out_tx,
      metadata,
      self.opts,
      cancel,
    ));

    out_rx
  }
}

enum ReaderEvent {
  Data { stream: usize, entry: LogEntry, permit: Option<OwnedSemaphorePermit> },
  Closed { stream: usize },
}

async fn read_stream(
  stream: usize,
  mut rx: mpsc::Receiver<LogEntry>,
  semaphore: Arc<Semaphore>,
  fan_in: mpsc::UnboundedSender<ReaderEvent>,
  cancel: CancellationToken,
) {
  loop {
    tokio::select! {
      _ = cancel.cancelled() => return,
      received = rx.recv() => {
        let Some(entry) = received else {
          let _ = fan_in.send(ReaderEvent::Closed { stream });
          return;
        };
        // Every entry passes through the gate, even heartbeats/errors,
        // so a stalled fast stream still throttles on its own backlog;
        // non-buffered kinds just release it straight back (§4.6).
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
          return;
        };
        let holds_permit = !entry.is_heartbeat() && !entry.is_error();
        let permit = if holds_permit {
          Some(permit)
        } else {
          drop(permit);
          None
        };
        if fan_in.send(ReaderEvent::Data { stream, entry, permit }).is_err() {
          return;
        }
      }
    }
  }
}

struct StreamState {
  last_seen: Option<Timestamp>,
  /// Clamps the heap key to be non-decreasing within this stream, so an
  /// out-of-order timestamp from one container never reorders relative to
  /// that same container's earlier lines (§4.6 "Single-stream case").
  effective_clock: Timestamp,
  closed: bool,
  stalled: bool,
  last_activity: Instant,
}

impl StreamState {
  fn new() -> Self {
    StreamState {
      last_seen: None,
      effective_clock: Timestamp::MIN,
      closed: false,
      stalled: false,
      last_activity: Instant::now(),
    }
  }

  fn active(&self) -> bool {
    !self.closed && !self.stalled
  }
}

struct HeapEntry {
  key: (Timestamp, u64),
  entry: LogEntry,
  permit: Option<OwnedSemaphorePermit>,
}

impl PartialEq for HeapEntry {
  fn eq(&self, other: &Self) -> bool {
    self.key == other.key
  }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for HeapEntry {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.key.cmp(&other.key)
  }
}

async fn process(
  mut fan_in: mpsc::UnboundedReceiver<ReaderEvent>,
  out: mpsc::Sender<LogEntry>,
  metadata: Vec<LogMetadata>,
  opts: MergeOptions,
  cancel: CancellationToken,
) {
  let mut states: Vec<StreamState> = (0..metadata.len()).map(|_| StreamState::new()).collect();
  let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
  let mut seq: u64 = 0;
  let mut ticker = opts.stall_timeout.map(|_| tokio::time::interval(opts.stall_check_interval));

  loop {
    let tick = async {
      match ticker.as_mut() {
        Some(t) => {
          t.tick().await;
        }
        None => std::future::pending().await,
      }
    };

    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tick => {
        if let Some(timeout) = opts.stall_timeout {
          mark_stalls(&mut states, &metadata, timeout, &out).await;
          drain_below_watermark(&states, &mut heap, &out).await;
        }
      }
      event = fan_in.recv() => {
        match event {
          None => break,
          Some(ReaderEvent::Closed { stream }) => {
            states[stream].closed = true;
            debug!(stream, "log stream closed");
          }
          Some(ReaderEvent::Data { stream, entry, permit }) => {
            let state = &mut states[stream];
            state.last_activity = Instant::now();
            if state.stalled {
              state.stalled = false;
              debug!(stream, "log stream un-stalled");
            }
            state.last_seen = Some(match state.last_seen {
              Some(prev) => prev.max(entry.timestamp),
              None => entry.timestamp,
            });

            if entry.is_error() {
              let _ = out.send(entry).await;
            } else if entry.is_heartbeat() {
              // Dropped after advancing `last_seen` above (§4.6).
            } else {
              seq += 1;
              let effective = entry.timestamp.max(state.effective_clock);
              state.effective_clock = effective;
              heap.push(Reverse(HeapEntry { key: (effective, seq), entry, permit }));
            }
          }
        }
        drain_below_watermark(&states, &mut heap, &out).await;
      }
    }

    if states.iter().all(|s| s.closed) {
      flush_all(&mut heap, &out).await;
      break;
    }
  }
}

/// An active stream that hasn't emitted anything yet blocks the watermark
/// entirely rather than being skipped: it could still produce a line
/// timestamped earlier than anything seen so far, so nothing downstream of
/// it is safe to flush (§4.6).
fn watermark(states: &[StreamState]) -> Option<Timestamp> {
  let mut min: Option<Timestamp> = None;
  for s in states.iter().filter(|s| s.active()) {
    let last_seen = s.last_seen?;
    min = Some(min.map_or(last_seen, |m| m.min(last_seen)));
  }
  min
}

async fn drain_below_watermark(
  states: &[StreamState],
  heap: &mut BinaryHeap<Reverse<HeapEntry>>,
  out: &mpsc::Sender<LogEntry>,
) {
  let Some(wm) = watermark(states) else { return };
  while let Some(Reverse(top)) = heap.peek() {
    if top.key.0 >= wm {
      break;
    }
    let Reverse(top) = heap.pop().expect("peeked above");
    drop(top.permit);
    let _ = out.send(top.entry).await;
  }
}

async fn flush_all(heap: &mut BinaryHeap<Reverse<HeapEntry>>, out: &mpsc::Sender<LogEntry>) {
  let mut remaining: Vec<HeapEntry> = std::mem::take(heap).into_iter().map(|Reverse(e)| e).collect();
  remaining.sort_by_key(|e| e.key);
  for entry in remaining {
    drop(entry.permit);
    let _ = out.send(entry.entry).await;
  }
}

async fn mark_stalls(
  states: &mut [StreamState],
  metadata: &[LogMetadata],
  timeout: Duration,
  out: &mpsc::Sender<LogEntry>,
) {
  for (i, state) in states.iter_mut().enumerate() {
    if state.closed || state.stalled {
      continue;
    }
    if state.last_activity.elapsed() > timeout {
      state.stalled = true;
      warn!(stream = i, "log stream stalled, excluding from watermark");
      let synthetic = LogEntry {
        metadata: metadata[i].clone(),
        stream: LogStreamKind::Stderr,
        timestamp: now_millis(),
        payload: LogPayload::Error("log stream stalled".to_string()),
      };
      let _ = out.send(synthetic).await;
    }
  }
}

fn now_millis() -> Timestamp {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as Timestamp)
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use cluster_client::LogStreamKind;

  fn metadata(container_id: &str) -> LogMetadata {
    LogMetadata {
      service_id: "svc1".to_string(),
      service_name: "web".to_string(),
      container_id: container_id.to_string(),
      machine_id: "m1".to_string(),
    }
  }

  fn entry(container_id: &str, ts: Timestamp, msg: &str) -> LogEntry {
    LogEntry {
      metadata: metadata(container_id),
      stream: LogStreamKind::Stdout,
      timestamp: ts,
      payload: LogPayload::Message(msg.to_string()),
    }
  }

  #[tokio::test]
  async fn merges_two_streams_in_timestamp_order() {
    let (tx_a, rx_a) = mpsc::channel(16);
    let (tx_b, rx_b) = mpsc::channel(16);
    let merger = LogMerger::new(
      vec![
        LogSource { metadata: metadata("a"), receiver: rx_a },
        LogSource { metadata: metadata("b"), receiver: rx_b },
      ],
      MergeOptions::default(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let mut out = merger.stream(cancel.clone());

    tx_a.send(entry("a", 10, "a1")).await.unwrap();
    tx_b.send(entry("b", 5, "b1")).await.unwrap();
    drop(tx_a);
    drop(tx_b);

    let mut messages = Vec::new();
    while let Some(e) = out.recv().await {
      if let LogPayload::Message(m) = e.payload {
        messages.push(m);
      }
    }
    assert_eq!(messages, vec!["b1", "a1"]);
  }

  #[tokio::test]
  async fn error_entries_bypass_the_heap() {
    let (tx_a, rx_a) = mpsc::channel(16);
    let merger = LogMerger::new(
      vec![LogSource { metadata: metadata("a"), receiver: rx_a }],
      MergeOptions::default(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let mut out = merger.stream(cancel.clone());

    let mut err_entry = entry("a", 100, "unused");
    err_entry.payload = LogPayload::Error("boom".to_string());
    tx_a.send(err_entry).await.unwrap();
    drop(tx_a);

    let first = out.recv().await.unwrap();
    assert!(matches!(first.payload, LogPayload::Error(_)));
  }

  #[tokio::test]
  async fn heartbeats_are_dropped() {
    let (tx_a, rx_a) = mpsc::channel(16);
    let merger = LogMerger::new(
      vec![LogSource { metadata: metadata("a"), receiver: rx_a }],
      MergeOptions::default(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let mut out = merger.stream(cancel.clone());

    let mut heartbeat = entry("a", 1, "unused");
    heartbeat.stream = LogStreamKind::Heartbeat;
    heartbeat.payload = LogPayload::Message(String::new());
    tx_a.send(heartbeat).await.unwrap();
    tx_a.send(entry("a", 2, "line")).await.unwrap();
    drop(tx_a);

    let first = out.recv().await.unwrap();
    assert!(matches!(first.payload, LogPayload::Message(m) if m == "line"));
    assert!(out.recv().await.is_none());
  }

  #[tokio::test]
  async fn single_stream_out_of_order_timestamps_stay_in_arrival_order() {
    let (tx_a, rx_a) = mpsc::channel(16);
    let merger = LogMerger::new(
      vec![LogSource { metadata: metadata("a"), receiver: rx_a }],
      MergeOptions::default(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let mut out = merger.stream(cancel.clone());

    tx_a.send(entry("a", 100, "first")).await.unwrap();
    tx_a.send(entry("a", 50, "second")).await.unwrap();
    drop(tx_a);

    let mut messages = Vec::new();
    while let Some(e) = out.recv().await {
      if let LogPayload::Message(m) = e.payload {
        messages.push(m);
      }
    }
    assert_eq!(messages, vec!["first", "second"]);
  }

  #[tokio::test]
  async fn stall_emits_synthetic_error_then_unstalls() {
    let (tx_a, rx_a) = mpsc::channel(16);
    let (tx_b, rx_b) = mpsc::channel(16);
    let opts = MergeOptions {
      stall_timeout: Some(Duration::from_millis(50)),
      stall_check_interval: Duration::from_millis(10),
      ..Default::default()
    };
    let merger = LogMerger::new(
      vec![
        LogSource { metadata: metadata("a"), receiver: rx_a },
        LogSource { metadata: metadata("b"), receiver: rx_b },
      ],
      opts,
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let mut out = merger.stream(cancel.clone());

    tx_a.send(entry("a", 1, "a1")).await.unwrap();
    tx_b.send(entry("b", 0, "b0")).await.unwrap();
    let mut heartbeat = entry("b", 2, "unused");
    heartbeat.stream = LogStreamKind::Heartbeat;
    tx_b.send(heartbeat).await.unwrap();

    let first = out.recv().await.unwrap();
    assert!(matches!(first.payload, LogPayload::Message(m) if m == "b0"));

    let second = out.recv().await.unwrap();
    assert!(matches!(second.payload, LogPayload::Error(_)));
    assert_eq!(second.metadata.container_id, "a");

    let third = out.recv().await.unwrap();
    assert!(matches!(third.payload, LogPayload::Message(m) if m == "a1"));

    drop(tx_a);
    drop(tx_b);
    cancel.cancel();
  }
}
