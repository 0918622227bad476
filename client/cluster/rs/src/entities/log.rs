//! Log entry shape consumed/produced by C6 (§3 "Log entry").

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMetadata {
  pub service_id: String,
  pub service_name: String,
  pub container_id: String,
  pub machine_id: String,
}

/// Milliseconds since the Unix epoch. A plain type alias rather than a
/// newtype: the merger only ever needs `Ord`/arithmetic on it, and every
/// adapter already produces timestamps in this unit.
pub type Timestamp = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStreamKind {
  Stdout,
  Stderr,
  /// Never queued; advances the stream's watermark and is dropped
  /// (§4.6 "Heartbeat entries").
  Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPayload {
  Message(String),
  /// Bypasses the heap entirely and is forwarded immediately (§4.6
  /// "Error forwarding"), or is the synthetic entry emitted on stall
  /// (§4.6 "Stall detection").
  Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
  pub metadata: LogMetadata,
  pub stream: LogStreamKind,
  pub timestamp: Timestamp,
  pub payload: LogPayload,
}

impl LogEntry {
  pub fn is_error(&self) -> bool {
    matches!(self.payload, LogPayload::Error(_))
  }

  pub fn is_heartbeat(&self) -> bool {
    matches!(self.stream, LogStreamKind::Heartbeat)
  }
}
