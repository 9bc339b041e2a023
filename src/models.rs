use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
  Active,
  Failed,
}

/// One registered worker. Owned exclusively by the membership registry;
/// `status` only ever moves active -> failed, recovery happens by
/// re-registering under the same id.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
  pub id: String,
  pub callback_address: String,
  pub last_heartbeat: Instant,
  pub status: WorkerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
  Pending,
  Dispatched,
  Completed,
}

/// A contiguous byte range of one log file, assigned to one worker. The wire
/// shape doubles as the dispatch request body sent to the worker's /process
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChunk {
  pub worker_id: String,
  pub callback_address: String,
  #[serde(rename = "filepath")]
  pub file_path: String,
  pub start: u64,
  pub size: u64,
  pub status: ChunkStatus,
  /// How many times the failure detector has requeued this chunk.
  #[serde(skip)]
  pub passes: u32,
}

/// One parsed log line as produced by the line parser. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRecord {
  pub timestamp: DateTime<Utc>,
  pub level: String,
  pub message: String,
  #[serde(default)]
  pub metrics: HashMap<String, f64>,
  #[serde(rename = "filepath", default)]
  pub source_file: String,
}

/// Whole-file metrics summary, persisted as JSON once a file's chunks have
/// all completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
  pub avg_response_time: f64,
  pub error_rate: f64,
  pub requests_per_second: f64,
  pub total_requests: u64,
  pub malformed_lines: u64,
}

/// Per-minute entry of a sliding-window query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowEntry {
  pub error_rate: f64,
  pub avg_response_time: f64,
  pub request_count: u64,
  pub requests_per_second: f64,
}
