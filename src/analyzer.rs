use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use crate::models::{FileSummary, ParsedRecord, WindowEntry};

/// File name used when a record arrives without one.
pub const UNKNOWN_FILE: &str = "unknown";

#[derive(Debug, Default, Clone)]
struct MetricsBucket {
  request_count: u64,
  error_count: u64,
  response_times: Vec<f64>,
}

#[derive(Debug, Default)]
struct AnalyzerState {
  /// Per file, per minute aggregates. The inner map is minute-keyed so window
  /// queries and eviction can range over it.
  buckets: HashMap<String, BTreeMap<DateTime<Utc>, MetricsBucket>>,
  malformed: HashMap<String, u64>,
}

/// Aggregates parsed records into per-file, per-minute buckets and answers
/// sliding-window and whole-file queries. All mutation happens under one
/// critical section per call, so concurrent chunk completions never observe a
/// partially applied batch.
pub struct MetricsAnalyzer {
  window_seconds: u64,
  retention_seconds: u64,
  state: Mutex<AnalyzerState>,
}

fn minute_key(ts: DateTime<Utc>) -> DateTime<Utc> {
  ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

fn mean(samples: &[f64]) -> f64 {
  if samples.is_empty() {
    0.0
  } else {
    samples.iter().sum::<f64>() / samples.len() as f64
  }
}

impl MetricsAnalyzer {
  pub fn new(window_seconds: u64, retention_seconds: u64) -> Self {
    Self {
      window_seconds,
      retention_seconds,
      state: Mutex::new(AnalyzerState::default()),
    }
  }

  /// Fold a batch of records into the bucket table. Order across batches does
  /// not matter; the aggregation is purely additive.
  pub async fn update_metrics(&self, records: &[ParsedRecord]) {
    let mut state = self.state.lock().await;
    for record in records {
      let file = if record.source_file.is_empty() {
        UNKNOWN_FILE
      } else {
        record.source_file.as_str()
      };
      let bucket = state
        .buckets
        .entry(file.to_string())
        .or_default()
        .entry(minute_key(record.timestamp))
        .or_default();
      bucket.request_count += 1;
      if record.level == "ERROR" {
        bucket.error_count += 1;
      }
      if let Some(rt) = record.metrics.get("response_time") {
        bucket.response_times.push(*rt);
      }
    }
  }

  /// Count lines the parser rejected for `file`.
  pub async fn record_malformed(&self, file: &str, count: u64) {
    if count == 0 {
      return;
    }
    let mut state = self.state.lock().await;
    *state.malformed.entry(file.to_string()).or_insert(0) += count;
  }

  /// Per-file, per-minute metrics for minutes within the trailing window.
  /// Also evicts buckets past the retention horizon, so repeated queries
  /// bound memory growth.
  pub async fn current_window_metrics(
    &self,
  ) -> HashMap<String, BTreeMap<DateTime<Utc>, WindowEntry>> {
    let now = Utc::now();
    self.evict_older_than(now - TimeDelta::seconds(self.retention_seconds as i64)).await;
    self.window_metrics_at(now).await
  }

  /// Window query with an explicit end instant. Buckets whose minute is
  /// strictly older than `now - window` are excluded but left in place.
  pub async fn window_metrics_at(
    &self,
    now: DateTime<Utc>,
  ) -> HashMap<String, BTreeMap<DateTime<Utc>, WindowEntry>> {
    let cutoff = now - TimeDelta::seconds(self.window_seconds as i64);
    let state = self.state.lock().await;
    let mut summary = HashMap::new();
    for (file, minutes) in &state.buckets {
      let mut per_minute = BTreeMap::new();
      for (minute, bucket) in minutes.range(cutoff..) {
        per_minute.insert(
          *minute,
          WindowEntry {
            error_rate: if bucket.request_count == 0 {
              0.0
            } else {
              bucket.error_count as f64 / bucket.request_count as f64
            },
            avg_response_time: mean(&bucket.response_times),
            request_count: bucket.request_count,
            requests_per_second: bucket.request_count as f64 / self.window_seconds as f64,
          },
        );
      }
      if !per_minute.is_empty() {
        summary.insert(file.clone(), per_minute);
      }
    }
    summary
  }

  /// Whole-file aggregate over every retained bucket, regardless of window.
  /// The error rate here is a percentage; throughput is normalized by the
  /// window size as an approximation rather than true elapsed time.
  pub async fn comprehensive_metrics(&self, file: &str) -> FileSummary {
    let state = self.state.lock().await;
    let mut total = 0u64;
    let mut errors = 0u64;
    let mut rt_sum = 0.0f64;
    let mut rt_count = 0usize;
    if let Some(minutes) = state.buckets.get(file) {
      for bucket in minutes.values() {
        total += bucket.request_count;
        errors += bucket.error_count;
        rt_sum += bucket.response_times.iter().sum::<f64>();
        rt_count += bucket.response_times.len();
      }
    }
    FileSummary {
      avg_response_time: if rt_count == 0 { 0.0 } else { rt_sum / rt_count as f64 },
      error_rate: if total == 0 { 0.0 } else { errors as f64 / total as f64 * 100.0 },
      requests_per_second: total as f64 / self.window_seconds as f64,
      total_requests: total,
      malformed_lines: state.malformed.get(file).copied().unwrap_or(0),
    }
  }

  /// Drop buckets older than `horizon`. Malformed-line counts are kept; they
  /// feed the whole-file summary, not the window.
  pub async fn evict_older_than(&self, horizon: DateTime<Utc>) {
    let mut state = self.state.lock().await;
    for minutes in state.buckets.values_mut() {
      *minutes = minutes.split_off(&minute_key(horizon));
    }
  }

  /// Names of every file the analyzer has seen records or malformed lines for.
  pub async fn known_files(&self) -> Vec<String> {
    let state = self.state.lock().await;
    let mut files: Vec<String> = state.buckets.keys().cloned().collect();
    for file in state.malformed.keys() {
      if !files.contains(file) {
        files.push(file.clone());
      }
    }
    files
  }
}
