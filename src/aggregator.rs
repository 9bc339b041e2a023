use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;
use crate::analyzer::MetricsAnalyzer;
use crate::models::{FileSummary, ParsedRecord};

/// Coordinator-side collection of worker results. Raw records are stored
/// append-only per file (arrival order is meaningless, workers push them
/// concurrently) and also folded into an analyzer so whole-file summaries can
/// be produced once a file finishes.
pub struct ResultAggregator {
  results: Mutex<HashMap<String, Vec<ParsedRecord>>>,
  analyzer: MetricsAnalyzer,
  metrics_path: String,
}

impl ResultAggregator {
  pub fn new(analyzer: MetricsAnalyzer, metrics_path: String) -> Self {
    Self {
      results: Mutex::new(HashMap::new()),
      analyzer,
      metrics_path,
    }
  }

  /// Append a worker's records for one file and fold them into the metrics
  /// analyzer. Field validation happens at the HTTP boundary; by the time
  /// this runs both ids are known present.
  pub async fn receive(
    &self,
    worker_id: &str,
    file_path: &str,
    records: Vec<ParsedRecord>,
    malformed_lines: u64,
  ) {
    info!(
      "Received {} records ({} malformed) for {} from worker {}",
      records.len(),
      malformed_lines,
      file_path,
      worker_id
    );
    self.analyzer.update_metrics(&records).await;
    self.analyzer.record_malformed(file_path, malformed_lines).await;
    {
      let mut results = self.results.lock().await;
      results.entry(file_path.to_string()).or_default().extend(records);
    }
  }

  pub async fn record_count(&self, file_path: &str) -> usize {
    self
      .results
      .lock()
      .await
      .get(file_path)
      .map(|r| r.len())
      .unwrap_or(0)
  }

  pub async fn summary(&self, file_path: &str) -> FileSummary {
    self.analyzer.comprehensive_metrics(file_path).await
  }

  /// Write the per-file summary map as JSON. Called whenever a file's chunk
  /// set completes; later completions simply rewrite the file with more
  /// entries.
  pub async fn persist_summaries(&self) -> Result<()> {
    let mut summaries: HashMap<String, FileSummary> = HashMap::new();
    for file in self.analyzer.known_files().await {
      summaries.insert(file.clone(), self.analyzer.comprehensive_metrics(&file).await);
    }
    let body = serde_json::to_string_pretty(&summaries)?;
    tokio::fs::write(&self.metrics_path, body)
      .await
      .with_context(|| format!("cannot write metrics to {}", self.metrics_path))?;
    info!("Persisted metrics for {} files to {}", summaries.len(), self.metrics_path);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{TimeZone, Utc};
  use uuid::Uuid;

  fn record(second: u32, level: &str, rt: f64) -> ParsedRecord {
    ParsedRecord {
      timestamp: Utc.with_ymd_and_hms(2024, 1, 24, 10, 15, second).unwrap(),
      level: level.to_string(),
      message: "request handled".to_string(),
      metrics: HashMap::from([("response_time".to_string(), rt)]),
      source_file: "app.log".to_string(),
    }
  }

  #[tokio::test]
  async fn receive_appends_across_workers() {
    let aggregator =
      ResultAggregator::new(MetricsAnalyzer::new(60, 900), "unused.json".to_string());
    aggregator
      .receive("w1", "app.log", vec![record(1, "INFO", 100.0)], 0)
      .await;
    aggregator
      .receive("w2", "app.log", vec![record(2, "ERROR", 200.0), record(3, "INFO", 60.0)], 5)
      .await;

    assert_eq!(aggregator.record_count("app.log").await, 3);
    let summary = aggregator.summary("app.log").await;
    assert_eq!(summary.total_requests, 3);
    assert_eq!(summary.malformed_lines, 5);
    assert_eq!(summary.avg_response_time, 120.0);
  }

  #[tokio::test]
  async fn persist_writes_summary_map() {
    let path = std::env::temp_dir().join(format!("dlas-metrics-{}.json", Uuid::new_v4()));
    let aggregator = ResultAggregator::new(
      MetricsAnalyzer::new(60, 900),
      path.to_string_lossy().into_owned(),
    );
    aggregator
      .receive("w1", "app.log", vec![record(1, "INFO", 109.0)], 2)
      .await;
    aggregator.persist_summaries().await.unwrap();

    let body = tokio::fs::read_to_string(&path).await.unwrap();
    let parsed: HashMap<String, FileSummary> = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["app.log"].total_requests, 1);
    assert_eq!(parsed["app.log"].malformed_lines, 2);
    tokio::fs::remove_file(&path).await.ok();
  }
}
