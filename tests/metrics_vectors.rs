use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use uuid::Uuid;
use dlas::analyzer::MetricsAnalyzer;
use dlas::models::{ChunkStatus, FileChunk, ParsedRecord};
use dlas::parser::LineParser;
use dlas::worker_processing::process_chunk;

fn record(minute: u32, second: u32, response_time: f64) -> ParsedRecord {
  ParsedRecord {
    timestamp: Utc.with_ymd_and_hms(2024, 1, 24, 10 + minute / 60, minute % 60, second).unwrap(),
    level: "INFO".to_string(),
    message: "Request processed".to_string(),
    metrics: HashMap::from([("response_time".to_string(), response_time)]),
    source_file: "normal.log".to_string(),
  }
}

#[tokio::test]
async fn three_thousand_clean_records_round_trip() {
  let analyzer = MetricsAnalyzer::new(60, 7 * 24 * 3600);

  // 3000 records spread evenly, 50 per minute, response times alternating
  // around a 109.0 mean, no errors anywhere
  let mut records = Vec::with_capacity(3000);
  for i in 0..3000u32 {
    let rt = if i % 2 == 0 { 100.0 } else { 118.0 };
    records.push(record(i / 50, i % 50, rt));
  }
  analyzer.update_metrics(&records).await;

  let summary = analyzer.comprehensive_metrics("normal.log").await;
  assert_eq!(summary.total_requests, 3000);
  assert_eq!(summary.error_rate, 0.0);
  assert!((summary.avg_response_time - 109.0).abs() < 1e-9);
  assert!((summary.requests_per_second - 50.0).abs() < 1e-9);
  assert_eq!(summary.malformed_lines, 0);
}

#[tokio::test]
async fn thirty_malformed_lines_out_of_two_hundred() {
  let path = std::env::temp_dir().join(format!("dlas-malformed-{}.log", Uuid::new_v4()));
  let mut body = String::new();
  for i in 0..200 {
    if i % 20 < 3 {
      // 3 of every 20 lines are broken: 30 malformed out of 200
      body.push_str("### corrupted entry ###\n");
    } else {
      body.push_str(&format!(
        "2024-01-24 10:{:02}:{:02}.000 INFO Request processed in 109ms\n",
        15 + i / 60,
        i % 60
      ));
    }
  }
  tokio::fs::write(&path, &body).await.unwrap();

  let parser = LineParser::new();
  let analyzer = MetricsAnalyzer::new(60, 7 * 24 * 3600);
  let chunk = FileChunk {
    worker_id: "w1".to_string(),
    callback_address: "127.0.0.1:9001".to_string(),
    file_path: path.to_string_lossy().into_owned(),
    start: 0,
    size: body.len() as u64,
    status: ChunkStatus::Dispatched,
    passes: 0,
  };

  let result = process_chunk(&parser, &analyzer, &chunk).await.unwrap();
  assert_eq!(result.records.len(), 170);
  assert_eq!(result.malformed_lines, 30);

  let summary = analyzer.comprehensive_metrics(&chunk.file_path).await;
  assert_eq!(summary.total_requests, 170);
  assert_eq!(summary.malformed_lines, 30);
  assert!((summary.avg_response_time - 109.0).abs() < 1e-9);

  tokio::fs::remove_file(&path).await.ok();
}
