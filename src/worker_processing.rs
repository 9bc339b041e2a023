use anyhow::{Context, Result};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::info;
use crate::analyzer::MetricsAnalyzer;
use crate::models::{FileChunk, ParsedRecord};
use crate::parser::LineParser;

pub struct ChunkResult {
  pub records: Vec<ParsedRecord>,
  pub malformed_lines: u64,
}

/// Read one byte range of a log file, parse every line in it, and fold the
/// accepted records into the local analyzer. Lines the parser rejects are
/// counted, never fatal. Lines cut in half at a chunk boundary fall into the
/// malformed count as well; the partition is byte-exact, not line-aligned.
pub async fn process_chunk(
  parser: &LineParser,
  analyzer: &MetricsAnalyzer,
  chunk: &FileChunk,
) -> Result<ChunkResult> {
  info!(
    "Processing chunk {} [{}+{}]",
    chunk.file_path, chunk.start, chunk.size
  );

  let mut file = File::open(&chunk.file_path)
    .await
    .with_context(|| format!("cannot open {}", chunk.file_path))?;
  file
    .seek(SeekFrom::Start(chunk.start))
    .await
    .with_context(|| format!("cannot seek to {} in {}", chunk.start, chunk.file_path))?;

  let mut data = Vec::with_capacity(chunk.size as usize);
  file
    .take(chunk.size)
    .read_to_end(&mut data)
    .await
    .with_context(|| format!("cannot read chunk of {}", chunk.file_path))?;
  let text = String::from_utf8_lossy(&data);

  let mut records = Vec::new();
  let mut malformed_lines = 0u64;
  for line in text.split('\n') {
    if line.trim().is_empty() {
      continue;
    }
    match parser.parse(line, &chunk.file_path) {
      Ok(record) => records.push(record),
      Err(_) => malformed_lines += 1,
    }
  }

  analyzer.update_metrics(&records).await;
  analyzer.record_malformed(&chunk.file_path, malformed_lines).await;

  info!(
    "Chunk {} [{}+{}]: {} records, {} malformed",
    chunk.file_path,
    chunk.start,
    chunk.size,
    records.len(),
    malformed_lines
  );
  Ok(ChunkResult { records, malformed_lines })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::ChunkStatus;
  use uuid::Uuid;

  fn chunk_for(path: &str, start: u64, size: u64) -> FileChunk {
    FileChunk {
      worker_id: "w1".to_string(),
      callback_address: "127.0.0.1:9001".to_string(),
      file_path: path.to_string(),
      start,
      size,
      status: ChunkStatus::Dispatched,
      passes: 0,
    }
  }

  #[tokio::test]
  async fn parses_good_lines_and_counts_bad_ones() {
    let path = std::env::temp_dir().join(format!("dlas-chunk-{}.log", Uuid::new_v4()));
    let body = "2024-01-24 10:15:32.123 INFO Request processed in 127ms\n\
                this line is garbage\n\
                2024-01-24 10:15:33.001 ERROR upstream timed out\n";
    tokio::fs::write(&path, body).await.unwrap();

    let parser = LineParser::new();
    let analyzer = MetricsAnalyzer::new(60, 900);
    let chunk = chunk_for(&path.to_string_lossy(), 0, body.len() as u64);
    let result = process_chunk(&parser, &analyzer, &chunk).await.unwrap();

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.malformed_lines, 1);
    let summary = analyzer.comprehensive_metrics(&chunk.file_path).await;
    assert_eq!(summary.total_requests, 2);
    assert_eq!(summary.malformed_lines, 1);
    tokio::fs::remove_file(&path).await.ok();
  }

  #[tokio::test]
  async fn missing_file_is_an_error() {
    let parser = LineParser::new();
    let analyzer = MetricsAnalyzer::new(60, 900);
    let chunk = chunk_for("/nonexistent/never.log", 0, 10);
    assert!(process_chunk(&parser, &analyzer, &chunk).await.is_err());
  }
}
