use anyhow::{Result, anyhow};
use chrono::{NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use crate::models::ParsedRecord;

/// Multi-format log line parser. Accepts three shapes:
///
/// 1. standard: `2024-01-24 10:15:32.123 INFO Request processed in 127ms`
/// 2. JSON:     `{"timestamp": "2024-01-24 10:15:33.001", "level": "INFO", ...}`
/// 3. access:   `192.168.1.1 - - [24/Jan/2024:10:15:33.125] GET /api/data HTTP/1.1 200 105ms`
///
/// Anything else is rejected with an error; the caller counts the line as
/// malformed and moves on.
pub struct LineParser {
  standard_re: Regex,
  response_re: Regex,
  access_re: Regex,
}

impl LineParser {
  pub fn new() -> Self {
    Self {
      standard_re: Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3}) (\w+) (.+)$")
        .unwrap(),
      response_re: Regex::new(r"processed in (\d+)ms").unwrap(),
      access_re: Regex::new(r".*\[([^\]]+)\].*?(\d+)ms").unwrap(),
    }
  }

  pub fn parse(&self, line: &str, source_file: &str) -> Result<ParsedRecord> {
    let line = line.trim();
    self
      .parse_json(line, source_file)
      .or_else(|_| self.parse_standard(line, source_file))
      .or_else(|_| self.parse_access(line, source_file))
      .map_err(|_| anyhow!("unable to parse log line: {}", line))
  }

  fn parse_json(&self, line: &str, source_file: &str) -> Result<ParsedRecord> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let ts_str = value
      .get("timestamp")
      .and_then(|v| v.as_str())
      .ok_or_else(|| anyhow!("missing timestamp"))?;
    let timestamp = NaiveDateTime::parse_from_str(ts_str, "%Y-%m-%d %H:%M:%S%.f")?.and_utc();

    let mut metrics = HashMap::new();
    for key in ["duration_ms", "response_time"] {
      if let Some(n) = value.get(key).and_then(|v| v.as_f64()) {
        metrics.insert(key.to_string(), n);
      }
    }

    Ok(ParsedRecord {
      timestamp,
      level: value
        .get("level")
        .and_then(|v| v.as_str())
        .unwrap_or("UNKNOWN")
        .to_string(),
      message: value
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string(),
      metrics,
      source_file: source_file.to_string(),
    })
  }

  fn parse_standard(&self, line: &str, source_file: &str) -> Result<ParsedRecord> {
    let caps = self
      .standard_re
      .captures(line)
      .ok_or_else(|| anyhow!("not standard format"))?;
    let timestamp = NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%d %H:%M:%S%.f")?.and_utc();
    let message = caps[3].to_string();

    let mut metrics = HashMap::new();
    if let Some(rt) = self.response_re.captures(&message) {
      if let Ok(ms) = rt[1].parse::<f64>() {
        metrics.insert("response_time".to_string(), ms);
      }
    }

    Ok(ParsedRecord {
      timestamp,
      level: caps[2].to_string(),
      message,
      metrics,
      source_file: source_file.to_string(),
    })
  }

  fn parse_access(&self, line: &str, source_file: &str) -> Result<ParsedRecord> {
    let caps = self
      .access_re
      .captures(line)
      .ok_or_else(|| anyhow!("not access-log format"))?;
    let timestamp = NaiveDateTime::parse_from_str(&caps[1], "%d/%b/%Y:%H:%M:%S%.f")?.and_utc();
    let ms: f64 = caps[2].parse()?;

    Ok(ParsedRecord {
      timestamp,
      level: "INFO".to_string(),
      message: line.to_string(),
      metrics: HashMap::from([("response_time".to_string(), ms)]),
      source_file: source_file.to_string(),
    })
  }
}

impl Default for LineParser {
  fn default() -> Self {
    Self::new()
  }
}
