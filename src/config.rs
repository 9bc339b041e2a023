use std::env;
use std::time::Duration;
use uuid::Uuid;

/// Runtime configuration, read from the environment. Both the coordinator and
/// the worker binaries share this type; each process only uses the fields that
/// apply to its role.
#[derive(Debug, Clone)]
pub struct Config {
  pub server_port: u16,
  pub coordinator_url: String,
  pub worker_id: String,
  pub callback_host: String,
  pub heartbeat_interval: Duration,
  pub heartbeat_check_interval: Duration,
  pub heartbeat_timeout: Duration,
  pub window_seconds: u64,
  pub retention_seconds: u64,
  pub log_dir: String,
  pub metrics_path: String,
  pub min_workers: usize,
  pub max_reassign_passes: Option<u32>,
}

fn env_u64(name: &str, default: u64) -> u64 {
  env::var(name)
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(default)
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      server_port: env_u64("SERVER_PORT", 8000) as u16,
      coordinator_url: env::var("COORDINATOR_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8000".into()),
      worker_id: env::var("WORKER_ID").unwrap_or_else(|_| Uuid::new_v4().to_string()),
      callback_host: env::var("CALLBACK_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
      heartbeat_interval: Duration::from_secs(env_u64("HEARTBEAT_INTERVAL_SECS", 10)),
      heartbeat_check_interval: Duration::from_secs(env_u64("HEARTBEAT_CHECK_INTERVAL_SECS", 10)),
      heartbeat_timeout: Duration::from_secs(env_u64("HEARTBEAT_TIMEOUT_SECS", 30)),
      window_seconds: env_u64("WINDOW_SECONDS", 60),
      retention_seconds: env_u64("RETENTION_SECONDS", 900),
      log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".into()),
      metrics_path: env::var("METRICS_PATH").unwrap_or_else(|_| "metrics.json".into()),
      min_workers: env_u64("MIN_WORKERS", 1) as usize,
      max_reassign_passes: env::var("MAX_REASSIGN_PASSES")
        .ok()
        .and_then(|v| v.parse().ok()),
    }
  }
}
