use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use dlas::aggregator::ResultAggregator;
use dlas::analyzer::MetricsAnalyzer;
use dlas::config::Config;
use dlas::detector::FailureDetector;
use dlas::registry::MembershipRegistry;
use dlas::routes::coordinator::{CoordinatorState, routes};
use dlas::scheduler::{ChunkScheduler, ReassignPolicy, ScheduleOutcome};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt::init();
  let config = Config::from_env();
  info!("Starting coordinator on port {}", config.server_port);

  let registry = Arc::new(MembershipRegistry::new());
  let scheduler = Arc::new(ChunkScheduler::new(registry.clone()));
  let aggregator = Arc::new(ResultAggregator::new(
    MetricsAnalyzer::new(config.window_seconds, config.retention_seconds),
    config.metrics_path.clone(),
  ));

  let detector = FailureDetector::new(
    registry.clone(),
    scheduler.clone(),
    config.heartbeat_check_interval,
    config.heartbeat_timeout,
    ReassignPolicy { max_passes: config.max_reassign_passes },
  );
  tokio::spawn(async move { detector.run().await });

  tokio::spawn(schedule_log_dir(
    scheduler.clone(),
    registry.clone(),
    config.clone(),
  ));

  let api = routes(CoordinatorState {
    registry,
    scheduler,
    aggregator,
  });

  let (addr, server) = warp::serve(api).bind_with_graceful_shutdown(
    ([0, 0, 0, 0], config.server_port),
    async {
      tokio::signal::ctrl_c().await.ok();
      info!("Shutdown signal received, draining in-flight requests");
    },
  );
  info!("Coordinator listening on {}", addr);
  server.await;
}

/// Wait until enough workers have registered, then schedule every .log file
/// in the configured directory. Files that hit an empty worker set are
/// retried on a later sweep; unreadable files are abandoned.
async fn schedule_log_dir(
  scheduler: Arc<ChunkScheduler>,
  registry: Arc<MembershipRegistry>,
  config: Config,
) {
  while registry.active_workers().await.len() < config.min_workers {
    tokio::time::sleep(Duration::from_secs(2)).await;
  }
  info!("Worker pool ready, scanning {}", config.log_dir);

  let mut pending = Vec::new();
  let mut entries = match tokio::fs::read_dir(&config.log_dir).await {
    Ok(entries) => entries,
    Err(e) => {
      error!("Cannot read log directory {}: {}", config.log_dir, e);
      return;
    }
  };
  while let Ok(Some(entry)) = entries.next_entry().await {
    let path = entry.path();
    if path.extension().map(|e| e == "log").unwrap_or(false) {
      pending.push(path.to_string_lossy().into_owned());
    }
  }
  info!("Found {} log files to distribute", pending.len());

  while !pending.is_empty() {
    let mut retry = Vec::new();
    for file_path in pending.drain(..) {
      match scheduler.schedule_file(&file_path).await {
        Ok(ScheduleOutcome::Scheduled(n)) => {
          info!("Scheduled {} as {} chunks", file_path, n);
        }
        Ok(ScheduleOutcome::NoActiveWorkers) => retry.push(file_path),
        Err(e) => error!("Abandoning {}: {:#}", file_path, e),
      }
    }
    pending = retry;
    if !pending.is_empty() {
      tokio::time::sleep(Duration::from_secs(5)).await;
    }
  }
}
