use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use tracing::{error, info};
use dlas::analyzer::MetricsAnalyzer;
use dlas::config::Config;
use dlas::parser::LineParser;
use dlas::routes::worker::{WorkerState, process_route};
use dlas::rpc;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt::init();
  let config = Config::from_env();
  info!(
    "Starting worker {} on port {}",
    config.worker_id, config.server_port
  );

  let state = WorkerState {
    config: Arc::new(config.clone()),
    parser: Arc::new(LineParser::new()),
    analyzer: Arc::new(MetricsAnalyzer::new(
      config.window_seconds,
      config.retention_seconds,
    )),
    client: rpc::http_client(),
  };

  register_with_coordinator(&state).await;
  tokio::spawn(heartbeat_loop(state.clone()));
  tokio::spawn(window_report_loop(state.clone()));

  let api = process_route(state);
  let (addr, server) = warp::serve(api).bind_with_graceful_shutdown(
    ([0, 0, 0, 0], config.server_port),
    async {
      tokio::signal::ctrl_c().await.ok();
      info!("Shutdown signal received, draining in-flight requests");
    },
  );
  info!("Worker listening on {}", addr);
  server.await;
}

async fn register_with_coordinator(state: &WorkerState) {
  let callback_address = format!("{}:{}", state.config.callback_host, state.config.server_port);
  let url = format!("{}/register", state.config.coordinator_url);
  let body = json!({
    "worker_id": state.config.worker_id,
    "callback_address": callback_address,
  });
  match rpc::post_json(&state.client, &url, &body).await {
    Ok(()) => info!("Registered with coordinator at {}", state.config.coordinator_url),
    Err(e) => error!("Registration failed: {:#}", e),
  }
}

/// Log a sliding-window snapshot once per window. The query also evicts
/// buckets past the retention horizon, keeping the worker's memory bounded on
/// long runs.
async fn window_report_loop(state: WorkerState) {
  let period = Duration::from_secs(state.config.window_seconds.max(1));
  loop {
    tokio::time::sleep(period).await;
    let summary = state.analyzer.current_window_metrics().await;
    for (file, minutes) in &summary {
      let requests: u64 = minutes.values().map(|m| m.request_count).sum();
      info!(
        "Window for {}: {} requests across {} active minutes",
        file,
        requests,
        minutes.len()
      );
    }
  }
}

/// Fire-and-forget liveness signal. A send failure is logged and the next
/// tick tries again; there is no retry inside a tick.
async fn heartbeat_loop(state: WorkerState) {
  let url = format!("{}/heartbeat", state.config.coordinator_url);
  let body = json!({"worker_id": state.config.worker_id});
  loop {
    tokio::time::sleep(state.config.heartbeat_interval).await;
    if let Err(e) = rpc::post_json(&state.client, &url, &body).await {
      error!("Heartbeat failed: {:#}", e);
    }
  }
}
