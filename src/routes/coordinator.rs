use warp::Filter;
use warp::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};
use crate::aggregator::ResultAggregator;
use crate::models::ParsedRecord;
use crate::registry::MembershipRegistry;
use crate::scheduler::ChunkScheduler;

#[derive(Clone)]
pub struct CoordinatorState {
  pub registry: Arc<MembershipRegistry>,
  pub scheduler: Arc<ChunkScheduler>,
  pub aggregator: Arc<ResultAggregator>,
}

#[derive(Deserialize)]
pub struct RegisterBody {
  pub worker_id: Option<String>,
  pub callback_address: Option<String>,
}

#[derive(Deserialize)]
pub struct HeartbeatBody {
  pub worker_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ResultsBody {
  pub worker_id: Option<String>,
  #[serde(rename = "filepath")]
  pub file_path: Option<String>,
  #[serde(default)]
  pub results: Vec<ParsedRecord>,
  #[serde(default)]
  pub malformed_lines: u64,
}

fn with_state(
  state: CoordinatorState,
) -> impl Filter<Extract = (CoordinatorState,), Error = Infallible> + Clone {
  warp::any().map(move || state.clone())
}

pub fn routes(
  state: CoordinatorState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  register_route(state.clone())
    .or(results_route(state.clone()))
    .or(heartbeat_route(state))
}

pub fn register_route(
  state: CoordinatorState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("register")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_state(state))
    .and_then(handle_register)
}

pub fn results_route(
  state: CoordinatorState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("results")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_state(state))
    .and_then(handle_results)
}

pub fn heartbeat_route(
  state: CoordinatorState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("heartbeat")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_state(state))
    .and_then(handle_heartbeat)
}

fn bad_request(message: &str) -> warp::reply::WithStatus<warp::reply::Json> {
  warp::reply::with_status(
    warp::reply::json(&json!({"status": "error", "message": message})),
    StatusCode::BAD_REQUEST,
  )
}

fn ack() -> warp::reply::WithStatus<warp::reply::Json> {
  warp::reply::with_status(
    warp::reply::json(&json!({"status": "success"})),
    StatusCode::OK,
  )
}

async fn handle_register(
  body: RegisterBody,
  state: CoordinatorState,
) -> Result<impl warp::Reply, warp::Rejection> {
  let Some(worker_id) = body.worker_id else {
    return Ok(bad_request("Worker ID required"));
  };
  let callback_address = body.callback_address.unwrap_or_default();
  state.registry.register(&worker_id, &callback_address).await;
  Ok(ack())
}

async fn handle_results(
  body: ResultsBody,
  state: CoordinatorState,
) -> Result<impl warp::Reply, warp::Rejection> {
  let (Some(worker_id), Some(file_path)) = (body.worker_id, body.file_path) else {
    return Ok(bad_request("worker_id and filepath required"));
  };

  state
    .aggregator
    .receive(&worker_id, &file_path, body.results, body.malformed_lines)
    .await;
  // a worker that delivers results is alive, whatever its heartbeats say
  state.registry.record_heartbeat(&worker_id).await;

  if state.scheduler.complete_chunks(&file_path, &worker_id).await {
    info!("All chunks of {} completed", file_path);
    if let Err(e) = state.aggregator.persist_summaries().await {
      error!("Failed to persist metrics: {:#}", e);
    }
  }
  Ok(ack())
}

async fn handle_heartbeat(
  body: HeartbeatBody,
  state: CoordinatorState,
) -> Result<impl warp::Reply, warp::Rejection> {
  if let Some(worker_id) = body.worker_id {
    state.registry.record_heartbeat(&worker_id).await;
  }
  Ok(ack())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analyzer::MetricsAnalyzer;
  use crate::models::{ChunkStatus, FileChunk};
  use uuid::Uuid;

  fn state() -> CoordinatorState {
    let registry = Arc::new(MembershipRegistry::new());
    let scheduler = Arc::new(ChunkScheduler::new(registry.clone()));
    let metrics_path = std::env::temp_dir()
      .join(format!("dlas-routes-{}.json", Uuid::new_v4()))
      .to_string_lossy()
      .into_owned();
    CoordinatorState {
      registry,
      scheduler,
      aggregator: Arc::new(ResultAggregator::new(MetricsAnalyzer::new(60, 900), metrics_path)),
    }
  }

  #[tokio::test]
  async fn register_without_worker_id_is_rejected() {
    let api = routes(state());
    let response = warp::test::request()
      .method("POST")
      .path("/register")
      .json(&serde_json::json!({"callback_address": "127.0.0.1:9001"}))
      .reply(&api)
      .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn register_adds_worker() {
    let st = state();
    let api = routes(st.clone());
    let response = warp::test::request()
      .method("POST")
      .path("/register")
      .json(&serde_json::json!({"worker_id": "w1", "callback_address": "127.0.0.1:9001"}))
      .reply(&api)
      .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(st.registry.active_workers().await.len(), 1);
  }

  #[tokio::test]
  async fn results_without_filepath_mutate_nothing() {
    let st = state();
    let api = routes(st.clone());
    let response = warp::test::request()
      .method("POST")
      .path("/results")
      .json(&serde_json::json!({"worker_id": "w1", "results": []}))
      .reply(&api)
      .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(st.aggregator.record_count("app.log").await, 0);
  }

  #[tokio::test]
  async fn results_mark_owned_chunks_completed() {
    let st = state();
    st.scheduler
      .track_chunks(
        "app.log",
        vec![FileChunk {
          worker_id: "w1".to_string(),
          callback_address: "127.0.0.1:9001".to_string(),
          file_path: "app.log".to_string(),
          start: 0,
          size: 100,
          status: ChunkStatus::Dispatched,
          passes: 0,
        }],
      )
      .await;

    let api = routes(st.clone());
    let response = warp::test::request()
      .method("POST")
      .path("/results")
      .json(&serde_json::json!({
        "worker_id": "w1",
        "filepath": "app.log",
        "results": [{
          "timestamp": "2024-01-24T10:15:32.123Z",
          "level": "INFO",
          "message": "Request processed in 127ms",
          "metrics": {"response_time": 127.0},
          "filepath": "app.log"
        }],
        "malformed_lines": 3
      }))
      .reply(&api)
      .await;
    assert_eq!(response.status(), StatusCode::OK);

    let chunks = st.scheduler.chunks_for("app.log").await;
    assert_eq!(chunks[0].status, ChunkStatus::Completed);
    let summary = st.aggregator.summary("app.log").await;
    assert_eq!(summary.total_requests, 1);
    assert_eq!(summary.malformed_lines, 3);
  }

  #[tokio::test]
  async fn heartbeat_is_always_acknowledged() {
    let api = routes(state());
    let response = warp::test::request()
      .method("POST")
      .path("/heartbeat")
      .json(&serde_json::json!({"worker_id": "ghost"}))
      .reply(&api)
      .await;
    assert_eq!(response.status(), StatusCode::OK);
  }
}
