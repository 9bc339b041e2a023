use warp::Filter;
use warp::http::StatusCode;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};
use crate::analyzer::MetricsAnalyzer;
use crate::config::Config;
use crate::models::FileChunk;
use crate::parser::LineParser;
use crate::rpc;
use crate::worker_processing;

#[derive(Clone)]
pub struct WorkerState {
  pub config: Arc<Config>,
  pub parser: Arc<LineParser>,
  pub analyzer: Arc<MetricsAnalyzer>,
  pub client: reqwest::Client,
}

fn with_state(
  state: WorkerState,
) -> impl Filter<Extract = (WorkerState,), Error = Infallible> + Clone {
  warp::any().map(move || state.clone())
}

pub fn process_route(
  state: WorkerState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("process")
    .and(warp::post())
    .and(warp::body::json())
    .and(with_state(state))
    .and_then(handle_process)
}

/// Receive a chunk descriptor, process the byte range, and push the parsed
/// records back to the coordinator. Any processing error is reported as a 500
/// with the message; the worker process itself keeps running.
async fn handle_process(
  chunk: FileChunk,
  state: WorkerState,
) -> Result<impl warp::Reply, warp::Rejection> {
  let result = match worker_processing::process_chunk(&state.parser, &state.analyzer, &chunk).await
  {
    Ok(result) => result,
    Err(e) => {
      error!("Chunk processing failed: {:#}", e);
      return Ok(warp::reply::with_status(
        warp::reply::json(&json!({"status": "error", "message": e.to_string()})),
        StatusCode::INTERNAL_SERVER_ERROR,
      ));
    }
  };

  let payload = json!({
    "worker_id": state.config.worker_id,
    "filepath": chunk.file_path,
    "results": result.records,
    "malformed_lines": result.malformed_lines,
  });
  let url = format!("{}/results", state.config.coordinator_url);
  // a failed push is lost; the chunk never completes on the coordinator and
  // eventually comes back through the failure detector
  match rpc::post_json(&state.client, &url, &payload).await {
    Ok(()) => info!("Results for {} pushed to coordinator", chunk.file_path),
    Err(e) => error!("Failed to push results for {}: {:#}", chunk.file_path, e),
  }

  Ok(warp::reply::with_status(
    warp::reply::json(&json!({"status": "success"})),
    StatusCode::OK,
  ))
}
