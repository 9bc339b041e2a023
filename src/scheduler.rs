use anyhow::{Context, Result};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use crate::models::{ChunkStatus, FileChunk, WorkerRecord};
use crate::registry::MembershipRegistry;
use crate::rpc;

/// How the failure detector handles a chunk that keeps needing reassignment.
/// The default places no cap, matching retry-until-a-worker-shows-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReassignPolicy {
  pub max_passes: Option<u32>,
}

pub enum ScheduleOutcome {
  /// Chunks were created and dispatch was attempted for each.
  Scheduled(usize),
  /// No active worker; the caller decides when to retry.
  NoActiveWorkers,
}

/// Split `[0, file_size)` into `n` contiguous ranges of `file_size / n`, the
/// last absorbing the remainder so coverage is exact for any n >= 1.
pub fn partition_ranges(file_size: u64, n: usize) -> Vec<(u64, u64)> {
  let n = n as u64;
  let chunk_size = file_size / n;
  (0..n)
    .map(|i| {
      let start = i * chunk_size;
      let size = if i < n - 1 { chunk_size } else { file_size - start };
      (start, size)
    })
    .collect()
}

/// Partitions files across the active worker set and owns the chunk table
/// that tracks each range through pending -> dispatched -> completed.
pub struct ChunkScheduler {
  registry: Arc<MembershipRegistry>,
  table: Mutex<HashMap<String, Vec<FileChunk>>>,
  client: reqwest::Client,
}

impl ChunkScheduler {
  pub fn new(registry: Arc<MembershipRegistry>) -> Self {
    Self {
      registry,
      table: Mutex::new(HashMap::new()),
      client: rpc::http_client(),
    }
  }

  /// Partition one file across the currently active workers and dispatch
  /// every chunk concurrently. An unreadable file is an error the caller
  /// logs and abandons; an empty worker set is a retryable outcome.
  pub async fn schedule_file(&self, file_path: &str) -> Result<ScheduleOutcome> {
    let file_size = tokio::fs::metadata(file_path)
      .await
      .with_context(|| format!("cannot stat {}", file_path))?
      .len();

    let workers = self.registry.active_workers().await;
    if workers.is_empty() {
      return Ok(ScheduleOutcome::NoActiveWorkers);
    }

    let chunks = build_chunks(file_path, file_size, &workers);
    info!(
      "Scheduling {} ({} bytes) as {} chunks",
      file_path,
      file_size,
      chunks.len()
    );
    {
      let mut table = self.table.lock().await;
      table.insert(file_path.to_string(), chunks.clone());
    }

    let count = chunks.len();
    join_all(chunks.into_iter().map(|chunk| self.dispatch(chunk))).await;
    Ok(ScheduleOutcome::Scheduled(count))
  }

  /// Send one chunk descriptor to its owner's /process endpoint. Transport
  /// failure leaves the chunk's status untouched; the failure detector's next
  /// pass is the only retry path.
  pub async fn dispatch(&self, chunk: FileChunk) {
    let url = format!("http://{}/process", chunk.callback_address);
    match rpc::post_json(&self.client, &url, &chunk).await {
      Ok(()) => {
        info!(
          "Dispatched {} [{}+{}] to worker {}",
          chunk.file_path, chunk.start, chunk.size, chunk.worker_id
        );
        self.mark_dispatched(&chunk).await;
      }
      Err(e) => {
        error!(
          "Dispatch of {} [{}+{}] to worker {} failed: {:#}",
          chunk.file_path, chunk.start, chunk.size, chunk.worker_id, e
        );
      }
    }
  }

  async fn mark_dispatched(&self, sent: &FileChunk) {
    let mut table = self.table.lock().await;
    if let Some(chunks) = table.get_mut(&sent.file_path) {
      for chunk in chunks.iter_mut() {
        // the detector may have reassigned the chunk while the send was in
        // flight; only promote it if the owner still matches
        if chunk.start == sent.start
          && chunk.worker_id == sent.worker_id
          && chunk.status == ChunkStatus::Pending
        {
          chunk.status = ChunkStatus::Dispatched;
        }
      }
    }
  }

  /// Mark every chunk of `file_path` owned by `worker_id` completed.
  /// Returns true when the whole file is now complete.
  pub async fn complete_chunks(&self, file_path: &str, worker_id: &str) -> bool {
    let mut table = self.table.lock().await;
    match table.get_mut(file_path) {
      Some(chunks) => {
        for chunk in chunks.iter_mut() {
          if chunk.worker_id == worker_id {
            chunk.status = ChunkStatus::Completed;
          }
        }
        chunks.iter().all(|c| c.status == ChunkStatus::Completed)
      }
      None => false,
    }
  }

  /// One recovery sweep over the chunk table. Incomplete chunks whose owner
  /// is no longer active are handed to the first active worker found (file
  /// path and byte range untouched); chunks still pending with a live owner
  /// are picked up for another dispatch attempt. Returns the chunks to send,
  /// so the caller can dispatch them without the table lock held.
  pub async fn recover_chunks(&self, policy: ReassignPolicy) -> Vec<FileChunk> {
    let workers = self.registry.active_workers().await;
    let mut to_send = Vec::new();
    let mut table = self.table.lock().await;
    for chunks in table.values_mut() {
      for chunk in chunks.iter_mut() {
        if chunk.status == ChunkStatus::Completed {
          continue;
        }
        let owner_active = workers.iter().any(|w| w.id == chunk.worker_id);
        if owner_active {
          if chunk.status == ChunkStatus::Pending {
            to_send.push(chunk.clone());
          }
          continue;
        }
        let Some(replacement) = workers.first() else {
          warn!(
            "No active worker for {} [{}+{}], leaving it pending",
            chunk.file_path, chunk.start, chunk.size
          );
          continue;
        };
        if let Some(max) = policy.max_passes {
          if chunk.passes >= max {
            warn!(
              "Chunk {} [{}+{}] exhausted {} reassignment passes",
              chunk.file_path, chunk.start, chunk.size, max
            );
            continue;
          }
        }
        info!(
          "Reassigning {} [{}+{}] from worker {} to worker {}",
          chunk.file_path, chunk.start, chunk.size, chunk.worker_id, replacement.id
        );
        chunk.worker_id = replacement.id.clone();
        chunk.callback_address = replacement.callback_address.clone();
        chunk.status = ChunkStatus::Pending;
        chunk.passes += 1;
        to_send.push(chunk.clone());
      }
    }
    to_send
  }

  /// Snapshot of the chunk table for one file.
  pub async fn chunks_for(&self, file_path: &str) -> Vec<FileChunk> {
    self
      .table
      .lock()
      .await
      .get(file_path)
      .cloned()
      .unwrap_or_default()
  }

  /// Insert a pre-built chunk set, bypassing dispatch. Used by tests and by
  /// callers that want to drive dispatch themselves.
  pub async fn track_chunks(&self, file_path: &str, chunks: Vec<FileChunk>) {
    self.table.lock().await.insert(file_path.to_string(), chunks);
  }
}

fn build_chunks(file_path: &str, file_size: u64, workers: &[WorkerRecord]) -> Vec<FileChunk> {
  partition_ranges(file_size, workers.len())
    .into_iter()
    .zip(workers)
    .map(|((start, size), worker)| FileChunk {
      worker_id: worker.id.clone(),
      callback_address: worker.callback_address.clone(),
      file_path: file_path.to_string(),
      start,
      size,
      status: ChunkStatus::Pending,
      passes: 0,
    })
    .collect()
}
