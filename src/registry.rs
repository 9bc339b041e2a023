use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use crate::models::{WorkerRecord, WorkerStatus};

/// Tracks known workers, their callback address and their liveness. The only
/// recovery path for a failed worker is re-registering under the same id,
/// which overwrites the old record.
pub struct MembershipRegistry {
  workers: Mutex<HashMap<String, WorkerRecord>>,
}

impl MembershipRegistry {
  pub fn new() -> Self {
    Self {
      workers: Mutex::new(HashMap::new()),
    }
  }

  /// Idempotent: re-registering an existing id resets it to active.
  pub async fn register(&self, worker_id: &str, callback_address: &str) {
    let mut workers = self.workers.lock().await;
    let replaced = workers
      .insert(
        worker_id.to_string(),
        WorkerRecord {
          id: worker_id.to_string(),
          callback_address: callback_address.to_string(),
          last_heartbeat: Instant::now(),
          status: WorkerStatus::Active,
        },
      )
      .is_some();
    if replaced {
      info!("Worker {} re-registered at {}", worker_id, callback_address);
    } else {
      info!("Worker {} registered at {}", worker_id, callback_address);
    }
  }

  /// Refresh a worker's liveness. Unknown ids are ignored; a failed worker's
  /// record is expected to be replaced by re-registration, not resumed.
  pub async fn record_heartbeat(&self, worker_id: &str) {
    let mut workers = self.workers.lock().await;
    if let Some(worker) = workers.get_mut(worker_id) {
      worker.last_heartbeat = Instant::now();
    }
  }

  /// Snapshot of every worker currently marked active.
  pub async fn active_workers(&self) -> Vec<WorkerRecord> {
    self
      .workers
      .lock()
      .await
      .values()
      .filter(|w| w.status == WorkerStatus::Active)
      .cloned()
      .collect()
  }

  /// Demote every active worker whose heartbeat age exceeds `timeout`.
  /// Returns the ids that were demoted on this pass.
  pub async fn mark_stale(&self, timeout: Duration) -> Vec<String> {
    let now = Instant::now();
    let mut workers = self.workers.lock().await;
    let mut failed = Vec::new();
    for (id, worker) in workers.iter_mut() {
      if worker.status == WorkerStatus::Active
        && now.duration_since(worker.last_heartbeat) > timeout
      {
        worker.status = WorkerStatus::Failed;
        warn!("Worker {} exceeded heartbeat timeout, marked failed", id);
        failed.push(id.clone());
      }
    }
    failed
  }

  #[cfg(test)]
  pub(crate) async fn backdate_heartbeat(&self, worker_id: &str, age: Duration) {
    let mut workers = self.workers.lock().await;
    if let Some(worker) = workers.get_mut(worker_id) {
      worker.last_heartbeat = Instant::now() - age;
    }
  }
}

impl Default for MembershipRegistry {
  fn default() -> Self {
    Self::new()
  }
}
