use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use crate::registry::MembershipRegistry;
use crate::scheduler::{ChunkScheduler, ReassignPolicy};

/// Periodically demotes workers with stale heartbeats and routes their
/// incomplete chunks back through the scheduler. Chunks that could not be
/// dispatched earlier are also retried here; there is no per-call deadline
/// anywhere else.
pub struct FailureDetector {
  registry: Arc<MembershipRegistry>,
  scheduler: Arc<ChunkScheduler>,
  check_interval: Duration,
  heartbeat_timeout: Duration,
  policy: ReassignPolicy,
}

impl FailureDetector {
  pub fn new(
    registry: Arc<MembershipRegistry>,
    scheduler: Arc<ChunkScheduler>,
    check_interval: Duration,
    heartbeat_timeout: Duration,
    policy: ReassignPolicy,
  ) -> Self {
    Self {
      registry,
      scheduler,
      check_interval,
      heartbeat_timeout,
      policy,
    }
  }

  pub async fn run(&self) {
    loop {
      tokio::time::sleep(self.check_interval).await;
      self.check_once().await;
    }
  }

  /// One detector pass: demote stale workers, then sweep the chunk table and
  /// dispatch everything the sweep handed back. Dispatch happens outside the
  /// table's critical section.
  pub async fn check_once(&self) {
    let failed = self.registry.mark_stale(self.heartbeat_timeout).await;
    if !failed.is_empty() {
      info!("Detector pass demoted workers: {:?}", failed);
    }
    let to_send = self.scheduler.recover_chunks(self.policy).await;
    for chunk in to_send {
      self.scheduler.dispatch(chunk).await;
    }
  }
}
