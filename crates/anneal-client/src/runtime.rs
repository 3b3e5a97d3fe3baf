//! State shared by the client, its submission workers and the poller.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::queue::SubmissionQueue;
use crate::status::JobId;
use crate::table::JobTable;
use crate::transport::Transport;

/// Lifecycle phase broadcast to background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Running,
    /// Queue closed; in-flight work may still finish within the grace period.
    Draining,
    /// Grace period over; tasks stop and cancel whatever they still hold.
    Aborting,
}

/// Everything one client instance owns besides its task handles.
pub(crate) struct Context {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: ClientConfig,
    pub(crate) queue: SubmissionQueue,
    pub(crate) table: JobTable,
}

impl Context {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let queue = SubmissionQueue::new(config.queue_high_water_mark);
        Self {
            transport,
            config,
            queue,
            table: JobTable::new(),
        }
    }

    /// Best-effort remote cancellation: one attempt per chunk, failures logged.
    pub(crate) async fn cancel_remote(&self, ids: &[JobId]) {
        for chunk in ids.chunks(self.config.poll.max_ids_per_request) {
            match self.transport.cancel_problems(chunk).await {
                Ok(outcomes) => debug!(count = outcomes.len(), "Remote cancellation sent"),
                Err(e) => warn!(count = chunk.len(), error = %e, "Remote cancellation failed"),
            }
        }
    }
}

/// Resolves once the phase reaches `Aborting` or the client is gone.
pub(crate) async fn aborted(phase: &mut watch::Receiver<Phase>) {
    let _ = phase.wait_for(|p| *p == Phase::Aborting).await;
}
