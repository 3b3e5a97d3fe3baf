//! The future handle returned for every submitted problem.
//!
//! ```text
//!   Created ──→ Queued ──→ Submitted ──→ Polling ──→ Completed
//!                  │            │           │
//!                  │            │           ├──→ Failed(error)
//!                  │            │           │
//!                  └────────────┴───────────┴──→ Cancelled
//! ```
//!
//! **Invariants:**
//! - Transitions are monotonic; terminal states are write-once.
//! - A result exists only on `Completed`, an error only on `Failed`.
//! - Every transition wakes both async waiters and blocked threads.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::problem::SampleResult;
use crate::status::{JobId, ProblemStatus};

/// Local lifecycle state of a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FutureState {
    /// Handle created, not yet queued.
    Created,
    /// Waiting in the submission queue or in flight to the service.
    Queued,
    /// Accepted by the service; remote id assigned.
    Submitted,
    /// Included in at least one status poll.
    Polling,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled locally or remotely.
    Cancelled,
}

impl FutureState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FutureState::Completed | FutureState::Failed | FutureState::Cancelled
        )
    }
}

impl fmt::Display for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FutureState::Created => "created",
            FutureState::Queued => "queued",
            FutureState::Submitted => "submitted",
            FutureState::Polling => "polling",
            FutureState::Completed => "completed",
            FutureState::Failed => "failed",
            FutureState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal outcome stored on a future.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Completed(Arc<SampleResult>),
    Failed(ClientError),
    Cancelled,
}

impl Outcome {
    fn state(&self) -> FutureState {
        match self {
            Outcome::Completed(_) => FutureState::Completed,
            Outcome::Failed(_) => FutureState::Failed,
            Outcome::Cancelled => FutureState::Cancelled,
        }
    }

    fn to_result(&self) -> ClientResult<Arc<SampleResult>> {
        match self {
            Outcome::Completed(result) => Ok(Arc::clone(result)),
            Outcome::Failed(error) => Err(error.clone()),
            Outcome::Cancelled => Err(ClientError::Cancelled),
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    state: FutureState,
    remote_id: Option<JobId>,
    outcome: Option<Outcome>,
    cancel_requested: bool,
    submitted_at: Option<DateTime<Utc>>,
    solved_at: Option<DateTime<Utc>>,
    eta_min: Option<DateTime<Utc>>,
    eta_max: Option<DateTime<Utc>>,
}

struct Shared {
    id: Uuid,
    created_at: DateTime<Utc>,
    deadline: Option<Instant>,
    state: watch::Sender<Snapshot>,
    /// Parking spot for threads in `blocking_wait`; the mutex guards no data.
    parked: (Mutex<()>, Condvar),
    canceller: Option<mpsc::UnboundedSender<JobId>>,
}

/// Handle to one submitted problem.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Clone)]
pub struct ProblemFuture {
    shared: Arc<Shared>,
}

impl ProblemFuture {
    /// Create a future in the `Created` state.
    ///
    /// `canceller` receives remote ids of submitted problems whose
    /// cancellation is requested; `deadline` bounds the total time the
    /// problem may stay outstanding.
    pub(crate) fn new(
        canceller: Option<mpsc::UnboundedSender<JobId>>,
        deadline: Option<Instant>,
    ) -> Self {
        let (state, _) = watch::channel(Snapshot {
            state: FutureState::Created,
            remote_id: None,
            outcome: None,
            cancel_requested: false,
            submitted_at: None,
            solved_at: None,
            eta_min: None,
            eta_max: None,
        });
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                deadline,
                state,
                parked: (Mutex::new(()), Condvar::new()),
                canceller,
            }),
        }
    }

    /// Unique local id.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Current state.
    pub fn state(&self) -> FutureState {
        self.shared.state.borrow().state
    }

    /// Remote job id, once assigned.
    pub fn remote_id(&self) -> Option<JobId> {
        self.shared.state.borrow().remote_id.clone()
    }

    /// Whether a terminal state has been reached.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether remote cancellation has been requested.
    pub fn cancel_requested(&self) -> bool {
        self.shared.state.borrow().cancel_requested
    }

    /// When the handle was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.shared.created_at
    }

    /// When the service accepted the problem.
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.shared.state.borrow().submitted_at
    }

    /// When the problem reached a terminal state.
    pub fn solved_at(&self) -> Option<DateTime<Utc>> {
        self.shared.state.borrow().solved_at
    }

    /// Earliest estimated completion reported by the service.
    pub fn eta_min(&self) -> Option<DateTime<Utc>> {
        self.shared.state.borrow().eta_min
    }

    /// Latest estimated completion reported by the service.
    pub fn eta_max(&self) -> Option<DateTime<Utc>> {
        self.shared.state.borrow().eta_max
    }

    /// Wait for a terminal state and return the result.
    ///
    /// A local timeout leaves the state untouched; the remote job keeps
    /// running.
    pub async fn result(&self, timeout: Option<Duration>) -> ClientResult<Arc<SampleResult>> {
        if !self.wait(timeout).await {
            return Err(self.timeout_error(timeout));
        }
        self.terminal_result()
    }

    /// Wait for a terminal state. Returns `false` if the timeout elapsed first.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.shared.state.subscribe();
        let done = async move {
            let finished = rx.wait_for(|s| s.state.is_terminal()).await.is_ok();
            finished
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, done).await.unwrap_or(false),
            None => done.await,
        }
    }

    /// Wait until the service has assigned a remote id.
    pub async fn wait_id(&self, timeout: Option<Duration>) -> ClientResult<JobId> {
        let mut rx = self.shared.state.subscribe();
        let assigned = async move {
            let ready = rx
                .wait_for(|s| s.remote_id.is_some() || s.state.is_terminal())
                .await
                .is_ok();
            ready
        };
        let ready = match timeout {
            Some(limit) => tokio::time::timeout(limit, assigned).await.unwrap_or(false),
            None => assigned.await,
        };
        if !ready {
            return Err(self.timeout_error(timeout));
        }
        if let Some(id) = self.remote_id() {
            return Ok(id);
        }
        self.terminal_result().and_then(|_| {
            Err(ClientError::InvalidResponse(
                "problem finished without a remote id".into(),
            ))
        })
    }

    /// Blocking variant of [`result`](Self::result) for synchronous callers.
    ///
    /// Parks the calling thread; must not be called from an async task.
    pub fn blocking_result(&self, timeout: Option<Duration>) -> ClientResult<Arc<SampleResult>> {
        if !self.blocking_wait(timeout) {
            return Err(self.timeout_error(timeout));
        }
        self.terminal_result()
    }

    /// Blocking variant of [`wait`](Self::wait).
    pub fn blocking_wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|limit| std::time::Instant::now() + limit);
        let (lock, condvar) = &self.shared.parked;
        let mut guard = lock.lock().expect("future park lock poisoned");
        loop {
            if self.is_done() {
                return true;
            }
            match deadline {
                None => {
                    guard = condvar.wait(guard).expect("future park lock poisoned");
                }
                Some(deadline) => {
                    let now = std::time::Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    guard = condvar
                        .wait_timeout(guard, deadline - now)
                        .expect("future park lock poisoned")
                        .0;
                }
            }
        }
    }

    /// Cancel the problem.
    ///
    /// Before submission the future becomes `Cancelled` at once and no
    /// request is made. After submission a best-effort remote cancellation is
    /// requested and the future becomes `Cancelled` once the service confirms.
    /// If the request cannot be delivered, the future stays live and a later
    /// call sends it again. Returns `false` if the future was already terminal.
    pub fn cancel(&self) -> bool {
        let mut accepted = false;
        let mut forward = None;
        let mut finished = false;
        self.shared.state.send_if_modified(|s| match s.state {
            FutureState::Created | FutureState::Queued => {
                s.state = FutureState::Cancelled;
                s.outcome = Some(Outcome::Cancelled);
                s.solved_at = Some(Utc::now());
                accepted = true;
                finished = true;
                true
            }
            FutureState::Submitted | FutureState::Polling => {
                accepted = true;
                if s.cancel_requested {
                    return false;
                }
                s.cancel_requested = true;
                forward = s.remote_id.clone();
                true
            }
            _ => false,
        });

        if finished {
            tracing::debug!(future = %self.id(), "Cancelled before submission");
            self.wake_parked();
        }
        if let (Some(job_id), Some(canceller)) = (forward, &self.shared.canceller) {
            tracing::debug!(future = %self.id(), job_id = %job_id, "Requesting remote cancellation");
            let _ = canceller.send(job_id);
        }
        accepted
    }

    /// Forget a remote cancellation the service never received or refused.
    pub(crate) fn withdraw_cancel(&self) {
        self.shared.state.send_if_modified(|s| {
            if s.state.is_terminal() || !s.cancel_requested {
                return false;
            }
            s.cancel_requested = false;
            true
        });
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.shared.deadline
    }

    /// `Created → Queued`.
    pub(crate) fn mark_queued(&self) -> bool {
        self.shared.state.send_if_modified(|s| {
            if s.state != FutureState::Created {
                return false;
            }
            s.state = FutureState::Queued;
            true
        })
    }

    /// Assign the remote id: `Created | Queued → Submitted`.
    ///
    /// Returns `false` if the future was cancelled in the meantime.
    pub(crate) fn mark_submitted(&self, status: &ProblemStatus) -> bool {
        self.shared.state.send_if_modified(|s| {
            if !matches!(s.state, FutureState::Created | FutureState::Queued) {
                return false;
            }
            s.state = FutureState::Submitted;
            s.remote_id = Some(status.id.clone());
            s.submitted_at = Some(status.submitted_on.unwrap_or_else(Utc::now));
            s.eta_min = status.eta_min;
            s.eta_max = status.eta_max;
            true
        })
    }

    /// `Submitted → Polling`, refreshing completion estimates.
    pub(crate) fn mark_polling(&self, status: &ProblemStatus) {
        self.shared.state.send_if_modified(|s| {
            if s.state.is_terminal() {
                return false;
            }
            let before = (s.state, s.eta_min, s.eta_max);
            s.state = FutureState::Polling;
            if status.eta_min.is_some() || status.eta_max.is_some() {
                s.eta_min = status.eta_min;
                s.eta_max = status.eta_max;
            }
            before != (s.state, s.eta_min, s.eta_max)
        });
    }

    /// Move to a terminal state. Returns `false` if already terminal.
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        let changed = self.shared.state.send_if_modified(|s| {
            if s.state.is_terminal() {
                return false;
            }
            s.state = outcome.state();
            s.solved_at = Some(match &outcome {
                Outcome::Completed(result) => result.solved_on.unwrap_or_else(Utc::now),
                _ => Utc::now(),
            });
            s.outcome = Some(outcome);
            true
        });
        if changed {
            self.wake_parked();
        }
        changed
    }

    #[cfg(test)]
    pub(crate) fn complete(&self, result: SampleResult) -> bool {
        self.resolve(Outcome::Completed(Arc::new(result)))
    }

    pub(crate) fn fail(&self, error: ClientError) -> bool {
        self.resolve(Outcome::Failed(error))
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.resolve(Outcome::Cancelled)
    }

    fn terminal_result(&self) -> ClientResult<Arc<SampleResult>> {
        match &self.shared.state.borrow().outcome {
            Some(outcome) => outcome.to_result(),
            None => Err(ClientError::InvalidResponse(
                "future has no outcome".into(),
            )),
        }
    }

    fn timeout_error(&self, timeout: Option<Duration>) -> ClientError {
        ClientError::Timeout(format!(
            "problem {} not finished within {:?}",
            self.id(),
            timeout.unwrap_or_default()
        ))
    }

    fn wake_parked(&self) {
        let (lock, condvar) = &self.shared.parked;
        let _guard = lock.lock().expect("future park lock poisoned");
        condvar.notify_all();
    }
}

impl fmt::Debug for ProblemFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.shared.state.borrow();
        f.debug_struct("ProblemFuture")
            .field("id", &self.shared.id)
            .field("state", &snapshot.state)
            .field("remote_id", &snapshot.remote_id)
            .field("cancel_requested", &snapshot.cancel_requested)
            .finish()
    }
}
