//! Outstanding job table.
//!
//! Maps remote ids to the futures waiting on them. The table holds an entry
//! exactly while its future is submitted and not yet terminal: every insert
//! and removal changes the future's state under the same lock.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::ClientError;
use crate::future::{Outcome, ProblemFuture};
use crate::problem::SampleResult;
use crate::status::{JobId, ProblemStatus, RemoteStatus};

/// Result of registering a submission response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    /// Now outstanding; the poller takes over.
    Outstanding,
    /// The response was already terminal; the future is resolved.
    Settled,
    /// The future was cancelled before the id arrived; the remote job is orphaned.
    Refused,
}

/// Map a status record to a terminal outcome.
///
/// Returns `None` for non-terminal records and for completed records that
/// arrived without their answer.
pub(crate) fn terminal_outcome(status: &ProblemStatus) -> Option<Outcome> {
    match status.status {
        RemoteStatus::Pending | RemoteStatus::InProgress => None,
        RemoteStatus::Completed => status.answer.as_ref().map(|answer| {
            Outcome::Completed(Arc::new(SampleResult {
                job_id: status.id.clone(),
                solver: status.solver.clone(),
                answer: answer.clone(),
                submitted_on: status.submitted_on,
                solved_on: status.solved_on,
            }))
        }),
        RemoteStatus::Failed => Some(Outcome::Failed(ClientError::RemoteJob {
            job_id: Some(status.id.to_string()),
            code: None,
            message: status
                .error_message
                .clone()
                .unwrap_or_else(|| "problem failed without a reason".to_string()),
        })),
        RemoteStatus::Cancelled => Some(Outcome::Cancelled),
    }
}

#[derive(Debug, Default)]
pub(crate) struct JobTable {
    jobs: Mutex<FxHashMap<JobId, ProblemFuture>>,
    added: Notify,
    emptied: Notify,
}

impl JobTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attach a submission response to its future.
    pub(crate) fn register(&self, status: &ProblemStatus, future: &ProblemFuture) -> Registration {
        let registration = {
            let mut jobs = self.jobs.lock().expect("job table lock poisoned");
            if !future.mark_submitted(status) {
                return Registration::Refused;
            }
            match terminal_outcome(status) {
                Some(outcome) => {
                    future.resolve(outcome);
                    Registration::Settled
                }
                None => {
                    jobs.insert(status.id.clone(), future.clone());
                    Registration::Outstanding
                }
            }
        };
        if registration == Registration::Outstanding {
            self.added.notify_waiters();
        }
        registration
    }

    /// Track a job that was submitted elsewhere.
    ///
    /// Returns the future already tracking `id` if there is one, otherwise
    /// `future` moved to `Submitted`.
    pub(crate) fn adopt(&self, id: &JobId, future: ProblemFuture) -> ProblemFuture {
        let adopted = {
            let mut jobs = self.jobs.lock().expect("job table lock poisoned");
            if let Some(existing) = jobs.get(id) {
                return existing.clone();
            }
            future.mark_submitted(&ProblemStatus::pending(id.clone()));
            jobs.insert(id.clone(), future.clone());
            future
        };
        self.added.notify_waiters();
        adopted
    }

    /// Remove a job and resolve its future. Returns `false` for unknown ids.
    pub(crate) fn resolve(&self, id: &JobId, outcome: Outcome) -> bool {
        let now_empty = {
            let mut jobs = self.jobs.lock().expect("job table lock poisoned");
            let Some(future) = jobs.remove(id) else {
                return false;
            };
            future.resolve(outcome);
            jobs.is_empty()
        };
        if now_empty {
            self.emptied.notify_waiters();
        }
        true
    }

    pub(crate) fn get(&self, id: &JobId) -> Option<ProblemFuture> {
        self.jobs.lock().expect("job table lock poisoned").get(id).cloned()
    }

    /// Outstanding ids in a stable order.
    pub(crate) fn ids(&self) -> Vec<JobId> {
        let jobs = self.jobs.lock().expect("job table lock poisoned");
        let mut ids: Vec<_> = jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids whose problem timeout has passed.
    pub(crate) fn overdue(&self, now: Instant) -> Vec<JobId> {
        let jobs = self.jobs.lock().expect("job table lock poisoned");
        jobs.iter()
            .filter(|(_, future)| future.deadline().is_some_and(|deadline| deadline <= now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Earliest problem timeout among outstanding jobs.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        let jobs = self.jobs.lock().expect("job table lock poisoned");
        jobs.values().filter_map(ProblemFuture::deadline).min()
    }

    /// Remove every job, resolving each future as cancelled.
    pub(crate) fn cancel_all(&self) -> Vec<JobId> {
        let drained: Vec<_> = {
            let mut jobs = self.jobs.lock().expect("job table lock poisoned");
            jobs.drain()
                .map(|(id, future)| {
                    future.cancelled();
                    id
                })
                .collect()
        };
        self.emptied.notify_waiters();
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.lock().expect("job table lock poisoned").len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry maps its remote id to a non-terminal future carrying that id.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let jobs = self.jobs.lock().expect("job table lock poisoned");
        jobs.iter().all(|(id, future)| {
            !future.is_done() && future.remote_id().as_ref() == Some(id)
        })
    }

    pub(crate) async fn wait_nonempty(&self) {
        loop {
            let added = self.added.notified();
            if !self.is_empty() {
                return;
            }
            added.await;
        }
    }

    pub(crate) async fn wait_empty(&self) {
        loop {
            let emptied = self.emptied.notified();
            if self.is_empty() {
                return;
            }
            emptied.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::FutureState;
    use serde_json::json;

    fn queued() -> ProblemFuture {
        let future = ProblemFuture::new(None, None);
        future.mark_queued();
        future
    }

    #[test]
    fn test_register_and_resolve() {
        let table = JobTable::new();
        let a = queued();
        let b = queued();

        assert_eq!(table.register(&ProblemStatus::pending("a"), &a), Registration::Outstanding);
        assert_eq!(table.register(&ProblemStatus::pending("b"), &b), Registration::Outstanding);
        assert_eq!(table.ids(), vec![JobId::new("a"), JobId::new("b")]);
        assert!(table.is_consistent());

        assert!(table.resolve(&JobId::new("a"), Outcome::Cancelled));
        assert!(!table.resolve(&JobId::new("a"), Outcome::Cancelled));
        assert_eq!(a.state(), FutureState::Cancelled);
        assert_eq!(table.ids(), vec![JobId::new("b")]);
        assert!(table.is_consistent());
    }

    #[test]
    fn test_adopt_existing_id_returns_tracking_future() {
        let table = JobTable::new();
        let tracked = queued();
        table.register(&ProblemStatus::pending("a"), &tracked);

        let adopted = table.adopt(&JobId::new("a"), ProblemFuture::new(None, None));
        assert_eq!(adopted.id(), tracked.id());

        let fresh = table.adopt(&JobId::new("b"), ProblemFuture::new(None, None));
        assert_eq!(fresh.state(), FutureState::Submitted);
        assert_eq!(fresh.remote_id(), Some(JobId::new("b")));
        assert_eq!(table.ids(), vec![JobId::new("a"), JobId::new("b")]);
        assert!(table.is_consistent());
    }

    #[test]
    fn test_terminal_submission_settles_immediately() {
        let table = JobTable::new();
        let done = queued();
        let failed = queued();

        let status = ProblemStatus::completed("c", json!({"energies": [-1.0]}));
        assert_eq!(table.register(&status, &done), Registration::Settled);
        assert_eq!(
            table.register(&ProblemStatus::failed("f", "An error message"), &failed),
            Registration::Settled
        );

        assert!(table.is_empty());
        assert_eq!(done.state(), FutureState::Completed);
        assert_eq!(done.remote_id(), Some(JobId::new("c")));
        assert_eq!(failed.state(), FutureState::Failed);
    }

    #[test]
    fn test_completed_without_answer_stays_outstanding() {
        let table = JobTable::new();
        let future = queued();
        let status = ProblemStatus::new("c", RemoteStatus::Completed);
        assert_eq!(table.register(&status, &future), Registration::Outstanding);
        assert_eq!(future.state(), FutureState::Submitted);
    }

    #[test]
    fn test_register_refuses_cancelled_future() {
        let table = JobTable::new();
        let future = queued();
        future.cancel();
        assert_eq!(table.register(&ProblemStatus::pending("x"), &future), Registration::Refused);
        assert!(table.is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let table = JobTable::new();
        let futures: Vec<_> = (0..3).map(|_| queued()).collect();
        for (n, future) in futures.iter().enumerate() {
            table.register(&ProblemStatus::pending(format!("job-{n}")), future);
        }
        assert_eq!(table.cancel_all().len(), 3);
        assert!(table.is_empty());
        assert!(futures.iter().all(|f| f.state() == FutureState::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_and_next_deadline() {
        let table = JobTable::new();
        let soon = ProblemFuture::new(None, Some(Instant::now() + std::time::Duration::from_secs(5)));
        let never = ProblemFuture::new(None, None);
        table.register(&ProblemStatus::pending("soon"), &soon);
        table.register(&ProblemStatus::pending("never"), &never);

        assert!(table.overdue(Instant::now()).is_empty());
        assert_eq!(table.next_deadline(), soon.deadline());

        tokio::time::advance(std::time::Duration::from_secs(6)).await;
        assert_eq!(table.overdue(Instant::now()), vec![JobId::new("soon")]);
    }

    #[tokio::test]
    async fn test_wait_empty_and_nonempty() {
        let table = Arc::new(JobTable::new());
        table.wait_empty().await;

        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.wait_nonempty().await })
        };
        tokio::task::yield_now().await;
        table.register(&ProblemStatus::pending("a"), &queued());
        waiter.await.unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.wait_empty().await })
        };
        tokio::task::yield_now().await;
        table.resolve(&JobId::new("a"), Outcome::Cancelled);
        waiter.await.unwrap();
    }
}
