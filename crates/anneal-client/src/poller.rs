//! Status poller.
//!
//! A single task polls the status of every outstanding job, in chunks of
//! `max_ids_per_request`, and resolves the futures of jobs that finished.
//! The interval starts at `base_interval`, doubles after every cycle that
//! resolved nothing and resets as soon as something resolves. While the
//! table is empty the poller sleeps until a job is registered.
//!
//! Remote cancellation requests from [`ProblemFuture::cancel`] arrive over a
//! channel and are sent right away, independent of the poll interval.
//!
//! [`ProblemFuture::cancel`]: crate::ProblemFuture::cancel

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::future::Outcome;
use crate::runtime::{aborted, Context, Phase};
use crate::status::{CancelOutcome, JobId, ProblemStatus, RemoteStatus};
use crate::table::terminal_outcome;

/// Adaptive poll interval.
#[derive(Debug, Clone)]
pub(crate) struct PollSchedule {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl PollSchedule {
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    /// Feed the number of jobs a cycle resolved; returns the next interval.
    pub(crate) fn record(&mut self, resolved: usize) -> Duration {
        self.current = if resolved > 0 {
            self.base
        } else {
            self.current.saturating_mul(2).min(self.max)
        };
        self.current
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }
}

pub(crate) struct Poller {
    ctx: Arc<Context>,
}

impl Poller {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub(crate) async fn run(
        self,
        mut cancels: mpsc::UnboundedReceiver<JobId>,
        mut phase: watch::Receiver<Phase>,
    ) {
        let poll = &self.ctx.config.poll;
        let mut schedule = PollSchedule::new(poll.base_interval(), poll.max_interval());
        let mut next_poll: Option<Instant> = None;
        let mut requested: Vec<JobId> = Vec::new();
        debug!("Poller started");

        loop {
            if *phase.borrow() == Phase::Aborting {
                break;
            }
            while let Ok(id) = cancels.try_recv() {
                requested.push(id);
            }
            if !requested.is_empty() {
                let ids = std::mem::take(&mut requested);
                tokio::select! {
                    resolved = self.request_cancellation(ids) => {
                        if resolved > 0 {
                            schedule.reset();
                        }
                    }
                    () = aborted(&mut phase) => break,
                }
                continue;
            }

            if self.ctx.table.is_empty() {
                next_poll = None;
                schedule.reset();
                tokio::select! {
                    () = self.ctx.table.wait_nonempty() => {}
                    Some(id) = cancels.recv() => requested.push(id),
                    () = aborted(&mut phase) => break,
                }
                continue;
            }

            if *phase.borrow() == Phase::Draining {
                schedule.reset();
            }
            let mut due = *next_poll.get_or_insert_with(|| Instant::now() + schedule.current());
            if let Some(deadline) = self.ctx.table.next_deadline() {
                due = due.min(deadline);
            }

            tokio::select! {
                () = tokio::time::sleep_until(due) => {
                    next_poll = None;
                    tokio::select! {
                        resolved = self.poll_once() => {
                            let interval = schedule.record(resolved);
                            debug!(resolved, next = ?interval, "Poll cycle finished");
                        }
                        () = aborted(&mut phase) => break,
                    }
                }
                Some(id) = cancels.recv() => requested.push(id),
                changed = phase.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    next_poll = None;
                }
            }
        }

        let abandoned = self.ctx.table.cancel_all();
        if !abandoned.is_empty() {
            info!(count = abandoned.len(), "Cancelling outstanding jobs on shutdown");
            self.ctx.cancel_remote(&abandoned).await;
        }
        debug!("Poller stopped");
    }

    /// One poll cycle. Returns the number of futures resolved.
    async fn poll_once(&self) -> usize {
        let mut resolved = self.expire_overdue().await;
        let ids = self.ctx.table.ids();
        let transport = &self.ctx.transport;

        for chunk in ids.chunks(self.ctx.config.poll.max_ids_per_request) {
            let statuses = self
                .ctx
                .config
                .retry
                .run("problem_status", || transport.problem_status(chunk))
                .await;
            match statuses {
                Ok(statuses) => {
                    for status in statuses {
                        resolved += self.apply(status).await;
                    }
                }
                Err(e) => {
                    warn!(count = chunk.len(), error = %e, "Status poll failed; retrying next cycle");
                }
            }
        }
        resolved
    }

    /// Apply one status record. Returns 1 if it resolved a future.
    async fn apply(&self, status: ProblemStatus) -> usize {
        let Some(future) = self.ctx.table.get(&status.id) else {
            debug!(job_id = %status.id, "Ignoring status for unknown job");
            return 0;
        };
        future.mark_polling(&status);

        let outcome = match terminal_outcome(&status) {
            Some(outcome) => outcome,
            None if status.status == RemoteStatus::Completed => {
                match self.fetch_answer(&status.id).await {
                    Some(outcome) => outcome,
                    None => return 0,
                }
            }
            None => return 0,
        };
        debug!(job_id = %status.id, status = %status.status, "Job finished");
        usize::from(self.ctx.table.resolve(&status.id, outcome))
    }

    async fn fetch_answer(&self, id: &JobId) -> Option<Outcome> {
        let transport = &self.ctx.transport;
        match self
            .ctx
            .config
            .retry
            .run("problem_answer", || transport.problem_answer(id))
            .await
        {
            Ok(result) => Some(Outcome::Completed(Arc::new(result))),
            Err(e) => {
                warn!(job_id = %id, error = %e, "Answer fetch failed; retrying next cycle");
                None
            }
        }
    }

    /// Fail jobs past their problem timeout and cancel them remotely.
    async fn expire_overdue(&self) -> usize {
        let overdue = self.ctx.table.overdue(Instant::now());
        if overdue.is_empty() {
            return 0;
        }
        let mut expired = Vec::with_capacity(overdue.len());
        for id in overdue {
            let error = ClientError::Timeout(format!("job {id} exceeded the problem timeout"));
            if self.ctx.table.resolve(&id, Outcome::Failed(error)) {
                expired.push(id);
            }
        }
        warn!(count = expired.len(), "Problem timeout exceeded");
        self.ctx.cancel_remote(&expired).await;
        expired.len()
    }

    /// Send remote cancellation for jobs still outstanding. Returns the
    /// number of futures resolved as cancelled.
    ///
    /// Jobs whose request failed or was refused have their cancel request
    /// withdrawn, so a later `cancel()` sends it again.
    async fn request_cancellation(&self, mut ids: Vec<JobId>) -> usize {
        ids.sort();
        ids.dedup();
        ids.retain(|id| self.ctx.table.get(id).is_some());
        let transport = &self.ctx.transport;

        let mut resolved = 0;
        for chunk in ids.chunks(self.ctx.config.poll.max_ids_per_request) {
            let outcomes = self
                .ctx
                .config
                .retry
                .run("cancel_problems", || transport.cancel_problems(chunk))
                .await;
            let outcomes = match outcomes {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    warn!(count = chunk.len(), error = %e, "Cancellation request failed");
                    self.withdraw_cancel(chunk.iter());
                    continue;
                }
            };

            let answered: HashSet<&JobId> = outcomes.iter().map(CancelOutcome::job_id).collect();
            self.withdraw_cancel(chunk.iter().filter(|id| !answered.contains(id)));
            for outcome in &outcomes {
                match outcome {
                    CancelOutcome::Acknowledged(id) => {
                        debug!(job_id = %id, "Cancellation acknowledged");
                        if self.ctx.table.resolve(id, Outcome::Cancelled) {
                            resolved += 1;
                        }
                    }
                    CancelOutcome::Requested(id) => {
                        debug!(job_id = %id, "Cancellation pending; keeping it polled");
                    }
                    CancelOutcome::AlreadyTerminal(id) => {
                        debug!(job_id = %id, "Job already finished; keeping it polled");
                    }
                }
            }
        }
        resolved
    }

    fn withdraw_cancel<'a>(&self, ids: impl Iterator<Item = &'a JobId>) {
        for id in ids {
            if let Some(future) = self.ctx.table.get(id) {
                future.withdraw_cancel();
            }
        }
    }
}
