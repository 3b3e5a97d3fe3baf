//! Submission workers.
//!
//! Each worker repeatedly takes a batch from the queue, submits it in one
//! request (retrying transient failures) and hands the returned ids to the
//! job table. Workers stop when the queue is closed and empty, or at once
//! when the client aborts.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BatchFailurePolicy;
use crate::error::ClientError;
use crate::future::ProblemFuture;
use crate::problem::Problem;
use crate::queue::QueueEntry;
use crate::runtime::{aborted, Context, Phase};
use crate::status::{JobId, SubmitOutcome};
use crate::table::Registration;

pub(crate) struct Worker {
    index: usize,
    ctx: Arc<Context>,
}

impl Worker {
    pub(crate) fn new(index: usize, ctx: Arc<Context>) -> Self {
        Self { index, ctx }
    }

    pub(crate) async fn run(self, mut phase: watch::Receiver<Phase>) {
        let config = &self.ctx.config;
        debug!(worker = self.index, "Submission worker started");
        loop {
            let batch = tokio::select! {
                batch = self.ctx.queue.drain(config.max_batch, config.max_batch_bytes, config.max_batch_wait()) => batch,
                () = aborted(&mut phase) => break,
            };
            let Some(batch) = batch else {
                break;
            };
            let batch = self.expire_overdue(batch);
            if batch.is_empty() {
                continue;
            }
            let (problems, futures): (Vec<Problem>, Vec<ProblemFuture>) =
                batch.into_iter().map(|entry| (entry.problem, entry.future)).unzip();

            tokio::select! {
                () = self.submit_batch(&problems, &futures) => {}
                () = aborted(&mut phase) => {
                    warn!(worker = self.index, size = futures.len(), "Abandoning in-flight batch");
                    for future in &futures {
                        future.cancelled();
                    }
                    break;
                }
            }
        }

        if *phase.borrow() == Phase::Aborting {
            for entry in self.ctx.queue.drain_remaining() {
                entry.future.cancelled();
            }
        }
        debug!(worker = self.index, "Submission worker stopped");
    }

    /// Fail entries whose problem timeout passed while they were queued.
    fn expire_overdue(&self, batch: Vec<QueueEntry>) -> Vec<QueueEntry> {
        let now = Instant::now();
        let (expired, live): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|entry| entry.future.deadline().is_some_and(|deadline| deadline <= now));
        if !expired.is_empty() {
            warn!(worker = self.index, count = expired.len(), "Problem timeout exceeded before submission");
        }
        for entry in expired {
            let id = entry.future.id();
            entry.future.fail(ClientError::Timeout(format!(
                "problem {id} exceeded the problem timeout before submission"
            )));
        }
        live
    }

    async fn submit_batch(&self, problems: &[Problem], futures: &[ProblemFuture]) {
        debug!(worker = self.index, size = problems.len(), "Submitting batch");
        let transport = &self.ctx.transport;
        let submitted = self
            .ctx
            .config
            .retry
            .run("submit_problems", || transport.submit_problems(problems))
            .await;

        let outcomes = match submitted {
            Ok(outcomes) if outcomes.len() == problems.len() => outcomes,
            Ok(outcomes) => {
                let error = ClientError::InvalidResponse(format!(
                    "submission returned {} results for {} problems",
                    outcomes.len(),
                    problems.len()
                ));
                warn!(worker = self.index, error = %error, "Discarding batch");
                self.fail_all(futures, &error);
                self.ctx.cancel_remote(&accepted_ids(&outcomes)).await;
                return;
            }
            Err(error) => {
                warn!(worker = self.index, size = problems.len(), error = %error, "Batch submission failed");
                self.fail_all(futures, &error);
                return;
            }
        };

        let rejected = outcomes
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::Rejected { .. }))
            .count();
        if rejected > 0 && self.ctx.config.batch_failure_policy == BatchFailurePolicy::WholeBatch {
            self.reject_whole_batch(futures, &outcomes, rejected).await;
            return;
        }

        let mut orphans = Vec::new();
        for (future, outcome) in futures.iter().zip(outcomes) {
            match outcome {
                SubmitOutcome::Accepted(status) => {
                    if self.ctx.table.register(&status, future) == Registration::Refused
                        && !status.status.is_terminal()
                    {
                        orphans.push(status.id);
                    }
                }
                SubmitOutcome::Rejected { code, message } => {
                    debug!(worker = self.index, future = %future.id(), reason = %message, "Problem rejected");
                    future.fail(ClientError::RemoteJob {
                        job_id: None,
                        code,
                        message,
                    });
                }
            }
        }

        info!(
            worker = self.index,
            accepted = problems.len() - rejected,
            rejected,
            "Batch submitted"
        );
        if !orphans.is_empty() {
            debug!(worker = self.index, count = orphans.len(), "Cancelling problems cancelled during submission");
            self.ctx.cancel_remote(&orphans).await;
        }
    }

    /// Fail every item because at least one was rejected; cancel the accepted ones.
    async fn reject_whole_batch(
        &self,
        futures: &[ProblemFuture],
        outcomes: &[SubmitOutcome],
        rejected: usize,
    ) {
        let reason = outcomes
            .iter()
            .find_map(|o| match o {
                SubmitOutcome::Rejected { message, .. } => Some(message.clone()),
                SubmitOutcome::Accepted(_) => None,
            })
            .unwrap_or_default();
        warn!(worker = self.index, rejected, size = futures.len(), reason = %reason, "Rejecting whole batch");

        for (future, outcome) in futures.iter().zip(outcomes) {
            let error = match outcome {
                SubmitOutcome::Rejected { code, message } => ClientError::RemoteJob {
                    job_id: None,
                    code: *code,
                    message: message.clone(),
                },
                SubmitOutcome::Accepted(status) => ClientError::RemoteJob {
                    job_id: Some(status.id.to_string()),
                    code: None,
                    message: format!("batch rejected: {reason}"),
                },
            };
            future.fail(error);
        }
        self.ctx.cancel_remote(&accepted_ids(outcomes)).await;
    }

    fn fail_all(&self, futures: &[ProblemFuture], error: &ClientError) {
        for future in futures {
            future.fail(error.clone());
        }
    }
}

/// Ids of accepted, still-running problems in a submission response.
fn accepted_ids(outcomes: &[SubmitOutcome]) -> Vec<JobId> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            SubmitOutcome::Accepted(status) if !status.status.is_terminal() => Some(status.id.clone()),
            _ => None,
        })
        .collect()
}
