//! Submission queue feeding the worker pool.
//!
//! FIFO of `(problem, future)` pairs. Workers take batches bounded by item
//! count and encoded size; a partial batch waits up to `max_wait` for
//! batch-mates. Entries whose future was cancelled while queued are dropped
//! on the next drain.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::{ClientError, ClientResult};
use crate::future::ProblemFuture;
use crate::problem::Problem;

/// One queued problem and the future that reports on it.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    pub(crate) problem: Problem,
    pub(crate) future: ProblemFuture,
    encoded_len: usize,
    /// Slot below the high-water mark, released when the entry leaves the queue.
    permit: Option<OwnedSemaphorePermit>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<QueueEntry>,
    closed: bool,
}

impl Inner {
    fn discard_cancelled(&mut self) {
        self.entries.retain(|entry| !entry.future.is_done());
    }

    fn encoded_len(&self) -> usize {
        self.entries.iter().map(|entry| entry.encoded_len).sum()
    }

    /// Pop a batch from the front. The first entry is always taken, even if
    /// it alone exceeds `max_bytes`.
    fn take_batch(&mut self, max_batch: usize, max_bytes: usize) -> Vec<QueueEntry> {
        let mut batch = Vec::new();
        let mut bytes = 0usize;
        while batch.len() < max_batch {
            let Some(front) = self.entries.front() else {
                break;
            };
            if !batch.is_empty() && bytes + front.encoded_len > max_bytes {
                break;
            }
            let Some(mut entry) = self.entries.pop_front() else {
                break;
            };
            bytes += entry.encoded_len;
            entry.permit = None;
            batch.push(entry);
        }
        batch
    }
}

/// Multi-producer, multi-consumer FIFO with optional backpressure.
#[derive(Debug)]
pub(crate) struct SubmissionQueue {
    inner: Mutex<Inner>,
    available: Notify,
    capacity: Option<Arc<Semaphore>>,
}

impl SubmissionQueue {
    /// Create a queue; `high_water_mark` bounds its length.
    pub(crate) fn new(high_water_mark: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: Notify::new(),
            capacity: high_water_mark.map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    /// Append a problem. Waits for space when a high-water mark is set.
    pub(crate) async fn enqueue(&self, problem: Problem, future: ProblemFuture) -> ClientResult<()> {
        let permit = match &self.capacity {
            Some(capacity) => Some(
                Arc::clone(capacity)
                    .acquire_owned()
                    .await
                    .map_err(|_| ClientError::Closed)?,
            ),
            None => None,
        };
        {
            let mut inner = self.inner.lock().expect("submission queue lock poisoned");
            if inner.closed {
                return Err(ClientError::Closed);
            }
            future.mark_queued();
            inner.entries.push_back(QueueEntry {
                encoded_len: problem.encoded_len(),
                problem,
                future,
                permit,
            });
        }
        self.available.notify_waiters();
        Ok(())
    }

    /// Wait for the next batch.
    ///
    /// A batch is released when it is full (by count or bytes), when the
    /// oldest waiting entry has waited `max_wait`, or when the queue is
    /// closed. Returns `None` once the queue is closed and empty.
    ///
    /// Entries leave the queue only in the final synchronous step, so
    /// dropping this future never loses work.
    pub(crate) async fn drain(
        &self,
        max_batch: usize,
        max_bytes: usize,
        max_wait: Duration,
    ) -> Option<Vec<QueueEntry>> {
        let mut deadline: Option<Instant> = None;
        loop {
            let notified = self.available.notified();
            {
                let mut inner = self.inner.lock().expect("submission queue lock poisoned");
                inner.discard_cancelled();
                let count = inner.entries.len();
                if count == 0 {
                    if inner.closed {
                        return None;
                    }
                    deadline = None;
                } else {
                    let due = *deadline.get_or_insert_with(|| Instant::now() + max_wait);
                    let ready = count >= max_batch
                        || inner.encoded_len() >= max_bytes
                        || inner.closed
                        || Instant::now() >= due;
                    if ready {
                        return Some(inner.take_batch(max_batch, max_bytes));
                    }
                }
            }
            match deadline {
                Some(due) => {
                    let _ = tokio::time::timeout_at(due, notified).await;
                }
                None => notified.await,
            }
        }
    }

    /// Remove every entry, live or not.
    pub(crate) fn drain_remaining(&self) -> Vec<QueueEntry> {
        let mut inner = self.inner.lock().expect("submission queue lock poisoned");
        inner.entries.drain(..).collect()
    }

    /// Refuse further pushes and wake every waiting worker.
    pub(crate) fn close(&self) {
        {
            let mut inner = self.inner.lock().expect("submission queue lock poisoned");
            inner.closed = true;
        }
        if let Some(capacity) = &self.capacity {
            capacity.close();
        }
        self.available.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().expect("submission queue lock poisoned").closed
    }

    /// Number of queued entries, including cancelled ones not yet discarded.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().expect("submission queue lock poisoned").entries.len()
    }
}
