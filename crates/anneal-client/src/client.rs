//! Client façade.
//!
//! A [`Client`] owns one transport, a submission queue, `workers` submission
//! tasks and one poller task. Clients are independent: each has its own
//! tasks, caches and tables.
//!
//! ```text
//!   submit() ──→ SubmissionQueue ──→ Worker ──→ Transport::submit_problems
//!                                                      │
//!   ProblemFuture ←── Poller ←── JobTable ←────────────┘
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::future::ProblemFuture;
use crate::poller::Poller;
use crate::problem::Problem;
use crate::runtime::{Context, Phase};
use crate::solver::{ProblemValidator, SchemaValidator, SolverCache, SolverDescriptor};
use crate::status::JobId;
use crate::transport::Transport;
use crate::worker::Worker;

struct Tasks {
    workers: JoinSet<()>,
    poller: JoinHandle<()>,
}

/// Entry point for submitting problems and querying solvers.
///
/// Must be created inside a Tokio runtime. Call [`close`](Client::close)
/// to shut down gracefully; dropping the client aborts outstanding work
/// without a grace period.
///
/// # Example
///
/// ```ignore
/// let client = Client::new(transport, ClientConfig::default())?;
/// let future = client.submit(problem).await?;
/// let result = future.result(None).await?;
/// client.close().await;
/// ```
pub struct Client {
    ctx: Arc<Context>,
    cache: SolverCache,
    validator: Arc<dyn ProblemValidator>,
    canceller: mpsc::UnboundedSender<JobId>,
    phase: watch::Sender<Phase>,
    tasks: Mutex<Option<Tasks>>,
}

impl Client {
    /// Create a client validating problems with [`SchemaValidator`].
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> ClientResult<Self> {
        Self::with_validator(transport, config, Arc::new(SchemaValidator))
    }

    /// Create a client with a custom problem validator.
    pub fn with_validator(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        validator: Arc<dyn ProblemValidator>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let handle = Handle::try_current().map_err(|_| {
            ClientError::Configuration("client must be created inside a Tokio runtime".into())
        })?;

        let cache = SolverCache::new(config.solver_cache_ttl());
        let workers = config.workers;
        let ctx = Arc::new(Context::new(transport, config));
        let (canceller, cancels) = mpsc::unbounded_channel();
        let (phase, _) = watch::channel(Phase::Running);

        let mut worker_set = JoinSet::new();
        for index in 0..workers {
            let worker = Worker::new(index, Arc::clone(&ctx));
            worker_set.spawn_on(worker.run(phase.subscribe()), &handle);
        }
        let poller = handle.spawn(Poller::new(Arc::clone(&ctx)).run(cancels, phase.subscribe()));

        info!(
            workers,
            max_batch = ctx.config.max_batch,
            "Client started"
        );
        Ok(Self {
            ctx,
            cache,
            validator,
            canceller,
            phase,
            tasks: Mutex::new(Some(Tasks {
                workers: worker_set,
                poller,
            })),
        })
    }

    /// The configuration this client runs with.
    pub fn config(&self) -> &ClientConfig {
        &self.ctx.config
    }

    /// Remote ids of submitted problems that have not finished yet.
    pub fn outstanding_jobs(&self) -> Vec<JobId> {
        self.ctx.table.ids()
    }

    /// Number of problems waiting for submission.
    pub fn queued(&self) -> usize {
        self.ctx.queue.len()
    }

    /// Whether [`close`](Client::close) has started.
    pub fn is_closed(&self) -> bool {
        self.ctx.queue.is_closed()
    }

    /// Validate a problem and queue it for submission.
    ///
    /// Returns as soon as the problem is queued (or, with a high-water mark
    /// configured, once the queue has room). Validation errors are returned
    /// here and the problem is never queued.
    pub async fn submit(&self, problem: Problem) -> ClientResult<ProblemFuture> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let solver = self.get_solver(&problem.solver).await?;
        self.validator.validate(&solver, &problem)?;

        let deadline = self.ctx.config.problem_timeout().map(|limit| Instant::now() + limit);
        let future = ProblemFuture::new(Some(self.canceller.clone()), deadline);
        let solver_id = problem.solver.clone();
        self.ctx.queue.enqueue(problem, future.clone()).await?;
        debug!(future = %future.id(), solver = %solver_id, "Problem queued");
        Ok(future)
    }

    /// Track a problem submitted earlier, possibly by another client, by its
    /// remote id.
    ///
    /// The returned future is polled and cancellable like one returned by
    /// [`submit`](Client::submit). If this client already tracks the id, the
    /// existing future is returned.
    pub fn retrieve(&self, job_id: impl Into<JobId>) -> ClientResult<ProblemFuture> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let job_id = job_id.into();
        let deadline = self.ctx.config.problem_timeout().map(|limit| Instant::now() + limit);
        let future = ProblemFuture::new(Some(self.canceller.clone()), deadline);
        let future = self.ctx.table.adopt(&job_id, future);
        debug!(future = %future.id(), job_id = %job_id, "Tracking existing problem");
        Ok(future)
    }

    /// List available solvers, from the cache unless `refresh` is set or
    /// the cache has expired.
    pub async fn get_solvers(&self, refresh: bool) -> ClientResult<Vec<SolverDescriptor>> {
        if !refresh {
            if let Some(solvers) = self.cache.fresh() {
                return Ok(solvers.as_ref().clone());
            }
        }
        let transport = &self.ctx.transport;
        let solvers = self
            .ctx
            .config
            .retry
            .run("list_solvers", || transport.list_solvers())
            .await?;
        debug!(count = solvers.len(), "Fetched solver list");
        Ok(self.cache.store(solvers).as_ref().clone())
    }

    /// Fetch one solver descriptor, from the cache when fresh.
    pub async fn get_solver(&self, id: &str) -> ClientResult<SolverDescriptor> {
        if let Some(solver) = self.cache.fresh_solver(id) {
            return Ok(solver);
        }
        let transport = &self.ctx.transport;
        let fetched = self
            .ctx
            .config
            .retry
            .run("get_solver", || transport.get_solver(id))
            .await;
        match fetched {
            Ok(solver) => {
                self.cache.upsert(solver.clone());
                Ok(solver)
            }
            Err(ClientError::Service { status: 404, .. }) => {
                Err(ClientError::SolverNotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Shut the client down.
    ///
    /// Stops accepting submissions, lets queued and in-flight work finish
    /// within the shutdown grace period, then cancels whatever is left and
    /// waits for every background task to exit. Safe to call repeatedly and
    /// concurrently; every call returns after shutdown has completed.
    pub async fn close(&self) {
        let mut tasks = self.tasks.lock().await;
        let Some(Tasks { mut workers, poller }) = tasks.take() else {
            return;
        };
        let grace = self.ctx.config.shutdown_grace();
        let deadline = Instant::now() + grace;
        info!(grace = ?grace, queued = self.ctx.queue.len(), outstanding = self.ctx.table.len(), "Closing client");

        self.ctx.queue.close();
        self.phase.send_replace(Phase::Draining);

        let flushed = tokio::time::timeout_at(deadline, async {
            while let Some(joined) = workers.join_next().await {
                log_join_error("worker", joined);
            }
        })
        .await
        .is_ok();
        let settled = flushed
            && tokio::time::timeout_at(deadline, self.ctx.table.wait_empty())
                .await
                .is_ok();
        if !settled {
            warn!(
                queued = self.ctx.queue.len(),
                outstanding = self.ctx.table.len(),
                "Shutdown grace period elapsed; cancelling remaining work"
            );
        }

        self.phase.send_replace(Phase::Aborting);
        while let Some(joined) = workers.join_next().await {
            log_join_error("worker", joined);
        }
        log_join_error("poller", poller.await);

        for entry in self.ctx.queue.drain_remaining() {
            entry.future.cancelled();
        }
        let leftover = self.ctx.table.cancel_all();
        if !leftover.is_empty() {
            self.ctx.cancel_remote(&leftover).await;
        }
        info!("Client closed");
    }
}

fn log_join_error(task: &str, joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(task, error = %e, "Background task ended abnormally");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let Some(mut tasks) = self.tasks.get_mut().take() else {
            return;
        };
        debug!("Client dropped without close; aborting background work");
        self.ctx.queue.close();
        for entry in self.ctx.queue.drain_remaining() {
            entry.future.cancelled();
        }
        self.phase.send_replace(Phase::Aborting);
        // Tasks observe the phase change and clean up on their own.
        tasks.workers.detach_all();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("workers", &self.ctx.config.workers)
            .field("closed", &self.is_closed())
            .field("queued", &self.ctx.queue.len())
            .field("outstanding", &self.ctx.table.len())
            .finish()
    }
}
