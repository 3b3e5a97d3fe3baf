//! Transport trait: the boundary between the runtime and the service API.
//!
//! ```text
//!   list_solvers() ──→ submit_problems() ──→ problem_status() ──→ problem_answer()
//!                                 │
//!                                 └──→ cancel_problems()
//! ```
//!
//! ## Method table
//!
//! | Method | Batched | Returns |
//! |--------|---------|---------|
//! | `submit_problems()` | yes | one `SubmitOutcome` per problem, in order |
//! | `problem_status()` | yes | one `ProblemStatus` per known id |
//! | `problem_answer()` | no | `SampleResult` |
//! | `cancel_problems()` | yes | at most one `CancelOutcome` per id |
//! | `list_solvers()` | - | `Vec<SolverDescriptor>` |
//! | `get_solver()` | - | `SolverDescriptor` |
//!
//! Implementations perform a single attempt per call; retries, batching and
//! scheduling belong to the runtime. Errors must be classified into
//! [`ClientError`](crate::ClientError) variants so the retry policy can tell
//! transient failures from terminal ones.

use async_trait::async_trait;

use crate::error::ClientResult;
use crate::problem::{Problem, SampleResult};
use crate::solver::SolverDescriptor;
use crate::status::{CancelOutcome, JobId, ProblemStatus, SubmitOutcome};

/// Request/response access to the solver service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a batch of problems.
    ///
    /// The response must contain exactly one outcome per problem, in request
    /// order; the runtime rejects the whole batch otherwise.
    async fn submit_problems(&self, problems: &[Problem]) -> ClientResult<Vec<SubmitOutcome>>;

    /// Fetch status records for a set of remote ids.
    ///
    /// Records may come back in any order; ids the service does not report
    /// stay outstanding and are polled again.
    async fn problem_status(&self, ids: &[JobId]) -> ClientResult<Vec<ProblemStatus>>;

    /// Fetch the answer of a completed problem whose status carried none.
    async fn problem_answer(&self, id: &JobId) -> ClientResult<SampleResult>;

    /// Request cancellation of submitted problems.
    ///
    /// Ids missing from the response were refused by the service; the
    /// runtime keeps polling them and lets the caller cancel again.
    async fn cancel_problems(&self, ids: &[JobId]) -> ClientResult<Vec<CancelOutcome>>;

    /// List the solvers available to this connection.
    async fn list_solvers(&self) -> ClientResult<Vec<SolverDescriptor>>;

    /// Fetch one solver descriptor.
    async fn get_solver(&self, id: &str) -> ClientResult<SolverDescriptor>;
}
