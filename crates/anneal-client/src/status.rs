//! Remote job identifiers and the status records the service reports.
//!
//! The remote state machine:
//!
//! ```text
//!   submit ──→ Pending ──→ InProgress ──→ Completed
//!                 │            │
//!                 │            ├──→ Failed(reason)
//!                 │            │
//!                 └────────────┴──→ Cancelled
//! ```
//!
//! Terminal states are permanent; a status record never moves backward.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote identifier assigned to a problem by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a problem as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    /// Accepted and waiting in the solver queue.
    Pending,
    /// Currently executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl RemoteStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteStatus::Completed | RemoteStatus::Failed | RemoteStatus::Cancelled
        )
    }

    /// Check if the problem is still pending (queued or running).
    pub fn is_pending(&self) -> bool {
        matches!(self, RemoteStatus::Pending | RemoteStatus::InProgress)
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Pending => write!(f, "PENDING"),
            RemoteStatus::InProgress => write!(f, "IN_PROGRESS"),
            RemoteStatus::Completed => write!(f, "COMPLETED"),
            RemoteStatus::Failed => write!(f, "FAILED"),
            RemoteStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One status record, as returned by submission and status requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemStatus {
    /// Remote job id.
    pub id: JobId,
    /// Reported status.
    pub status: RemoteStatus,
    /// Solver the problem runs on.
    pub solver: Option<String>,
    /// When the service accepted the problem.
    pub submitted_on: Option<DateTime<Utc>>,
    /// When the service finished the problem.
    pub solved_on: Option<DateTime<Utc>>,
    /// Earliest estimated completion.
    pub eta_min: Option<DateTime<Utc>>,
    /// Latest estimated completion.
    pub eta_max: Option<DateTime<Utc>>,
    /// Answer payload; only present on some completed records.
    pub answer: Option<serde_json::Value>,
    /// Failure reason for failed records.
    pub error_message: Option<String>,
}

impl ProblemStatus {
    /// Create a record with the given status and no metadata.
    pub fn new(id: impl Into<JobId>, status: RemoteStatus) -> Self {
        Self {
            id: id.into(),
            status,
            solver: None,
            submitted_on: None,
            solved_on: None,
            eta_min: None,
            eta_max: None,
            answer: None,
            error_message: None,
        }
    }

    /// A pending record.
    pub fn pending(id: impl Into<JobId>) -> Self {
        Self::new(id, RemoteStatus::Pending)
    }

    /// A completed record carrying its answer.
    pub fn completed(id: impl Into<JobId>, answer: serde_json::Value) -> Self {
        Self::new(id, RemoteStatus::Completed).with_answer(answer)
    }

    /// A failed record.
    pub fn failed(id: impl Into<JobId>, message: impl Into<String>) -> Self {
        let mut status = Self::new(id, RemoteStatus::Failed);
        status.error_message = Some(message.into());
        status
    }

    /// A cancelled record.
    pub fn cancelled(id: impl Into<JobId>) -> Self {
        Self::new(id, RemoteStatus::Cancelled)
    }

    /// Attach an answer payload.
    pub fn with_answer(mut self, answer: serde_json::Value) -> Self {
        self.answer = Some(answer);
        self
    }

    /// Attach completion estimates.
    pub fn with_eta(mut self, eta_min: Option<DateTime<Utc>>, eta_max: Option<DateTime<Utc>>) -> Self {
        self.eta_min = eta_min;
        self.eta_max = eta_max;
        self
    }

    /// Attach the solver name.
    pub fn with_solver(mut self, solver: impl Into<String>) -> Self {
        self.solver = Some(solver.into());
        self
    }
}

/// Per-problem outcome of a batched submission request.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The service accepted the problem and reports its current status.
    Accepted(ProblemStatus),
    /// The service rejected the problem outright.
    Rejected {
        /// Error code reported by the service.
        code: Option<u16>,
        /// Rejection reason.
        message: String,
    },
}

/// Per-job outcome of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The service cancelled the job.
    Acknowledged(JobId),
    /// The service took the request but the job is still pending or running;
    /// polling reports whether it ends cancelled or finishes anyway.
    Requested(JobId),
    /// The job had already finished; its real status arrives through polling.
    AlreadyTerminal(JobId),
}

impl CancelOutcome {
    /// The job this outcome refers to.
    pub fn job_id(&self) -> &JobId {
        match self {
            CancelOutcome::Acknowledged(id)
            | CancelOutcome::Requested(id)
            | CancelOutcome::AlreadyTerminal(id) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_terminal() {
        assert!(!RemoteStatus::Pending.is_terminal());
        assert!(!RemoteStatus::InProgress.is_terminal());
        assert!(RemoteStatus::Completed.is_terminal());
        assert!(RemoteStatus::Failed.is_terminal());
        assert!(RemoteStatus::Cancelled.is_terminal());
        assert!(RemoteStatus::InProgress.is_pending());
    }

    #[test]
    fn test_remote_status_wire_names() {
        let status: RemoteStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(status, RemoteStatus::InProgress);
        assert_eq!(serde_json::to_string(&RemoteStatus::Cancelled).unwrap(), "\"CANCELLED\"");
    }

    #[test]
    fn test_status_builders() {
        let failed = ProblemStatus::failed("123", "An error message");
        assert_eq!(failed.id, JobId::new("123"));
        assert_eq!(failed.status, RemoteStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("An error message"));

        let done = ProblemStatus::completed("7", serde_json::json!({"energies": [-3.0]}));
        assert!(done.answer.is_some());
        assert_eq!(done.id.to_string(), "7");
    }
}
