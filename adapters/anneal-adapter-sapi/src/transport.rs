//! [`Transport`] implementation over the SAPI REST API.

use anneal_client::{
    CancelOutcome, ClientError, ClientResult, ConnectionConfig, JobId, Problem, ProblemStatus,
    RemoteStatus, SampleResult, SolverDescriptor, SubmitOutcome, Transport,
};
use async_trait::async_trait;
use tracing::warn;

use crate::api::{ProblemReply, SapiClient};
use crate::error::{SapiError, SapiResult};

/// Error code SAPI uses for operations on problems that already finished.
const ALREADY_TERMINAL: u16 = 409;

/// SAPI transport.
#[derive(Debug)]
pub struct SapiTransport {
    client: SapiClient,
}

impl SapiTransport {
    /// Create a transport for the given connection.
    pub fn new(config: &ConnectionConfig) -> SapiResult<Self> {
        Ok(Self {
            client: SapiClient::new(config)?,
        })
    }

    /// Base URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        self.client.base_url()
    }

    fn submit_outcome(reply: ProblemReply) -> SubmitOutcome {
        match reply {
            ProblemReply::Status(record) => SubmitOutcome::Accepted(record.into_status()),
            ProblemReply::Error(err) => SubmitOutcome::Rejected {
                code: Some(err.error_code),
                message: err.error_msg,
            },
        }
    }

    /// `None` when the service returned an error other than "already finished".
    fn cancel_outcome(requested: &JobId, reply: ProblemReply) -> Option<CancelOutcome> {
        match reply {
            ProblemReply::Status(record) => {
                let status = record.status;
                let id = JobId::new(record.id);
                Some(match status {
                    RemoteStatus::Cancelled => CancelOutcome::Acknowledged(id),
                    RemoteStatus::Completed | RemoteStatus::Failed => {
                        CancelOutcome::AlreadyTerminal(id)
                    }
                    RemoteStatus::Pending | RemoteStatus::InProgress => {
                        CancelOutcome::Requested(id)
                    }
                })
            }
            ProblemReply::Error(err) if err.error_code == ALREADY_TERMINAL => {
                Some(CancelOutcome::AlreadyTerminal(requested.clone()))
            }
            ProblemReply::Error(err) => {
                warn!(
                    job_id = %requested,
                    code = err.error_code,
                    "Cancel refused: {}",
                    err.error_msg
                );
                None
            }
        }
    }
}

#[async_trait]
impl Transport for SapiTransport {
    async fn submit_problems(&self, problems: &[Problem]) -> ClientResult<Vec<SubmitOutcome>> {
        let replies = self.client.submit_problems(problems).await?;
        Ok(replies.into_iter().map(Self::submit_outcome).collect())
    }

    async fn problem_status(&self, ids: &[JobId]) -> ClientResult<Vec<ProblemStatus>> {
        let records = self.client.problem_status(ids).await?;
        Ok(records.into_iter().map(|r| r.into_status()).collect())
    }

    async fn problem_answer(&self, id: &JobId) -> ClientResult<SampleResult> {
        let record = self.client.problem(id).await?;
        if record.status != RemoteStatus::Completed {
            return Err(SapiError::UnexpectedResponse(format!(
                "problem {id} is {}, not COMPLETED",
                record.status
            ))
            .into());
        }
        let answer = record.answer.ok_or_else(|| {
            ClientError::InvalidResponse(format!("problem {id} completed without an answer"))
        })?;

        Ok(SampleResult {
            job_id: JobId::new(record.id),
            solver: record.solver,
            answer,
            submitted_on: record.submitted_on,
            solved_on: record.solved_on,
        })
    }

    async fn cancel_problems(&self, ids: &[JobId]) -> ClientResult<Vec<CancelOutcome>> {
        match self.client.cancel_problems(ids).await {
            Ok(replies) if replies.len() != ids.len() => Err(ClientError::InvalidResponse(format!(
                "cancellation returned {} results for {} problems",
                replies.len(),
                ids.len()
            ))),
            Ok(replies) => Ok(ids
                .iter()
                .zip(replies)
                .filter_map(|(id, reply)| Self::cancel_outcome(id, reply))
                .collect()),
            Err(SapiError::ApiError {
                status: ALREADY_TERMINAL,
                ..
            }) => Ok(ids.iter().cloned().map(CancelOutcome::AlreadyTerminal).collect()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_solvers(&self) -> ClientResult<Vec<SolverDescriptor>> {
        Ok(self.client.list_solvers().await?)
    }

    async fn get_solver(&self, id: &str) -> ClientResult<SolverDescriptor> {
        Ok(self.client.solver(id).await?)
    }
}
