//! Scripted in-memory transport shared by the integration tests.
//!
//! Problem labels select how the fake service treats each problem:
//!
//! | Label | Behavior |
//! |-------|----------|
//! | none | completes on the first status poll |
//! | `slow:N` | in progress for `N` polls, then completes |
//! | `pending` | never finishes unless cancelled |
//! | `fail` | fails on the first status poll |
//! | `no-answer` | reported completed without its answer |
//! | `immediate` | already completed in the submission response |
//! | `reject` | rejected at submission |

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anneal_client::{
    CancelOutcome, Client, ClientConfig, ClientError, ClientResult, JobId, PollConfig, Problem,
    ProblemStatus, ProblemType, RemoteStatus, RetryPolicy, SampleResult, SolverDescriptor,
    SubmitOutcome, Transport,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::Instant;

pub const SOLVER: &str = "test-solver";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReply {
    Acknowledge,
    /// Taken but not carried out; the job keeps running.
    Requested,
    AlreadyTerminal,
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Complete { after_polls: usize },
    Pending,
    Fail,
    NoAnswer,
}

#[derive(Debug)]
struct Job {
    behavior: Behavior,
    polls: usize,
    cancelled: bool,
    answer: Value,
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    jobs: HashMap<JobId, Job>,
    submit_sizes: Vec<usize>,
    status_calls: Vec<(Instant, Vec<JobId>)>,
    answer_calls: Vec<JobId>,
    cancel_calls: Vec<Vec<JobId>>,
    list_calls: usize,
    get_solver_calls: usize,
    submit_failures: VecDeque<ClientError>,
    status_failures: usize,
    cancel_failures: usize,
    truncate_submissions: bool,
    submit_delay: Option<Duration>,
    cancel_reply: Option<CancelReply>,
}

/// In-memory service with scripted per-problem behavior and call recording.
pub struct MockTransport {
    solvers: Vec<SolverDescriptor>,
    state: Mutex<State>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let solver: SolverDescriptor = serde_json::from_value(json!({
            "id": SOLVER,
            "description": "Scripted test solver",
            "properties": {
                "supported_problem_types": ["ising", "qubo"],
                "num_qubits": 8,
                "parameters": {"num_reads": "Number of samples to return."}
            }
        }))
        .unwrap();
        Self {
            solvers: vec![solver],
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Fail the next submissions with these errors, in order.
    pub fn fail_submissions(&self, errors: impl IntoIterator<Item = ClientError>) {
        self.state().submit_failures.extend(errors);
    }

    /// Fail the next `n` status requests with a 503.
    pub fn fail_status_requests(&self, n: usize) {
        self.state().status_failures = n;
    }

    /// Fail the next `n` cancellation requests with a 503.
    pub fn fail_cancel_requests(&self, n: usize) {
        self.state().cancel_failures = n;
    }

    /// Create a job directly on the service, as if submitted by another client.
    pub fn seed_job(&self, label: Option<&str>) -> JobId {
        let mut state = self.state();
        match Self::accept(&mut state, &problem(label)) {
            SubmitOutcome::Accepted(status) => status.id,
            SubmitOutcome::Rejected { message, .. } => panic!("seeded job rejected: {message}"),
        }
    }

    /// Return one outcome fewer than the number of submitted problems.
    pub fn truncate_submissions(&self) {
        self.state().truncate_submissions = true;
    }

    /// Hold every submission request for `delay`.
    pub fn delay_submissions(&self, delay: Duration) {
        self.state().submit_delay = Some(delay);
    }

    pub fn reply_to_cancel(&self, reply: CancelReply) {
        self.state().cancel_reply = Some(reply);
    }

    pub fn submit_sizes(&self) -> Vec<usize> {
        self.state().submit_sizes.clone()
    }

    pub fn status_calls(&self) -> Vec<(Instant, Vec<JobId>)> {
        self.state().status_calls.clone()
    }

    pub fn answer_calls(&self) -> Vec<JobId> {
        self.state().answer_calls.clone()
    }

    pub fn cancel_calls(&self) -> usize {
        self.state().cancel_calls.len()
    }

    pub fn cancelled_ids(&self) -> Vec<JobId> {
        self.state().cancel_calls.iter().flatten().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn get_solver_calls(&self) -> usize {
        self.state().get_solver_calls
    }

    /// Total number of requests of any kind seen so far.
    pub fn total_calls(&self) -> usize {
        let state = self.state();
        state.submit_sizes.len()
            + state.status_calls.len()
            + state.answer_calls.len()
            + state.cancel_calls.len()
            + state.list_calls
            + state.get_solver_calls
    }

    fn answer_for(label: Option<&str>) -> Value {
        json!({"energies": [-1.0], "num_occurrences": [1], "label": label})
    }

    fn accept(state: &mut State, problem: &Problem) -> SubmitOutcome {
        let label = problem.label.as_deref();
        if label == Some("reject") {
            return SubmitOutcome::Rejected {
                code: Some(400),
                message: "Problem rejected by solver".to_string(),
            };
        }
        state.next_id += 1;
        let id = JobId::new(format!("job-{:03}", state.next_id));
        let answer = Self::answer_for(label);

        if label == Some("immediate") {
            return SubmitOutcome::Accepted(
                ProblemStatus::completed(id, answer).with_solver(SOLVER),
            );
        }

        let behavior = match label {
            Some("pending") => Behavior::Pending,
            Some("fail") => Behavior::Fail,
            Some("no-answer") => Behavior::NoAnswer,
            Some(l) if l.starts_with("slow:") => Behavior::Complete {
                after_polls: l["slow:".len()..].parse().unwrap(),
            },
            _ => Behavior::Complete { after_polls: 0 },
        };
        state.jobs.insert(
            id.clone(),
            Job {
                behavior,
                polls: 0,
                cancelled: false,
                answer,
            },
        );
        SubmitOutcome::Accepted(ProblemStatus::pending(id).with_solver(SOLVER))
    }

    fn status_of(id: &JobId, job: &mut Job) -> ProblemStatus {
        job.polls += 1;
        if job.cancelled {
            return ProblemStatus::cancelled(id.clone());
        }
        let status = match job.behavior {
            Behavior::Complete { after_polls } if job.polls > after_polls => {
                ProblemStatus::completed(id.clone(), job.answer.clone())
            }
            Behavior::Complete { .. } => ProblemStatus::new(id.clone(), RemoteStatus::InProgress),
            Behavior::Pending => ProblemStatus::pending(id.clone()),
            Behavior::Fail => ProblemStatus::failed(id.clone(), "An error message"),
            Behavior::NoAnswer => ProblemStatus::new(id.clone(), RemoteStatus::Completed),
        };
        status.with_solver(SOLVER)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn submit_problems(&self, problems: &[Problem]) -> ClientResult<Vec<SubmitOutcome>> {
        let delay = self.state().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.submit_sizes.push(problems.len());
        if let Some(error) = state.submit_failures.pop_front() {
            return Err(error);
        }
        let mut outcomes: Vec<_> = problems.iter().map(|p| Self::accept(&mut state, p)).collect();
        if state.truncate_submissions {
            outcomes.pop();
        }
        Ok(outcomes)
    }

    async fn problem_status(&self, ids: &[JobId]) -> ClientResult<Vec<ProblemStatus>> {
        let mut state = self.state();
        state.status_calls.push((Instant::now(), ids.to_vec()));
        if state.status_failures > 0 {
            state.status_failures -= 1;
            return Err(ClientError::service(503, "Service Unavailable"));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.jobs.get_mut(id).map(|job| Self::status_of(id, job)))
            .collect())
    }

    async fn problem_answer(&self, id: &JobId) -> ClientResult<SampleResult> {
        let mut state = self.state();
        state.answer_calls.push(id.clone());
        let job = state
            .jobs
            .get(id)
            .ok_or_else(|| ClientError::service(404, "no such problem"))?;
        Ok(SampleResult {
            job_id: id.clone(),
            solver: Some(SOLVER.to_string()),
            answer: job.answer.clone(),
            submitted_on: None,
            solved_on: None,
        })
    }

    async fn cancel_problems(&self, ids: &[JobId]) -> ClientResult<Vec<CancelOutcome>> {
        let mut state = self.state();
        state.cancel_calls.push(ids.to_vec());
        if state.cancel_failures > 0 {
            state.cancel_failures -= 1;
            return Err(ClientError::service(503, "Service Unavailable"));
        }
        let reply = state.cancel_reply.unwrap_or(CancelReply::Acknowledge);
        Ok(ids
            .iter()
            .map(|id| match reply {
                CancelReply::AlreadyTerminal => CancelOutcome::AlreadyTerminal(id.clone()),
                CancelReply::Requested => CancelOutcome::Requested(id.clone()),
                CancelReply::Acknowledge => {
                    if let Some(job) = state.jobs.get_mut(id) {
                        job.cancelled = true;
                    }
                    CancelOutcome::Acknowledged(id.clone())
                }
            })
            .collect())
    }

    async fn list_solvers(&self) -> ClientResult<Vec<SolverDescriptor>> {
        self.state().list_calls += 1;
        Ok(self.solvers.clone())
    }

    async fn get_solver(&self, id: &str) -> ClientResult<SolverDescriptor> {
        self.state().get_solver_calls += 1;
        self.solvers
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| ClientError::service(404, format!("solver {id} not found")))
    }
}

/// Short intervals and no jitter, so paused-clock tests are deterministic.
pub fn config() -> ClientConfig {
    ClientConfig {
        workers: 2,
        max_batch: 2,
        max_batch_wait_ms: 50,
        poll: PollConfig {
            base_interval_ms: 100,
            max_interval_ms: 1_000,
            max_ids_per_request: 100,
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
            max_elapsed_ms: 10_000,
            jitter: 0.0,
        },
        shutdown_grace_ms: 1_000,
        ..ClientConfig::default()
    }
}

pub fn client(mock: &Arc<MockTransport>, config: ClientConfig) -> Client {
    Client::new(Arc::clone(mock) as Arc<dyn Transport>, config).unwrap()
}

pub fn problem(label: Option<&str>) -> Problem {
    let problem = Problem::new(SOLVER, ProblemType::Ising, json!({"lin": [1.0, -1.0], "quad": [0.5]}))
        .with_param("num_reads", 10);
    match label {
        Some(label) => problem.with_label(label),
        None => problem,
    }
}
