//! Anneal client runtime
//!
//! This crate submits optimization problems to a remote annealing service
//! and tracks them until they finish.
//!
//! # Overview
//!
//! - A [`Client`] accepts problems and returns a [`ProblemFuture`] at once
//! - Problems submitted earlier can be tracked again by remote id with
//!   [`Client::retrieve`]
//! - Submission workers group queued problems into batched requests
//! - A poller tracks outstanding jobs with adaptive backoff and resolves
//!   their futures
//! - Every remote call goes through a [`RetryPolicy`]
//! - The service itself sits behind the [`Transport`] trait
//!
//! # Transports
//!
//! | Service | Crate | Authentication |
//! |---------|-------|----------------|
//! | SAPI (REST) | `anneal-adapter-sapi` | `X-Auth-Token` header |
//!
//! # Example: Sampling a Problem
//!
//! ```ignore
//! use std::sync::Arc;
//! use anneal_client::{Client, ClientConfig, ConnectionConfig, Problem, ProblemType};
//! use anneal_adapter_sapi::SapiTransport;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connection = ConnectionConfig::new("https://cloud.example.com/sapi/v2")
//!         .with_token(std::env::var("ANNEAL_API_TOKEN")?);
//!     let client = Client::new(Arc::new(SapiTransport::new(&connection)?), ClientConfig::default())?;
//!
//!     let problem = Problem::new("abc123", ProblemType::Ising, json!({"lin": [1, -1], "quad": [0.5]}))
//!         .with_param("num_reads", 100);
//!     let future = client.submit(problem).await?;
//!
//!     let result = future.result(None).await?;
//!     println!("Answer: {}", result.answer);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Implementing a Custom Transport
//!
//! ```ignore
//! use anneal_client::{
//!     CancelOutcome, ClientResult, JobId, Problem, ProblemStatus, SampleResult,
//!     SolverDescriptor, SubmitOutcome, Transport,
//! };
//! use async_trait::async_trait;
//!
//! struct MyTransport;
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn submit_problems(&self, problems: &[Problem]) -> ClientResult<Vec<SubmitOutcome>> {
//!         // One outcome per problem, in order
//!         # todo!()
//!     }
//!
//!     async fn problem_status(&self, ids: &[JobId]) -> ClientResult<Vec<ProblemStatus>> {
//!         # todo!()
//!     }
//!
//!     async fn problem_answer(&self, id: &JobId) -> ClientResult<SampleResult> {
//!         # todo!()
//!     }
//!
//!     async fn cancel_problems(&self, ids: &[JobId]) -> ClientResult<Vec<CancelOutcome>> {
//!         # todo!()
//!     }
//!
//!     async fn list_solvers(&self) -> ClientResult<Vec<SolverDescriptor>> {
//!         # todo!()
//!     }
//!
//!     async fn get_solver(&self, id: &str) -> ClientResult<SolverDescriptor> {
//!         # todo!()
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod future;
pub mod problem;
pub mod retry;
pub mod solver;
pub mod status;
pub mod transport;

mod poller;
mod queue;
mod runtime;
mod table;
mod worker;

pub use client::Client;
pub use config::{BatchFailurePolicy, ClientConfig, ConnectionConfig, PollConfig};
pub use error::{ClientError, ClientResult, NetworkErrorKind};
pub use future::{FutureState, ProblemFuture};
pub use problem::{Problem, ProblemType, SampleResult};
pub use retry::{RetryDecision, RetryPolicy};
pub use solver::{ProblemValidator, SchemaValidator, SolverDescriptor, SolverProperties};
pub use status::{CancelOutcome, JobId, ProblemStatus, RemoteStatus, SubmitOutcome};
pub use transport::Transport;
