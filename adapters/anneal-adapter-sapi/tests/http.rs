//! Transport tests against a local mock HTTP server.

use std::time::Duration;

use anneal_adapter_sapi::SapiTransport;
use anneal_client::{
    CancelOutcome, ClientError, ConnectionConfig, JobId, Problem, ProblemType, RemoteStatus,
    SubmitOutcome, Transport,
};
use mockito::{Matcher, Server};
use serde_json::json;

const TOKEN: &str = "test-token";

fn transport(server: &Server) -> SapiTransport {
    let config = ConnectionConfig::new(server.url()).with_token(TOKEN);
    SapiTransport::new(&config).unwrap()
}

fn problem() -> Problem {
    Problem::new(
        "abc123",
        ProblemType::Ising,
        json!({"lin": [1.0, -1.0], "quad": [0.5]}),
    )
    .with_param("num_reads", 100)
}

/// Test that a batch goes out as one JSON array and replies map in order.
#[tokio::test]
async fn test_submit_batch() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/problems/")
        .match_header("x-auth-token", TOKEN)
        .match_body(Matcher::Json(json!([
            {"solver": "abc123", "type": "ising", "data": {"lin": [1.0, -1.0], "quad": [0.5]}, "params": {"num_reads": 100}},
            {"solver": "abc123", "type": "ising", "data": {"lin": [1.0, -1.0], "quad": [0.5]}, "params": {"num_reads": 100}}
        ])))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {"id": "1", "status": "PENDING", "submitted_on": "2013-01-18T10:25:59.941674"},
                {"error_code": 400, "error_msg": "Missing parameter"}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let outcomes = transport(&server)
        .submit_problems(&[problem(), problem()])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(outcomes.len(), 2);
    match &outcomes[0] {
        SubmitOutcome::Accepted(status) => {
            assert_eq!(status.id, JobId::new("1"));
            assert_eq!(status.status, RemoteStatus::Pending);
            assert!(status.submitted_on.is_some());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        outcomes[1],
        SubmitOutcome::Rejected {
            code: Some(400),
            message: "Missing parameter".into()
        }
    );
}

/// Test that status polling sends every id in one query.
#[tokio::test]
async fn test_problem_status_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/problems/")
        .match_query(Matcher::UrlEncoded("id".into(), "1,2".into()))
        .with_status(200)
        .with_body(
            json!([
                {"id": "1", "status": "COMPLETED", "answer": {"energies": [-1.0]}},
                {"id": "2", "status": "IN_PROGRESS",
                 "earliest_estimated_completion": "2030-01-01T00:00:10+00:00"}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let statuses = transport(&server)
        .problem_status(&[JobId::new("1"), JobId::new("2")])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(statuses[0].status, RemoteStatus::Completed);
    assert!(statuses[0].answer.is_some());
    assert_eq!(statuses[1].status, RemoteStatus::InProgress);
    assert!(statuses[1].eta_min.is_some());
}

/// Test that the answer endpoint returns the sample payload.
#[tokio::test]
async fn test_problem_answer() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/problems/7/")
        .with_status(200)
        .with_body(
            json!({
                "id": "7",
                "status": "COMPLETED",
                "solver": "abc123",
                "solved_on": "2012-12-05T19:15:07+00:00",
                "answer": {"format": "qp", "energies": "AAAAAAAALsA="}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let result = transport(&server).problem_answer(&JobId::new("7")).await.unwrap();
    assert_eq!(result.job_id, JobId::new("7"));
    assert_eq!(result.answer["format"], "qp");
    assert_eq!(result.solver.as_deref(), Some("abc123"));
    assert!(result.solved_on.is_some());
}

/// Test that an answer request for an unfinished problem is an invalid response.
#[tokio::test]
async fn test_problem_answer_not_completed() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/problems/8/")
        .with_status(200)
        .with_body(json!({"id": "8", "status": "PENDING"}).to_string())
        .create_async()
        .await;

    let err = transport(&server)
        .problem_answer(&JobId::new("8"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse(_)));
}

/// Test that cancel sends the ids as a JSON array and maps each reply.
#[tokio::test]
async fn test_cancel_problems() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/problems/")
        .match_body(Matcher::Json(json!(["1", "2", "3"])))
        .with_status(200)
        .with_body(
            json!([
                {"id": "1", "status": "CANCELLED"},
                {"id": "2", "status": "COMPLETED"},
                {"error_code": 409, "error_msg": "already done"}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let ids = [JobId::new("1"), JobId::new("2"), JobId::new("3")];
    let outcomes = transport(&server).cancel_problems(&ids).await.unwrap();

    mock.assert_async().await;
    assert_eq!(
        outcomes,
        vec![
            CancelOutcome::Acknowledged(JobId::new("1")),
            CancelOutcome::AlreadyTerminal(JobId::new("2")),
            CancelOutcome::AlreadyTerminal(JobId::new("3")),
        ]
    );
}

/// Test that a cancel reply still reporting the job as running is not a confirmation.
#[tokio::test]
async fn test_cancel_reply_still_running() {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/problems/")
        .with_status(200)
        .with_body(
            json!([
                {"id": "5", "status": "IN_PROGRESS"},
                {"id": "6", "status": "PENDING"}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let outcomes = transport(&server)
        .cancel_problems(&[JobId::new("5"), JobId::new("6")])
        .await
        .unwrap();
    assert_eq!(
        outcomes,
        vec![
            CancelOutcome::Requested(JobId::new("5")),
            CancelOutcome::Requested(JobId::new("6")),
        ]
    );
}

/// Test that a cancel reply with fewer entries than ids is an invalid response.
#[tokio::test]
async fn test_cancel_reply_count_mismatch() {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/problems/")
        .with_status(200)
        .with_body(json!([{"id": "1", "status": "CANCELLED"}]).to_string())
        .create_async()
        .await;

    let err = transport(&server)
        .cancel_problems(&[JobId::new("1"), JobId::new("2")])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse(_)));
}

/// Test that a 409 for the whole cancel request means every job already finished.
#[tokio::test]
async fn test_cancel_conflict_status() {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/problems/")
        .with_status(409)
        .with_body("Problem already completed")
        .create_async()
        .await;

    let outcomes = transport(&server)
        .cancel_problems(&[JobId::new("4")])
        .await
        .unwrap();
    assert_eq!(outcomes, vec![CancelOutcome::AlreadyTerminal(JobId::new("4"))]);
}

/// Test that rate limiting carries the server's retry hint.
#[tokio::test]
async fn test_rate_limit_retry_after() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/problems/")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "5")
        .with_body("Too Many Requests")
        .create_async()
        .await;

    let err = transport(&server)
        .problem_status(&[JobId::new("1")])
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
}

/// Test that server errors are retryable and client errors are not.
#[tokio::test]
async fn test_error_classification() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/solvers/remote/")
        .with_status(503)
        .create_async()
        .await;
    server
        .mock("GET", "/solvers/remote/missing/")
        .with_status(404)
        .with_body("Solver not found")
        .create_async()
        .await;

    let transport = transport(&server);
    let unavailable = transport.list_solvers().await.unwrap_err();
    assert!(matches!(unavailable, ClientError::Service { status: 503, .. }));
    assert!(unavailable.is_retryable());

    let missing = transport.get_solver("missing").await.unwrap_err();
    assert!(matches!(missing, ClientError::Service { status: 404, .. }));
    assert!(!missing.is_retryable());
}

/// Test that a malformed body is an invalid response, not a network error.
#[tokio::test]
async fn test_malformed_body() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/solvers/remote/")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let err = transport(&server).list_solvers().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse(_)));
}

/// Test that solver descriptors deserialize with their schema.
#[tokio::test]
async fn test_get_solver() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/solvers/remote/abc123/")
        .with_status(200)
        .with_body(
            json!({
                "id": "abc123",
                "description": "A test solver",
                "status": "ONLINE",
                "properties": {
                    "supported_problem_types": ["ising", "qubo"],
                    "num_qubits": 3,
                    "parameters": {"num_reads": "Number of samples to return."},
                    "topology": {"type": "chimera"}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let solver = transport(&server).get_solver("abc123").await.unwrap();
    assert!(solver.is_online());
    assert!(solver.supports(ProblemType::Qubo));
    assert!(solver.accepts_parameter("num_reads"));
    assert!(solver.properties.extra.contains_key("topology"));
}

/// Test that a connection refused is a retryable network error.
#[tokio::test]
async fn test_connection_refused() {
    let config = ConnectionConfig::new("http://127.0.0.1:1").with_token(TOKEN);
    let transport = SapiTransport::new(&config).unwrap();

    let err = transport.list_solvers().await.unwrap_err();
    assert!(matches!(err, ClientError::Network { .. }));
    assert!(err.is_retryable());
}
