//! Client and connection configuration.
//!
//! Configuration is resolved by the caller (file discovery and environment
//! precedence live outside this crate). All structs deserialize with serde
//! defaults, so a partial YAML or JSON document is enough:
//!
//! ```yaml
//! workers: 5
//! max_batch: 20
//! poll:
//!   base_interval_ms: 1000
//! retry:
//!   max_attempts: 8
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::retry::RetryPolicy;

/// Connection descriptor for one service endpoint.
///
/// Immutable for the lifetime of a client; rotating credentials means
/// building a new client.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the service API.
    pub endpoint: String,
    /// API token.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Optional HTTP(S) proxy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Override for the `User-Agent` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ConnectionConfig {
    /// Create a connection descriptor with default timeouts.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            proxy: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            user_agent: None,
        }
    }

    /// Set the API token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Route requests through a proxy.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whole-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"[REDACTED]")
            .field("proxy", &self.proxy)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// What happens to a batch when the service rejects some of its items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Fail only the rejected items; accepted items proceed normally.
    #[default]
    PerItem,
    /// Fail every item of the batch; accepted items are cancelled remotely.
    WholeBatch,
}

/// Status polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Interval between polls while jobs keep resolving
    #[serde(default = "default_poll_base")]
    pub base_interval_ms: u64,
    /// Upper bound for the idle back-off interval
    #[serde(default = "default_poll_max")]
    pub max_interval_ms: u64,
    /// Maximum job ids per status request
    #[serde(default = "default_ids_per_request")]
    pub max_ids_per_request: usize,
}

impl PollConfig {
    /// Base polling interval.
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    /// Maximum polling interval.
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_poll_base(),
            max_interval_ms: default_poll_max(),
            max_ids_per_request: default_ids_per_request(),
        }
    }
}

/// Runtime configuration of a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Number of submission workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum problems per submission request
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Maximum encoded bytes per submission request (a single larger problem is still sent)
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
    /// How long a partial batch waits for batch-mates
    #[serde(default = "default_max_batch_wait")]
    pub max_batch_wait_ms: u64,
    /// Queue length at which `submit` starts waiting for space
    #[serde(default)]
    pub queue_high_water_mark: Option<usize>,
    /// Rejection policy for partially accepted batches
    #[serde(default)]
    pub batch_failure_policy: BatchFailurePolicy,
    /// Polling settings
    #[serde(default)]
    pub poll: PollConfig,
    /// Retry settings for every remote call
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Solver descriptor cache lifetime
    #[serde(default = "default_solver_ttl")]
    pub solver_cache_ttl_ms: u64,
    /// Caller-visible total timeout per problem, measured from `submit`.
    /// Queued problems past it fail when a worker picks them up, without a
    /// request; problems in flight fail once the service has replied
    #[serde(default)]
    pub problem_timeout_ms: Option<u64>,
    /// Grace period for in-flight work on `close()`
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_batch: default_max_batch(),
            max_batch_bytes: default_max_batch_bytes(),
            max_batch_wait_ms: default_max_batch_wait(),
            queue_high_water_mark: None,
            batch_failure_policy: BatchFailurePolicy::default(),
            poll: PollConfig::default(),
            retry: RetryPolicy::default(),
            solver_cache_ttl_ms: default_solver_ttl(),
            problem_timeout_ms: None,
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl ClientConfig {
    /// Partial-batch wait.
    pub fn max_batch_wait(&self) -> Duration {
        Duration::from_millis(self.max_batch_wait_ms)
    }

    /// Solver cache lifetime.
    pub fn solver_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.solver_cache_ttl_ms)
    }

    /// Per-problem total timeout.
    pub fn problem_timeout(&self) -> Option<Duration> {
        self.problem_timeout_ms.map(Duration::from_millis)
    }

    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Reject configurations the runtime cannot operate with.
    pub fn validate(&self) -> ClientResult<()> {
        if self.workers == 0 {
            return Err(ClientError::Configuration("workers must be at least 1".into()));
        }
        if self.max_batch == 0 {
            return Err(ClientError::Configuration("max_batch must be at least 1".into()));
        }
        if self.poll.max_ids_per_request == 0 {
            return Err(ClientError::Configuration(
                "poll.max_ids_per_request must be at least 1".into(),
            ));
        }
        if self.poll.base_interval_ms == 0 || self.poll.max_interval_ms < self.poll.base_interval_ms {
            return Err(ClientError::Configuration(
                "poll intervals must satisfy 0 < base_interval_ms <= max_interval_ms".into(),
            ));
        }
        if self.queue_high_water_mark == Some(0) {
            return Err(ClientError::Configuration(
                "queue_high_water_mark must be at least 1".into(),
            ));
        }
        self.retry.validate()
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

fn default_poll_base() -> u64 {
    1_000
}

fn default_poll_max() -> u64 {
    60_000
}

fn default_ids_per_request() -> usize {
    100
}

fn default_workers() -> usize {
    5
}

fn default_max_batch() -> usize {
    20
}

fn default_max_batch_bytes() -> usize {
    // 10 MiB
    10 * 1024 * 1024
}

fn default_max_batch_wait() -> u64 {
    50
}

fn default_solver_ttl() -> u64 {
    // 5 minutes
    300_000
}

fn default_shutdown_grace() -> u64 {
    5_000
}
