//! Solver descriptors, problem validation and the descriptor cache.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ClientError, ClientResult};
use crate::problem::{Problem, ProblemType};

/// Parameters with this prefix bypass schema checks (experimental flags).
const EXPERIMENTAL_PARAM_PREFIX: &str = "x_";

/// Description of a remote solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverDescriptor {
    /// Solver identifier.
    pub id: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Availability, e.g. `ONLINE`.
    #[serde(default = "default_status")]
    pub status: String,
    /// Average load reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_load: Option<f64>,
    /// Capabilities and parameter schema.
    #[serde(default)]
    pub properties: SolverProperties,
}

fn default_status() -> String {
    "ONLINE".to_string()
}

/// Capability set of a solver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverProperties {
    /// Problem types the solver accepts (wire names).
    #[serde(default)]
    pub supported_problem_types: Vec<String>,
    /// Number of qubits, for hardware solvers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_qubits: Option<u32>,
    /// Parameter schema: name → description. `None` when not published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
    /// Remaining solver-specific properties.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SolverDescriptor {
    /// Create a descriptor with empty properties.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            status: default_status(),
            avg_load: None,
            properties: SolverProperties::default(),
        }
    }

    /// Whether the solver is currently accepting problems.
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }

    /// Whether the solver accepts the given problem type.
    ///
    /// A solver that publishes no problem types accepts all of them.
    pub fn supports(&self, problem_type: ProblemType) -> bool {
        let types = &self.properties.supported_problem_types;
        types.is_empty() || types.iter().any(|t| t == problem_type.as_str())
    }

    /// Whether the parameter schema admits `name`.
    pub fn accepts_parameter(&self, name: &str) -> bool {
        if name.starts_with(EXPERIMENTAL_PARAM_PREFIX) {
            return true;
        }
        match &self.properties.parameters {
            Some(schema) => schema.contains_key(name),
            None => true,
        }
    }
}

/// Validates problems against a solver before they are queued.
///
/// Validation failures surface synchronously from `Client::submit` and the
/// problem is never queued.
pub trait ProblemValidator: Send + Sync {
    /// Check `problem` against `solver`.
    fn validate(&self, solver: &SolverDescriptor, problem: &Problem) -> ClientResult<()>;
}

/// Default validator: structural checks against the published schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl ProblemValidator for SchemaValidator {
    fn validate(&self, solver: &SolverDescriptor, problem: &Problem) -> ClientResult<()> {
        if !solver.is_online() {
            return Err(ClientError::Validation(format!(
                "solver {} is {}",
                solver.id, solver.status
            )));
        }
        if !solver.supports(problem.problem_type) {
            return Err(ClientError::Validation(format!(
                "solver {} does not support {} problems",
                solver.id, problem.problem_type
            )));
        }
        if let Some(unknown) = problem.params.keys().find(|k| !solver.accepts_parameter(k)) {
            return Err(ClientError::Validation(format!(
                "parameter '{unknown}' is not accepted by solver {}",
                solver.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct CachedSolvers {
    fetched_at: Instant,
    solvers: Arc<Vec<SolverDescriptor>>,
    /// Whether `solvers` is a full listing rather than individually fetched entries.
    complete: bool,
}

/// Time-limited cache of solver descriptors.
///
/// The cache never performs I/O itself; callers fetch on a miss and
/// [`store`](SolverCache::store) the result.
#[derive(Debug)]
pub(crate) struct SolverCache {
    ttl: Duration,
    entry: RwLock<Option<CachedSolvers>>,
}

impl SolverCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// The cached full listing, if it is younger than the TTL.
    pub(crate) fn fresh(&self) -> Option<Arc<Vec<SolverDescriptor>>> {
        self.fresh_entry(true)
    }

    /// A fresh cached descriptor by id.
    pub(crate) fn fresh_solver(&self, id: &str) -> Option<SolverDescriptor> {
        self.fresh_entry(false)
            .and_then(|solvers| solvers.iter().find(|s| s.id == id).cloned())
    }

    fn fresh_entry(&self, complete_only: bool) -> Option<Arc<Vec<SolverDescriptor>>> {
        let entry = self.entry.read().expect("solver cache lock poisoned");
        entry
            .as_ref()
            .filter(|cached| cached.complete || !complete_only)
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.solvers))
    }

    /// Replace the cached list.
    pub(crate) fn store(&self, solvers: Vec<SolverDescriptor>) -> Arc<Vec<SolverDescriptor>> {
        let solvers = Arc::new(solvers);
        let mut entry = self.entry.write().expect("solver cache lock poisoned");
        *entry = Some(CachedSolvers {
            fetched_at: Instant::now(),
            solvers: Arc::clone(&solvers),
            complete: true,
        });
        solvers
    }

    /// Insert or replace a single descriptor, keeping the list's age.
    pub(crate) fn upsert(&self, solver: SolverDescriptor) {
        let mut entry = self.entry.write().expect("solver cache lock poisoned");
        match entry.as_mut() {
            Some(cached) if cached.fetched_at.elapsed() < self.ttl => {
                let mut solvers: Vec<_> = cached
                    .solvers
                    .iter()
                    .filter(|s| s.id != solver.id)
                    .cloned()
                    .collect();
                solvers.push(solver);
                cached.solvers = Arc::new(solvers);
            }
            _ => {
                *entry = Some(CachedSolvers {
                    fetched_at: Instant::now(),
                    solvers: Arc::new(vec![solver]),
                    complete: false,
                });
            }
        }
    }
}
