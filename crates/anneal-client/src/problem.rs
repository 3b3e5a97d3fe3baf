//! Problem and result records.
//!
//! A [`Problem`] is a closed record: the model data is already encoded by
//! the caller and stays opaque to the runtime, which only measures its size
//! for batching.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::status::JobId;

/// Kind of model carried by a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    /// Ising model (spins in {-1, +1}).
    Ising,
    /// Quadratic unconstrained binary optimization.
    Qubo,
    /// Binary quadratic model.
    Bqm,
}

impl ProblemType {
    /// Wire name of the problem type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Ising => "ising",
            ProblemType::Qubo => "qubo",
            ProblemType::Bqm => "bqm",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ising" => Ok(ProblemType::Ising),
            "qubo" => Ok(ProblemType::Qubo),
            "bqm" => Ok(ProblemType::Bqm),
            other => Err(ClientError::Validation(format!(
                "unknown problem type '{other}'"
            ))),
        }
    }
}

/// An encoded optimization problem addressed to one solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    /// Target solver identifier.
    pub solver: String,
    /// Kind of model.
    #[serde(rename = "type")]
    pub problem_type: ProblemType,
    /// Encoded model data, opaque to the runtime.
    pub data: serde_json::Value,
    /// Solver parameters (e.g. `num_reads`).
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Optional user label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Problem {
    /// Create a problem with no parameters.
    pub fn new(solver: impl Into<String>, problem_type: ProblemType, data: serde_json::Value) -> Self {
        Self {
            solver: solver.into(),
            problem_type,
            data,
            params: serde_json::Map::new(),
            label: None,
        }
    }

    /// Set one solver parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Size in bytes of the encoded model data.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.data).map_or(0, |bytes| bytes.len())
    }
}

/// Result of a completed problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Remote job id.
    pub job_id: JobId,
    /// Solver that produced the answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
    /// Answer payload as returned by the service.
    pub answer: serde_json::Value,
    /// When the service accepted the problem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_on: Option<DateTime<Utc>>,
    /// When the service finished the problem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solved_on: Option<DateTime<Utc>>,
}
