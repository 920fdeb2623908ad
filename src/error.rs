//! Typed error kinds for the kernel, executor, and API boundary.
//!
//! Mirrors the five error kinds of the external contract: malformed input,
//! missing references, a single failed replica, an executor-level failure,
//! and a precondition violated by an analytic endpoint. Each carries enough
//! context to render a 4xx/5xx response without re-deriving it at the HTTP
//! layer.

use std::fmt;

/// Malformed input: an invariant violation in `SimulationConfig`, or an
/// out-of-range replica/worker count.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Dotted field path (e.g. `"num_replicas"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error for the given field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation error: {} — {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// A referenced configuration or experiment does not exist.
#[derive(Debug, Clone)]
pub struct NotFoundError {
    /// What kind of resource was missing (`"experiment"`, `"configuration"`).
    pub resource: String,
    /// The identifier that was looked up.
    pub id: u64,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} not found", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// A single replica's kernel raised a fatal error. Recorded on the replica;
/// never propagated to the experiment or the caller.
#[derive(Debug, Clone)]
pub struct ReplicaFailure {
    /// Replica index (1-based).
    pub replica_index: u32,
    /// Human-readable failure description.
    pub message: String,
}

impl fmt::Display for ReplicaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica {} failed: {}", self.replica_index, self.message)
    }
}

impl std::error::Error for ReplicaFailure {}

/// Pool construction, persistence, or aggregation failed at the executor
/// level. Transitions the experiment to `failed`.
#[derive(Debug, Clone)]
pub struct ExecutorFailure {
    /// Human-readable failure description.
    pub message: String,
}

impl fmt::Display for ExecutorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "executor failure: {}", self.message)
    }
}

impl std::error::Error for ExecutorFailure {}

/// An analytic endpoint (ANOVA) was called on an experiment outside its
/// required state, or with too few factor levels.
#[derive(Debug, Clone)]
pub struct PreconditionError {
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "precondition error: {}", self.message)
    }
}

impl std::error::Error for PreconditionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_formats_field_and_message() {
        let err = ValidationError::new("num_replicas", "must be in [100, 100000]");
        assert_eq!(
            err.to_string(),
            "validation error: num_replicas — must be in [100, 100000]"
        );
    }

    #[test]
    fn not_found_error_includes_resource_and_id() {
        let err = NotFoundError {
            resource: "experiment".to_string(),
            id: 7,
        };
        assert_eq!(err.to_string(), "experiment 7 not found");
    }
}
