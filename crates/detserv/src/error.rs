//! Error taxonomy for the admission-control core.
//!
//! Rejecting a flow is never an error: admission checks return `Ok(false)`.
//! Everything in [`DnmError`] is fatal for the operation that raised it.

use thiserror::Error;

use crate::topology::{LinkId, NodeId, QueueId};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DnmError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("allocation strategy {strategy} does not implement the {model} access-control model")]
    ModelMismatch {
        strategy: &'static str,
        model: crate::config::AcModel,
    },
    #[error("allocation strategy {strategy} has no parameter for queue {queue}")]
    MissingAllocationParameter { strategy: &'static str, queue: usize },
    #[error("curve is not a token bucket: {0}")]
    NotATokenBucket(String),
    #[error("{quantity} is unbounded for queue {queue} (arrival rate exceeds service rate)")]
    Unbounded {
        quantity: &'static str,
        queue: QueueId,
    },
    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: f64 },
    #[error("only complete paths can be registered or deregistered")]
    PartialPathRegistration,
    #[error("empty path")]
    EmptyPath,
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown link {0}")]
    UnknownLink(LinkId),
    #[error("unknown queue {0}")]
    UnknownQueue(QueueId),
    #[error("request carries no traffic envelope")]
    MissingEnvelope,
    #[error("no constraint with index {0}")]
    UnknownConstraint(usize),
}

pub type Result<T> = std::result::Result<T, DnmError>;

/// Reject NaN, infinite and negative inputs.
pub(crate) fn ensure_non_negative(what: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(DnmError::InvalidValue { what, value })
    }
}
