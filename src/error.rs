use crate::utils::fingerprint::Fingerprint;
use thiserror::Error;

/// Failure taxonomy of one detection request.
///
/// `EmptyListingSet` and `GraphTooLarge` are recoverable by the caller
/// (report "no opportunities" / narrow the query). `InvariantViolation` is a
/// programming-error-level fault and must reach the caller instead of being
/// swallowed into an empty result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no usable listings after filtering")]
    EmptyListingSet,

    #[error("graph exceeds configured safety limits: {nodes} nodes / {edges} edges (max {max_nodes} / {max_edges})")]
    GraphTooLarge { nodes: usize, edges: usize, max_nodes: usize, max_edges: usize },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Cache-internal failure. A payload tag mismatch means two queries collided
/// on a fingerprint; the engine downgrades it to a forced miss, never to a
/// request failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache payload kind mismatch for {fingerprint}: expected {expected}, found {found}")]
    PayloadKindMismatch { fingerprint: Fingerprint, expected: &'static str, found: &'static str },
}
