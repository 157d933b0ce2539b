//! Error types for model learning, structural mutation and inference.

use thiserror::Error;

/// Errors surfaced by the classifier engine.
///
/// Estimator-level degeneracies (zero denominators, unseen states) are never
/// errors: they resolve locally to `0.0` parameters or `None` state indexes.
/// Only illegal structural mutations and malformed sequences reach the caller.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// without breaking downstream matches.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// A proposed adjacency matrix violates the constraints of its subgraph
    /// (cycle among class variables, feature→class edge, wrong dimension).
    /// The model keeps its previous structure.
    #[error("illegal structure: {0}")]
    StructuralIllegality(String),

    /// A sequence could not be built (too few observations, bad timestamp,
    /// ragged rows, inconsistent class values under strict validation).
    #[error("sequence integrity error: {0}")]
    SequenceIntegrity(String),

    /// Invalid configuration or argument (unknown variable, negative
    /// hyperparameter, empty class set).
    #[error("validation error: {0}")]
    Validation(String),

    /// Numerical input that cannot be handled (NaN/Inf durations).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal invariant violation (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}
