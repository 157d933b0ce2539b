//! # mctbnc core
//!
//! Multi-dimensional continuous-time Bayesian network classifiers: a discrete
//! Bayesian network over the class variables joined to a continuous-time
//! Bayesian network over irregularly sampled discrete features.

#![forbid(unsafe_code)]

pub mod engine;
pub mod metrics;

// Re-export commonly used types
pub use engine::classifier::{MultiCtbnc, MultiCtbncConfig};
pub use engine::constraints::{
    BridgeConstraints, DagConstraints, InitialStructureOnly, NaiveBayesConstraints,
    StructureConstraints, StructureLearningAlgorithm, StructuredModel,
};
pub use engine::ctbn::InitialBridge;
pub use engine::dataset::{Dataset, Observation, Sequence, SequenceValidation};
pub use engine::errors::ModelError;
pub use engine::estimation::{BnEstimator, CtbnEstimator, Penalization};
pub use engine::inference::Prediction;
pub use engine::merged::MergedModel;
pub use engine::network::AdjacencyMatrix;
pub use engine::node::{HasCim, HasCpt, HasStates, ModelNode, NodeId};
pub use metrics::{evaluate, PerformanceReport};
