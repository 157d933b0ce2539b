//! The learning and inference engine.
//!
//! This module provides:
//! - **errors**: error taxonomy
//! - **states** / **node** / **network**: state vocabularies, discrete nodes
//!   with mixed-radix parent encoding, and the node arena with symmetric edges
//! - **dataset**: sequences and datasets with validation
//! - **statistics** / **estimation**: sufficient statistics, CPT/CIM
//!   estimators and penalised scores
//! - **constraints**: structural legality and the structure-learning seam
//! - **bn** / **ctbn** / **merged** / **classifier**: subgraphs, their merge
//!   and the classifier that trains them
//! - **inference** / **sampler**: MAP classification and generative sampling

pub mod bn;
pub mod classifier;
pub mod constraints;
pub mod ctbn;
pub mod dataset;
pub mod errors;
pub mod estimation;
pub mod factory;
pub mod inference;
pub mod merged;
pub mod network;
pub mod node;
pub mod sampler;
pub mod states;
pub mod statistics;
