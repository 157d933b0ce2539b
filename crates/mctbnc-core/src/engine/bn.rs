//! Discrete Bayesian network over the class variables.

use std::sync::Arc;

use crate::engine::constraints::{check_shape, DagConstraints, StructureConstraints, StructuredModel};
use crate::engine::dataset::Dataset;
use crate::engine::errors::ModelError;
use crate::engine::estimation::{cpt_num_parameters, BnEstimator, Penalization};
use crate::engine::factory;
use crate::engine::network::{AdjacencyMatrix, Network};
use crate::engine::node::{CptNode, HasCpt, HasStates, NodeId};
use crate::engine::statistics::compute_bn_statistics;

/// Bayesian network of CPT nodes trained on a shared dataset.
#[derive(Debug, Clone)]
pub struct Bn {
    network: Network<CptNode>,
    dataset: Arc<Dataset>,
    estimator: BnEstimator,
    constraints: Arc<dyn StructureConstraints>,
}

impl Bn {
    /// Creates an edge-free network over `variables` with parameters learned.
    pub fn new(
        dataset: Arc<Dataset>,
        variables: &[Arc<str>],
        estimator: BnEstimator,
    ) -> Result<Self, ModelError> {
        Self::with_constraints(dataset, variables, estimator, Arc::new(DagConstraints::default()))
    }

    pub fn with_constraints(
        dataset: Arc<Dataset>,
        variables: &[Arc<str>],
        estimator: BnEstimator,
        constraints: Arc<dyn StructureConstraints>,
    ) -> Result<Self, ModelError> {
        let estimator = estimator.validate()?;
        let network = Network::new(factory::cpt_nodes(&dataset, variables)?)?;
        let mut bn = Self {
            network,
            dataset,
            estimator,
            constraints,
        };
        bn.learn_parameters()?;
        Ok(bn)
    }

    pub fn network(&self) -> &Network<CptNode> {
        &self.network
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn estimator(&self) -> BnEstimator {
        self.estimator
    }

    pub fn node(&self, name: &str) -> Option<&CptNode> {
        self.network.node_by_name(name)
    }

    /// Re-estimates every node from the training dataset.
    pub fn learn_parameters(&mut self) -> Result<(), ModelError> {
        for i in 0..self.network.len() {
            self.relearn(NodeId::from(i))?;
        }
        Ok(())
    }

    fn relearn(&mut self, id: NodeId) -> Result<(), ModelError> {
        let statistics = compute_bn_statistics(&self.network, id, &self.dataset)?;
        let cpt = self.estimator.estimate(&statistics);
        let node = self
            .network
            .node_mut(id)
            .ok_or_else(|| ModelError::Internal(format!("node id {} out of range", id.0)))?;
        node.install(statistics, cpt);
        Ok(())
    }

    fn validate_structure(&self, matrix: &AdjacencyMatrix) -> Result<(), ModelError> {
        check_shape(matrix, self.network.len())?;
        self.constraints.check(matrix, &self.class_mask())
    }
}

impl StructuredModel for Bn {
    fn node_names(&self) -> Vec<Arc<str>> {
        self.network.names()
    }

    fn class_mask(&self) -> Vec<bool> {
        vec![true; self.network.len()]
    }

    fn adjacency_matrix(&self) -> AdjacencyMatrix {
        self.network.adjacency_matrix()
    }

    fn constraints(&self) -> &dyn StructureConstraints {
        self.constraints.as_ref()
    }

    fn set_structure(&mut self, matrix: &AdjacencyMatrix) -> Result<(), ModelError> {
        self.validate_structure(matrix)?;
        self.network.clear_edges();
        for (parent, child) in matrix.edges() {
            self.network.add_edge(NodeId::from(parent), NodeId::from(child))?;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(edges = matrix.num_edges(), "bn: structure replaced");
        self.learn_parameters()
    }

    fn set_structure_modified_nodes(
        &mut self,
        matrix: &AdjacencyMatrix,
    ) -> Result<Vec<NodeId>, ModelError> {
        self.validate_structure(matrix)?;
        let current = self.network.adjacency_matrix();
        let modified: Vec<NodeId> = (0..self.network.len())
            .filter(|&c| current.parents_differ(matrix, c))
            .map(NodeId::from)
            .collect();
        for &child in &modified {
            self.network
                .set_parents(child, &matrix.parents_of(child.index()))?;
        }
        for &child in &modified {
            self.relearn(child)?;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(relearned = modified.len(), "bn: structure updated");
        Ok(modified)
    }

    fn estimate_log_likelihood(&self, penalization: Penalization) -> f64 {
        let penalty = penalization.penalty(self.dataset.len());
        self.network
            .nodes()
            .iter()
            .map(|node| {
                node.log_likelihood()
                    - penalty
                        * cpt_num_parameters(
                            node.discrete().num_states_parents(),
                            node.num_states(),
                        )
            })
            .sum()
    }
}
