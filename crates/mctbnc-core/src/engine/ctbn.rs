//! Continuous-time Bayesian network over all variables.
//!
//! Every variable has a [`CimNode`] so that feature nodes can take class
//! variables as parents and encode their states. Only feature nodes are
//! estimated; class-variable nodes carry no parameters here and are replaced
//! by the companion [`Bn`]'s nodes when the classifier merges the subgraphs.

use std::sync::Arc;

use crate::engine::bn::Bn;
use crate::engine::constraints::{
    check_shape, naive_bayes_structure, BridgeConstraints, StructureConstraints, StructuredModel,
};
use crate::engine::dataset::Dataset;
use crate::engine::errors::ModelError;
use crate::engine::estimation::{cim_num_parameters, CtbnEstimator, Penalization};
use crate::engine::factory;
use crate::engine::network::{AdjacencyMatrix, Network};
use crate::engine::node::{CimNode, HasCim, HasStates, NodeId};
use crate::engine::statistics::compute_ctbn_statistics;

/// Bridge structure a CTBN starts from before structure learning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InitialBridge {
    /// No edges.
    Empty,
    /// Every class variable is a parent of every feature.
    #[default]
    NaiveBayes,
}

/// Continuous-time Bayesian network of CIM nodes.
#[derive(Debug, Clone)]
pub struct Ctbn {
    network: Network<CimNode>,
    dataset: Arc<Dataset>,
    class_subgraph: Arc<Bn>,
    estimator: CtbnEstimator,
    constraints: Arc<dyn StructureConstraints>,
}

impl Ctbn {
    /// Creates a CTBN over every dataset variable, with the class variables of
    /// `class_subgraph`, seeded with `initial` and with parameters learned.
    pub fn new(
        dataset: Arc<Dataset>,
        class_subgraph: Arc<Bn>,
        estimator: CtbnEstimator,
        constraints: Arc<dyn StructureConstraints>,
        initial: InitialBridge,
    ) -> Result<Self, ModelError> {
        let estimator = estimator.validate()?;
        let variables = dataset.variables().to_vec();
        let mut nodes = factory::cim_nodes(&dataset, &variables)?;
        for node in &mut nodes {
            let is_class = class_subgraph.network().id_of(node.name()).is_some();
            node.discrete_mut().set_class_variable(is_class);
        }
        let network = Network::new(nodes)?;
        let mut ctbn = Self {
            network,
            dataset,
            class_subgraph,
            estimator,
            constraints,
        };

        let mask = ctbn.class_mask();
        let start = match initial {
            InitialBridge::Empty => AdjacencyMatrix::new(mask.len()),
            InitialBridge::NaiveBayes => naive_bayes_structure(&mask),
        };
        ctbn.set_structure(&start)?;
        Ok(ctbn)
    }

    /// CTBN with the default bridge constraints.
    pub fn with_defaults(
        dataset: Arc<Dataset>,
        class_subgraph: Arc<Bn>,
        estimator: CtbnEstimator,
    ) -> Result<Self, ModelError> {
        Self::new(
            dataset,
            class_subgraph,
            estimator,
            Arc::new(BridgeConstraints::default()),
            InitialBridge::default(),
        )
    }

    pub fn network(&self) -> &Network<CimNode> {
        &self.network
    }

    pub fn class_subgraph(&self) -> &Arc<Bn> {
        &self.class_subgraph
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn estimator(&self) -> CtbnEstimator {
        self.estimator
    }

    pub fn node(&self, name: &str) -> Option<&CimNode> {
        self.network.node_by_name(name)
    }

    /// Ids of the feature (non-class) nodes.
    pub fn feature_ids(&self) -> Vec<NodeId> {
        self.network
            .nodes()
            .iter()
            .filter(|n| !n.is_class_variable())
            .map(|n| n.id())
            .collect()
    }

    /// Re-estimates every feature node.
    pub fn learn_parameters(&mut self) -> Result<(), ModelError> {
        for id in self.feature_ids() {
            self.relearn(id)?;
        }
        Ok(())
    }

    fn relearn(&mut self, id: NodeId) -> Result<(), ModelError> {
        if self
            .network
            .node(id)
            .map(|n| n.is_class_variable())
            .unwrap_or(false)
        {
            return Ok(());
        }
        let statistics = compute_ctbn_statistics(&self.network, id, &self.dataset)?;
        let cim = self.estimator.estimate(&statistics);
        let node = self
            .network
            .node_mut(id)
            .ok_or_else(|| ModelError::Internal(format!("node id {} out of range", id.0)))?;
        node.install(statistics, cim);
        Ok(())
    }

    fn validate_structure(&self, matrix: &AdjacencyMatrix) -> Result<(), ModelError> {
        check_shape(matrix, self.network.len())?;
        self.constraints.check(matrix, &self.class_mask())
    }
}

impl StructuredModel for Ctbn {
    fn node_names(&self) -> Vec<Arc<str>> {
        self.network.names()
    }

    fn class_mask(&self) -> Vec<bool> {
        self.network
            .nodes()
            .iter()
            .map(|n| n.is_class_variable())
            .collect()
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
        tracing::debug!(edges = matrix.num_edges(), "ctbn: structure replaced");
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
        tracing::debug!(relearned = modified.len(), "ctbn: structure updated");
        Ok(modified)
    }

    fn estimate_log_likelihood(&self, penalization: Penalization) -> f64 {
        let penalty = penalization.penalty(self.dataset.len());
        self.network
            .nodes()
            .iter()
            .filter(|n| !n.is_class_variable())
            .map(|node| {
                node.log_likelihood()
                    - penalty
                        * cim_num_parameters(
                            node.discrete().num_states_parents(),
                            node.num_states(),
                        )
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::estimation::BnEstimator;

    fn dataset() -> Arc<Dataset> {
        let columns = ["t", "C", "X"];
        let blocks = vec![
            vec![
                vec!["0.0", "c0", "a"],
                vec!["1.0", "c0", "b"],
                vec!["3.0", "c0", "a"],
            ],
            vec![
                vec!["0.0", "c1", "a"],
                vec!["4.0", "c1", "b"],
                vec!["4.5", "c1", "b"],
            ],
        ];
        Arc::new(Dataset::from_records("t", &["C"], &columns, &blocks))
    }

    fn ctbn(initial: InitialBridge) -> Ctbn {
        let ds = dataset();
        let bn = Arc::new(Bn::new(ds.clone(), ds.class_variables(), BnEstimator::Mle).unwrap());
        Ctbn::new(
            ds,
            bn,
            CtbnEstimator::Mle,
            Arc::new(BridgeConstraints::default()),
            initial,
        )
        .unwrap()
    }

    #[test]
    fn naive_bayes_seed_conditions_features_on_class() {
        let model = ctbn(InitialBridge::NaiveBayes);
        let x = model.node("X").unwrap();
        assert_eq!(x.discrete().num_states_parents(), 2);
        // c0: a for 1.0 then leaves once -> qx = 1
        assert_eq!(x.cim().exit_rate(0, 0), 1.0);
        // c1: a for 4.0, leaves once -> qx = 0.25
        assert_eq!(x.cim().exit_rate(1, 0), 0.25);
        // c0: b for 2.0, leaves once -> qx = 0.5
        assert_eq!(x.cim().exit_rate(0, 1), 0.5);
        assert_eq!(x.cim().exit_rate(1, 1), 0.0);
    }

    #[test]
    fn empty_seed_pools_sequences() {
        let model = ctbn(InitialBridge::Empty);
        let x = model.node("X").unwrap();
        assert_eq!(x.discrete().num_states_parents(), 1);
        assert_eq!(x.ctbn_statistics().tx()[0], vec![5.0, 2.5]);
        assert_eq!(x.cim().exit_rate(0, 0), 2.0 / 5.0);
    }

    #[test]
    fn feature_to_class_edge_is_rejected() {
        let mut model = ctbn(InitialBridge::Empty);
        let mut m = AdjacencyMatrix::new(2);
        m.set(1, 0, true);
        assert!(matches!(
            model.set_structure_modified_nodes(&m),
            Err(ModelError::StructuralIllegality(_))
        ));
        assert_eq!(model.adjacency_matrix().num_edges(), 0);
    }

    #[test]
    fn class_nodes_are_not_estimated() {
        let model = ctbn(InitialBridge::NaiveBayes);
        let c = model.node("C").unwrap();
        assert!(c.is_class_variable());
        assert!(c.ctbn_statistics().tx().iter().flatten().all(|&t| t == 0.0));
        assert_eq!(model.feature_ids(), vec![NodeId(1)]);
    }
}
