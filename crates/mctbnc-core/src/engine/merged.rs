//! The merged classifier graph.
//!
//! A [`MergedModel`] is the read-only product of training: one [`ModelNode`]
//! per variable, class nodes taken from the Bayesian network and feature nodes
//! taken from the continuous-time network. Class nodes keep the ids they had in
//! the Bayesian network (`0..num_classes`); features follow in CTBN order.
//! Feature parent lists are rewired onto the class nodes with their order
//! untouched, so every feature's parent-state encoding (and therefore its CIM
//! rows) stays valid.

use std::sync::Arc;

use crate::engine::bn::Bn;
use crate::engine::ctbn::Ctbn;
use crate::engine::errors::ModelError;
use crate::engine::network::Network;
use crate::engine::node::{HasStates, ModelNode, NodeId};

/// Trained classifier graph used by inference and sampling.
#[derive(Debug, Clone)]
pub struct MergedModel {
    network: Network<ModelNode>,
    /// Class nodes in declaration order (configuration radix order).
    class_nodes: Vec<NodeId>,
    /// Class nodes in topological order (prior factorisation order).
    class_order: Vec<NodeId>,
    feature_nodes: Vec<NodeId>,
    time_variable: Arc<str>,
    class_variables: Arc<[Arc<str>]>,
    /// All variables in dataset header order.
    header: Arc<[Arc<str>]>,
}

impl MergedModel {
    /// Merges a class subgraph and a CTBN trained on the same dataset.
    pub fn merge(bn: &Bn, ctbn: &Ctbn) -> Result<Self, ModelError> {
        let num_classes = bn.network().len();
        let ctbn_nodes = ctbn.network().nodes();

        // CTBN id -> merged id
        let mut remap = vec![NodeId(0); ctbn_nodes.len()];
        let mut features = Vec::new();
        for node in ctbn_nodes {
            let merged = if node.is_class_variable() {
                let class = bn.network().node_by_name(node.name()).ok_or_else(|| {
                    ModelError::Internal(format!(
                        "class variable '{}' missing from class subgraph",
                        node.name()
                    ))
                })?;
                if class.discrete().states().states() != node.discrete().states().states() {
                    return Err(ModelError::Internal(format!(
                        "class variable '{}' has different vocabularies in the two subgraphs",
                        node.name()
                    )));
                }
                class.id()
            } else {
                features.push(node.id());
                NodeId::from(num_classes + features.len() - 1)
            };
            remap[node.id().index()] = merged;
        }

        let mut nodes: Vec<ModelNode> = bn
            .network()
            .nodes()
            .iter()
            .cloned()
            .map(ModelNode::Cpt)
            .collect();

        for &old in &features {
            let Some(source) = ctbn.network().node(old) else {
                return Err(ModelError::Internal(format!("node id {} out of range", old.0)));
            };
            let mut node = source.clone();
            let new_id = remap[old.index()];
            let discrete = node.discrete_mut();
            discrete.set_id(new_id);
            discrete.remap_edges(|id| remap[id.index()]);
            if let Some(&child) = discrete.children().iter().find(|c| c.index() < num_classes) {
                return Err(ModelError::StructuralIllegality(format!(
                    "feature '{}' is a parent of class node {}",
                    discrete.name(),
                    child.0
                )));
            }
            for &parent in discrete.parents() {
                if parent.index() < num_classes {
                    nodes[parent.index()].discrete_mut().add_child(new_id);
                }
            }
            nodes.push(ModelNode::Cim(node));
        }

        let network = Network::from_linked(nodes)?;
        let class_nodes: Vec<NodeId> = (0..num_classes).map(NodeId::from).collect();
        let class_order = network.class_topological_order()?;
        let feature_nodes: Vec<NodeId> = (num_classes..network.len()).map(NodeId::from).collect();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            classes = class_nodes.len(),
            features = feature_nodes.len(),
            "merged class subgraph and ctbn"
        );

        let dataset = ctbn.dataset();
        Ok(Self {
            network,
            class_nodes,
            class_order,
            feature_nodes,
            time_variable: dataset.time_variable().clone(),
            class_variables: bn.network().names().into(),
            header: dataset.variables().into(),
        })
    }

    pub fn network(&self) -> &Network<ModelNode> {
        &self.network
    }

    pub fn node(&self, name: &str) -> Option<&ModelNode> {
        self.network.node_by_name(name)
    }

    pub fn class_nodes(&self) -> &[NodeId] {
        &self.class_nodes
    }

    pub fn class_order(&self) -> &[NodeId] {
        &self.class_order
    }

    pub fn feature_nodes(&self) -> &[NodeId] {
        &self.feature_nodes
    }

    pub fn time_variable(&self) -> &Arc<str> {
        &self.time_variable
    }

    pub fn class_variables(&self) -> &Arc<[Arc<str>]> {
        &self.class_variables
    }

    pub fn header(&self) -> &Arc<[Arc<str>]> {
        &self.header
    }

    /// Cardinality of each class variable, in declaration order.
    pub fn class_cardinalities(&self) -> Vec<usize> {
        self.class_nodes
            .iter()
            .filter_map(|&id| self.network.node(id))
            .map(|n| n.num_states())
            .collect()
    }
}
