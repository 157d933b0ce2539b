//! Structural constraints and the structure-learning seam.
//!
//! Models never accept an adjacency matrix without first asking their
//! [`StructureConstraints`]. A rejected matrix surfaces as
//! [`ModelError::StructuralIllegality`] and leaves the model untouched.
//!
//! Search heuristics (hill climbing, tabu search, constraint-based methods)
//! live outside this crate. They drive a model through [`StructuredModel`]
//! and are plugged into the classifier as a [`StructureLearningAlgorithm`].

use std::fmt;
use std::sync::Arc;

use crate::engine::errors::ModelError;
use crate::engine::estimation::Penalization;
use crate::engine::network::AdjacencyMatrix;
use crate::engine::node::NodeId;

/// Legality rules for one subgraph.
pub trait StructureConstraints: fmt::Debug + Send + Sync {
    /// Checks `matrix` against the rules; `class_mask[i]` tells whether node
    /// `i` is a class variable.
    fn check(&self, matrix: &AdjacencyMatrix, class_mask: &[bool]) -> Result<(), ModelError>;

    /// Structure a model starts from before any search.
    fn initial_structure(&self, class_mask: &[bool]) -> AdjacencyMatrix {
        AdjacencyMatrix::new(class_mask.len())
    }

    fn is_structure_legal(&self, matrix: &AdjacencyMatrix, class_mask: &[bool]) -> bool {
        self.check(matrix, class_mask).is_ok()
    }
}

/// Shape checks shared by every constraint set: matching dimension and no
/// self-loops.
pub fn check_shape(matrix: &AdjacencyMatrix, num_nodes: usize) -> Result<(), ModelError> {
    if matrix.dim() != num_nodes {
        return Err(ModelError::StructuralIllegality(format!(
            "adjacency matrix is {}x{}, model has {} nodes",
            matrix.dim(),
            matrix.dim(),
            num_nodes
        )));
    }
    if let Some(i) = (0..num_nodes).find(|&i| matrix.get(i, i)) {
        return Err(ModelError::StructuralIllegality(format!(
            "self-loop on node {}",
            i
        )));
    }
    Ok(())
}

fn check_max_parents(
    matrix: &AdjacencyMatrix,
    max: Option<usize>,
    counts: impl Fn(usize) -> bool,
    child_filter: impl Fn(usize) -> bool,
) -> Result<(), ModelError> {
    let Some(max) = max else {
        return Ok(());
    };
    for child in (0..matrix.dim()).filter(|&c| child_filter(c)) {
        let n = (0..matrix.dim())
            .filter(|&p| counts(p) && matrix.get(p, child))
            .count();
        if n > max {
            return Err(ModelError::StructuralIllegality(format!(
                "node {} has {} parents, at most {} allowed",
                child, n, max
            )));
        }
    }
    Ok(())
}

/// Acyclic structure over class variables (the Bayesian-network subgraph).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DagConstraints {
    /// Optional cap on the number of parents per node.
    pub max_parents: Option<usize>,
}

impl StructureConstraints for DagConstraints {
    fn check(&self, matrix: &AdjacencyMatrix, class_mask: &[bool]) -> Result<(), ModelError> {
        check_shape(matrix, class_mask.len())?;
        if !matrix.is_acyclic() {
            return Err(ModelError::StructuralIllegality(
                "class subgraph must be acyclic".into(),
            ));
        }
        check_max_parents(matrix, self.max_parents, |_| true, |_| true)
    }
}

/// Bridge and feature subgraph of a continuous-time network: class variables
/// take no parents, features may form cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeConstraints {
    /// Optional cap on feature parents per feature (class parents are free).
    pub max_feature_parents: Option<usize>,
}

impl StructureConstraints for BridgeConstraints {
    fn check(&self, matrix: &AdjacencyMatrix, class_mask: &[bool]) -> Result<(), ModelError> {
        check_shape(matrix, class_mask.len())?;
        if let Some((parent, child)) = matrix.edges().find(|&(_, c)| class_mask[c]) {
            return Err(ModelError::StructuralIllegality(format!(
                "edge {} -> {} points into a class variable",
                parent, child
            )));
        }
        check_max_parents(
            matrix,
            self.max_feature_parents,
            |p| !class_mask[p],
            |c| !class_mask[c],
        )
    }
}

/// Fixed naive-Bayes bridge: every class variable is a parent of every
/// feature and there are no other edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NaiveBayesConstraints;

impl StructureConstraints for NaiveBayesConstraints {
    fn check(&self, matrix: &AdjacencyMatrix, class_mask: &[bool]) -> Result<(), ModelError> {
        check_shape(matrix, class_mask.len())?;
        if *matrix != naive_bayes_structure(class_mask) {
            return Err(ModelError::StructuralIllegality(
                "naive Bayes structure requires exactly the class -> feature edges".into(),
            ));
        }
        Ok(())
    }

    fn initial_structure(&self, class_mask: &[bool]) -> AdjacencyMatrix {
        naive_bayes_structure(class_mask)
    }
}

/// All class → feature edges.
pub fn naive_bayes_structure(class_mask: &[bool]) -> AdjacencyMatrix {
    let mut m = AdjacencyMatrix::new(class_mask.len());
    for (p, &p_class) in class_mask.iter().enumerate() {
        for (c, &c_class) in class_mask.iter().enumerate() {
            if p_class && !c_class {
                m.set(p, c, true);
            }
        }
    }
    m
}

/// The structural API a model exposes to search procedures.
pub trait StructuredModel {
    fn node_names(&self) -> Vec<Arc<str>>;

    /// `true` for every node that is a class variable, in id order.
    fn class_mask(&self) -> Vec<bool>;

    fn adjacency_matrix(&self) -> AdjacencyMatrix;

    fn constraints(&self) -> &dyn StructureConstraints;

    fn is_structure_legal(&self, matrix: &AdjacencyMatrix) -> bool {
        self.constraints()
            .is_structure_legal(matrix, &self.class_mask())
    }

    /// Replaces every edge and relearns every node.
    fn set_structure(&mut self, matrix: &AdjacencyMatrix) -> Result<(), ModelError>;

    /// Relearns only nodes whose parent set changed; returns them.
    fn set_structure_modified_nodes(
        &mut self,
        matrix: &AdjacencyMatrix,
    ) -> Result<Vec<NodeId>, ModelError>;

    /// Sum of per-node (penalised) log-likelihoods under current parameters.
    fn estimate_log_likelihood(&self, penalization: Penalization) -> f64;
}

/// A procedure choosing a model's structure.
pub trait StructureLearningAlgorithm: fmt::Debug + Send + Sync {
    fn learn(&self, model: &mut dyn StructuredModel) -> Result<(), ModelError>;
}

/// Keeps whatever structure the model was initialised with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitialStructureOnly;

impl StructureLearningAlgorithm for InitialStructureOnly {
    fn learn(&self, model: &mut dyn StructuredModel) -> Result<(), ModelError> {
        let current = model.adjacency_matrix();
        if !model.is_structure_legal(&current) {
            let initial = model.constraints().initial_structure(&model.class_mask());
            model.set_structure(&initial)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[u8]]) -> AdjacencyMatrix {
        let rows: Vec<Vec<bool>> = rows
            .iter()
            .map(|r| r.iter().map(|&v| v == 1).collect())
            .collect();
        AdjacencyMatrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn dag_rejects_cycles_and_loops() {
        let mask = [true, true];
        let dag = DagConstraints::default();
        assert!(dag.is_structure_legal(&matrix(&[&[0, 1], &[0, 0]]), &mask));
        assert!(!dag.is_structure_legal(&matrix(&[&[0, 1], &[1, 0]]), &mask));
        assert!(!dag.is_structure_legal(&matrix(&[&[1, 0], &[0, 0]]), &mask));
        assert!(!dag.is_structure_legal(&AdjacencyMatrix::new(3), &mask));
    }

    #[test]
    fn bridge_rejects_edges_into_class_variables() {
        // node 0 is a class variable, 1 and 2 are features
        let mask = [true, false, false];
        let bridge = BridgeConstraints::default();
        assert!(bridge.is_structure_legal(&matrix(&[&[0, 1, 1], &[0, 0, 1], &[0, 1, 0]]), &mask));
        assert!(!bridge.is_structure_legal(&matrix(&[&[0, 1, 0], &[1, 0, 0], &[0, 0, 0]]), &mask));
    }

    #[test]
    fn bridge_caps_feature_parents_only() {
        let mask = [true, false, false, false];
        let bridge = BridgeConstraints {
            max_feature_parents: Some(1),
        };
        let ok = matrix(&[&[0, 1, 1, 1], &[0, 0, 0, 1], &[0, 0, 0, 0], &[0, 0, 0, 0]]);
        let too_many = matrix(&[&[0, 1, 1, 1], &[0, 0, 0, 1], &[0, 0, 0, 1], &[0, 0, 0, 0]]);
        assert!(bridge.is_structure_legal(&ok, &mask));
        assert!(!bridge.is_structure_legal(&too_many, &mask));
    }

    #[test]
    fn naive_bayes_structure_links_every_class_to_every_feature() {
        let mask = [true, false, true, false];
        let nb = naive_bayes_structure(&mask);
        assert_eq!(nb.num_edges(), 4);
        assert!(nb.get(0, 1) && nb.get(0, 3) && nb.get(2, 1) && nb.get(2, 3));
        assert!(NaiveBayesConstraints.is_structure_legal(&nb, &mask));
        assert!(!NaiveBayesConstraints.is_structure_legal(&AdjacencyMatrix::new(4), &mask));
    }
}
