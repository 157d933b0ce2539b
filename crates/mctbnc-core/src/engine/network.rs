//! Node arenas, symmetric edges and adjacency matrices.
//!
//! A [`Network`] owns its nodes in a `Vec` addressed by [`NodeId`]; edges are
//! id lists stored on both endpoints. The only way to create or remove an edge
//! is [`Network::add_edge`] / [`Network::remove_edge`], which update the
//! child's parent list (and radix base) and the parent's child list together.
//!
//! Adjacency matrices use `m[parent][child]`: row `i` lists the children of
//! node `i`, column `j` lists the parents of node `j`.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::errors::ModelError;
use crate::engine::node::{HasStates, NodeId};

/// Square boolean adjacency matrix, `get(parent, child)`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdjacencyMatrix {
    dim: usize,
    cells: Vec<bool>,
}

impl AdjacencyMatrix {
    /// Empty (edge-free) matrix over `dim` nodes.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            cells: vec![false; dim * dim],
        }
    }

    /// Builds a matrix from rows; every row must have `rows.len()` cells.
    pub fn from_rows(rows: &[Vec<bool>]) -> Result<Self, ModelError> {
        let dim = rows.len();
        let mut m = Self::new(dim);
        for (parent, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(ModelError::StructuralIllegality(format!(
                    "adjacency row {} has {} cells, expected {}",
                    parent,
                    row.len(),
                    dim
                )));
            }
            for (child, &edge) in row.iter().enumerate() {
                m.set(parent, child, edge);
            }
        }
        Ok(m)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn get(&self, parent: usize, child: usize) -> bool {
        parent < self.dim && child < self.dim && self.cells[parent * self.dim + child]
    }

    #[inline]
    pub fn set(&mut self, parent: usize, child: usize, edge: bool) {
        if parent < self.dim && child < self.dim {
            self.cells[parent * self.dim + child] = edge;
        }
    }

    /// Parents of `child` in increasing id order.
    pub fn parents_of(&self, child: usize) -> Vec<NodeId> {
        (0..self.dim)
            .filter(|&p| self.get(p, child))
            .map(NodeId::from)
            .collect()
    }

    /// Whether the parent set (column) of `child` differs between matrices.
    pub fn parents_differ(&self, other: &AdjacencyMatrix, child: usize) -> bool {
        (0..self.dim.max(other.dim)).any(|p| self.get(p, child) != other.get(p, child))
    }

    /// All edges as `(parent, child)` pairs in row-major order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.dim).flat_map(move |p| {
            (0..self.dim)
                .filter(move |&c| self.get(p, c))
                .map(move |c| (p, c))
        })
    }

    pub fn num_edges(&self) -> usize {
        self.cells.iter().filter(|&&e| e).count()
    }

    /// Kahn's algorithm over the whole matrix.
    pub fn is_acyclic(&self) -> bool {
        let mut in_degree: Vec<usize> = (0..self.dim)
            .map(|c| (0..self.dim).filter(|&p| self.get(p, c)).count())
            .collect();
        let mut queue: VecDeque<usize> = (0..self.dim).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0;
        while let Some(node) = queue.pop_front() {
            visited += 1;
            for child in 0..self.dim {
                if self.get(node, child) {
                    in_degree[child] -= 1;
                    if in_degree[child] == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
        visited == self.dim
    }
}

/// Stable name → id index for a network's nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeIndexer {
    by_name: FxHashMap<Arc<str>, NodeId>,
}

impl NodeIndexer {
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }
}

/// Arena of nodes with symmetric parent/child edges.
#[derive(Debug, Clone)]
pub struct Network<N> {
    nodes: Vec<N>,
    indexer: NodeIndexer,
}

impl<N: HasStates> Network<N> {
    /// Takes ownership of `nodes`, assigning ids in order. Existing edges on
    /// the nodes are discarded. Names must be unique.
    pub fn new(nodes: Vec<N>) -> Result<Self, ModelError> {
        let mut network = Self {
            nodes,
            indexer: NodeIndexer::default(),
        };
        for (i, node) in network.nodes.iter_mut().enumerate() {
            let id = NodeId::from(i);
            node.discrete_mut().set_id(id);
            node.discrete_mut().clear_edges();
            if network.indexer.by_name.insert(node.name().clone(), id).is_some() {
                return Err(ModelError::Validation(format!(
                    "duplicate variable '{}' in network",
                    node.name()
                )));
            }
        }
        Ok(network)
    }

    /// Builds a network from nodes whose ids and edges are already consistent
    /// (ids equal positions). Used when merging subgraphs.
    pub(crate) fn from_linked(nodes: Vec<N>) -> Result<Self, ModelError> {
        let mut indexer = NodeIndexer::default();
        for (i, node) in nodes.iter().enumerate() {
            if node.id().index() != i {
                return Err(ModelError::Internal(format!(
                    "node '{}' has id {} at position {}",
                    node.name(),
                    node.id().0,
                    i
                )));
            }
            if indexer.by_name.insert(node.name().clone(), node.id()).is_some() {
                return Err(ModelError::Internal(format!(
                    "duplicate variable '{}' in merged network",
                    node.name()
                )));
            }
        }
        Ok(Self { nodes, indexer })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(id.index())
    }

    pub fn indexer(&self) -> &NodeIndexer {
        &self.indexer
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.indexer.id_of(name)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&N> {
        self.id_of(name).and_then(|id| self.node(id))
    }

    /// Parents of `id` in radix order; empty for an unknown id.
    pub fn parents_of(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.discrete().parents()).unwrap_or(&[])
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.discrete().children()).unwrap_or(&[])
    }

    pub fn names(&self) -> Vec<Arc<str>> {
        self.nodes.iter().map(|n| n.name().clone()).collect()
    }

    pub fn into_nodes(self) -> Vec<N> {
        self.nodes
    }

    fn check(&self, id: NodeId) -> Result<(), ModelError> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(ModelError::Internal(format!("node id {} out of range", id.0)))
        }
    }

    /// Adds `parent → child`, updating both endpoints.
    ///
    /// Returns `Ok(false)` if the edge already existed.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<bool, ModelError> {
        self.check(parent)?;
        self.check(child)?;
        if parent == child {
            return Err(ModelError::StructuralIllegality(format!(
                "self-loop on '{}'",
                self.nodes[parent.index()].name()
            )));
        }
        let cardinality = self.nodes[parent.index()].num_states();
        if !self.nodes[child.index()]
            .discrete_mut()
            .add_parent(parent, cardinality)
        {
            return Ok(false);
        }
        self.nodes[parent.index()].discrete_mut().add_child(child);
        Ok(true)
    }

    /// Removes `parent → child` from both endpoints. Returns whether it existed.
    pub fn remove_edge(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.check(parent).is_err() || self.check(child).is_err() {
            return false;
        }
        let removed = self.nodes[child.index()].discrete_mut().remove_parent(parent);
        if removed {
            self.nodes[parent.index()].discrete_mut().remove_child(child);
        }
        removed
    }

    /// Replaces the parent set of `child` with `parents` (in that radix order).
    pub fn set_parents(&mut self, child: NodeId, parents: &[NodeId]) -> Result<(), ModelError> {
        self.check(child)?;
        let current: Vec<NodeId> = self.nodes[child.index()].discrete().parents().to_vec();
        for parent in current {
            self.remove_edge(parent, child);
        }
        for &parent in parents {
            self.add_edge(parent, child)?;
        }
        Ok(())
    }

    pub fn clear_edges(&mut self) {
        for node in &mut self.nodes {
            node.discrete_mut().clear_edges();
        }
    }

    pub fn adjacency_matrix(&self) -> AdjacencyMatrix {
        let mut m = AdjacencyMatrix::new(self.nodes.len());
        for node in &self.nodes {
            for &parent in node.discrete().parents() {
                m.set(parent.index(), node.id().index(), true);
            }
        }
        m
    }

    /// Kahn's algorithm over all nodes. Ties resolve by increasing id.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, ModelError> {
        self.kahn(|_| true)
    }

    /// Topological order of the class variables, following only edges between
    /// class variables.
    pub fn class_topological_order(&self) -> Result<Vec<NodeId>, ModelError> {
        self.kahn(|n| n.is_class_variable())
    }

    fn kahn(&self, include: impl Fn(&N) -> bool) -> Result<Vec<NodeId>, ModelError> {
        let selected: Vec<bool> = self.nodes.iter().map(&include).collect();
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| {
                n.discrete()
                    .parents()
                    .iter()
                    .filter(|p| selected[p.index()])
                    .count()
            })
            .collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| selected[i] && in_degree[i] == 0)
            .collect();
        let expected = selected.iter().filter(|&&s| s).count();
        let mut order = Vec::with_capacity(expected);
        while let Some(i) = queue.pop_front() {
            order.push(NodeId::from(i));
            let mut children: Vec<NodeId> = self.nodes[i]
                .discrete()
                .children()
                .iter()
                .copied()
                .filter(|c| selected[c.index()])
                .collect();
            children.sort_unstable();
            for child in children {
                in_degree[child.index()] -= 1;
                if in_degree[child.index()] == 0 {
                    queue.push_back(child.index());
                }
            }
        }
        if order.len() != expected {
            return Err(ModelError::StructuralIllegality(
                "graph contains a cycle; no topological order exists".into(),
            ));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::node::{CptNode, DiscreteNode};
    use crate::engine::states::StateIndex;

    fn network(cards: &[usize]) -> Network<CptNode> {
        let nodes = cards
            .iter()
            .enumerate()
            .map(|(i, &k)| {
                let states: Vec<String> = (0..k).map(|s| s.to_string()).collect();
                CptNode::new(DiscreteNode::new(
                    format!("N{i}"),
                    Arc::new(StateIndex::new(states)),
                    true,
                ))
            })
            .collect();
        Network::new(nodes).unwrap()
    }

    #[test]
    fn edges_are_symmetric() {
        let mut net = network(&[2, 3, 2]);
        assert!(net.add_edge(NodeId(0), NodeId(2)).unwrap());
        assert!(net.add_edge(NodeId(1), NodeId(2)).unwrap());
        assert!(!net.add_edge(NodeId(1), NodeId(2)).unwrap());
        let child = net.node(NodeId(2)).unwrap().discrete();
        assert_eq!(child.parents(), &[NodeId(0), NodeId(1)]);
        assert_eq!(child.num_states_parents(), 6);
        assert_eq!(net.node(NodeId(1)).unwrap().discrete().children(), &[NodeId(2)]);

        assert!(net.remove_edge(NodeId(0), NodeId(2)));
        assert!(net.node(NodeId(0)).unwrap().discrete().children().is_empty());
        assert_eq!(net.node(NodeId(2)).unwrap().discrete().num_states_parents(), 3);
    }

    #[test]
    fn self_loop_is_illegal() {
        let mut net = network(&[2]);
        assert!(matches!(
            net.add_edge(NodeId(0), NodeId(0)),
            Err(ModelError::StructuralIllegality(_))
        ));
    }

    #[test]
    fn adjacency_matrix_round_trips_edges() {
        let mut net = network(&[2, 2, 2]);
        net.add_edge(NodeId(2), NodeId(0)).unwrap();
        net.add_edge(NodeId(0), NodeId(1)).unwrap();
        let m = net.adjacency_matrix();
        assert!(m.get(2, 0));
        assert!(m.get(0, 1));
        assert_eq!(m.num_edges(), 2);
        assert_eq!(m.parents_of(0), vec![NodeId(2)]);
        assert!(m.is_acyclic());
    }

    #[test]
    fn topological_order_respects_edges() {
        let mut net = network(&[2, 2, 2, 2]);
        net.add_edge(NodeId(3), NodeId(1)).unwrap();
        net.add_edge(NodeId(1), NodeId(0)).unwrap();
        net.add_edge(NodeId(2), NodeId(0)).unwrap();
        let order = net.topological_order().unwrap();
        let pos = |id: u32| order.iter().position(|n| n.0 == id).unwrap();
        assert!(pos(3) < pos(1));
        assert!(pos(1) < pos(0));
        assert!(pos(2) < pos(0));
    }

    #[test]
    fn cycle_is_detected() {
        let m = AdjacencyMatrix::from_rows(&[
            vec![false, true, false],
            vec![false, false, true],
            vec![true, false, false],
        ])
        .unwrap();
        assert!(!m.is_acyclic());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(AdjacencyMatrix::from_rows(&[vec![false, true], vec![false]]).is_err());
    }
}
