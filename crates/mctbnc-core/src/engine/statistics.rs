//! Sufficient statistics for discrete and continuous-time nodes.
//!
//! ## Bayesian network
//!
//! `Nx[j][k]` counts sequences whose first observation places the parents in
//! joint state `j` and the node in state `k`. Class variables are constant
//! within a sequence, so the first observation is enough.
//!
//! ## Continuous-time Bayesian network
//!
//! For every interval `[t_i, t_{i+1})` of a sequence, with parent state `j`
//! and node state `x` read at `t_i`:
//!
//! ```text
//! Tx[j][x]     += t_{i+1} - t_i
//! Mxy[j][x][y] += 1            if the node is in y != x at t_{i+1}
//! Mx[j][x]      = Σ_y Mxy[j][x][y]
//! ```
//!
//! The last observation of a sequence opens no interval (its duration is
//! unknown). Intervals whose node or parent states were unseen in training are
//! skipped. Class variables always take the sequence's class values, whatever
//! later rows of their column say.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::dataset::{Dataset, Observation, Sequence};
use crate::engine::errors::ModelError;
use crate::engine::network::Network;
use crate::engine::node::{HasStates, NodeId};
use crate::engine::states::{StateContext, StateIndex};

/// Count statistics of a CPT node: `nx[parent_state][state]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BnSufficientStatistics {
    nx: Vec<Vec<f64>>,
}

impl BnSufficientStatistics {
    pub fn zeros(num_parent_states: usize, num_states: usize) -> Self {
        Self {
            nx: vec![vec![0.0; num_states]; num_parent_states],
        }
    }

    /// Wraps explicit counts (rows indexed by parent state).
    pub fn from_counts(nx: Vec<Vec<f64>>) -> Self {
        Self { nx }
    }

    pub fn nx(&self) -> &[Vec<f64>] {
        &self.nx
    }

    pub fn count(&self, parent_state: usize, state: usize) -> f64 {
        self.nx
            .get(parent_state)
            .and_then(|row| row.get(state))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn row_total(&self, parent_state: usize) -> f64 {
        self.nx.get(parent_state).map(|r| r.iter().sum()).unwrap_or(0.0)
    }

    /// Number of sequences counted.
    pub fn total(&self) -> f64 {
        self.nx.iter().flatten().sum()
    }

    pub fn num_parent_states(&self) -> usize {
        self.nx.len()
    }
}

/// Transition and sojourn statistics of a CIM node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CtbnSufficientStatistics {
    mxy: Vec<Vec<Vec<f64>>>,
    mx: Vec<Vec<f64>>,
    tx: Vec<Vec<f64>>,
}

impl CtbnSufficientStatistics {
    pub fn zeros(num_parent_states: usize, num_states: usize) -> Self {
        Self {
            mxy: vec![vec![vec![0.0; num_states]; num_states]; num_parent_states],
            mx: vec![vec![0.0; num_states]; num_parent_states],
            tx: vec![vec![0.0; num_states]; num_parent_states],
        }
    }

    /// Wraps explicit transition counts and sojourn times; `mx` is derived.
    pub fn from_counts(mxy: Vec<Vec<Vec<f64>>>, tx: Vec<Vec<f64>>) -> Self {
        let mx = tx.iter().map(|row| vec![0.0; row.len()]).collect();
        let mut stats = Self { mxy, mx, tx };
        stats.derive_mx();
        stats
    }

    /// `mxy[parent_state][from][to]`: number of observed transitions.
    pub fn mxy(&self) -> &[Vec<Vec<f64>>] {
        &self.mxy
    }

    /// `mx[parent_state][from]`: number of times the node left `from`.
    pub fn mx(&self) -> &[Vec<f64>] {
        &self.mx
    }

    /// `tx[parent_state][from]`: total time spent in `from`.
    pub fn tx(&self) -> &[Vec<f64>] {
        &self.tx
    }

    pub fn num_parent_states(&self) -> usize {
        self.tx.len()
    }

    pub fn num_states(&self) -> usize {
        self.tx.first().map(Vec::len).unwrap_or(0)
    }

    fn derive_mx(&mut self) {
        for (mx_row, mxy_rows) in self.mx.iter_mut().zip(&self.mxy) {
            for (mx, mxy_row) in mx_row.iter_mut().zip(mxy_rows) {
                *mx = mxy_row.iter().sum();
            }
        }
    }
}

/// Where a bound variable's value is read from.
#[derive(Clone, Copy)]
enum Source {
    /// Column of every observation.
    Column(usize),
    /// Slot of the sequence's class values, fixed for the whole sequence.
    Class(usize),
}

/// A node or parent bound to its dataset column.
struct Binding {
    node: NodeId,
    source: Source,
    states: Arc<StateIndex>,
}

type Bindings = SmallVec<[Binding; 5]>;

/// Binds `node` and its parents to dataset columns or class slots.
fn bind<N: HasStates>(
    network: &Network<N>,
    node: NodeId,
    dataset: &Dataset,
) -> Result<Bindings, ModelError> {
    let target = network
        .node(node)
        .ok_or_else(|| ModelError::Internal(format!("node id {} out of range", node.0)))?;
    let mut bindings = Bindings::new();
    for &id in std::iter::once(&node).chain(target.discrete().parents()) {
        let n = network
            .node(id)
            .ok_or_else(|| ModelError::Internal(format!("node id {} out of range", id.0)))?;
        let column = dataset.column_of(n.name()).ok_or_else(|| {
            ModelError::Validation(format!("variable '{}' not present in dataset", n.name()))
        })?;
        let source = match dataset
            .class_variables()
            .iter()
            .position(|c| c.as_ref() == n.name().as_ref())
        {
            Some(slot) => Source::Class(slot),
            None => Source::Column(column),
        };
        bindings.push(Binding {
            node: id,
            source,
            states: n.discrete().states().clone(),
        });
    }
    Ok(bindings)
}

#[inline]
fn state_of(binding: &Binding, sequence: &Sequence, observation: &Observation) -> Option<usize> {
    let value = match binding.source {
        Source::Column(column) => &observation.values[column],
        Source::Class(slot) => sequence.class_values().get(slot)?,
    };
    binding.states.index_of(value)
}

#[inline]
fn load(
    ctx: &mut StateContext,
    bindings: &Bindings,
    sequence: &Sequence,
    observation: &Observation,
) {
    for b in bindings {
        ctx.set(b.node, state_of(b, sequence, observation));
    }
}

/// Computes `Nx` for one node of `network` from `dataset`.
pub fn compute_bn_statistics<N: HasStates>(
    network: &Network<N>,
    node: NodeId,
    dataset: &Dataset,
) -> Result<BnSufficientStatistics, ModelError> {
    let bindings = bind(network, node, dataset)?;
    let target = network.node(node).map(|n| n.discrete()).ok_or_else(|| {
        ModelError::Internal(format!("node id {} out of range", node.0))
    })?;
    let mut stats = BnSufficientStatistics::zeros(target.num_states_parents(), target.num_states());
    let mut ctx = StateContext::new(network.len());

    for sequence in dataset.sequences() {
        let Some(first) = sequence.observations().first() else {
            continue;
        };
        load(&mut ctx, &bindings, sequence, first);
        if let (Some(j), Some(k)) = (target.idx_state_parents(&ctx), target.current_state(&ctx)) {
            stats.nx[j][k] += 1.0;
        }
    }
    Ok(stats)
}

/// Computes `Mxy`, `Mx` and `Tx` for one node of `network` from `dataset`.
pub fn compute_ctbn_statistics<N: HasStates>(
    network: &Network<N>,
    node: NodeId,
    dataset: &Dataset,
) -> Result<CtbnSufficientStatistics, ModelError> {
    let bindings = bind(network, node, dataset)?;
    let target = network.node(node).map(|n| n.discrete()).ok_or_else(|| {
        ModelError::Internal(format!("node id {} out of range", node.0))
    })?;
    let mut stats =
        CtbnSufficientStatistics::zeros(target.num_states_parents(), target.num_states());
    let mut ctx = StateContext::new(network.len());

    for sequence in dataset.sequences() {
        for window in sequence.observations().windows(2) {
            let (current, next) = (&window[0], &window[1]);
            load(&mut ctx, &bindings, sequence, current);
            let (Some(j), Some(from)) = (target.idx_state_parents(&ctx), target.current_state(&ctx))
            else {
                continue;
            };
            stats.tx[j][from] += next.time - current.time;
            if let Some(to) = state_of(&bindings[0], sequence, next) {
                if to != from {
                    stats.mxy[j][from][to] += 1.0;
                }
            }
        }
    }
    stats.derive_mx();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dataset::Dataset;
    use crate::engine::node::{CimNode, DiscreteNode};

    fn dataset() -> Dataset {
        let columns = ["t", "C", "X"];
        let blocks = vec![
            vec![
                vec!["0.0", "c0", "a"],
                vec!["1.0", "c0", "b"],
                vec!["1.5", "c0", "a"],
                vec!["4.0", "c0", "a"],
            ],
            vec![vec!["0.0", "c1", "b"], vec!["2.0", "c1", "a"]],
        ];
        Dataset::from_records("t", &["C"], &columns, &blocks)
    }

    fn network(ds: &Dataset) -> Network<CimNode> {
        let nodes = ["C", "X"]
            .iter()
            .map(|&name| {
                CimNode::new(DiscreteNode::new(
                    name,
                    ds.state_index(name).unwrap(),
                    ds.is_class_variable(name),
                ))
            })
            .collect();
        Network::new(nodes).unwrap()
    }

    #[test]
    fn ctbn_statistics_accumulate_sojourns_and_transitions() {
        let ds = dataset();
        let mut net = network(&ds);
        net.add_edge(NodeId(0), NodeId(1)).unwrap();
        let stats = compute_ctbn_statistics(&net, NodeId(1), &ds).unwrap();
        // parent c0 -> j=0, c1 -> j=1; a -> 0, b -> 1
        assert_eq!(stats.tx()[0][0], 1.0 + 2.5);
        assert_eq!(stats.tx()[0][1], 0.5);
        assert_eq!(stats.tx()[1][1], 2.0);
        assert_eq!(stats.mxy()[0][0][1], 1.0);
        assert_eq!(stats.mxy()[0][1][0], 1.0);
        assert_eq!(stats.mxy()[1][1][0], 1.0);
        assert_eq!(stats.mx()[0][0], 1.0);
        assert_eq!(stats.mx()[1][0], 0.0);
    }

    #[test]
    fn class_parent_is_fixed_for_the_whole_sequence() {
        // The class column of the first sequence drifts to c1 after its first
        // row; every interval still belongs to c0.
        let columns = ["t", "C", "X"];
        let blocks = vec![
            vec![
                vec!["0.0", "c0", "a"],
                vec!["1.0", "c1", "b"],
                vec!["3.0", "c1", "a"],
            ],
            vec![vec!["0.0", "c1", "a"], vec!["1.0", "c1", "a"]],
        ];
        let ds = Dataset::from_records("t", &["C"], &columns, &blocks);
        let mut net = network(&ds);
        net.add_edge(NodeId(0), NodeId(1)).unwrap();
        let stats = compute_ctbn_statistics(&net, NodeId(1), &ds).unwrap();
        assert_eq!(stats.tx(), &[vec![1.0, 2.0], vec![1.0, 0.0]]);
        assert_eq!(stats.mxy()[0][0][1], 1.0);
        assert_eq!(stats.mxy()[0][1][0], 1.0);
        assert_eq!(stats.mx()[1], vec![0.0, 0.0]);
    }

    #[test]
    fn drifting_class_value_never_enters_vocabulary() {
        let columns = ["t", "C", "X"];
        let blocks = vec![vec![
            vec!["0.0", "c0", "a"],
            vec!["1.0", "c1", "b"],
            vec!["2.0", "c1", "a"],
        ]];
        let ds = Dataset::from_records("t", &["C"], &columns, &blocks);
        let net = network(&ds);
        assert_eq!(net.node(NodeId(0)).unwrap().discrete().num_states(), 1);
        let stats = compute_ctbn_statistics(&net, NodeId(1), &ds).unwrap();
        assert_eq!(stats.tx(), &[vec![1.0, 1.0]]);
        let bn = compute_bn_statistics(&net, NodeId(0), &ds).unwrap();
        assert_eq!(bn.nx(), &[vec![1.0]]);
    }

    #[test]
    fn bn_statistics_count_first_observation() {
        let ds = dataset();
        let net = network(&ds);
        let stats = compute_bn_statistics(&net, NodeId(0), &ds).unwrap();
        assert_eq!(stats.nx(), &[vec![1.0, 1.0]]);
        assert_eq!(stats.total(), 2.0);
    }

    #[test]
    fn unknown_variable_is_a_validation_error() {
        let ds = dataset();
        let node = CimNode::new(DiscreteNode::new(
            "Missing",
            Arc::new(StateIndex::new(["x"])),
            false,
        ));
        let net = Network::new(vec![node]).unwrap();
        assert!(matches!(
            compute_ctbn_statistics(&net, NodeId(0), &ds),
            Err(ModelError::Validation(_))
        ));
    }
}
