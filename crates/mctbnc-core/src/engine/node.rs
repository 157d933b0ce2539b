//! # Discrete model nodes
//!
//! Every variable of the classifier is a [`DiscreteNode`]: a name, an immutable
//! state vocabulary and an ordered list of parents. Parent states are encoded
//! into a single integer with a mixed-radix scheme:
//!
//! ```text
//! idx = s_0 + k_0 * (s_1 + k_1 * (s_2 + ...))
//! ```
//!
//! where `s_i` is the state index of parent `i` and `k_i` its cardinality.
//! Parent 0 is the least significant digit. `num_states_parents` caches
//! `Π k_i` and is kept in sync on every parent add/remove.
//!
//! Nodes specialise into [`CptNode`] (class variables, discrete Bayesian
//! network) and [`CimNode`] (features, continuous-time Bayesian network).
//! The closed union [`ModelNode`] holds either kind inside a merged model;
//! code that needs a capability goes through [`HasStates`], [`HasCpt`] or
//! [`HasCim`] instead of down-casting.
//!
//! Edges are never created on a node directly. [`Network`](crate::engine::network::Network)
//! owns the symmetric edge API and updates both ends together.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::estimation::{cim_log_likelihood, cpt_log_likelihood, Cim, Cpt};
use crate::engine::states::{StateContext, StateIndex};
use crate::engine::statistics::{BnSufficientStatistics, CtbnSufficientStatistics};

/// Inline capacity for parent/child lists.
const INLINE_EDGES: usize = 4;

/// Stable 0-based index of a node inside its network arena.
///
/// Doubles as the row/column of the node in adjacency matrices.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for NodeId {
    fn from(idx: usize) -> Self {
        NodeId(idx as u32)
    }
}

/// A state-indexed discrete variable.
#[derive(Debug, Clone)]
pub struct DiscreteNode {
    id: NodeId,
    name: Arc<str>,
    states: Arc<StateIndex>,
    is_class_variable: bool,
    parents: SmallVec<[NodeId; INLINE_EDGES]>,
    /// Cardinality of each parent, aligned with `parents`.
    parent_cardinalities: SmallVec<[usize; INLINE_EDGES]>,
    children: SmallVec<[NodeId; INLINE_EDGES]>,
    num_states_parents: usize,
}

impl DiscreteNode {
    pub fn new(name: impl Into<Arc<str>>, states: Arc<StateIndex>, is_class_variable: bool) -> Self {
        Self {
            id: NodeId(0),
            name: name.into(),
            states,
            is_class_variable,
            parents: SmallVec::new(),
            parent_cardinalities: SmallVec::new(),
            children: SmallVec::new(),
            num_states_parents: 1,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn states(&self) -> &Arc<StateIndex> {
        &self.states
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn is_class_variable(&self) -> bool {
        self.is_class_variable
    }

    pub(crate) fn set_class_variable(&mut self, is_class_variable: bool) {
        self.is_class_variable = is_class_variable;
    }

    /// Parents in radix order (parent 0 is the least significant digit).
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn parent_cardinalities(&self) -> &[usize] {
        &self.parent_cardinalities
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_parent(&self, parent: NodeId) -> bool {
        self.parents.contains(&parent)
    }

    /// Product of all parents' cardinalities (1 for a root node).
    #[inline]
    pub fn num_states_parents(&self) -> usize {
        self.num_states_parents
    }

    /// Appends `parent` as the most significant radix digit.
    ///
    /// Returns `false` (and changes nothing) if the parent is already present.
    pub(crate) fn add_parent(&mut self, parent: NodeId, cardinality: usize) -> bool {
        if self.has_parent(parent) {
            return false;
        }
        self.parents.push(parent);
        self.parent_cardinalities.push(cardinality);
        self.num_states_parents *= cardinality;
        true
    }

    /// Removes `parent`, dividing its cardinality back out of the radix base.
    pub(crate) fn remove_parent(&mut self, parent: NodeId) -> bool {
        let Some(pos) = self.parents.iter().position(|&p| p == parent) else {
            return false;
        };
        self.parents.remove(pos);
        let cardinality = self.parent_cardinalities.remove(pos);
        if cardinality > 0 {
            self.num_states_parents /= cardinality;
        } else {
            self.num_states_parents = self.parent_cardinalities.iter().product();
        }
        true
    }

    pub(crate) fn add_child(&mut self, child: NodeId) -> bool {
        if self.children.contains(&child) {
            return false;
        }
        self.children.push(child);
        true
    }

    pub(crate) fn remove_child(&mut self, child: NodeId) -> bool {
        let Some(pos) = self.children.iter().position(|&c| c == child) else {
            return false;
        };
        self.children.remove(pos);
        true
    }

    pub(crate) fn clear_edges(&mut self) {
        self.parents.clear();
        self.parent_cardinalities.clear();
        self.children.clear();
        self.num_states_parents = 1;
    }

    /// Rewrites parent and child ids through `map` (used when nodes move
    /// between arenas). Parent order, and therefore the radix encoding, is
    /// preserved.
    pub(crate) fn remap_edges(&mut self, map: impl Fn(NodeId) -> NodeId) {
        for p in self.parents.iter_mut() {
            *p = map(*p);
        }
        for c in self.children.iter_mut() {
            *c = map(*c);
        }
    }

    pub(crate) fn retain_children(&mut self, keep: impl Fn(NodeId) -> bool) {
        self.children.retain(|c| keep(*c));
    }

    /// Sets this node's current state in `ctx`.
    ///
    /// Returns the state index, or `None` when `value` was never observed in
    /// training; the slot is then left unset.
    pub fn set_state(&self, ctx: &mut StateContext, value: &str) -> Option<usize> {
        let idx = self.states.index_of(value);
        ctx.set(self.id, idx);
        idx
    }

    /// Current state of this node in `ctx`.
    #[inline]
    pub fn current_state(&self, ctx: &StateContext) -> Option<usize> {
        ctx.get(self.id)
    }

    /// Linearises the parents' current states into one index.
    ///
    /// Returns `None` if any parent slot is unset or unseen. A node without
    /// parents always returns `Some(0)`.
    pub fn idx_state_parents(&self, ctx: &StateContext) -> Option<usize> {
        let mut idx = 0usize;
        let mut base = 1usize;
        for (&parent, &cardinality) in self.parents.iter().zip(&self.parent_cardinalities) {
            let state = ctx.get(parent)?;
            idx += state * base;
            base *= cardinality;
        }
        Some(idx)
    }

    /// Inverse of [`idx_state_parents`](Self::idx_state_parents): writes each
    /// parent's state into `ctx`.
    pub fn set_state_parents(&self, ctx: &mut StateContext, mut idx: usize) {
        for (&parent, &cardinality) in self.parents.iter().zip(&self.parent_cardinalities) {
            if cardinality == 0 {
                ctx.set(parent, None);
                continue;
            }
            ctx.set(parent, Some(idx % cardinality));
            idx /= cardinality;
        }
    }
}

/// Access to the discrete-state core of any node.
pub trait HasStates {
    fn discrete(&self) -> &DiscreteNode;
    fn discrete_mut(&mut self) -> &mut DiscreteNode;

    fn id(&self) -> NodeId {
        self.discrete().id()
    }

    fn name(&self) -> &Arc<str> {
        self.discrete().name()
    }

    fn num_states(&self) -> usize {
        self.discrete().num_states()
    }

    fn is_class_variable(&self) -> bool {
        self.discrete().is_class_variable()
    }
}

/// Nodes parameterised by a conditional probability table.
pub trait HasCpt: HasStates {
    fn cpt(&self) -> &Cpt;
    fn bn_statistics(&self) -> &BnSufficientStatistics;

    /// Log-likelihood of the node's counts under its current table.
    fn log_likelihood(&self) -> f64 {
        cpt_log_likelihood(self.bn_statistics(), self.cpt())
    }
}

/// Nodes parameterised by a conditional intensity matrix.
pub trait HasCim: HasStates {
    fn cim(&self) -> &Cim;
    fn ctbn_statistics(&self) -> &CtbnSufficientStatistics;

    /// Log-likelihood of the node's transitions and sojourns under its
    /// current intensity matrix.
    fn log_likelihood(&self) -> f64 {
        cim_log_likelihood(self.ctbn_statistics(), self.cim())
    }
}

/// Class variable node of the discrete Bayesian network.
///
/// Statistics and table are held behind `Arc` and replaced wholesale on
/// relearn, so a cloned model keeps reading a consistent snapshot.
#[derive(Debug, Clone)]
pub struct CptNode {
    node: DiscreteNode,
    statistics: Arc<BnSufficientStatistics>,
    cpt: Arc<Cpt>,
}

impl CptNode {
    pub fn new(node: DiscreteNode) -> Self {
        let statistics = Arc::new(BnSufficientStatistics::zeros(
            node.num_states_parents(),
            node.num_states(),
        ));
        let cpt = Arc::new(Cpt::zeros(node.num_states_parents(), node.num_states()));
        Self {
            node,
            statistics,
            cpt,
        }
    }

    /// Installs freshly estimated statistics and parameters.
    pub(crate) fn install(&mut self, statistics: BnSufficientStatistics, cpt: Cpt) {
        self.statistics = Arc::new(statistics);
        self.cpt = Arc::new(cpt);
    }
}

impl HasStates for CptNode {
    fn discrete(&self) -> &DiscreteNode {
        &self.node
    }

    fn discrete_mut(&mut self) -> &mut DiscreteNode {
        &mut self.node
    }
}

impl HasCpt for CptNode {
    fn cpt(&self) -> &Cpt {
        &self.cpt
    }

    fn bn_statistics(&self) -> &BnSufficientStatistics {
        &self.statistics
    }
}

/// Feature node of the continuous-time Bayesian network.
#[derive(Debug, Clone)]
pub struct CimNode {
    node: DiscreteNode,
    statistics: Arc<CtbnSufficientStatistics>,
    cim: Arc<Cim>,
}

impl CimNode {
    pub fn new(node: DiscreteNode) -> Self {
        let statistics = Arc::new(CtbnSufficientStatistics::zeros(
            node.num_states_parents(),
            node.num_states(),
        ));
        let cim = Arc::new(Cim::zeros(node.num_states_parents(), node.num_states()));
        Self {
            node,
            statistics,
            cim,
        }
    }

    pub(crate) fn install(&mut self, statistics: CtbnSufficientStatistics, cim: Cim) {
        self.statistics = Arc::new(statistics);
        self.cim = Arc::new(cim);
    }
}

impl HasStates for CimNode {
    fn discrete(&self) -> &DiscreteNode {
        &self.node
    }

    fn discrete_mut(&mut self) -> &mut DiscreteNode {
        &mut self.node
    }
}

impl HasCim for CimNode {
    fn cim(&self) -> &Cim {
        &self.cim
    }

    fn ctbn_statistics(&self) -> &CtbnSufficientStatistics {
        &self.statistics
    }
}

/// A node of the merged classifier graph.
#[derive(Debug, Clone)]
pub enum ModelNode {
    /// Class variable from the Bayesian network.
    Cpt(CptNode),
    /// Feature variable from the continuous-time Bayesian network.
    Cim(CimNode),
}

impl ModelNode {
    pub fn as_cpt(&self) -> Option<&CptNode> {
        match self {
            Self::Cpt(node) => Some(node),
            Self::Cim(_) => None,
        }
    }

    pub fn as_cim(&self) -> Option<&CimNode> {
        match self {
            Self::Cim(node) => Some(node),
            Self::Cpt(_) => None,
        }
    }
}

impl HasStates for ModelNode {
    fn discrete(&self) -> &DiscreteNode {
        match self {
            Self::Cpt(node) => node.discrete(),
            Self::Cim(node) => node.discrete(),
        }
    }

    fn discrete_mut(&mut self) -> &mut DiscreteNode {
        match self {
            Self::Cpt(node) => node.discrete_mut(),
            Self::Cim(node) => node.discrete_mut(),
        }
    }
}
