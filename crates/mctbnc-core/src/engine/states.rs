//! State vocabularies and evaluation contexts.
//!
//! A [`StateIndex`] is the immutable bijection between the string states a
//! variable took in the training data and dense indexes `0..k`. It is shared
//! through an `Arc` by every node created for the variable, so cloning a model
//! never copies vocabularies.
//!
//! A [`StateContext`] holds the "current state" of every node during one
//! statistics, inference or sampling pass. Nodes never store mutable scratch
//! state themselves; the same node can be evaluated from several contexts at
//! once.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::node::NodeId;

/// Immutable bijective map between states and indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateIndex {
    states: Vec<Arc<str>>,
    lookup: FxHashMap<Arc<str>, usize>,
}

impl StateIndex {
    /// Builds an index from states in the given order. Duplicates keep their
    /// first position.
    pub fn new<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let mut ordered: Vec<Arc<str>> = Vec::new();
        let mut lookup = FxHashMap::default();
        for state in states {
            let state: Arc<str> = state.into();
            if lookup.contains_key(&state) {
                continue;
            }
            lookup.insert(state.clone(), ordered.len());
            ordered.push(state);
        }
        Self {
            states: ordered,
            lookup,
        }
    }

    /// Index of `value`, or `None` if the state was never seen in training.
    #[inline]
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.lookup.get(value).copied()
    }

    /// State at `idx`.
    #[inline]
    pub fn state(&self, idx: usize) -> Option<&Arc<str>> {
        self.states.get(idx)
    }

    /// Number of states (the variable's cardinality).
    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// States in index order.
    pub fn states(&self) -> &[Arc<str>] {
        &self.states
    }
}

/// Per-pass "current state" slots, one per node id.
///
/// `None` marks a slot that is unset or was assigned a state unseen during
/// training.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateContext {
    slots: Vec<Option<usize>>,
}

impl StateContext {
    /// Creates a context with `num_nodes` unset slots.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            slots: vec![None; num_nodes],
        }
    }

    #[inline]
    pub fn get(&self, node: NodeId) -> Option<usize> {
        self.slots.get(node.index()).copied().flatten()
    }

    #[inline]
    pub fn set(&mut self, node: NodeId, state: Option<usize>) {
        if let Some(slot) = self.slots.get_mut(node.index()) {
            *slot = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_index_is_bijective() {
        let idx = StateIndex::new(["a", "b", "c"]);
        for i in 0..idx.len() {
            let s = idx.state(i).unwrap().clone();
            assert_eq!(idx.index_of(&s), Some(i));
        }
    }

    #[test]
    fn unseen_state_is_none() {
        let idx = StateIndex::new(["low", "high"]);
        assert_eq!(idx.index_of("medium"), None);
    }

    #[test]
    fn duplicates_keep_first_position() {
        let idx = StateIndex::new(["x", "y", "x"]);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.index_of("y"), Some(1));
    }

    #[test]
    fn context_out_of_range_reads_none() {
        let mut ctx = StateContext::new(2);
        ctx.set(NodeId(1), Some(3));
        assert_eq!(ctx.get(NodeId(1)), Some(3));
        assert_eq!(ctx.get(NodeId(7)), None);
        ctx.set(NodeId(1), None);
        assert_eq!(ctx.get(NodeId(1)), None);
    }
}
