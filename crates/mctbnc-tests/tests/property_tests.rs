//! Property tests for parent encoding and estimator invariants.

use std::sync::Arc;

use mctbnc_core::engine::network::Network;
use mctbnc_core::engine::node::{CptNode, DiscreteNode};
use mctbnc_core::engine::states::{StateContext, StateIndex};
use mctbnc_core::engine::statistics::{BnSufficientStatistics, CtbnSufficientStatistics};
use mctbnc_core::{BnEstimator, CtbnEstimator, HasStates, NodeId};
use proptest::prelude::*;

fn node(name: &str, k: usize) -> CptNode {
    let states: Vec<String> = (0..k).map(|i| format!("s{i}")).collect();
    CptNode::new(DiscreteNode::new(name, Arc::new(StateIndex::new(states)), false))
}

/// Node 0 is the child; nodes 1.. are its parents with the given cardinalities.
fn star(cards: &[usize]) -> Network<CptNode> {
    let mut nodes = vec![node("child", 2)];
    nodes.extend(cards.iter().enumerate().map(|(i, &k)| node(&format!("p{i}"), k)));
    let mut net = Network::new(nodes).unwrap();
    for i in 1..=cards.len() {
        net.add_edge(NodeId::from(i), NodeId(0)).unwrap();
    }
    net
}

fn counts_matrix() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (1usize..5, 1usize..5).prop_flat_map(|(j, k)| {
        prop::collection::vec(prop::collection::vec((0u32..20).prop_map(f64::from), k), j)
    })
}

fn transition_counts() -> impl Strategy<Value = (Vec<Vec<Vec<f64>>>, Vec<Vec<f64>>)> {
    (1usize..4, 2usize..5).prop_flat_map(|(j, k)| {
        (
            prop::collection::vec(
                prop::collection::vec(prop::collection::vec((0u32..10).prop_map(f64::from), k), k),
                j,
            ),
            prop::collection::vec(prop::collection::vec(0.0f64..50.0, k), j),
        )
    })
}

proptest! {
    #[test]
    fn parent_state_round_trip(cards in prop::collection::vec(1usize..5, 0..4)) {
        let net = star(&cards);
        let child = net.node(NodeId(0)).unwrap().discrete();
        let expected: usize = cards.iter().product();
        prop_assert_eq!(child.num_states_parents(), expected);
        let mut ctx = StateContext::new(net.len());
        for idx in 0..expected {
            child.set_state_parents(&mut ctx, idx);
            prop_assert_eq!(child.idx_state_parents(&ctx), Some(idx));
        }
    }

    #[test]
    fn removing_parents_restores_radix_base(
        cards in prop::collection::vec(1usize..5, 1..5),
        order in any::<prop::sample::Index>(),
    ) {
        let mut net = star(&cards);
        let first = order.index(cards.len());
        prop_assert!(net.remove_edge(NodeId::from(first + 1), NodeId(0)));
        let rest: usize = cards
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != first)
            .map(|(_, &k)| k)
            .product();
        prop_assert_eq!(net.node(NodeId(0)).unwrap().discrete().num_states_parents(), rest);

        for i in 1..=cards.len() {
            net.remove_edge(NodeId::from(i), NodeId(0));
        }
        let child = net.node(NodeId(0)).unwrap().discrete();
        prop_assert_eq!(child.num_states_parents(), 1);
        prop_assert!(child.parents().is_empty());
        prop_assert!(net.nodes().iter().all(|n| n.discrete().children().is_empty()));
    }

    #[test]
    fn cpt_rows_sum_to_one_or_zero(nx in counts_matrix(), alpha in 0.0f64..5.0) {
        let stats = BnSufficientStatistics::from_counts(nx.clone());
        for estimator in [BnEstimator::Mle, BnEstimator::Bayesian { alpha }] {
            let cpt = estimator.estimate(&stats);
            for (j, row) in cpt.table().iter().enumerate() {
                let sum: f64 = row.iter().sum();
                let pseudo = match estimator {
                    BnEstimator::Bayesian { alpha } => alpha,
                    _ => 0.0,
                };
                if pseudo == 0.0 && nx[j].iter().all(|&n| n == 0.0) {
                    prop_assert_eq!(sum, 0.0);
                } else {
                    prop_assert!((sum - 1.0).abs() < 1e-9, "row {} sums to {}", j, sum);
                }
            }
        }
    }

    #[test]
    fn cim_rates_are_non_negative_and_rows_normalised(
        (mxy, tx) in transition_counts(),
        mxy_hp in 0.0f64..3.0,
        tx_hp in 0.0f64..3.0,
    ) {
        let mut mxy = mxy;
        for m in mxy.iter_mut() {
            for (x, row) in m.iter_mut().enumerate() {
                row[x] = 0.0;
            }
        }
        let stats = CtbnSufficientStatistics::from_counts(mxy, tx);
        let estimators = [CtbnEstimator::Mle, CtbnEstimator::Bayesian { mxy_hp, tx_hp }];
        for estimator in estimators {
            let cim = estimator.estimate(&stats);
            for (j, rates) in cim.qx().iter().enumerate() {
                for (x, &q) in rates.iter().enumerate() {
                    prop_assert!(q >= 0.0 && q.is_finite());
                    let row = &cim.oxy()[j][x];
                    prop_assert_eq!(row[x], 0.0);
                    let sum: f64 = row.iter().sum();
                    if stats.mx()[j][x] > 0.0 {
                        prop_assert!((sum - 1.0).abs() < 1e-9, "oxy[{}][{}] sums to {}", j, x, sum);
                    }
                }
            }
        }
    }

    #[test]
    fn zero_hyperparameters_are_bit_identical_to_mle(
        nx in counts_matrix(),
        (mxy, tx) in transition_counts(),
    ) {
        let bn_stats = BnSufficientStatistics::from_counts(nx);
        prop_assert_eq!(
            BnEstimator::Mle.estimate(&bn_stats),
            BnEstimator::Bayesian { alpha: 0.0 }.estimate(&bn_stats)
        );
        let ctbn_stats = CtbnSufficientStatistics::from_counts(mxy, tx);
        prop_assert_eq!(
            CtbnEstimator::Mle.estimate(&ctbn_stats),
            CtbnEstimator::Bayesian { mxy_hp: 0.0, tx_hp: 0.0 }.estimate(&ctbn_stats)
        );
    }
}
