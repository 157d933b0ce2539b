//! Hand-computed sufficient statistics and parameters for a three-feature
//! CTBN with `V2 -> V1`, `V3 -> V1` and `V3 -> V2`.
//!
//! Parent states of `V1` are encoded as `s(V2) + 2·s(V3)`, those of `V2` as
//! `s(V3)`, with `a = 0` and `b = 1`.

use std::sync::Arc;

use mctbnc_core::engine::bn::Bn;
use mctbnc_core::engine::ctbn::{Ctbn, InitialBridge};
use mctbnc_core::{
    BnEstimator, BridgeConstraints, CtbnEstimator, HasCim, HasStates, Penalization,
    StructuredModel,
};
use mctbnc_tests::{assert_close, golden_dataset, golden_structure};

fn golden_ctbn(estimator: CtbnEstimator) -> Ctbn {
    let dataset = golden_dataset();
    let bn = Arc::new(Bn::new(dataset.clone(), dataset.class_variables(), BnEstimator::Mle).unwrap());
    let mut ctbn = Ctbn::new(
        dataset,
        bn,
        estimator,
        Arc::new(BridgeConstraints::default()),
        InitialBridge::Empty,
    )
    .unwrap();
    ctbn.set_structure(&golden_structure()).unwrap();
    ctbn
}

#[test]
fn parent_encoding_follows_edge_order() {
    let ctbn = golden_ctbn(CtbnEstimator::Mle);
    let v1 = ctbn.node("V1").unwrap();
    let names: Vec<&str> = v1
        .discrete()
        .parents()
        .iter()
        .map(|&p| ctbn.network().node(p).unwrap().name().as_ref())
        .collect();
    assert_eq!(names, vec!["V2", "V3"]);
    assert_eq!(v1.discrete().num_states_parents(), 4);
    assert_eq!(ctbn.node("V2").unwrap().discrete().num_states_parents(), 2);
    assert_eq!(ctbn.node("V3").unwrap().discrete().num_states_parents(), 1);
}

#[test]
fn literal_reference_values() {
    let ctbn = golden_ctbn(CtbnEstimator::Mle);
    let v1 = ctbn.node("V1").unwrap();
    // Tx[V1 = a | V2 = a, V3 = a]
    assert_eq!(v1.ctbn_statistics().tx()[0][0], 0.5);
    // Mxy[V1: a -> b | V2 = b, V3 = b]
    assert_eq!(v1.ctbn_statistics().mxy()[3][0][1], 2.0);
    // qx[V3 = a]
    assert_eq!(ctbn.node("V3").unwrap().cim().exit_rate(0, 0), 2.0);
}

#[test]
fn v1_sojourn_times_and_transitions() {
    let ctbn = golden_ctbn(CtbnEstimator::Mle);
    let stats = ctbn.node("V1").unwrap().ctbn_statistics();
    let expected_tx = [[0.5, 0.0], [0.0, 0.5], [0.5, 4.0], [2.5, 6.0]];
    for (j, row) in expected_tx.iter().enumerate() {
        for (x, &t) in row.iter().enumerate() {
            assert_close(stats.tx()[j][x], t, 1e-12, &format!("V1 tx[{j}][{x}]"));
        }
    }
    let expected_mxy = [
        [[0.0, 1.0], [0.0, 0.0]],
        [[0.0, 0.0], [0.0, 0.0]],
        [[0.0, 0.0], [1.0, 0.0]],
        [[0.0, 2.0], [3.0, 0.0]],
    ];
    for (j, m) in expected_mxy.iter().enumerate() {
        for (x, row) in m.iter().enumerate() {
            assert_eq!(stats.mxy()[j][x], row.to_vec(), "V1 mxy[{j}][{x}]");
        }
    }
    assert_eq!(stats.mx()[3], vec![2.0, 3.0]);
}

#[test]
fn v1_mle_parameters() {
    let ctbn = golden_ctbn(CtbnEstimator::Mle);
    let cim = ctbn.node("V1").unwrap().cim();
    let expected_qx = [[2.0, 0.0], [0.0, 0.0], [0.0, 0.25], [0.8, 0.5]];
    for (j, row) in expected_qx.iter().enumerate() {
        for (x, &q) in row.iter().enumerate() {
            assert_close(cim.exit_rate(j, x), q, 1e-12, &format!("V1 qx[{j}][{x}]"));
        }
    }
    // binary states: every visited-and-left state jumps to the other one
    assert_eq!(cim.transition_probability(0, 0, 1), 1.0);
    assert_eq!(cim.transition_probability(3, 0, 1), 1.0);
    assert_eq!(cim.transition_probability(3, 1, 0), 1.0);
    // visited but never left, or never visited
    assert_eq!(cim.transition_probability(1, 0, 1), 0.0);
    assert_eq!(cim.transition_probability(1, 1, 0), 0.0);
}

#[test]
fn v2_and_v3_parameters() {
    let ctbn = golden_ctbn(CtbnEstimator::Mle);
    let v2 = ctbn.node("V2").unwrap();
    assert_eq!(v2.ctbn_statistics().tx(), &[vec![0.5, 0.5], vec![4.5, 8.5]]);
    assert_eq!(v2.ctbn_statistics().mx(), &[vec![0.0, 0.0], vec![3.0, 2.0]]);
    assert_eq!(v2.cim().exit_rate(0, 0), 0.0);
    assert_eq!(v2.cim().exit_rate(0, 1), 0.0);
    assert_close(v2.cim().exit_rate(1, 0), 3.0 / 4.5, 1e-12, "V2 qx[1][0]");
    assert_close(v2.cim().exit_rate(1, 1), 2.0 / 8.5, 1e-12, "V2 qx[1][1]");

    let v3 = ctbn.node("V3").unwrap();
    assert_eq!(v3.ctbn_statistics().tx(), &[vec![1.0, 13.0]]);
    assert_eq!(v3.ctbn_statistics().mx(), &[vec![2.0, 1.0]]);
    assert_close(v3.cim().exit_rate(0, 0), 2.0, 1e-12, "V3 qx[0][0]");
    assert_close(v3.cim().exit_rate(0, 1), 1.0 / 13.0, 1e-12, "V3 qx[0][1]");
}

#[test]
fn bayesian_estimates_with_imaginary_counts() {
    let ctbn = golden_ctbn(CtbnEstimator::Bayesian {
        mxy_hp: 1.0,
        tx_hp: 0.5,
    });
    let v3 = ctbn.node("V3").unwrap();
    // statistics stay raw
    assert_eq!(v3.ctbn_statistics().mx(), &[vec![2.0, 1.0]]);
    // Mx_hp = 1·(2 − 1)
    assert_close(v3.cim().exit_rate(0, 0), 3.0 / 1.5, 1e-12, "V3 qx[0][0]");
    assert_close(v3.cim().exit_rate(0, 1), 2.0 / 13.5, 1e-12, "V3 qx[0][1]");
    assert_close(v3.cim().transition_probability(0, 0, 1), 1.0, 1e-12, "V3 oxy");

    let v1 = ctbn.node("V1").unwrap();
    // unvisited parent state (j = 1, x = 0): (0 + 1) / (0 + 0.5)
    assert_close(v1.cim().exit_rate(1, 0), 2.0, 1e-12, "V1 qx[1][0]");
    // visited, never left (j = 1, x = 1): (0 + 1) / (0.5 + 0.5)
    assert_close(v1.cim().exit_rate(1, 1), 1.0, 1e-12, "V1 qx[1][1]");
}

#[test]
fn golden_log_likelihood() {
    let ctbn = golden_ctbn(CtbnEstimator::Mle);
    // For every (j, x) with Mx > 0 and binary states: Mx·ln(qx) − qx·Tx, and
    // oxy = 1 contributes nothing.
    let term = |m: f64, t: f64| if m > 0.0 { m * (m / t).ln() - m } else { 0.0 };
    let v1 = term(1.0, 0.5) + term(1.0, 4.0) + term(2.0, 2.5) + term(3.0, 6.0);
    let v2 = term(3.0, 4.5) + term(2.0, 8.5);
    let v3 = term(2.0, 1.0) + term(1.0, 13.0);
    assert_close(
        ctbn.estimate_log_likelihood(Penalization::None),
        v1 + v2 + v3,
        1e-9,
        "log-likelihood",
    );
    assert_close(v1 + v2 + v3, -23.507764111406990, 1e-9, "log-likelihood literal");

    // BIC: ln(6)/2 per parameter, J·K·(K−1) = 8 + 4 + 2
    let bic = v1 + v2 + v3 - 6f64.ln() / 2.0 * 14.0;
    assert_close(ctbn.estimate_log_likelihood(Penalization::Bic), bic, 1e-9, "bic");
}
