//! Shared fixtures for the integration and property tests.

use std::sync::Arc;

use mctbnc_core::{AdjacencyMatrix, Dataset};

pub fn assert_close(actual: f64, expected: f64, tol: f64, label: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{} mismatch: expected {:.15}, got {:.15}, diff={:.3e}",
        label,
        expected,
        actual,
        (actual - expected).abs()
    );
}

/// Six sequences over class `C` and binary features `V1`, `V2`, `V3`.
///
/// Node ids in a CTBN over this dataset follow the header: `C=0, V1=1, V2=2,
/// V3=3`.
pub fn golden_dataset() -> Arc<Dataset> {
    let columns = ["t", "C", "V1", "V2", "V3"];
    let blocks: Vec<Vec<Vec<&str>>> = vec![
        vec![
            vec!["0.0", "c0", "a", "a", "a"],
            vec!["0.5", "c0", "b", "a", "b"],
            vec!["1.5", "c0", "b", "b", "b"],
            vec!["2.0", "c0", "a", "b", "b"],
        ],
        vec![
            vec!["0.0", "c0", "a", "b", "b"],
            vec!["1.0", "c0", "b", "b", "b"],
            vec!["2.0", "c0", "b", "a", "b"],
        ],
        vec![
            vec!["0.0", "c1", "a", "b", "b"],
            vec!["0.5", "c1", "b", "b", "b"],
            vec!["1.5", "c1", "b", "b", "a"],
            vec!["2.0", "c1", "b", "b", "b"],
        ],
        vec![
            vec!["0.0", "c1", "b", "a", "b"],
            vec!["1.0", "c1", "b", "b", "b"],
            vec!["3.0", "c1", "a", "b", "b"],
        ],
        vec![
            vec!["0.0", "c0", "b", "b", "b"],
            vec!["1.5", "c0", "a", "b", "b"],
            vec!["2.5", "c0", "a", "a", "b"],
        ],
        vec![
            vec!["0.0", "c1", "b", "a", "b"],
            vec!["2.0", "c1", "a", "a", "b"],
            vec!["2.5", "c1", "a", "b", "b"],
        ],
    ];
    Arc::new(Dataset::from_records("t", &["C"], &columns, &blocks))
}

/// `V2 -> V1`, `V3 -> V1`, `V3 -> V2` over the golden dataset's nodes.
pub fn golden_structure() -> AdjacencyMatrix {
    let mut m = AdjacencyMatrix::new(4);
    m.set(2, 1, true);
    m.set(3, 1, true);
    m.set(3, 2, true);
    m
}

/// Records of one sequence on a 0.25 grid over `[0, 8]`.
///
/// A fast feature toggles at every grid point; a slow one toggles at 4 and 8.
pub fn rate_records(c: &str, d: &str) -> Vec<Vec<String>> {
    let fast_x = c == "c0";
    let fast_y = d == "d0";
    let toggle = |fast: bool, step: usize| {
        let flips = if fast { step } else { step / 16 };
        if flips % 2 == 0 {
            "a"
        } else {
            "b"
        }
    };
    (0..=32)
        .map(|step| {
            vec![
                format!("{}", step as f64 * 0.25),
                c.to_string(),
                d.to_string(),
                toggle(fast_x, step).to_string(),
                toggle(fast_y, step).to_string(),
            ]
        })
        .collect()
}

pub fn rate_columns() -> Vec<String> {
    ["t", "C", "D", "X", "Y"].iter().map(|s| s.to_string()).collect()
}

/// Dataset where `C` sets the switching rate of `X` and `D` that of `Y`.
/// `counts` lists how many sequences each `(C, D)` combination gets.
pub fn rate_dataset(counts: &[((&str, &str), usize)]) -> Arc<Dataset> {
    let mut blocks = Vec::new();
    for &((c, d), n) in counts {
        for _ in 0..n {
            blocks.push(rate_records(c, d));
        }
    }
    Arc::new(Dataset::from_records("t", &["C", "D"], &rate_columns(), &blocks))
}

/// Two of every class combination.
pub fn balanced_rate_dataset() -> Arc<Dataset> {
    rate_dataset(&[
        (("c0", "d0"), 2),
        (("c0", "d1"), 2),
        (("c1", "d0"), 2),
        (("c1", "d1"), 2),
    ])
}
