//! # Parameter estimation
//!
//! Closed-form estimators turning sufficient statistics into parameters.
//!
//! - **CPT** (Lindstone / Dirichlet rule):
//!   `cpt[j][k] = (Nx[j][k] + α) / (Σ_k Nx[j][k] + α·K)`
//! - **CIM**:
//!   `qx[j][x] = (Mx[j][x] + Mx_hp) / (Tx[j][x] + Tx_hp)` with `Mx_hp = Mxy_hp·(K−1)`,
//!   `oxy[j][x][y] = (Mxy[j][x][y] + Mxy_hp) / (Mx[j][x] + Mx_hp)` for `y ≠ x`.
//!
//! Maximum likelihood is the same computation with every hyperparameter at
//! zero, so a Bayesian estimator with zero hyperparameters is bit-identical to
//! MLE. Every ratio whose denominator is zero is defined as exactly `0.0`.

use crate::engine::errors::ModelError;
use crate::engine::statistics::{BnSufficientStatistics, CtbnSufficientStatistics};

/// Ratio with the zero-denominator convention.
#[inline]
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn check_hyperparameter(name: &str, value: f64) -> Result<(), ModelError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ModelError::Validation(format!(
            "{} must be finite and >= 0, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Conditional probability table `cpt[parent_state][state]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cpt {
    table: Vec<Vec<f64>>,
}

impl Cpt {
    pub fn zeros(num_parent_states: usize, num_states: usize) -> Self {
        Self {
            table: vec![vec![0.0; num_states]; num_parent_states],
        }
    }

    /// Wraps an explicit table (rows indexed by parent state).
    pub fn from_table(table: Vec<Vec<f64>>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &[Vec<f64>] {
        &self.table
    }

    /// `P(state | parent_state)`, `0.0` outside the table.
    #[inline]
    pub fn probability(&self, parent_state: usize, state: usize) -> f64 {
        self.table
            .get(parent_state)
            .and_then(|row| row.get(state))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn row(&self, parent_state: usize) -> Option<&[f64]> {
        self.table.get(parent_state).map(Vec::as_slice)
    }
}

/// Conditional intensity matrix: exit rates `qx[j][x]` and embedded transition
/// probabilities `oxy[j][x][y]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cim {
    qx: Vec<Vec<f64>>,
    oxy: Vec<Vec<Vec<f64>>>,
}

impl Cim {
    pub fn zeros(num_parent_states: usize, num_states: usize) -> Self {
        Self {
            qx: vec![vec![0.0; num_states]; num_parent_states],
            oxy: vec![vec![vec![0.0; num_states]; num_states]; num_parent_states],
        }
    }

    pub fn from_parts(qx: Vec<Vec<f64>>, oxy: Vec<Vec<Vec<f64>>>) -> Self {
        Self { qx, oxy }
    }

    pub fn qx(&self) -> &[Vec<f64>] {
        &self.qx
    }

    pub fn oxy(&self) -> &[Vec<Vec<f64>>] {
        &self.oxy
    }

    /// Exit rate of `from` under `parent_state`, `0.0` outside the table.
    #[inline]
    pub fn exit_rate(&self, parent_state: usize, from: usize) -> f64 {
        self.qx
            .get(parent_state)
            .and_then(|row| row.get(from))
            .copied()
            .unwrap_or(0.0)
    }

    /// Probability that leaving `from` lands in `to`.
    #[inline]
    pub fn transition_probability(&self, parent_state: usize, from: usize, to: usize) -> f64 {
        self.oxy
            .get(parent_state)
            .and_then(|m| m.get(from))
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Estimator for CPT nodes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BnEstimator {
    /// Maximum likelihood.
    #[default]
    Mle,
    /// Dirichlet prior with the same pseudo-count `alpha` in every cell.
    Bayesian { alpha: f64 },
}

impl BnEstimator {
    pub fn validate(self) -> Result<Self, ModelError> {
        if let Self::Bayesian { alpha } = self {
            check_hyperparameter("alpha", alpha)?;
        }
        Ok(self)
    }

    fn alpha(self) -> f64 {
        match self {
            Self::Mle => 0.0,
            Self::Bayesian { alpha } => alpha,
        }
    }

    pub fn estimate(self, stats: &BnSufficientStatistics) -> Cpt {
        let alpha = self.alpha();
        let table = stats
            .nx()
            .iter()
            .map(|row| {
                let k = row.len() as f64;
                let total: f64 = row.iter().sum::<f64>() + alpha * k;
                row.iter().map(|&n| ratio(n + alpha, total)).collect()
            })
            .collect();
        Cpt { table }
    }
}

/// Estimator for CIM nodes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CtbnEstimator {
    /// Maximum likelihood.
    #[default]
    Mle,
    /// Imaginary transition counts `mxy_hp` and imaginary time `tx_hp`.
    Bayesian { mxy_hp: f64, tx_hp: f64 },
}

impl CtbnEstimator {
    pub fn validate(self) -> Result<Self, ModelError> {
        if let Self::Bayesian { mxy_hp, tx_hp } = self {
            check_hyperparameter("mxy_hp", mxy_hp)?;
            check_hyperparameter("tx_hp", tx_hp)?;
        }
        Ok(self)
    }

    fn hyperparameters(self) -> (f64, f64) {
        match self {
            Self::Mle => (0.0, 0.0),
            Self::Bayesian { mxy_hp, tx_hp } => (mxy_hp, tx_hp),
        }
    }

    pub fn estimate(self, stats: &CtbnSufficientStatistics) -> Cim {
        let (mxy_hp, tx_hp) = self.hyperparameters();
        let k = stats.num_states();
        let mx_hp = mxy_hp * k.saturating_sub(1) as f64;

        let mut cim = Cim::zeros(stats.num_parent_states(), k);
        for j in 0..stats.num_parent_states() {
            for x in 0..k {
                let mx = stats.mx()[j][x] + mx_hp;
                cim.qx[j][x] = ratio(mx, stats.tx()[j][x] + tx_hp);
                for y in 0..k {
                    if y != x {
                        cim.oxy[j][x][y] = ratio(stats.mxy()[j][x][y] + mxy_hp, mx);
                    }
                }
            }
        }
        cim
    }
}

/// Penalisation applied to log-likelihood scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Penalization {
    /// Plain log-likelihood.
    #[default]
    None,
    /// Akaike: one unit per free parameter.
    Aic,
    /// Bayesian information criterion: `ln(N)/2` per free parameter.
    Bic,
}

impl Penalization {
    /// Per-parameter penalty for a dataset of `num_sequences` sequences.
    pub fn penalty(self, num_sequences: usize) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Aic => 1.0,
            Self::Bic => (num_sequences.max(1) as f64).ln() / 2.0,
        }
    }
}

/// `Σ_{j,k} Nx·ln cpt`, skipping zero cells.
pub fn cpt_log_likelihood(stats: &BnSufficientStatistics, cpt: &Cpt) -> f64 {
    let mut ll = 0.0;
    for (j, row) in stats.nx().iter().enumerate() {
        for (k, &n) in row.iter().enumerate() {
            let p = cpt.probability(j, k);
            if n > 0.0 && p > 0.0 {
                ll += n * p.ln();
            }
        }
    }
    ll
}

/// `Σ_{j,x} [Mx·ln qx − qx·Tx + Σ_{y≠x} Mxy·ln oxy]`, skipping `ln` of zero.
pub fn cim_log_likelihood(stats: &CtbnSufficientStatistics, cim: &Cim) -> f64 {
    let mut ll = 0.0;
    let k = stats.num_states();
    for j in 0..stats.num_parent_states() {
        for x in 0..k {
            let qx = cim.exit_rate(j, x);
            if qx > 0.0 {
                ll += stats.mx()[j][x] * qx.ln() - qx * stats.tx()[j][x];
            }
            for y in 0..k {
                if y == x {
                    continue;
                }
                let oxy = cim.transition_probability(j, x, y);
                if oxy > 0.0 {
                    ll += stats.mxy()[j][x][y] * oxy.ln();
                }
            }
        }
    }
    ll
}

/// Free parameters of a CPT: `J·(K−1)`.
pub fn cpt_num_parameters(num_parent_states: usize, num_states: usize) -> f64 {
    (num_parent_states * num_states.saturating_sub(1)) as f64
}

/// Free parameters of a CIM: `J·K·(K−1)`.
pub fn cim_num_parameters(num_parent_states: usize, num_states: usize) -> f64 {
    (num_parent_states * num_states * num_states.saturating_sub(1)) as f64
}
