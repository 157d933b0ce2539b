//! # Maximum a posteriori classification
//!
//! For every joint class configuration `c` the score
//!
//! ```text
//! score(c) = ln P(c) + ln P(sequence | c)
//! ```
//!
//! is evaluated exactly. The prior factorises over the class subgraph in
//! topological order (`Σ ln cpt[j][k]`, `−∞` for a zero cell). The likelihood
//! walks every inter-observation interval of every feature:
//!
//! ```text
//! −qx·Δt                      always
//! + ln qx + ln oxy            when the feature leaves x at the end of the interval
//! ```
//!
//! Zero parameters contribute no logarithm, mirroring the estimator's
//! log-likelihood. Unseen states contribute nothing.
//!
//! Scores are normalised with log-sum-exp. When every configuration scores
//! `−∞` the posterior is uniform and the first configuration is predicted.
//! Ties go to the configuration enumerated first.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::dataset::{Dataset, Sequence};
use crate::engine::errors::ModelError;
use crate::engine::merged::MergedModel;
use crate::engine::node::{HasCim, HasCpt, HasStates, ModelNode, NodeId};
use crate::engine::states::StateContext;

/// State indexes of the class variables, in declaration order.
pub type ClassConfiguration = SmallVec<[usize; 4]>;

/// Odometer over all joint class configurations; the first class variable is
/// the least significant digit.
#[derive(Debug, Clone)]
pub struct ClassConfigurations {
    cardinalities: SmallVec<[usize; 4]>,
    next: Option<ClassConfiguration>,
}

impl ClassConfigurations {
    pub fn new(cardinalities: &[usize]) -> Self {
        let next = if cardinalities.iter().any(|&k| k == 0) {
            None
        } else {
            Some(SmallVec::from_elem(0, cardinalities.len()))
        };
        Self {
            cardinalities: cardinalities.iter().copied().collect(),
            next,
        }
    }

    /// Number of configurations, or `None` on overflow.
    pub fn num_configurations(cardinalities: &[usize]) -> Option<usize> {
        cardinalities
            .iter()
            .try_fold(1usize, |acc, &k| acc.checked_mul(k))
    }
}

impl Iterator for ClassConfigurations {
    type Item = ClassConfiguration;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut successor = current.clone();
        let mut carry = true;
        for (digit, &k) in successor.iter_mut().zip(&self.cardinalities) {
            *digit += 1;
            if *digit < k {
                carry = false;
                break;
            }
            *digit = 0;
        }
        if !carry {
            self.next = Some(successor);
        }
        Some(current)
    }
}

/// Posterior probability of one class configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConfigurationProbability {
    /// Class values aligned with the model's class variables.
    pub values: Vec<Arc<str>>,
    pub probability: f64,
}

/// Classification of one sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Prediction {
    class_variables: Arc<[Arc<str>]>,
    predicted: Vec<Arc<str>>,
    /// Unnormalised log joint of the predicted configuration.
    log_score: f64,
    probabilities: Option<Vec<ConfigurationProbability>>,
}

impl Prediction {
    /// Assembles a prediction from precomputed parts.
    pub fn from_parts(
        class_variables: Arc<[Arc<str>]>,
        predicted: Vec<Arc<str>>,
        log_score: f64,
        probabilities: Option<Vec<ConfigurationProbability>>,
    ) -> Self {
        Self {
            class_variables,
            predicted,
            log_score,
            probabilities,
        }
    }

    pub fn class_variables(&self) -> &[Arc<str>] {
        &self.class_variables
    }

    /// Predicted class values aligned with [`class_variables`](Self::class_variables).
    pub fn predicted(&self) -> &[Arc<str>] {
        &self.predicted
    }

    /// `(variable, value)` pairs of the prediction.
    pub fn class_values(&self) -> impl Iterator<Item = (&Arc<str>, &Arc<str>)> {
        self.class_variables.iter().zip(&self.predicted)
    }

    pub fn value_of(&self, variable: &str) -> Option<&Arc<str>> {
        self.class_variables
            .iter()
            .position(|c| c.as_ref() == variable)
            .map(|i| &self.predicted[i])
    }

    pub fn log_score(&self) -> f64 {
        self.log_score
    }

    /// Posterior over every configuration, when requested.
    pub fn probabilities(&self) -> Option<&[ConfigurationProbability]> {
        self.probabilities.as_deref()
    }

    /// Marginal posterior `P(variable = value | sequence)`.
    pub fn probability_of(&self, variable: &str, value: &str) -> Option<f64> {
        let column = self
            .class_variables
            .iter()
            .position(|c| c.as_ref() == variable)?;
        let probabilities = self.probabilities.as_ref()?;
        Some(
            probabilities
                .iter()
                .filter(|p| p.values[column].as_ref() == value)
                .map(|p| p.probability)
                .sum(),
        )
    }

    /// Posterior of the predicted configuration.
    pub fn confidence(&self) -> Option<f64> {
        self.probabilities
            .as_ref()?
            .iter()
            .find(|p| p.values == self.predicted)
            .map(|p| p.probability)
    }
}

/// Feature states read once per observation.
struct FeatureTrace {
    times: Vec<f64>,
    /// `states[i][f]`: state of feature `f` at observation `i`.
    states: Vec<SmallVec<[Option<usize>; 8]>>,
}

fn read_trace(model: &MergedModel, sequence: &Sequence) -> Result<FeatureTrace, ModelError> {
    let mut columns = SmallVec::<[(usize, &ModelNode); 8]>::new();
    for &id in model.feature_nodes() {
        let node = model
            .network()
            .node(id)
            .ok_or_else(|| ModelError::Internal(format!("node id {} out of range", id.0)))?;
        let column = sequence.column_of(node.name()).ok_or_else(|| {
            ModelError::Validation(format!("feature '{}' missing from sequence", node.name()))
        })?;
        columns.push((column, node));
    }
    let observations = sequence.observations();
    Ok(FeatureTrace {
        times: observations.iter().map(|o| o.time).collect(),
        states: observations
            .iter()
            .map(|o| {
                columns
                    .iter()
                    .map(|(c, node)| node.discrete().states().index_of(&o.values[*c]))
                    .collect()
            })
            .collect(),
    })
}

fn log_prior(model: &MergedModel, ctx: &StateContext) -> Result<f64, ModelError> {
    let mut lp = 0.0;
    for &id in model.class_order() {
        let node = model
            .network()
            .node(id)
            .and_then(ModelNode::as_cpt)
            .ok_or_else(|| ModelError::Internal(format!("class node {} has no CPT", id.0)))?;
        let (Some(j), Some(k)) = (node.discrete().idx_state_parents(ctx), node.discrete().current_state(ctx))
        else {
            return Ok(f64::NEG_INFINITY);
        };
        let p = node.cpt().probability(j, k);
        if p <= 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        lp += p.ln();
    }
    Ok(lp)
}

fn log_likelihood(
    model: &MergedModel,
    trace: &FeatureTrace,
    ctx: &mut StateContext,
) -> Result<f64, ModelError> {
    let features = model.feature_nodes();
    let mut nodes = SmallVec::<[&ModelNode; 8]>::new();
    for &id in features {
        nodes.push(
            model
                .network()
                .node(id)
                .ok_or_else(|| ModelError::Internal(format!("node id {} out of range", id.0)))?,
        );
    }

    let mut ll = 0.0;
    for i in 1..trace.times.len() {
        let dt = trace.times[i] - trace.times[i - 1];
        for (&id, state) in features.iter().zip(&trace.states[i - 1]) {
            ctx.set(id, *state);
        }
        for (f, node) in nodes.iter().enumerate() {
            let Some(cim_node) = node.as_cim() else {
                return Err(ModelError::Internal(format!(
                    "feature '{}' has no CIM",
                    node.name()
                )));
            };
            let (Some(x), Some(j)) = (trace.states[i - 1][f], node.discrete().idx_state_parents(ctx))
            else {
                continue;
            };
            let cim = cim_node.cim();
            let qx = cim.exit_rate(j, x);
            ll -= qx * dt;
            if let Some(y) = trace.states[i][f] {
                if y != x {
                    if qx > 0.0 {
                        ll += qx.ln();
                    }
                    let oxy = cim.transition_probability(j, x, y);
                    if oxy > 0.0 {
                        ll += oxy.ln();
                    }
                }
            }
        }
    }
    Ok(ll)
}

/// Classifies one sequence. With `with_probabilities` the full posterior is
/// attached.
pub fn predict_sequence(
    model: &MergedModel,
    sequence: &Sequence,
    with_probabilities: bool,
) -> Result<Prediction, ModelError> {
    let cardinalities = model.class_cardinalities();
    let total = ClassConfigurations::num_configurations(&cardinalities).ok_or_else(|| {
        ModelError::Validation("number of class configurations overflows usize".into())
    })?;
    if total == 0 {
        return Err(ModelError::Validation(
            "model has a class variable without states".into(),
        ));
    }

    let trace = read_trace(model, sequence)?;
    let mut ctx = StateContext::new(model.network().len());
    let mut configurations = Vec::with_capacity(total);
    let mut scores = Vec::with_capacity(total);
    for configuration in ClassConfigurations::new(&cardinalities) {
        for (&id, &state) in model.class_nodes().iter().zip(&configuration) {
            ctx.set(id, Some(state));
        }
        let prior = log_prior(model, &ctx)?;
        let score = if prior == f64::NEG_INFINITY {
            prior
        } else {
            prior + log_likelihood(model, &trace, &mut ctx)?
        };
        scores.push(score);
        configurations.push(configuration);
    }

    let mut best = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = i;
        }
    }

    let values_of = |configuration: &ClassConfiguration| -> Result<Vec<Arc<str>>, ModelError> {
        model
            .class_nodes()
            .iter()
            .zip(configuration)
            .map(|(&id, &state)| state_name(model, id, state))
            .collect()
    };

    let probabilities = if with_probabilities {
        let posterior = normalize(&scores);
        let mut out = Vec::with_capacity(total);
        for (configuration, probability) in configurations.iter().zip(posterior) {
            out.push(ConfigurationProbability {
                values: values_of(configuration)?,
                probability,
            });
        }
        Some(out)
    } else {
        None
    };

    Ok(Prediction {
        class_variables: model.class_variables().clone(),
        predicted: values_of(&configurations[best])?,
        log_score: scores[best],
        probabilities,
    })
}

fn state_name(model: &MergedModel, id: NodeId, state: usize) -> Result<Arc<str>, ModelError> {
    model
        .network()
        .node(id)
        .and_then(|n| n.discrete().states().state(state))
        .cloned()
        .ok_or_else(|| ModelError::Internal(format!("state {} of node {} out of range", state, id.0)))
}

/// Log-sum-exp normalisation; uniform when every score is `−∞`.
pub fn normalize(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        let uniform = 1.0 / scores.len().max(1) as f64;
        return vec![uniform; scores.len()];
    }
    let weights: Vec<f64> = scores.iter().map(|&s| (s - max).exp()).collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Classifies every sequence of `dataset`, in dataset order.
pub fn predict(
    model: &MergedModel,
    dataset: &Dataset,
    with_probabilities: bool,
) -> Result<Vec<Prediction>, ModelError> {
    #[cfg(feature = "parallel")]
    {
        dataset
            .sequences()
            .par_iter()
            .map(|s| predict_sequence(model, s, with_probabilities))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        dataset
            .sequences()
            .iter()
            .map(|s| predict_sequence(model, s, with_probabilities))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configurations_count_first_digit_fastest() {
        let all: Vec<Vec<usize>> = ClassConfigurations::new(&[2, 3])
            .map(|c| c.to_vec())
            .collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![1, 0]);
        assert_eq!(all[2], vec![0, 1]);
        assert_eq!(all[5], vec![1, 2]);
    }

    #[test]
    fn configuration_count_detects_overflow() {
        assert_eq!(ClassConfigurations::num_configurations(&[2, 3, 4]), Some(24));
        assert_eq!(ClassConfigurations::num_configurations(&[usize::MAX, 2]), None);
        assert_eq!(ClassConfigurations::new(&[2, 0]).count(), 0);
    }

    #[test]
    fn normalize_is_shift_invariant() {
        let p = normalize(&[-1000.0, -1000.0 + 2f64.ln()]);
        assert!((p[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((p[1] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn all_impossible_scores_are_uniform() {
        let p = normalize(&[f64::NEG_INFINITY; 4]);
        assert_eq!(p, vec![0.25; 4]);
        let q = normalize(&[f64::NEG_INFINITY, 0.0]);
        assert_eq!(q, vec![0.0, 1.0]);
    }
}
