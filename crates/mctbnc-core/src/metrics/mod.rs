//! Classification performance metrics.
//!
//! Built-in metrics, all computed against the class values stored in a
//! labelled dataset:
//! - `global_accuracy`: share of sequences with every class variable right
//! - `mean_accuracy`: per-variable accuracy averaged over class variables
//! - `macro_f1`: per-variable macro F1 averaged over class variables
//! - `brier_score`: mean squared error of the joint posterior (needs
//!   predictions made with probabilities)
//!
//! Notes:
//! - Deterministic: labels are visited in sorted order.
//! - A state with no true and no predicted occurrence is ignored by F1.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::dataset::Dataset;
use crate::engine::errors::ModelError;
use crate::engine::inference::Prediction;

/// Predictions paired with the true class values of their sequences.
#[derive(Debug, Clone, Copy)]
pub struct Labelled<'a> {
    pub predictions: &'a [Prediction],
    pub dataset: &'a Dataset,
}

impl<'a> Labelled<'a> {
    /// Pairs `predictions` with `dataset`, checking they line up.
    pub fn new(predictions: &'a [Prediction], dataset: &'a Dataset) -> Result<Self, ModelError> {
        if predictions.len() != dataset.len() {
            return Err(ModelError::Validation(format!(
                "{} predictions for {} sequences",
                predictions.len(),
                dataset.len()
            )));
        }
        if let Some(p) = predictions
            .iter()
            .find(|p| p.class_variables() != dataset.class_variables())
        {
            return Err(ModelError::Validation(format!(
                "prediction class variables {:?} differ from dataset {:?}",
                p.class_variables(),
                dataset.class_variables()
            )));
        }
        Ok(Self {
            predictions,
            dataset,
        })
    }

    fn pairs(&self, variable: usize) -> impl Iterator<Item = (&Arc<str>, &Arc<str>)> + '_ {
        self.dataset
            .sequences()
            .iter()
            .zip(self.predictions)
            .map(move |(s, p)| (&s.class_values()[variable], &p.predicted()[variable]))
    }

    fn num_variables(&self) -> usize {
        self.dataset.class_variables().len()
    }
}

/// Trait for metric implementations.
pub trait MetricFn: Send + Sync + 'static {
    fn eval(&self, labelled: &Labelled<'_>) -> Result<f64, ModelError>;
}

/// Registry mapping names to metric implementations.
#[derive(Default, Clone)]
pub struct MetricRegistry {
    inner: FxHashMap<String, Arc<dyn MetricFn>>,
}

impl MetricRegistry {
    pub fn with_builtins() -> Self {
        let mut r = MetricRegistry::default();
        r.register("global_accuracy", Arc::new(GlobalAccuracy));
        r.register("mean_accuracy", Arc::new(MeanAccuracy));
        r.register("macro_f1", Arc::new(MeanMacroF1));
        r.register("brier_score", Arc::new(BrierScore));
        r
    }

    pub fn register(&mut self, name: &str, f: Arc<dyn MetricFn>) {
        self.inner.insert(name.to_string(), f);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MetricFn>> {
        self.inner.get(name).cloned()
    }

    /// Evaluates the metric registered under `name`.
    pub fn eval(&self, name: &str, labelled: &Labelled<'_>) -> Result<f64, ModelError> {
        let f = self
            .get(name)
            .ok_or_else(|| ModelError::Validation(format!("unknown metric '{}'", name)))?;
        f.eval(labelled)
    }
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Accuracy of one class variable.
pub fn accuracy(labelled: &Labelled<'_>, variable: usize) -> f64 {
    mean(labelled.pairs(variable).map(|(t, p)| if t == p { 1.0 } else { 0.0 }))
}

/// Macro-averaged F1 of one class variable.
pub fn macro_f1(labelled: &Labelled<'_>, variable: usize) -> f64 {
    let mut tp: FxHashMap<&str, f64> = FxHashMap::default();
    let mut fp: FxHashMap<&str, f64> = FxHashMap::default();
    let mut fn_: FxHashMap<&str, f64> = FxHashMap::default();
    let mut labels = BTreeSet::new();
    for (truth, predicted) in labelled.pairs(variable) {
        labels.insert(truth.as_ref());
        labels.insert(predicted.as_ref());
        if truth == predicted {
            *tp.entry(truth.as_ref()).or_default() += 1.0;
        } else {
            *fp.entry(predicted.as_ref()).or_default() += 1.0;
            *fn_.entry(truth.as_ref()).or_default() += 1.0;
        }
    }
    mean(labels.into_iter().map(|label| {
        let tp = tp.get(label).copied().unwrap_or(0.0);
        let denominator = 2.0 * tp
            + fp.get(label).copied().unwrap_or(0.0)
            + fn_.get(label).copied().unwrap_or(0.0);
        if denominator == 0.0 {
            0.0
        } else {
            2.0 * tp / denominator
        }
    }))
}

struct GlobalAccuracy;

impl MetricFn for GlobalAccuracy {
    fn eval(&self, labelled: &Labelled<'_>) -> Result<f64, ModelError> {
        Ok(mean(
            labelled
                .dataset
                .sequences()
                .iter()
                .zip(labelled.predictions)
                .map(|(s, p)| if s.class_values() == p.predicted() { 1.0 } else { 0.0 }),
        ))
    }
}

struct MeanAccuracy;

impl MetricFn for MeanAccuracy {
    fn eval(&self, labelled: &Labelled<'_>) -> Result<f64, ModelError> {
        Ok(mean((0..labelled.num_variables()).map(|v| accuracy(labelled, v))))
    }
}

struct MeanMacroF1;

impl MetricFn for MeanMacroF1 {
    fn eval(&self, labelled: &Labelled<'_>) -> Result<f64, ModelError> {
        Ok(mean((0..labelled.num_variables()).map(|v| macro_f1(labelled, v))))
    }
}

struct BrierScore;

impl MetricFn for BrierScore {
    fn eval(&self, labelled: &Labelled<'_>) -> Result<f64, ModelError> {
        let mut scores = Vec::with_capacity(labelled.predictions.len());
        for (sequence, prediction) in labelled.dataset.sequences().iter().zip(labelled.predictions) {
            let probabilities = prediction.probabilities().ok_or_else(|| {
                ModelError::Validation("brier_score needs predictions with probabilities".into())
            })?;
            scores.push(
                probabilities
                    .iter()
                    .map(|p| {
                        let hit = if p.values.as_slice() == sequence.class_values() { 1.0 } else { 0.0 };
                        (p.probability - hit).powi(2)
                    })
                    .sum::<f64>(),
            );
        }
        Ok(mean(scores))
    }
}

/// Scores of one class variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableReport {
    pub variable: Arc<str>,
    pub accuracy: f64,
    pub macro_f1: f64,
}

/// Summary of a prediction run against labelled sequences.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerformanceReport {
    pub num_sequences: usize,
    pub global_accuracy: f64,
    pub mean_accuracy: f64,
    pub mean_macro_f1: f64,
    pub per_variable: Vec<VariableReport>,
    /// Present when every prediction carries probabilities.
    pub brier_score: Option<f64>,
}

/// Compares `predictions` with the class values of `dataset`.
pub fn evaluate(
    predictions: &[Prediction],
    dataset: &Dataset,
) -> Result<PerformanceReport, ModelError> {
    let labelled = Labelled::new(predictions, dataset)?;
    let registry = MetricRegistry::with_builtins();
    let per_variable = dataset
        .class_variables()
        .iter()
        .enumerate()
        .map(|(v, name)| VariableReport {
            variable: name.clone(),
            accuracy: accuracy(&labelled, v),
            macro_f1: macro_f1(&labelled, v),
        })
        .collect();
    let brier_score = if predictions.iter().all(|p| p.probabilities().is_some()) {
        Some(registry.eval("brier_score", &labelled)?)
    } else {
        None
    };
    Ok(PerformanceReport {
        num_sequences: dataset.len(),
        global_accuracy: registry.eval("global_accuracy", &labelled)?,
        mean_accuracy: registry.eval("mean_accuracy", &labelled)?,
        mean_macro_f1: registry.eval("macro_f1", &labelled)?,
        per_variable,
        brier_score,
    })
}
