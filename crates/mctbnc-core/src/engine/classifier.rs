//! Multi-dimensional continuous-time Bayesian network classifier.
//!
//! Training runs in three steps:
//!
//! 1. learn the class subgraph, a Bayesian network over the class variables;
//! 2. learn the bridge and feature subgraph, a CTBN over every variable whose
//!    class nodes only serve as parents of features;
//! 3. merge both into a [`MergedModel`] used for prediction and sampling.
//!
//! Structure search is delegated to [`StructureLearningAlgorithm`]s; the
//! default keeps the initial structure (an empty class subgraph and the
//! configured bridge).

use std::sync::Arc;

use rand::Rng;

use crate::engine::bn::Bn;
use crate::engine::constraints::{
    BridgeConstraints, DagConstraints, InitialStructureOnly, StructureLearningAlgorithm,
};
use crate::engine::ctbn::{Ctbn, InitialBridge};
use crate::engine::dataset::{Dataset, Sequence};
use crate::engine::errors::ModelError;
use crate::engine::estimation::{BnEstimator, CtbnEstimator};
use crate::engine::inference::{self, Prediction};
use crate::engine::merged::MergedModel;
use crate::engine::sampler;

/// Training configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultiCtbncConfig {
    pub bn_estimator: BnEstimator,
    pub ctbn_estimator: CtbnEstimator,
    pub initial_bridge: InitialBridge,
    /// Cap on parents per class variable.
    pub max_class_parents: Option<usize>,
    /// Cap on feature parents per feature.
    pub max_feature_parents: Option<usize>,
}

impl MultiCtbncConfig {
    pub fn validate(self) -> Result<Self, ModelError> {
        self.bn_estimator.validate()?;
        self.ctbn_estimator.validate()?;
        Ok(self)
    }
}

/// Classifier owning its trained subgraphs.
#[derive(Debug, Clone)]
pub struct MultiCtbnc {
    config: MultiCtbncConfig,
    bn_learner: Arc<dyn StructureLearningAlgorithm>,
    ctbn_learner: Arc<dyn StructureLearningAlgorithm>,
    bn: Option<Arc<Bn>>,
    ctbn: Option<Arc<Ctbn>>,
    model: Option<Arc<MergedModel>>,
}

impl Default for MultiCtbnc {
    fn default() -> Self {
        Self::new(MultiCtbncConfig::default())
    }
}

impl MultiCtbnc {
    pub fn new(config: MultiCtbncConfig) -> Self {
        Self {
            config,
            bn_learner: Arc::new(InitialStructureOnly),
            ctbn_learner: Arc::new(InitialStructureOnly),
            bn: None,
            ctbn: None,
            model: None,
        }
    }

    /// Replaces the structure learners of the class subgraph and the CTBN.
    pub fn with_structure_learners(
        mut self,
        bn_learner: Arc<dyn StructureLearningAlgorithm>,
        ctbn_learner: Arc<dyn StructureLearningAlgorithm>,
    ) -> Self {
        self.bn_learner = bn_learner;
        self.ctbn_learner = ctbn_learner;
        self
    }

    pub fn config(&self) -> &MultiCtbncConfig {
        &self.config
    }

    /// Trains both subgraphs on `dataset` and merges them.
    ///
    /// A failed call leaves any previously trained model in place.
    pub fn learn(&mut self, dataset: Arc<Dataset>) -> Result<(), ModelError> {
        let config = self.config.validate()?;
        if dataset.class_variables().is_empty() {
            return Err(ModelError::Validation(
                "dataset declares no class variables".into(),
            ));
        }
        if dataset.is_empty() {
            return Err(ModelError::Validation(
                "cannot learn from a dataset without sequences".into(),
            ));
        }

        let mut bn = Bn::with_constraints(
            dataset.clone(),
            dataset.class_variables(),
            config.bn_estimator,
            Arc::new(DagConstraints {
                max_parents: config.max_class_parents,
            }),
        )?;
        self.bn_learner.learn(&mut bn)?;
        let bn = Arc::new(bn);

        let mut ctbn = Ctbn::new(
            dataset.clone(),
            bn.clone(),
            config.ctbn_estimator,
            Arc::new(BridgeConstraints {
                max_feature_parents: config.max_feature_parents,
            }),
            config.initial_bridge,
        )?;
        self.ctbn_learner.learn(&mut ctbn)?;

        let model = MergedModel::merge(&bn, &ctbn)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            sequences = dataset.len(),
            classes = model.class_nodes().len(),
            features = model.feature_nodes().len(),
            "multi-dimensional ctbn classifier trained"
        );

        self.bn = Some(bn);
        self.ctbn = Some(Arc::new(ctbn));
        self.model = Some(Arc::new(model));
        Ok(())
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// The merged model, once trained.
    pub fn model(&self) -> Result<&Arc<MergedModel>, ModelError> {
        self.model
            .as_ref()
            .ok_or_else(|| ModelError::Validation("classifier has not been trained".into()))
    }

    pub fn bn(&self) -> Option<&Arc<Bn>> {
        self.bn.as_ref()
    }

    pub fn ctbn(&self) -> Option<&Arc<Ctbn>> {
        self.ctbn.as_ref()
    }

    pub fn predict(
        &self,
        dataset: &Dataset,
        with_probabilities: bool,
    ) -> Result<Vec<Prediction>, ModelError> {
        inference::predict(self.model()?, dataset, with_probabilities)
    }

    pub fn predict_sequence(
        &self,
        sequence: &Sequence,
        with_probabilities: bool,
    ) -> Result<Prediction, ModelError> {
        inference::predict_sequence(self.model()?, sequence, with_probabilities)
    }

    pub fn sample<R: Rng + ?Sized>(&self, duration: f64, rng: &mut R) -> Result<Sequence, ModelError> {
        sampler::sample_sequence(self.model()?, duration, rng)
    }

    pub fn sample_dataset<R: Rng + ?Sized>(
        &self,
        count: usize,
        duration: f64,
        rng: &mut R,
    ) -> Result<Dataset, ModelError> {
        sampler::sample_dataset(self.model()?, count, duration, rng)
    }
}
