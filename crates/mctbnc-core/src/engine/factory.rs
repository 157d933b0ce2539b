//! Node creation from a dataset's vocabulary.

use std::sync::Arc;

use crate::engine::dataset::Dataset;
use crate::engine::errors::ModelError;
use crate::engine::node::{CimNode, CptNode, DiscreteNode};

/// Creates one discrete node per variable, reading each vocabulary from
/// `dataset`.
pub fn discrete_nodes(
    dataset: &Dataset,
    variables: &[Arc<str>],
) -> Result<Vec<DiscreteNode>, ModelError> {
    variables
        .iter()
        .map(|name| {
            let states = dataset.state_index(name).ok_or_else(|| {
                ModelError::Validation(format!("variable '{}' not present in dataset", name))
            })?;
            Ok(DiscreteNode::new(
                name.clone(),
                states,
                dataset.is_class_variable(name),
            ))
        })
        .collect()
}

pub fn cpt_nodes(dataset: &Dataset, variables: &[Arc<str>]) -> Result<Vec<CptNode>, ModelError> {
    Ok(discrete_nodes(dataset, variables)?
        .into_iter()
        .map(CptNode::new)
        .collect())
}

pub fn cim_nodes(dataset: &Dataset, variables: &[Arc<str>]) -> Result<Vec<CimNode>, ModelError> {
    Ok(discrete_nodes(dataset, variables)?
        .into_iter()
        .map(CimNode::new)
        .collect())
}
