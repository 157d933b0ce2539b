//! Generative sampling from a trained classifier.
//!
//! Class values are drawn once per sequence by ancestral sampling over the
//! class subgraph. Feature trajectories are simulated with competing
//! exponentials: every feature draws a sojourn time `−ln(1 − u) / qx` from its
//! current exit rate, the earliest one fires and jumps to a state drawn from
//! its embedded transition row. All pending sojourns are redrawn after each
//! jump since a feature's rate may depend on the one that moved.

use std::sync::Arc;

use rand::Rng;

use crate::engine::dataset::{Dataset, Sequence, SequenceValidation};
use crate::engine::errors::ModelError;
use crate::engine::merged::MergedModel;
use crate::engine::node::{HasCim, HasCpt, HasStates, ModelNode, NodeId};
use crate::engine::states::StateContext;

/// Inverts the cumulative distribution of `weights` at `u`.
///
/// Falls back to the last index when the weights sum to less than `u`
/// (including an all-zero row).
pub fn categorical(weights: &[f64], u: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if u < cumulative {
            return i;
        }
    }
    weights.len().saturating_sub(1)
}

fn node<'a>(model: &'a MergedModel, id: NodeId) -> Result<&'a ModelNode, ModelError> {
    model
        .network()
        .node(id)
        .ok_or_else(|| ModelError::Internal(format!("node id {} out of range", id.0)))
}

fn snapshot(
    model: &MergedModel,
    ctx: &StateContext,
    columns: &[NodeId],
) -> Result<Vec<Arc<str>>, ModelError> {
    columns
        .iter()
        .map(|&id| {
            let n = node(model, id)?;
            n.discrete()
                .current_state(ctx)
                .and_then(|s| n.discrete().states().state(s))
                .cloned()
                .ok_or_else(|| {
                    ModelError::Internal(format!("no sampled state for '{}'", n.name()))
                })
        })
        .collect()
}

/// Samples one sequence spanning `[0, duration]`.
///
/// The result always has at least two observations: the initial state at
/// time 0 and a closing observation at `duration`.
pub fn sample_sequence<R: Rng + ?Sized>(
    model: &MergedModel,
    duration: f64,
    rng: &mut R,
) -> Result<Sequence, ModelError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ModelError::Numerical(format!(
            "sampling duration must be finite and > 0, got {}",
            duration
        )));
    }

    let header = model.header().clone();
    let columns = header
        .iter()
        .map(|name| {
            model.network().id_of(name).ok_or_else(|| {
                ModelError::Internal(format!("header variable '{}' has no node", name))
            })
        })
        .collect::<Result<Vec<NodeId>, ModelError>>()?;

    let mut ctx = StateContext::new(model.network().len());

    for &id in model.class_order() {
        let n = node(model, id)?;
        let cpt_node = n
            .as_cpt()
            .ok_or_else(|| ModelError::Internal(format!("class node '{}' has no CPT", n.name())))?;
        let j = n.discrete().idx_state_parents(&ctx).ok_or_else(|| {
            ModelError::Internal(format!("parents of '{}' not sampled yet", n.name()))
        })?;
        let row = cpt_node.cpt().row(j).unwrap_or(&[]);
        let k = if row.is_empty() {
            n.num_states().saturating_sub(1)
        } else {
            categorical(row, rng.gen::<f64>())
        };
        ctx.set(id, Some(k));
    }

    for &id in model.feature_nodes() {
        let n = node(model, id)?;
        if n.num_states() == 0 {
            return Err(ModelError::Internal(format!("feature '{}' has no states", n.name())));
        }
        ctx.set(id, Some(rng.gen_range(0..n.num_states())));
    }

    let mut rows = vec![(0.0, snapshot(model, &ctx, &columns)?)];
    let mut t = 0.0;
    loop {
        let mut next: Option<(f64, NodeId)> = None;
        for &id in model.feature_nodes() {
            let n = node(model, id)?;
            let cim_node = n
                .as_cim()
                .ok_or_else(|| ModelError::Internal(format!("feature '{}' has no CIM", n.name())))?;
            let (Some(x), Some(j)) = (n.discrete().current_state(&ctx), n.discrete().idx_state_parents(&ctx))
            else {
                continue;
            };
            let qx = cim_node.cim().exit_rate(j, x);
            let u: f64 = rng.gen();
            let dt = if qx > 0.0 {
                -(1.0 - u).ln() / qx
            } else {
                f64::INFINITY
            };
            if next.map_or(true, |(best, _)| dt < best) {
                next = Some((dt, id));
            }
        }

        let Some((dt, id)) = next else {
            break;
        };
        if t + dt >= duration {
            break;
        }
        t += dt;

        let n = node(model, id)?;
        let (Some(cim_node), Some(x), Some(j)) = (
            n.as_cim(),
            n.discrete().current_state(&ctx),
            n.discrete().idx_state_parents(&ctx),
        ) else {
            break;
        };
        let row = cim_node
            .cim()
            .oxy()
            .get(j)
            .and_then(|m| m.get(x))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let y = categorical(row, rng.gen::<f64>());
        if y == x || row.is_empty() {
            continue;
        }
        ctx.set(id, Some(y));
        rows.push((t, snapshot(model, &ctx, &columns)?));
    }

    rows.push((duration, snapshot(model, &ctx, &columns)?));
    Sequence::new(
        header,
        model.time_variable().clone(),
        model.class_variables(),
        rows,
        SequenceValidation::default(),
    )
}

/// Samples `count` sequences into a fresh dataset.
pub fn sample_dataset<R: Rng + ?Sized>(
    model: &MergedModel,
    count: usize,
    duration: f64,
    rng: &mut R,
) -> Result<Dataset, ModelError> {
    let mut dataset = Dataset::new(
        model.time_variable().clone(),
        model.class_variables().iter().cloned(),
    );
    for _ in 0..count {
        dataset.add_sequence(sample_sequence(model, duration, rng)?)?;
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(sequences = count, duration, "sampled dataset");
    Ok(dataset)
}
