//! Sequences and datasets.
//!
//! A [`Sequence`] is one irregularly timed trajectory: a time-ordered list
//! of observations over a single time axis, fixed class-variable values and
//! time-varying feature values. A [`Dataset`] collects sequences sharing the
//! same header and caches every variable's observed vocabulary.
//!
//! Construction is where malformed input is rejected. Building a sequence
//! fails with [`ModelError::SequenceIntegrity`]; a dataset that receives such a
//! failure logs a warning, drops that sequence only and keeps loading.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::errors::ModelError;
use crate::engine::states::StateIndex;

/// Validation policy applied while building sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequenceValidation {
    /// Reject sequences whose class values change between observations.
    ///
    /// When `false`, the first observation's class values are used and later
    /// disagreement is ignored.
    pub strict_class_values: bool,
}

/// One observation: a timestamp and a value for every header variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub time: f64,
    pub values: Vec<Arc<str>>,
}

/// A time-ordered trajectory with fixed class values.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    header: Arc<[Arc<str>]>,
    time_variable: Arc<str>,
    class_variables: Arc<[Arc<str>]>,
    class_values: Vec<Arc<str>>,
    observations: Vec<Observation>,
}

impl Sequence {
    /// Builds a sequence from already-typed rows.
    ///
    /// `header` names the value columns of every row (the time column is not
    /// part of it). Class values are read from the first observation.
    pub fn new(
        header: Arc<[Arc<str>]>,
        time_variable: impl Into<Arc<str>>,
        class_variables: &[Arc<str>],
        rows: Vec<(f64, Vec<Arc<str>>)>,
        validation: SequenceValidation,
    ) -> Result<Self, ModelError> {
        let time_variable = time_variable.into();
        if rows.len() < 2 {
            return Err(ModelError::SequenceIntegrity(format!(
                "a sequence needs at least two observations, got {}",
                rows.len()
            )));
        }

        let mut class_columns = Vec::with_capacity(class_variables.len());
        for class in class_variables {
            let column = header.iter().position(|h| h == class).ok_or_else(|| {
                ModelError::SequenceIntegrity(format!("class variable '{}' missing from header", class))
            })?;
            class_columns.push(column);
        }

        let mut previous = f64::NEG_INFINITY;
        let mut observations = Vec::with_capacity(rows.len());
        for (i, (time, values)) in rows.into_iter().enumerate() {
            if values.len() != header.len() {
                return Err(ModelError::SequenceIntegrity(format!(
                    "observation {} has {} values, header has {}",
                    i,
                    values.len(),
                    header.len()
                )));
            }
            if !time.is_finite() {
                return Err(ModelError::SequenceIntegrity(format!(
                    "observation {} has non-finite time {}",
                    i, time
                )));
            }
            if time < previous {
                return Err(ModelError::SequenceIntegrity(format!(
                    "observation {} goes back in time ({} < {})",
                    i, time, previous
                )));
            }
            previous = time;
            observations.push(Observation { time, values });
        }

        let class_values: Vec<Arc<str>> = class_columns
            .iter()
            .map(|&c| observations[0].values[c].clone())
            .collect();

        if validation.strict_class_values {
            for (i, obs) in observations.iter().enumerate().skip(1) {
                for (k, &c) in class_columns.iter().enumerate() {
                    if obs.values[c] != class_values[k] {
                        return Err(ModelError::SequenceIntegrity(format!(
                            "class variable '{}' changes from '{}' to '{}' at observation {}",
                            class_variables[k], class_values[k], obs.values[c], i
                        )));
                    }
                }
            }
        }

        Ok(Self {
            header,
            time_variable,
            class_variables: class_variables.into(),
            class_values,
            observations,
        })
    }

    /// Builds a sequence from raw string records whose columns are named by
    /// `columns` (which must include `time_variable`).
    pub fn from_records<S: AsRef<str>>(
        columns: &[S],
        records: &[Vec<S>],
        time_variable: &str,
        class_variables: &[Arc<str>],
        validation: SequenceValidation,
    ) -> Result<Self, ModelError> {
        let time_column = columns
            .iter()
            .position(|c| c.as_ref() == time_variable)
            .ok_or_else(|| {
                ModelError::SequenceIntegrity(format!("time variable '{}' missing", time_variable))
            })?;
        let header: Arc<[Arc<str>]> = columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_column)
            .map(|(_, c)| Arc::from(c.as_ref()))
            .collect();

        let mut rows = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if record.len() != columns.len() {
                return Err(ModelError::SequenceIntegrity(format!(
                    "record {} has {} fields, expected {}",
                    i,
                    record.len(),
                    columns.len()
                )));
            }
            let raw = record[time_column].as_ref();
            let time: f64 = raw.trim().parse().map_err(|_| {
                ModelError::SequenceIntegrity(format!("record {} has unparsable time '{}'", i, raw))
            })?;
            let values = record
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != time_column)
                .map(|(_, v)| Arc::from(v.as_ref()))
                .collect();
            rows.push((time, values));
        }
        Self::new(header, time_variable, class_variables, rows, validation)
    }

    pub fn header(&self) -> &Arc<[Arc<str>]> {
        &self.header
    }

    pub fn time_variable(&self) -> &Arc<str> {
        &self.time_variable
    }

    pub fn class_variables(&self) -> &[Arc<str>] {
        &self.class_variables
    }

    /// Class values aligned with [`class_variables`](Self::class_variables).
    pub fn class_values(&self) -> &[Arc<str>] {
        &self.class_values
    }

    pub fn class_value(&self, variable: &str) -> Option<&Arc<str>> {
        self.class_variables
            .iter()
            .position(|c| c.as_ref() == variable)
            .map(|i| &self.class_values[i])
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn column_of(&self, variable: &str) -> Option<usize> {
        self.header.iter().position(|h| h.as_ref() == variable)
    }

    /// Elapsed time between first and last observation.
    pub fn duration(&self) -> f64 {
        match (self.observations.first(), self.observations.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }
}

/// A collection of sequences plus the variable metadata shared by all.
#[derive(Debug, Clone)]
pub struct Dataset {
    time_variable: Arc<str>,
    class_variables: Vec<Arc<str>>,
    header: Option<Arc<[Arc<str>]>>,
    sequences: Vec<Sequence>,
    vocabulary: FxHashMap<Arc<str>, BTreeSet<Arc<str>>>,
    validation: SequenceValidation,
    dropped: usize,
}

impl Dataset {
    pub fn new<I, S>(time_variable: impl Into<Arc<str>>, class_variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            time_variable: time_variable.into(),
            class_variables: class_variables.into_iter().map(Into::into).collect(),
            header: None,
            sequences: Vec::new(),
            vocabulary: FxHashMap::default(),
            validation: SequenceValidation::default(),
            dropped: 0,
        }
    }

    pub fn with_validation(mut self, validation: SequenceValidation) -> Self {
        self.validation = validation;
        self
    }

    /// Builds a dataset from raw record blocks, one block per sequence.
    ///
    /// Malformed blocks are dropped with a warning; see
    /// [`dropped_sequences`](Self::dropped_sequences).
    pub fn from_records<S: AsRef<str>>(
        time_variable: &str,
        class_variables: &[&str],
        columns: &[S],
        blocks: &[Vec<Vec<S>>],
    ) -> Self {
        let mut dataset = Dataset::new(time_variable, class_variables.iter().copied());
        for block in blocks {
            dataset.push_records(columns, block);
        }
        dataset
    }

    /// Parses one record block and adds it. Returns whether the sequence was
    /// kept.
    pub fn push_records<S: AsRef<str>>(&mut self, columns: &[S], records: &[Vec<S>]) -> bool {
        let built = Sequence::from_records(
            columns,
            records,
            &self.time_variable,
            &self.class_variables,
            self.validation,
        );
        self.accept(built)
    }

    /// Adds an already-built (or failed) sequence; failures are logged and
    /// dropped. Returns whether the sequence was kept.
    pub fn accept(&mut self, sequence: Result<Sequence, ModelError>) -> bool {
        match sequence.and_then(|s| self.add_sequence(s)) {
            Ok(()) => true,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    error = %_err,
                    index = self.sequences.len() + self.dropped,
                    "dropping malformed sequence"
                );
                self.dropped += 1;
                false
            }
        }
    }

    /// Adds a sequence, checking it matches the dataset's metadata.
    pub fn add_sequence(&mut self, sequence: Sequence) -> Result<(), ModelError> {
        if sequence.time_variable != self.time_variable {
            return Err(ModelError::SequenceIntegrity(format!(
                "sequence time variable '{}' differs from dataset '{}'",
                sequence.time_variable, self.time_variable
            )));
        }
        if sequence.class_variables.as_ref() != self.class_variables.as_slice() {
            return Err(ModelError::SequenceIntegrity(
                "sequence class variables differ from dataset".into(),
            ));
        }
        match &self.header {
            Some(header) if header != &sequence.header => {
                return Err(ModelError::SequenceIntegrity(
                    "sequence header differs from dataset header".into(),
                ));
            }
            Some(_) => {}
            None => self.header = Some(sequence.header.clone()),
        }

        for (column, variable) in sequence.header.iter().enumerate() {
            let vocab = self.vocabulary.entry(variable.clone()).or_default();
            if let Some(value) = sequence.class_value(variable) {
                if !vocab.contains(value) {
                    vocab.insert(value.clone());
                }
                continue;
            }
            for obs in &sequence.observations {
                if !vocab.contains(&obs.values[column]) {
                    vocab.insert(obs.values[column].clone());
                }
            }
        }
        self.sequences.push(sequence);
        Ok(())
    }

    pub fn time_variable(&self) -> &Arc<str> {
        &self.time_variable
    }

    pub fn class_variables(&self) -> &[Arc<str>] {
        &self.class_variables
    }

    pub fn is_class_variable(&self, variable: &str) -> bool {
        self.class_variables.iter().any(|c| c.as_ref() == variable)
    }

    /// Non-time, non-class variables in header order.
    pub fn feature_variables(&self) -> Vec<Arc<str>> {
        self.header
            .iter()
            .flat_map(|h| h.iter())
            .filter(|v| !self.is_class_variable(v))
            .cloned()
            .collect()
    }

    /// All non-time variables in header order.
    pub fn variables(&self) -> &[Arc<str>] {
        self.header.as_deref().unwrap_or(&[])
    }

    pub fn column_of(&self, variable: &str) -> Option<usize> {
        self.variables().iter().position(|v| v.as_ref() == variable)
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Number of sequences rejected during loading.
    pub fn dropped_sequences(&self) -> usize {
        self.dropped
    }

    /// Observed states of `variable`, sorted.
    pub fn states(&self, variable: &str) -> Option<Vec<Arc<str>>> {
        self.vocabulary
            .get(variable)
            .map(|s| s.iter().cloned().collect())
    }

    /// Observed vocabulary of `variable` as a state index.
    pub fn state_index(&self, variable: &str) -> Option<Arc<StateIndex>> {
        self.vocabulary
            .get(variable)
            .map(|s| Arc::new(StateIndex::new(s.iter().cloned())))
    }
}
