//! Long ⇄ wide reshaping
//!
//! `to_wide` pivots one row per (time, entity) into one row per time point with
//! one column per entity. `to_long` undoes it, emitting only non-missing cells.

use crate::error::ComputeError;
use crate::types::{validate_time, EntityCatalog, Sample, WideMatrix};
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Reshaper between long samples and wide matrices
pub struct Reshaper;

impl Reshaper {
    /// Pivot long samples into a wide matrix
    ///
    /// Rows are the distinct sample times in ascending order; columns are the
    /// interned entities. Every (time, entity) pair must be unique.
    pub fn to_wide(samples: &[Sample]) -> Result<WideMatrix, ComputeError> {
        let columns = EntityCatalog::from_samples(samples);
        let n_cols = columns.len();

        let mut rows: BTreeMap<OrderedFloat<f64>, Vec<Option<f64>>> = BTreeMap::new();
        let mut seen: HashSet<(OrderedFloat<f64>, u32)> = HashSet::with_capacity(samples.len());

        for (row, sample) in samples.iter().enumerate() {
            validate_time(sample.time, row)?;
            // -0.0 folds into 0.0
            let time = OrderedFloat(sample.time + 0.0);
            let col = columns
                .id_of(&sample.entity)
                .ok_or_else(|| ComputeError::SchemaError(format!("row {row}: unknown entity")))?;

            if !seen.insert((time, col.0)) {
                return Err(ComputeError::DuplicateKeyError {
                    time: sample.time,
                    entity: sample.entity.to_string(),
                });
            }

            let cells = rows.entry(time).or_insert_with(|| vec![None; n_cols]);
            cells[col.0 as usize] = sample.value.filter(|v| !v.is_nan());
        }

        let mut matrix = WideMatrix::empty(columns);
        for (time, cells) in rows {
            matrix.times.push(time.into_inner());
            matrix.values.push(cells);
        }

        debug!(
            samples = samples.len(),
            rows = matrix.n_rows(),
            columns = matrix.n_cols(),
            "pivoted long samples to wide"
        );

        Ok(matrix)
    }

    /// Melt a wide matrix back into long samples, skipping missing cells
    ///
    /// Samples come out time-major, columns in catalog order.
    pub fn to_long(matrix: &WideMatrix) -> Vec<Sample> {
        let mut samples = Vec::new();
        for (time, row) in matrix.times.iter().zip(&matrix.values) {
            for (entity, cell) in matrix.columns.labels().iter().zip(row) {
                if let Some(value) = cell {
                    samples.push(Sample::new(*time, entity.clone(), *value));
                }
            }
        }
        samples
    }
}
