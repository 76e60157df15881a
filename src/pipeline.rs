//! Pipeline orchestration
//!
//! This module provides the public API for context-align.
//! It composes pivoting, resampling and block labeling into a labeled
//! feature matrix, one row per time bucket and one column per entity.

use crate::align::{AlignedStreams, StreamAligner};
use crate::block::BlockLabeler;
use crate::error::ComputeError;
use crate::resample::Resampler;
use crate::reshape::Reshaper;
use crate::schema::ColumnMap;
use crate::session::SessionFamily;
use crate::types::{BlockLabel, EntityCatalog, EntityLabel, FeatureMatrix, GroupKey, Interval, Sample, WideMatrix};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Configuration surface of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bucket width
    pub interval: Interval,
    /// Truncate aligned streams to their shared extent
    pub drop_tail: bool,
    /// Remove rows labeled `mixed`
    pub drop_mixed: bool,
    /// Grouping keys used when aligning long streams
    pub group_keys: Vec<GroupKey>,
    /// Input column names
    pub columns: ColumnMap,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: Interval::default(),
            drop_tail: true,
            drop_mixed: true,
            group_keys: Vec::new(),
            columns: ColumnMap::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_drop_tail(mut self, drop_tail: bool) -> Self {
        self.drop_tail = drop_tail;
        self
    }

    pub fn with_drop_mixed(mut self, drop_mixed: bool) -> Self {
        self.drop_mixed = drop_mixed;
        self
    }

    pub fn with_group_keys(mut self, group_keys: Vec<GroupKey>) -> Self {
        self.group_keys = group_keys;
        self
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    /// Parse a configuration from JSON; absent fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        serde_json::from_str(json).map_err(|e| ComputeError::ConfigError(e.to_string()))
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ComputeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ComputeError::ConfigError(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }
}

/// A labeled feature matrix and what was removed to produce it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRun {
    pub features: FeatureMatrix,
    pub session: Option<String>,
    pub session_family: Option<SessionFamily>,
    pub interval: Interval,
    pub removed_undefined: usize,
    pub removed_mixed: usize,
    /// Rows cut from the end by tail truncation (joint matrices only)
    pub removed_tail: usize,
}

/// Remove rows carrying `label`; returns the number removed
pub fn remove_label(features: &mut FeatureMatrix, label: BlockLabel) -> usize {
    let Some(blocks) = features.blocks.as_mut() else {
        return 0;
    };
    let keep: Vec<bool> = blocks.iter().map(|b| *b != label).collect();
    let before = blocks.len();
    blocks.retain(|b| *b != label);
    let removed = before - blocks.len();
    features.matrix.retain_rows(&keep);
    removed
}

/// Remove rows outside the session's labeled schedule
pub fn remove_undefined(features: &mut FeatureMatrix) -> usize {
    remove_label(features, BlockLabel::Undefined)
}

/// Remove rows whose context is mixed
pub fn remove_mixed(features: &mut FeatureMatrix) -> usize {
    remove_label(features, BlockLabel::Mixed)
}

/// Feature-matrix builder
#[derive(Debug, Clone, Default)]
pub struct FeaturePipeline {
    config: PipelineConfig,
}

impl FeaturePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Pivot, resample and (with a session) label one long-format table
    ///
    /// Pipeline stages:
    /// 1. Reshaper::to_wide - one column per entity
    /// 2. Resampler::resample_wide - bucket the time index
    /// 3. BlockLabeler - one label per bucket
    /// 4. Remove `undefined` rows, then `mixed` rows if configured
    pub fn build(&self, samples: &[Sample], session: Option<&str>) -> Result<FeatureRun, ComputeError> {
        let labeler = session.map(BlockLabeler::for_session).transpose()?;
        if samples.is_empty() {
            return Err(ComputeError::EmptyInputError("no samples to pivot".to_string()));
        }

        let wide = Reshaper::to_wide(samples)?;
        let resampled = Resampler::new(self.config.interval).resample_wide(&wide)?;

        self.finish(resampled, session, labeler.as_ref(), 0)
    }

    /// Build one matrix from an activity stream and a behaviour stream
    ///
    /// Both streams are pivoted and resampled on the same grid. With
    /// `drop_tail`, rows at or past the earlier of the two last buckets are
    /// removed. Behaviour columns are then joined onto the activity rows by
    /// bucket; activity buckets without behaviour get missing cells.
    pub fn build_joint(
        &self,
        activity: &[Sample],
        behaviour: &[Sample],
        session: Option<&str>,
    ) -> Result<FeatureRun, ComputeError> {
        let labeler = session.map(BlockLabeler::for_session).transpose()?;
        if activity.is_empty() {
            return Err(ComputeError::EmptyInputError("activity stream has no rows".to_string()));
        }
        if behaviour.is_empty() {
            return Err(ComputeError::EmptyInputError("behaviour stream has no rows".to_string()));
        }

        let resampler = Resampler::new(self.config.interval);
        let mut wide_a = resampler.resample_wide(&Reshaper::to_wide(activity)?)?;
        let mut wide_b = resampler.resample_wide(&Reshaper::to_wide(behaviour)?)?;

        let mut removed_tail = 0;
        if self.config.drop_tail {
            if let (Some(max_a), Some(max_b)) = (wide_a.max_time(), wide_b.max_time()) {
                let shared_max = max_a.min(max_b);
                removed_tail = wide_a.truncate_before(shared_max);
                wide_b.truncate_before(shared_max);
                if removed_tail > 0 {
                    warn!(shared_max, removed_tail, "truncated activity to behaviour extent");
                }
            }
        }
        if wide_a.is_empty() {
            return Err(ComputeError::EmptyInputError(
                "activity stream has no rows after truncation".to_string(),
            ));
        }
        if wide_b.is_empty() {
            return Err(ComputeError::EmptyInputError(
                "behaviour stream has no rows after truncation".to_string(),
            ));
        }

        let joined = join_columns(&wide_a, &wide_b, self.config.interval)?;
        self.finish(joined, session, labeler.as_ref(), removed_tail)
    }

    /// Align two long-format streams with this pipeline's settings
    pub fn align(&self, stream_a: &[Sample], stream_b: &[Sample]) -> Result<AlignedStreams, ComputeError> {
        StreamAligner::new(self.config.interval)
            .with_drop_tail(self.config.drop_tail)
            .with_group_keys(self.config.group_keys.clone())
            .align(stream_a, stream_b)
    }

    fn finish(
        &self,
        matrix: WideMatrix,
        session: Option<&str>,
        labeler: Option<&BlockLabeler>,
        removed_tail: usize,
    ) -> Result<FeatureRun, ComputeError> {
        let mut features = FeatureMatrix::unlabeled(matrix);
        let mut removed_undefined = 0;
        let mut removed_mixed = 0;

        if let Some(labeler) = labeler {
            features.blocks = Some(labeler.label(&features.matrix.times));
            debug!(counts = ?features.block_counts(), "labeled buckets");

            removed_undefined = remove_undefined(&mut features);
            if self.config.drop_mixed {
                removed_mixed = remove_mixed(&mut features);
            }
        }

        if features.matrix.is_empty() {
            return Err(ComputeError::EmptyInputError(
                "no rows left after label filtering".to_string(),
            ));
        }

        info!(
            rows = features.n_rows(),
            columns = features.matrix.n_cols(),
            removed_undefined,
            removed_mixed,
            interval = %self.config.interval,
            "built feature matrix"
        );

        Ok(FeatureRun {
            features,
            session: session.map(str::to_string),
            session_family: labeler.map(BlockLabeler::family),
            interval: self.config.interval,
            removed_undefined,
            removed_mixed,
            removed_tail,
        })
    }
}

/// Append `right`'s columns to `left`'s rows, matching rows by bucket
fn join_columns(left: &WideMatrix, right: &WideMatrix, interval: Interval) -> Result<WideMatrix, ComputeError> {
    if let Some(shared) = left
        .columns
        .labels()
        .iter()
        .find(|label| right.columns.id_of(label).is_some())
    {
        return Err(ComputeError::SchemaError(format!(
            "entity '{shared}' appears in both streams"
        )));
    }

    let columns = EntityCatalog::from_labels(
        left.columns
            .labels()
            .iter()
            .chain(right.columns.labels())
            .cloned(),
    );
    let position = |label: &EntityLabel| columns.id_of(label).map(|id| id.0 as usize);
    let left_pos: Vec<usize> = left.columns.labels().iter().filter_map(&position).collect();
    let right_pos: Vec<usize> = right.columns.labels().iter().filter_map(&position).collect();

    let right_rows: HashMap<i64, &Vec<Option<f64>>> = right
        .times
        .iter()
        .zip(&right.values)
        .map(|(t, row)| (interval.bucket_of(*t), row))
        .collect();

    let mut values = Vec::with_capacity(left.n_rows());
    for (time, row) in left.times.iter().zip(&left.values) {
        let mut cells = vec![None; columns.len()];
        for (pos, cell) in left_pos.iter().zip(row) {
            cells[*pos] = *cell;
        }
        if let Some(other) = right_rows.get(&interval.bucket_of(*time)) {
            for (pos, cell) in right_pos.iter().zip(other.iter()) {
                cells[*pos] = *cell;
            }
        }
        values.push(cells);
    }

    Ok(WideMatrix {
        times: left.times.clone(),
        columns,
        values,
    })
}

/// Turn a long-format activity table into a (labeled) feature matrix (stateless, one-shot).
///
/// # Arguments
/// * `samples` - Long-format samples
/// * `config` - Bucket width and filtering options
/// * `session_name` - Session to label buckets for; `None` skips labeling
///
/// # Example
/// ```ignore
/// let run = build_feature_matrix(&samples, &PipelineConfig::new("1s".parse()?), Some("day4-test1"))?;
/// ```
pub fn build_feature_matrix(
    samples: &[Sample],
    config: &PipelineConfig,
    session_name: Option<&str>,
) -> Result<FeatureRun, ComputeError> {
    FeaturePipeline::new(config.clone()).build(samples, session_name)
}
