//! Feature-matrix encoding
//!
//! This module encodes a labeled feature matrix into a self-describing JSON
//! payload with producer and provenance metadata.

use crate::error::ComputeError;
use crate::pipeline::FeatureRun;
use crate::session::SessionFamily;
use crate::types::BlockLabel;
use crate::{PRODUCER_NAME, VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Current payload format version
pub const FORMAT_VERSION: &str = "1.0.0";

/// Encoded feature matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePayload {
    pub format_version: String,
    pub producer: Producer,
    pub provenance: Provenance,
    pub quality: Quality,
    /// Column labels, in matrix order
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_family: Option<SessionFamily>,
    pub interval: String,
    pub computed_at_utc: String,
    pub rows_removed: RowsRemoved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsRemoved {
    pub undefined: usize,
    pub mixed: usize,
    pub tail: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    pub rows: usize,
    pub columns: usize,
    /// Fraction of cells holding a value
    pub coverage: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<BlockLabel, usize>,
}

/// One time bucket of the matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub time: f64,
    pub values: Vec<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockLabel>,
}

/// Encoder for feature payloads
pub struct FeatureEncoder {
    instance_id: String,
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Encode a pipeline run into a payload
    pub fn encode(&self, run: &FeatureRun) -> Result<FeaturePayload, ComputeError> {
        let matrix = &run.features.matrix;
        if let Some(blocks) = &run.features.blocks {
            if blocks.len() != matrix.n_rows() {
                return Err(ComputeError::SchemaError(format!(
                    "{} block labels for {} rows",
                    blocks.len(),
                    matrix.n_rows()
                )));
            }
        }

        let producer = Producer {
            name: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = Provenance {
            session: run.session.clone(),
            session_family: run.session_family,
            interval: run.interval.to_string(),
            computed_at_utc: Utc::now().to_rfc3339(),
            rows_removed: RowsRemoved {
                undefined: run.removed_undefined,
                mixed: run.removed_mixed,
                tail: run.removed_tail,
            },
        };

        let cells = matrix.n_rows() * matrix.n_cols();
        let filled = matrix.values.iter().flatten().filter(|v| v.is_some()).count();
        let quality = Quality {
            rows: matrix.n_rows(),
            columns: matrix.n_cols(),
            coverage: if cells == 0 { 0.0 } else { filled as f64 / cells as f64 },
            blocks: run.features.block_counts(),
        };

        let rows = matrix
            .times
            .iter()
            .zip(&matrix.values)
            .enumerate()
            .map(|(idx, (time, values))| FeatureRow {
                time: *time,
                values: values.clone(),
                block: run.features.blocks.as_ref().map(|b| b[idx]),
            })
            .collect();

        Ok(FeaturePayload {
            format_version: FORMAT_VERSION.to_string(),
            producer,
            provenance,
            quality,
            columns: matrix.columns.labels().iter().map(ToString::to_string).collect(),
            rows,
        })
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, run: &FeatureRun) -> Result<String, ComputeError> {
        let payload = self.encode(run)?;
        serde_json::to_string_pretty(&payload).map_err(ComputeError::JsonError)
    }
}
