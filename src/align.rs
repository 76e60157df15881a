//! Temporal alignment of two independently sampled streams
//!
//! Both streams are resampled with the same bucket width and the same origin
//! (t=0), so their bucket edges coincide. With `drop_tail`, rows at or past
//! `min(max(time_a), max(time_b))` are removed from both streams.
//!
//! Equal row counts do not imply equal timestamps: a bucket can be present
//! in one stream and absent in the other. Use [`AlignedStreams::reindex_union`]
//! when rows must correspond one to one.

use crate::error::ComputeError;
use crate::resample::Resampler;
use crate::types::{BucketRow, GroupKey, GroupValue, Interval, ResampledSeries, Sample};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Result of aligning two streams
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedStreams {
    pub a: ResampledSeries,
    pub b: ResampledSeries,
    /// Exclusive upper time bound applied to both streams, if truncated
    pub shared_max: Option<f64>,
    /// Rows removed from each stream by truncation
    pub dropped_a: usize,
    pub dropped_b: usize,
}

impl AlignedStreams {
    pub fn into_pair(self) -> (ResampledSeries, ResampledSeries) {
        (self.a, self.b)
    }

    /// Place both streams on the union of their (bucket, group) keys
    ///
    /// A key missing from one stream is filled with a "no value" row, so the
    /// returned series have equal length and `a.rows[i].time == b.rows[i].time`.
    pub fn reindex_union(&self) -> (ResampledSeries, ResampledSeries) {
        let interval = self.a.interval;
        let index = |series: &ResampledSeries| -> BTreeMap<(i64, Vec<GroupValue>), BucketRow> {
            series
                .rows
                .iter()
                .map(|r| ((interval.bucket_of(r.time), r.key.clone()), r.clone()))
                .collect()
        };
        let rows_a = index(&self.a);
        let rows_b = index(&self.b);

        let keys: BTreeSet<&(i64, Vec<GroupValue>)> = rows_a.keys().chain(rows_b.keys()).collect();

        let fill = |rows: &BTreeMap<(i64, Vec<GroupValue>), BucketRow>| -> Vec<BucketRow> {
            keys.iter()
                .map(|key| {
                    rows.get(*key).cloned().unwrap_or_else(|| BucketRow {
                        time: interval.bucket_start(key.0),
                        key: key.1.clone(),
                        value: None,
                        count: 0,
                    })
                })
                .collect()
        };

        (
            ResampledSeries {
                rows: fill(&rows_a),
                ..self.a.clone()
            },
            ResampledSeries {
                rows: fill(&rows_b),
                ..self.b.clone()
            },
        )
    }
}

/// Brings two streams onto a common time grid
#[derive(Debug, Clone)]
pub struct StreamAligner {
    resampler: Resampler,
    drop_tail: bool,
    group_keys: Vec<GroupKey>,
}

impl StreamAligner {
    /// Create an aligner that truncates to the shared extent
    pub fn new(interval: Interval) -> Self {
        Self {
            resampler: Resampler::new(interval),
            drop_tail: true,
            group_keys: Vec::new(),
        }
    }

    pub fn with_drop_tail(mut self, drop_tail: bool) -> Self {
        self.drop_tail = drop_tail;
        self
    }

    pub fn with_group_keys(mut self, group_keys: Vec<GroupKey>) -> Self {
        self.group_keys = group_keys;
        self
    }

    /// Resample both streams and, if configured, cut the longer one's tail
    pub fn align(
        &self,
        stream_a: &[Sample],
        stream_b: &[Sample],
    ) -> Result<AlignedStreams, ComputeError> {
        if stream_a.is_empty() {
            return Err(ComputeError::EmptyInputError("stream a has no rows".to_string()));
        }
        if stream_b.is_empty() {
            return Err(ComputeError::EmptyInputError("stream b has no rows".to_string()));
        }

        let mut a = self.resampler.resample(stream_a, &self.group_keys)?;
        let mut b = self.resampler.resample(stream_b, &self.group_keys)?;

        let mut shared_max = None;
        let (mut dropped_a, mut dropped_b) = (0, 0);

        if self.drop_tail {
            let limit = match (a.max_time(), b.max_time()) {
                (Some(max_a), Some(max_b)) => max_a.min(max_b),
                _ => {
                    return Err(ComputeError::EmptyInputError(
                        "resampling produced no buckets".to_string(),
                    ))
                }
            };
            dropped_a = a.truncate_before(limit);
            dropped_b = b.truncate_before(limit);
            shared_max = Some(limit);

            if dropped_a + dropped_b > 0 {
                warn!(
                    shared_max = limit,
                    dropped_a, dropped_b, "truncated streams to shared extent"
                );
            }
        }

        if a.is_empty() {
            return Err(ComputeError::EmptyInputError(
                "stream a has no rows after truncation".to_string(),
            ));
        }
        if b.is_empty() {
            return Err(ComputeError::EmptyInputError(
                "stream b has no rows after truncation".to_string(),
            ));
        }

        debug!(rows_a = a.len(), rows_b = b.len(), "aligned streams");

        Ok(AlignedStreams {
            a,
            b,
            shared_max,
            dropped_a,
            dropped_b,
        })
    }
}

/// Resample two streams at `interval` and optionally truncate to their shared extent
pub fn align(
    stream_a: &[Sample],
    stream_b: &[Sample],
    interval: Interval,
    drop_tail: bool,
) -> Result<(ResampledSeries, ResampledSeries), ComputeError> {
    StreamAligner::new(interval)
        .with_drop_tail(drop_tail)
        .align(stream_a, stream_b)
        .map(AlignedStreams::into_pair)
}
