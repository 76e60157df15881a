//! Fixed-width downsampling
//!
//! Buckets samples onto `[k*w, (k+1)*w)` intervals anchored at t=0 and
//! aggregates each bucket by the arithmetic mean of its non-missing values.

use crate::error::ComputeError;
use crate::types::{
    validate_time, BucketRow, GroupKey, GroupValue, Interval, ResampledSeries, Sample, WideMatrix,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Running mean of one bucket
#[derive(Debug, Clone, Copy, Default)]
struct MeanAccumulator {
    sum: f64,
    values: usize,
    samples: usize,
}

impl MeanAccumulator {
    fn push(&mut self, value: Option<f64>) {
        self.samples += 1;
        if let Some(v) = value.filter(|v| !v.is_nan()) {
            self.sum += v;
            self.values += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.values == 0 {
            None
        } else {
            Some(self.sum / self.values as f64)
        }
    }
}

/// Resampler for long-format samples and wide matrices
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    interval: Interval,
}

impl Resampler {
    pub fn new(interval: Interval) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Resample long-format samples, optionally per group
    ///
    /// Without group keys, every bucket between the first and last occupied
    /// bucket is emitted, empty ones with a missing value. With group keys,
    /// only buckets holding at least one sample of the group are emitted.
    /// Rows are ordered by time, then by group key.
    pub fn resample(
        &self,
        samples: &[Sample],
        group_keys: &[GroupKey],
    ) -> Result<ResampledSeries, ComputeError> {
        for (row, sample) in samples.iter().enumerate() {
            validate_time(sample.time, row)?;
        }

        let rows = if group_keys.is_empty() {
            self.resample_ungrouped(samples)
        } else {
            self.resample_grouped(samples, group_keys)
        };

        debug!(
            samples = samples.len(),
            buckets = rows.len(),
            interval = %self.interval,
            grouped = !group_keys.is_empty(),
            "resampled long series"
        );

        Ok(ResampledSeries {
            interval: self.interval,
            group_keys: group_keys.to_vec(),
            rows,
        })
    }

    fn resample_ungrouped(&self, samples: &[Sample]) -> Vec<BucketRow> {
        let mut buckets: BTreeMap<i64, MeanAccumulator> = BTreeMap::new();
        for sample in samples {
            buckets
                .entry(self.interval.bucket_of(sample.time))
                .or_default()
                .push(sample.value);
        }

        let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Vec::new(),
        };

        (first..=last)
            .map(|bucket| {
                let acc = buckets.get(&bucket).copied().unwrap_or_default();
                BucketRow {
                    time: self.interval.bucket_start(bucket),
                    key: Vec::new(),
                    value: acc.mean(),
                    count: acc.samples,
                }
            })
            .collect()
    }

    fn resample_grouped(&self, samples: &[Sample], group_keys: &[GroupKey]) -> Vec<BucketRow> {
        let mut buckets: BTreeMap<(i64, Vec<GroupValue>), MeanAccumulator> = BTreeMap::new();
        for sample in samples {
            let key: Vec<GroupValue> = group_keys.iter().map(|k| sample.key(*k)).collect();
            buckets
                .entry((self.interval.bucket_of(sample.time), key))
                .or_default()
                .push(sample.value);
        }

        buckets
            .into_iter()
            .map(|((bucket, key), acc)| BucketRow {
                time: self.interval.bucket_start(bucket),
                key,
                value: acc.mean(),
                count: acc.samples,
            })
            .collect()
    }

    /// Resample a wide matrix by its time index, column by column
    ///
    /// Buckets between the first and last occupied bucket are all emitted;
    /// a bucket with no rows becomes a row of missing values.
    pub fn resample_wide(&self, matrix: &WideMatrix) -> Result<WideMatrix, ComputeError> {
        for (row, time) in matrix.times.iter().enumerate() {
            validate_time(*time, row)?;
        }

        let n_cols = matrix.n_cols();
        let mut buckets: BTreeMap<i64, Vec<MeanAccumulator>> = BTreeMap::new();
        for (time, row) in matrix.times.iter().zip(&matrix.values) {
            let accs = buckets
                .entry(self.interval.bucket_of(*time))
                .or_insert_with(|| vec![MeanAccumulator::default(); n_cols]);
            for (acc, cell) in accs.iter_mut().zip(row) {
                acc.push(*cell);
            }
        }

        let mut out = WideMatrix::empty(matrix.columns.clone());
        if let (Some(first), Some(last)) = (buckets.keys().next(), buckets.keys().next_back()) {
            for bucket in *first..=*last {
                out.times.push(self.interval.bucket_start(bucket));
                out.values.push(match buckets.get(&bucket) {
                    Some(accs) => accs.iter().map(MeanAccumulator::mean).collect(),
                    None => vec![None; n_cols],
                });
            }
        }

        debug!(
            rows_in = matrix.n_rows(),
            rows_out = out.n_rows(),
            columns = n_cols,
            interval = %self.interval,
            "resampled wide matrix"
        );

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityCatalog, EntityLabel};

    fn secs(s: f64) -> Interval {
        Interval::from_secs_f64(s).unwrap()
    }

    #[test]
    fn test_bucket_mean() {
        let samples = vec![Sample::new(0.0, 1, 2.0), Sample::new(0.5, 1, 4.0)];
        let series = Resampler::new(secs(1.0)).resample(&samples, &[]).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series.rows[0].time, 0.0);
        assert_eq!(series.rows[0].value, Some(3.0));
        assert_eq!(series.rows[0].count, 2);
    }

    #[test]
    fn test_sample_just_below_edge_stays_in_bucket() {
        let resampler = Resampler::new("1s".parse().unwrap());
        let samples = vec![Sample::new(0.0, 1, 2.0), Sample::new(0.9999996, 1, 4.0)];
        let series = resampler.resample(&samples, &[]).unwrap();

        assert_eq!(series.interval, resampler.interval());
        assert_eq!(series.len(), 1);
        assert_eq!(series.rows[0].time, 0.0);
        assert_eq!(series.rows[0].value, Some(3.0));
    }

    #[test]
    fn test_empty_buckets_retained_without_grouping() {
        let samples = vec![Sample::new(0.2, 1, 1.0), Sample::new(3.7, 1, 5.0)];
        let series = Resampler::new(secs(1.0)).resample(&samples, &[]).unwrap();

        assert_eq!(series.times(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(series.rows[1].value, None);
        assert_eq!(series.rows[2].value, None);
        assert_eq!(series.rows[1].count, 0);
        assert_eq!(series.rows[3].value, Some(5.0));
    }

    #[test]
    fn test_buckets_anchored_at_zero() {
        let samples = vec![Sample::new(2.3, 1, 1.0), Sample::new(2.9, 1, 3.0)];
        let series = Resampler::new(secs(2.0)).resample(&samples, &[]).unwrap();

        assert_eq!(series.times(), vec![2.0]);
        assert_eq!(series.rows[0].value, Some(2.0));
    }

    #[test]
    fn test_missing_values_skipped_in_mean() {
        let samples = vec![
            Sample::new(0.0, 1, 2.0),
            Sample::missing(0.1, 1),
            Sample::new(0.2, 1, f64::NAN),
            Sample::missing(1.5, 1),
        ];
        let series = Resampler::new(secs(1.0)).resample(&samples, &[]).unwrap();

        assert_eq!(series.rows[0].value, Some(2.0));
        assert_eq!(series.rows[0].count, 3);
        assert_eq!(series.rows[1].value, None);
        assert_eq!(series.rows[1].count, 1);
    }

    #[test]
    fn test_grouped_only_occupied_buckets() {
        let samples = vec![
            Sample::new(0.1, 2, 1.0),
            Sample::new(0.2, 1, 10.0),
            Sample::new(0.4, 1, 20.0),
            Sample::new(2.5, 2, 3.0),
        ];
        let series = Resampler::new(secs(1.0))
            .resample(&samples, &[GroupKey::Entity])
            .unwrap();

        let summary: Vec<(f64, Vec<GroupValue>, Option<f64>)> = series
            .rows
            .iter()
            .map(|r| (r.time, r.key.clone(), r.value))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0.0, vec![GroupValue::Entity(EntityLabel::Int(1))], Some(15.0)),
                (0.0, vec![GroupValue::Entity(EntityLabel::Int(2))], Some(1.0)),
                (2.0, vec![GroupValue::Entity(EntityLabel::Int(2))], Some(3.0)),
            ]
        );
    }

    #[test]
    fn test_grouped_by_subject_and_entity() {
        let samples = vec![
            Sample::new(0.0, 1, 1.0).with_subject("m2"),
            Sample::new(0.0, 1, 3.0).with_subject("m1"),
            Sample::new(0.5, 1, 5.0).with_subject("m1"),
        ];
        let series = Resampler::new(secs(1.0))
            .resample(&samples, &[GroupKey::Subject, GroupKey::Entity])
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.rows[0].key[0], GroupValue::Text("m1".to_string()));
        assert_eq!(series.rows[0].value, Some(4.0));
        assert_eq!(series.rows[1].key[0], GroupValue::Text("m2".to_string()));
    }

    #[test]
    fn test_resample_is_deterministic() {
        let samples: Vec<Sample> = (0..200)
            .map(|i| Sample::new(i as f64 * 0.037, i % 7, (i * 13 % 17) as f64))
            .collect();
        let resampler = Resampler::new(secs(0.5));

        let first = resampler.resample(&samples, &[GroupKey::Entity]).unwrap();
        let second = resampler.resample(&samples, &[GroupKey::Entity]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_times_rejected() {
        let resampler = Resampler::new(secs(1.0));
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let samples = vec![Sample::new(0.0, 1, 1.0), Sample::new(bad, 1, 1.0)];
            assert!(matches!(
                resampler.resample(&samples, &[]),
                Err(ComputeError::SchemaError(_))
            ));
        }
    }

    #[test]
    fn test_empty_input_gives_empty_series() {
        let series = Resampler::new(secs(1.0)).resample(&[], &[]).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.max_time(), None);
    }

    #[test]
    fn test_resample_wide() {
        let columns = EntityCatalog::from_labels(vec![EntityLabel::Int(1), EntityLabel::Int(2)]);
        let matrix = WideMatrix {
            times: vec![0.0, 0.25, 0.5, 2.1],
            columns,
            values: vec![
                vec![Some(1.0), None],
                vec![Some(3.0), Some(4.0)],
                vec![None, Some(8.0)],
                vec![Some(7.0), None],
            ],
        };

        let out = Resampler::new(secs(1.0)).resample_wide(&matrix).unwrap();

        assert_eq!(out.times, vec![0.0, 1.0, 2.0]);
        assert_eq!(out.values[0], vec![Some(2.0), Some(6.0)]);
        assert_eq!(out.values[1], vec![None, None]);
        assert_eq!(out.values[2], vec![Some(7.0), None]);
    }
}
