//! Core types for the context-align pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: long-format samples, interned entity identifiers, bucketed series,
//! wide matrices and block labels.

use crate::error::ComputeError;
use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifier of a recorded entity (a cell, a tracked body part, ...)
///
/// Integers order numerically and sort before text identifiers, so a table of
/// numeric cell ids keeps its natural column order after pivoting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityLabel {
    Int(i64),
    Text(String),
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityLabel::Int(id) => write!(f, "{id}"),
            EntityLabel::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for EntityLabel {
    fn from(v: i64) -> Self {
        EntityLabel::Int(v)
    }
}

impl From<i32> for EntityLabel {
    fn from(v: i32) -> Self {
        EntityLabel::Int(i64::from(v))
    }
}

impl From<u32> for EntityLabel {
    fn from(v: u32) -> Self {
        EntityLabel::Int(i64::from(v))
    }
}

impl From<&str> for EntityLabel {
    fn from(v: &str) -> Self {
        EntityLabel::Text(v.to_string())
    }
}

impl From<String> for EntityLabel {
    fn from(v: String) -> Self {
        EntityLabel::Text(v)
    }
}

/// Interned entity identifiers for one table
///
/// Built once from the samples of a table; every entity gets a dense index in
/// ascending identifier order. Column `i` of a wide matrix is `labels()[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCatalog {
    labels: Vec<EntityLabel>,
}

/// Dense index of an entity inside its [`EntityCatalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u32);

impl EntityCatalog {
    /// Intern every distinct entity label found in `samples`
    pub fn from_samples(samples: &[Sample]) -> Self {
        Self::from_labels(samples.iter().map(|s| s.entity.clone()))
    }

    /// Build a catalog from arbitrary labels, deduplicated and sorted
    pub fn from_labels(labels: impl IntoIterator<Item = EntityLabel>) -> Self {
        let mut labels: Vec<EntityLabel> = labels.into_iter().collect();
        labels.sort();
        labels.dedup();
        Self { labels }
    }

    pub fn id_of(&self, label: &EntityLabel) -> Option<EntityId> {
        self.labels
            .binary_search(label)
            .ok()
            .map(|idx| EntityId(idx as u32))
    }

    pub fn labels(&self) -> &[EntityLabel] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// One long-format observation: an entity's value at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the start of the recording
    pub time: f64,
    /// Entity that produced the value
    pub entity: EntityLabel,
    /// Observed value; `None` marks "no value"
    pub value: Option<f64>,
    /// Session name (pass-through, used only for grouping)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Subject (mouse) name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Experimental group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Sample {
    pub fn new(time: f64, entity: impl Into<EntityLabel>, value: f64) -> Self {
        Self {
            time,
            entity: entity.into(),
            value: Some(value),
            session: None,
            subject: None,
            group: None,
        }
    }

    /// A sample whose value is missing
    pub fn missing(time: f64, entity: impl Into<EntityLabel>) -> Self {
        Self {
            value: None,
            ..Self::new(time, entity, 0.0)
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Value of this sample for a grouping key
    pub fn key(&self, key: GroupKey) -> GroupValue {
        let text = |v: &Option<String>| match v {
            Some(s) => GroupValue::Text(s.clone()),
            None => GroupValue::Missing,
        };
        match key {
            GroupKey::Entity => GroupValue::Entity(self.entity.clone()),
            GroupKey::Session => text(&self.session),
            GroupKey::Subject => text(&self.subject),
            GroupKey::Group => text(&self.group),
        }
    }
}

/// Check that a time value is a usable offset in seconds
pub fn validate_time(time: f64, row: usize) -> Result<(), ComputeError> {
    if !time.is_finite() {
        return Err(ComputeError::SchemaError(format!(
            "row {row}: time must be finite, got {time}"
        )));
    }
    if time < 0.0 {
        return Err(ComputeError::SchemaError(format!(
            "row {row}: time must be >= 0, got {time}"
        )));
    }
    Ok(())
}

/// Auxiliary columns a long table can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Entity,
    Session,
    Subject,
    Group,
}

impl FromStr for GroupKey {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entity" | "cell" | "cell_id" => Ok(GroupKey::Entity),
            "session" | "session_name" => Ok(GroupKey::Session),
            "subject" | "mouse" => Ok(GroupKey::Subject),
            "group" => Ok(GroupKey::Group),
            other => Err(ComputeError::ConfigError(format!(
                "unknown group key '{other}'"
            ))),
        }
    }
}

/// Value of one grouping key; missing values group together and sort first
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Missing,
    Entity(EntityLabel),
    Text(String),
}

/// Fixed bucket width on the duration axis
///
/// Stored as a `chrono::Duration`; bucket arithmetic happens in whole
/// nanoseconds, with times rounded to the nearest nanosecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval(Duration);

const NANOS_PER_SEC: f64 = 1e9;

impl Interval {
    pub fn new(width: Duration) -> Result<Self, ComputeError> {
        match width.num_nanoseconds() {
            Some(ns) if ns > 0 => Ok(Self(width)),
            _ => Err(ComputeError::InvalidInterval(format!(
                "bucket width must be a positive number of nanoseconds, got {width}"
            ))),
        }
    }

    pub fn from_secs_f64(secs: f64) -> Result<Self, ComputeError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ComputeError::InvalidInterval(format!(
                "bucket width must be positive, got {secs}s"
            )));
        }
        Self::new(Duration::nanoseconds((secs * NANOS_PER_SEC).round() as i64))
    }

    pub fn as_nanos(&self) -> i64 {
        // Checked positive and in range by `new`
        self.0.num_nanoseconds().unwrap_or(i64::MAX)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.as_nanos() as f64 / NANOS_PER_SEC
    }

    /// Index of the bucket `[k*w, (k+1)*w)` containing `time` seconds
    pub fn bucket_of(&self, time: f64) -> i64 {
        let offset = (time * NANOS_PER_SEC).round() as i64;
        offset.div_euclid(self.as_nanos())
    }

    /// Left edge of bucket `k`, re-expressed in seconds
    pub fn bucket_start(&self, bucket: i64) -> f64 {
        (bucket as f64 * self.as_nanos() as f64) / NANOS_PER_SEC
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self(Duration::seconds(1))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = self.as_nanos();
        if ns % 3_600_000_000_000 == 0 {
            write!(f, "{}h", ns / 3_600_000_000_000)
        } else if ns % 60_000_000_000 == 0 {
            write!(f, "{}min", ns / 60_000_000_000)
        } else if ns % 1_000_000_000 == 0 {
            write!(f, "{}s", ns / 1_000_000_000)
        } else if ns % 1_000_000 == 0 {
            write!(f, "{}ms", ns / 1_000_000)
        } else if ns % 1_000 == 0 {
            write!(f, "{}us", ns / 1_000)
        } else {
            write!(f, "{ns}ns")
        }
    }
}

impl FromStr for Interval {
    type Err = ComputeError;

    /// Parse an offset string such as `"500ms"`, `"1s"`, `"2min"` or `"0.25"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        let number = if number.is_empty() { "1" } else { number };
        let amount: f64 = number
            .trim()
            .parse()
            .map_err(|_| ComputeError::InvalidInterval(format!("cannot parse '{s}'")))?;

        let nanos_per_unit = match unit.to_lowercase().as_str() {
            "ns" | "n" => 1.0,
            "us" | "u" => 1e3,
            "ms" | "l" => 1e6,
            "" | "s" => 1e9,
            "min" | "t" => 60e9,
            "h" => 3600e9,
            other => {
                return Err(ComputeError::InvalidInterval(format!(
                    "unknown unit '{other}' in '{s}'"
                )))
            }
        };
        let nanos = amount * nanos_per_unit;
        if !nanos.is_finite() || nanos < 1.0 {
            return Err(ComputeError::InvalidInterval(format!(
                "'{s}' is below the one-nanosecond resolution"
            )));
        }
        Self::new(Duration::nanoseconds(nanos.round() as i64))
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(f64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Interval::from_secs_f64(secs).map_err(serde::de::Error::custom),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Experimental context of a time point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockLabel {
    Safe,
    Scary,
    Mixed,
    Undefined,
}

impl BlockLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockLabel::Safe => "safe",
            BlockLabel::Scary => "scary",
            BlockLabel::Mixed => "mixed",
            BlockLabel::Undefined => "undefined",
        }
    }
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aggregated bucket of a long-format series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRow {
    /// Left edge of the bucket in seconds
    pub time: f64,
    /// Values of the grouping keys, in the order of `ResampledSeries::group_keys`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key: Vec<GroupValue>,
    /// Mean of the non-missing values in the bucket
    pub value: Option<f64>,
    /// Number of samples that fell into the bucket
    pub count: usize,
}

/// Output of resampling a long-format table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledSeries {
    pub interval: Interval,
    pub group_keys: Vec<GroupKey>,
    pub rows: Vec<BucketRow>,
}

impl ResampledSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn max_time(&self) -> Option<f64> {
        self.rows.iter().map(|r| r.time).reduce(f64::max)
    }

    pub fn times(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.time).collect()
    }

    /// Keep only rows strictly before `limit`
    pub fn truncate_before(&mut self, limit: f64) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| r.time < limit);
        before - self.rows.len()
    }
}

/// Time-indexed matrix: one row per time point, one column per entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideMatrix {
    /// Row index in seconds, strictly increasing
    pub times: Vec<f64>,
    /// Column identifiers
    pub columns: EntityCatalog,
    /// Row-major cells; `None` marks "no value"
    pub values: Vec<Vec<Option<f64>>>,
}

impl WideMatrix {
    pub fn empty(columns: EntityCatalog) -> Self {
        Self {
            times: Vec::new(),
            columns,
            values: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.times.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn row(&self, idx: usize) -> &[Option<f64>] {
        &self.values[idx]
    }

    /// Cell for `(time row, entity)` if the entity is a column
    pub fn get(&self, row: usize, entity: &EntityLabel) -> Option<f64> {
        let col = self.columns.id_of(entity)?;
        self.values.get(row)?.get(col.0 as usize).copied().flatten()
    }

    /// Column as a vector over all rows
    pub fn column(&self, entity: &EntityLabel) -> Option<Vec<Option<f64>>> {
        let col = self.columns.id_of(entity)?.0 as usize;
        Some(self.values.iter().map(|row| row[col]).collect())
    }

    /// Keep rows whose mask entry is true
    pub fn retain_rows(&mut self, keep: &[bool]) {
        let mut flags = keep.iter();
        self.times.retain(|_| *flags.next().unwrap_or(&false));
        let mut flags = keep.iter();
        self.values.retain(|_| *flags.next().unwrap_or(&false));
    }

    /// Keep rows strictly before `limit` seconds; returns the number removed
    pub fn truncate_before(&mut self, limit: f64) -> usize {
        let keep: Vec<bool> = self.times.iter().map(|t| *t < limit).collect();
        let before = self.times.len();
        self.retain_rows(&keep);
        before - self.times.len()
    }

    pub fn max_time(&self) -> Option<f64> {
        self.times.last().copied()
    }
}

/// A wide matrix with an optional block label per row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub matrix: WideMatrix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<BlockLabel>>,
}

impl FeatureMatrix {
    pub fn unlabeled(matrix: WideMatrix) -> Self {
        Self {
            matrix,
            blocks: None,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.matrix.n_rows()
    }

    /// Count rows per block label
    pub fn block_counts(&self) -> BTreeMap<BlockLabel, usize> {
        let mut counts = BTreeMap::new();
        for label in self.blocks.iter().flatten() {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_label_ordering() {
        let catalog = EntityCatalog::from_labels(vec![
            EntityLabel::from(10),
            EntityLabel::from("b"),
            EntityLabel::from(2),
            EntityLabel::from(2),
        ]);

        assert_eq!(catalog.len(), 3);
        assert_eq!(
            catalog.labels(),
            &[EntityLabel::Int(2), EntityLabel::Int(10), EntityLabel::from("b")]
        );
        assert_eq!(catalog.id_of(&EntityLabel::Int(10)), Some(EntityId(1)));
        assert_eq!(catalog.id_of(&EntityLabel::Int(3)), None);
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("500ms".parse::<Interval>().unwrap().as_nanos(), 500_000_000);
        assert_eq!("1s".parse::<Interval>().unwrap().as_nanos(), 1_000_000_000);
        assert_eq!("2min".parse::<Interval>().unwrap().as_nanos(), 120_000_000_000);
        assert_eq!("0.25".parse::<Interval>().unwrap().as_nanos(), 250_000_000);
        assert_eq!("1h".parse::<Interval>().unwrap().as_nanos(), 3_600_000_000_000);
        assert_eq!("100us".parse::<Interval>().unwrap().as_nanos(), 100_000);
        assert_eq!("10ns".parse::<Interval>().unwrap().as_nanos(), 10);
        assert_eq!("1500ns".parse::<Interval>().unwrap().as_nanos(), 1_500);
        assert_eq!("1500ns".parse::<Interval>().unwrap().to_string(), "1500ns");

        assert!("0s".parse::<Interval>().is_err());
        assert!("-1s".parse::<Interval>().is_err());
        assert!("10 parsecs".parse::<Interval>().is_err());
        assert!("abc".parse::<Interval>().is_err());
    }

    #[test]
    fn test_interval_display_roundtrip() {
        for text in ["500ms", "1s", "2min", "1h", "250us", "10ns"] {
            let interval: Interval = text.parse().unwrap();
            assert_eq!(interval.to_string(), text);
        }
    }

    #[test]
    fn test_interval_serde() {
        let interval: Interval = serde_json::from_str("\"100ms\"").unwrap();
        assert_eq!(interval.as_nanos(), 100_000_000);

        let interval: Interval = serde_json::from_str("0.5").unwrap();
        assert_eq!(interval.as_nanos(), 500_000_000);

        assert_eq!(serde_json::to_string(&interval).unwrap(), "\"500ms\"");
    }

    #[test]
    fn test_bucket_of() {
        let interval = Interval::from_secs_f64(0.1).unwrap();
        assert_eq!(interval.bucket_of(0.0), 0);
        assert_eq!(interval.bucket_of(0.0999), 0);
        assert_eq!(interval.bucket_of(0.1), 1);
        assert_eq!(interval.bucket_of(0.3), 3);
        assert!((interval.bucket_start(3) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_bucket_edge_below_one_microsecond() {
        let interval: Interval = "1s".parse().unwrap();
        assert_eq!(interval.bucket_of(0.9999996), 0);
        assert_eq!(interval.bucket_of(0.999999999), 0);
        assert_eq!(interval.bucket_of(1.0), 1);

        let fine: Interval = "10ns".parse().unwrap();
        assert_eq!(fine.bucket_of(0.000_000_025), 2);
    }

    #[test]
    fn test_validate_time() {
        assert!(validate_time(0.0, 0).is_ok());
        assert!(validate_time(12.5, 0).is_ok());
        assert!(matches!(
            validate_time(-0.1, 3),
            Err(ComputeError::SchemaError(_))
        ));
        assert!(matches!(
            validate_time(f64::NAN, 0),
            Err(ComputeError::SchemaError(_))
        ));
        assert!(matches!(
            validate_time(f64::INFINITY, 0),
            Err(ComputeError::SchemaError(_))
        ));
    }

    #[test]
    fn test_block_label_serde() {
        assert_eq!(serde_json::to_string(&BlockLabel::Scary).unwrap(), "\"scary\"");
        let label: BlockLabel = serde_json::from_str("\"mixed\"").unwrap();
        assert_eq!(label, BlockLabel::Mixed);
    }
}
