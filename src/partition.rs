//! Splitting and subsetting tables by metadata
//!
//! Partitions are keyed by `BTreeMap`, so iteration order is deterministic.
//! Samples without the partition column land under [`UNASSIGNED`].

use crate::types::{EntityCatalog, EntityLabel, Sample, WideMatrix};
use std::collections::{BTreeMap, BTreeSet};

/// Partition key for samples that lack the partition column
pub const UNASSIGNED: &str = "unassigned";

fn split_by(samples: &[Sample], key: impl Fn(&Sample) -> Option<&str>) -> BTreeMap<String, Vec<Sample>> {
    let mut parts: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        let name = key(sample).unwrap_or(UNASSIGNED);
        parts.entry(name.to_string()).or_default().push(sample.clone());
    }
    parts
}

/// Split samples by experimental group
pub fn split_by_group(samples: &[Sample]) -> BTreeMap<String, Vec<Sample>> {
    split_by(samples, |s| s.group.as_deref())
}

/// Split samples by subject
pub fn split_by_subject(samples: &[Sample]) -> BTreeMap<String, Vec<Sample>> {
    split_by(samples, |s| s.subject.as_deref())
}

/// Split samples by group, then by subject within each group
pub fn split_by_group_and_subject(
    samples: &[Sample],
) -> BTreeMap<String, BTreeMap<String, Vec<Sample>>> {
    split_by_group(samples)
        .into_iter()
        .map(|(group, members)| (group, split_by_subject(&members)))
        .collect()
}

/// Keep only the listed entity columns of a wide matrix
///
/// Requested ids that are not columns are ignored.
pub fn subset_entities(matrix: &WideMatrix, entities: &[EntityLabel]) -> WideMatrix {
    let wanted: BTreeSet<&EntityLabel> = entities.iter().collect();
    let kept: Vec<(usize, EntityLabel)> = matrix
        .columns
        .labels()
        .iter()
        .enumerate()
        .filter(|(_, label)| wanted.contains(label))
        .map(|(idx, label)| (idx, label.clone()))
        .collect();

    let columns = EntityCatalog::from_labels(kept.iter().map(|(_, label)| label.clone()));
    let values = matrix
        .values
        .iter()
        .map(|row| kept.iter().map(|(idx, _)| row[*idx]).collect())
        .collect();

    WideMatrix {
        times: matrix.times.clone(),
        columns,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reshape::Reshaper;

    fn cohort() -> Vec<Sample> {
        vec![
            Sample::new(0.0, 1, 1.0).with_group("Experimental").with_subject("m2"),
            Sample::new(0.0, 2, 2.0).with_group("No Shock").with_subject("m3"),
            Sample::new(0.0, 3, 3.0).with_group("Experimental").with_subject("m1"),
            Sample::new(1.0, 1, 4.0).with_group("Experimental").with_subject("m2"),
            Sample::new(1.0, 4, 5.0),
        ]
    }

    #[test]
    fn test_split_by_group() {
        let parts = split_by_group(&cohort());

        let names: Vec<&str> = parts.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Experimental", "No Shock", UNASSIGNED]);
        assert_eq!(parts["Experimental"].len(), 3);
        assert_eq!(parts[UNASSIGNED].len(), 1);
    }

    #[test]
    fn test_split_by_group_and_subject() {
        let parts = split_by_group_and_subject(&cohort());

        let experimental = &parts["Experimental"];
        let subjects: Vec<&str> = experimental.keys().map(String::as_str).collect();
        assert_eq!(subjects, vec!["m1", "m2"]);
        assert_eq!(experimental["m2"].len(), 2);
    }

    #[test]
    fn test_subset_entities() {
        let wide = Reshaper::to_wide(&cohort()).unwrap();
        let subset = subset_entities(&wide, &[EntityLabel::Int(3), EntityLabel::Int(1), EntityLabel::Int(99)]);

        assert_eq!(subset.columns.labels(), &[EntityLabel::Int(1), EntityLabel::Int(3)]);
        assert_eq!(subset.times, wide.times);
        assert_eq!(subset.values[0], vec![Some(1.0), Some(3.0)]);
        assert_eq!(subset.values[1], vec![Some(4.0), None]);
    }
}
