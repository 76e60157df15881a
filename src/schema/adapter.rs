//! Adapter for converting JSON records into typed samples
//!
//! Records are flat JSON objects, one per (time, entity) observation. Column
//! names are resolved once through a [`ColumnMap`]; everything downstream
//! works on [`Sample`] fields.

use crate::error::ComputeError;
use crate::schema::columns::ColumnMap;
use crate::types::{validate_time, EntityLabel, Sample};
use serde_json::{Map, Value};

/// One input record
pub type Record = Map<String, Value>;

/// Adapter for converting records to samples
pub struct RecordAdapter;

impl RecordAdapter {
    /// Parse a JSON string containing an array of records
    pub fn parse_array(json: &str) -> Result<Vec<Record>, ComputeError> {
        let records: Vec<Record> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing records
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Record>, ComputeError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Convert records to samples, failing on the first invalid row
    pub fn to_samples(records: &[Record], columns: &ColumnMap) -> Result<Vec<Sample>, ComputeError> {
        records
            .iter()
            .enumerate()
            .map(|(row, record)| record_to_sample(row, record, columns))
            .collect()
    }

    /// Validate a batch of records without converting them
    pub fn validate_records(records: &[Record], columns: &ColumnMap) -> Vec<ValidationResult> {
        records
            .iter()
            .enumerate()
            .filter_map(|(row, record)| {
                record_to_sample(row, record, columns)
                    .err()
                    .map(|error| ValidationResult { index: row, error })
            })
            .collect()
    }
}

/// A record that failed validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub error: ComputeError,
}

fn record_to_sample(row: usize, record: &Record, columns: &ColumnMap) -> Result<Sample, ComputeError> {
    let time = match record.get(&columns.time) {
        None | Some(Value::Null) => {
            return Err(ComputeError::SchemaError(format!(
                "row {row}: missing column '{}'",
                columns.time
            )))
        }
        Some(value) => value.as_f64().ok_or_else(|| {
            ComputeError::SchemaError(format!(
                "row {row}: column '{}' must be numeric, got {value}",
                columns.time
            ))
        })?,
    };
    validate_time(time, row)?;

    let entity = match record.get(&columns.entity) {
        None | Some(Value::Null) => {
            return Err(ComputeError::SchemaError(format!(
                "row {row}: missing column '{}'",
                columns.entity
            )))
        }
        Some(value) => entity_label(value).ok_or_else(|| {
            ComputeError::SchemaError(format!(
                "row {row}: column '{}' must be an integer or string, got {value}",
                columns.entity
            ))
        })?,
    };

    let value = match record.get(&columns.value) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_f64().ok_or_else(|| {
            ComputeError::SchemaError(format!(
                "row {row}: column '{}' must be numeric, got {value}",
                columns.value
            ))
        })?),
    };

    Ok(Sample {
        time,
        entity,
        value,
        session: text_field(record, &columns.session),
        subject: text_field(record, &columns.subject),
        group: text_field(record, &columns.group),
    })
}

fn entity_label(value: &Value) -> Option<EntityLabel> {
    match value {
        Value::String(s) => Some(EntityLabel::Text(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(EntityLabel::Int(i)),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| EntityLabel::Int(f as i64)),
        },
        _ => None,
    }
}

fn text_field(record: &Record, column: &str) -> Option<String> {
    match record.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"
            {"time": 0.0, "cell_id": 1, "value": 0.5}
            {"time": 0.1, "cell_id": "c2", "value": null, "subject": "m1"}

            {"time": 0.2, "cell_id": 3.0, "session": "day4-test1", "group": "Experimental"}
        "#;

        let records = RecordAdapter::parse_ndjson(ndjson).unwrap();
        assert_eq!(records.len(), 3);

        let samples = RecordAdapter::to_samples(&records, &ColumnMap::default()).unwrap();
        assert_eq!(samples[0].entity, EntityLabel::Int(1));
        assert_eq!(samples[0].value, Some(0.5));
        assert_eq!(samples[1].entity, EntityLabel::Text("c2".to_string()));
        assert_eq!(samples[1].value, None);
        assert_eq!(samples[1].subject.as_deref(), Some("m1"));
        assert_eq!(samples[2].entity, EntityLabel::Int(3));
        assert_eq!(samples[2].session.as_deref(), Some("day4-test1"));
        assert_eq!(samples[2].group.as_deref(), Some("Experimental"));
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"time\": 0.0, \"cell_id\": 1}\nnot json\n";
        match RecordAdapter::parse_ndjson(ndjson) {
            Err(ComputeError::ParseError(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_column_overrides() {
        let json = r#"[{"t": 1.5, "neuron": 7, "dff": 2.0}]"#;
        let records = RecordAdapter::parse_array(json).unwrap();
        let columns = ColumnMap::default()
            .with_time("t")
            .with_entity("neuron")
            .with_value("dff");

        let samples = RecordAdapter::to_samples(&records, &columns).unwrap();
        assert_eq!(samples, vec![Sample::new(1.5, 7, 2.0)]);

        let err = RecordAdapter::to_samples(&records, &ColumnMap::default()).unwrap_err();
        assert!(matches!(err, ComputeError::SchemaError(msg) if msg.contains("'time'")));
    }

    #[test]
    fn test_metadata_column_overrides() {
        let json = r#"[{"time": 0.5, "cell_id": 2, "value": 1.0, "sess": "day2-morning", "mouse": "m4", "cohort": "No Shock"}]"#;
        let records = RecordAdapter::parse_array(json).unwrap();
        let columns = ColumnMap::default()
            .with_session("sess")
            .with_subject("mouse")
            .with_group("cohort");

        let samples = RecordAdapter::to_samples(&records, &columns).unwrap();
        assert_eq!(
            samples,
            vec![Sample::new(0.5, 2, 1.0)
                .with_session("day2-morning")
                .with_subject("m4")
                .with_group("No Shock")]
        );
    }

    #[test]
    fn test_schema_errors() {
        let bad = [
            r#"{"cell_id": 1, "value": 1.0}"#,
            r#"{"time": "soon", "cell_id": 1}"#,
            r#"{"time": -2.0, "cell_id": 1}"#,
            r#"{"time": 1.0}"#,
            r#"{"time": 1.0, "cell_id": 1.5}"#,
            r#"{"time": 1.0, "cell_id": 1, "value": "high"}"#,
        ];
        for line in bad {
            let records = RecordAdapter::parse_ndjson(line).unwrap();
            let result = RecordAdapter::to_samples(&records, &ColumnMap::default());
            assert!(
                matches!(result, Err(ComputeError::SchemaError(_))),
                "expected schema error for {line}"
            );
        }
    }

    #[test]
    fn test_validate_records() {
        let ndjson = r#"
            {"time": 0.0, "cell_id": 1, "value": 1.0}
            {"time": -1.0, "cell_id": 1, "value": 1.0}
            {"time": 2.0, "cell_id": 1, "value": 1.0}
            {"value": 1.0}
        "#;
        let records = RecordAdapter::parse_ndjson(ndjson).unwrap();
        let results = RecordAdapter::validate_records(&records, &ColumnMap::default());

        let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }
}
