//! Input column naming for long-format records

use serde::{Deserialize, Serialize};

/// Default name of the time column (seconds)
pub const DEFAULT_TIME_COL: &str = "time";

/// Default name of the entity column
pub const DEFAULT_ENTITY_COL: &str = "cell_id";

/// Default name of the value column
pub const DEFAULT_VALUE_COL: &str = "value";

/// Names of the columns read from each input record
///
/// Only `time` and `entity` are required in a record; a missing `value`
/// reads as "no value" and the metadata columns are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub time: String,
    pub entity: String,
    pub value: String,
    pub session: String,
    pub subject: String,
    pub group: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            time: DEFAULT_TIME_COL.to_string(),
            entity: DEFAULT_ENTITY_COL.to_string(),
            value: DEFAULT_VALUE_COL.to_string(),
            session: "session".to_string(),
            subject: "subject".to_string(),
            group: "group".to_string(),
        }
    }
}

impl ColumnMap {
    pub fn with_time(mut self, name: impl Into<String>) -> Self {
        self.time = name.into();
        self
    }

    pub fn with_entity(mut self, name: impl Into<String>) -> Self {
        self.entity = name.into();
        self
    }

    pub fn with_value(mut self, name: impl Into<String>) -> Self {
        self.value = name.into();
        self
    }

    pub fn with_session(mut self, name: impl Into<String>) -> Self {
        self.session = name.into();
        self
    }

    pub fn with_subject(mut self, name: impl Into<String>) -> Self {
        self.subject = name.into();
        self
    }

    pub fn with_group(mut self, name: impl Into<String>) -> Self {
        self.group = name.into();
        self
    }
}
