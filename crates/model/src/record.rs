use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataRecordType {
    Insert,
    Update,
    Delete,
}

/// A single row change flowing from a dumper to an importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub table: String,
    pub record_type: DataRecordType,
    pub columns: BTreeMap<String, Value>,
}

impl DataRecord {
    pub fn new(table: impl Into<String>, record_type: DataRecordType) -> Self {
        Self {
            table: table.into(),
            record_type,
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(name.into(), value.into());
        self
    }
}
