use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    MySql,
    PostgreSql,
    OpenGauss,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::MySql => f.write_str("MySQL"),
            DatabaseType::PostgreSql => f.write_str("PostgreSQL"),
            DatabaseType::OpenGauss => f.write_str("openGauss"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceConfiguration {
    pub name: String,
    pub database_type: DatabaseType,
    pub url: String,
}

/// A table name with an optional schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedTable {
    pub schema: Option<String>,
    pub table: String,
}

impl QualifiedTable {
    pub fn new(schema: Option<&str>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            table: table.into(),
        }
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => f.write_str(&self.table),
        }
    }
}

/// Source table on one data source and the table it lands in on the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub logic_table: String,
    pub source_data_source: String,
    pub source: QualifiedTable,
    pub target: QualifiedTable,
}

/// Tables handled by one sharding item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNodeLine {
    pub mappings: Vec<TableMapping>,
}

/// Immutable description of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfiguration {
    pub job_id: String,
    pub sharding_count: u32,
    /// One line per sharding item, indexed by item.
    pub data_node_lines: Vec<DataNodeLine>,
    pub sources: Vec<DataSourceConfiguration>,
    pub target: DataSourceConfiguration,
    #[serde(default)]
    pub disabled: bool,
}

impl JobConfiguration {
    pub fn data_node_line(&self, sharding_item: u32) -> Option<&DataNodeLine> {
        self.data_node_lines.get(sharding_item as usize)
    }

    pub fn source(&self, name: &str) -> Option<&DataSourceConfiguration> {
        self.sources.iter().find(|s| s.name == name)
    }
}
