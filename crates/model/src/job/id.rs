//! Job identifiers.
//!
//! A job id carries everything needed to route it before any configuration
//! is loaded:
//!
//! ```text
//! j 01 P 07 6c6f6769635f6462 <md5 hex>
//! | |  | |  |                 +-- digest of a caller-supplied discriminator
//! | |  | |  +-- database name, hex encoded
//! | |  | +-- database name length in bytes, two hex digits
//! | |  +-- instance type
//! | +-- job type code
//! +-- fixed prefix
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const PREFIX: char = 'j';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobIdError {
    #[error("Job id '{0}' is too short")]
    TooShort(String),

    #[error("Job id '{0}' does not start with 'j'")]
    MissingPrefix(String),

    #[error("Unknown job type code '{0}'")]
    UnknownJobType(String),

    #[error("Unknown instance type '{0}'")]
    UnknownInstanceType(char),

    #[error("Invalid database name segment in job id '{0}'")]
    InvalidDatabaseName(String),

    #[error("Database name '{0}' is longer than 255 bytes")]
    DatabaseNameTooLong(String),
}

/// Closed set of pipeline job types known to this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    Migration,
    ConsistencyCheck,
    Cdc,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Migration, JobType::ConsistencyCheck, JobType::Cdc];

    pub fn code(&self) -> &'static str {
        match self {
            JobType::Migration => "01",
            JobType::ConsistencyCheck => "02",
            JobType::Cdc => "03",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Migration => "MIGRATION",
            JobType::ConsistencyCheck => "CONSISTENCY_CHECK",
            JobType::Cdc => "STREAMING",
        }
    }

    /// CDC jobs drive every sharding item from a single invocation.
    pub fn handles_all_items(&self) -> bool {
        matches!(self, JobType::Cdc)
    }

    /// Consistency checks are bounded: they end after the inventory phase.
    pub fn has_incremental_phase(&self) -> bool {
        !matches!(self, JobType::ConsistencyCheck)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceType {
    Proxy,
    Embedded,
}

impl InstanceType {
    fn as_char(&self) -> char {
        match self {
            InstanceType::Proxy => 'P',
            InstanceType::Embedded => 'E',
        }
    }

    fn from_char(c: char) -> Result<Self, JobIdError> {
        match c {
            'P' => Ok(InstanceType::Proxy),
            'E' => Ok(InstanceType::Embedded),
            other => Err(JobIdError::UnknownInstanceType(other)),
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceType::Proxy => f.write_str("PROXY"),
            InstanceType::Embedded => f.write_str("EMBEDDED"),
        }
    }
}

/// Identifies the cluster context (logical database + deployment mode) a job belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    pub database_name: String,
    pub instance_type: InstanceType,
}

impl ContextKey {
    pub fn new(database_name: impl Into<String>, instance_type: InstanceType) -> Self {
        Self {
            database_name: database_name.into(),
            instance_type,
        }
    }
}

/// Builds a job id for `job_type` in `context_key`.
pub fn marshal(
    job_type: JobType,
    context_key: &ContextKey,
    discriminator: &str,
) -> Result<String, JobIdError> {
    let name = context_key.database_name.as_bytes();
    if name.len() > u8::MAX as usize {
        return Err(JobIdError::DatabaseNameTooLong(
            context_key.database_name.clone(),
        ));
    }

    let hex_name: String = name.iter().map(|b| format!("{b:02x}")).collect();
    let digest = md5::compute(discriminator.as_bytes());

    Ok(format!(
        "{PREFIX}{}{}{:02x}{hex_name}{digest:x}",
        job_type.code(),
        context_key.instance_type.as_char(),
        name.len(),
    ))
}

pub fn parse_job_type(job_id: &str) -> Result<JobType, JobIdError> {
    check_prefix(job_id)?;
    let code = job_id
        .get(1..3)
        .ok_or_else(|| JobIdError::TooShort(job_id.to_string()))?;
    JobType::from_code(code).ok_or_else(|| JobIdError::UnknownJobType(code.to_string()))
}

pub fn parse_context_key(job_id: &str) -> Result<ContextKey, JobIdError> {
    check_prefix(job_id)?;
    let instance = job_id
        .get(3..4)
        .and_then(|s| s.chars().next())
        .ok_or_else(|| JobIdError::TooShort(job_id.to_string()))?;
    let instance_type = InstanceType::from_char(instance)?;

    let invalid = || JobIdError::InvalidDatabaseName(job_id.to_string());
    let len_hex = job_id.get(4..6).ok_or_else(invalid)?;
    let len = usize::from_str_radix(len_hex, 16).map_err(|_| invalid())?;
    let hex_name = job_id.get(6..6 + len * 2).ok_or_else(invalid)?;

    let bytes = (0..len)
        .map(|i| {
            hex_name
                .get(i * 2..i * 2 + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        })
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(invalid)?;
    let database_name = String::from_utf8(bytes).map_err(|_| invalid())?;

    Ok(ContextKey {
        database_name,
        instance_type,
    })
}

fn check_prefix(job_id: &str) -> Result<(), JobIdError> {
    if job_id.len() < 6 {
        return Err(JobIdError::TooShort(job_id.to_string()));
    }
    if !job_id.starts_with(PREFIX) {
        return Err(JobIdError::MissingPrefix(job_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_what_it_marshals() {
        let key = ContextKey::new("logic_db", InstanceType::Proxy);
        let job_id = marshal(JobType::Cdc, &key, "ds_0.t_order").unwrap();

        assert!(job_id.starts_with("j03P08"));
        assert_eq!(parse_job_type(&job_id).unwrap(), JobType::Cdc);
        assert_eq!(parse_context_key(&job_id).unwrap(), key);
    }

    #[test]
    fn discriminator_changes_digest_only() {
        let key = ContextKey::new("db", InstanceType::Embedded);
        let a = marshal(JobType::Migration, &key, "a").unwrap();
        let b = marshal(JobType::Migration, &key, "b").unwrap();

        assert_ne!(a, b);
        assert_eq!(&a[..10], &b[..10]);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(
            parse_job_type("j01"),
            Err(JobIdError::TooShort("j01".to_string()))
        );
        assert!(matches!(
            parse_job_type("x01P00abcdef"),
            Err(JobIdError::MissingPrefix(_))
        ));
        assert_eq!(
            parse_job_type("j99P00abcdef"),
            Err(JobIdError::UnknownJobType("99".to_string()))
        );
        assert_eq!(
            parse_context_key("j01X00abcdef"),
            Err(JobIdError::UnknownInstanceType('X'))
        );
        assert!(matches!(
            parse_context_key("j01P09zz"),
            Err(JobIdError::InvalidDatabaseName(_))
        ));
    }

    #[test]
    fn consistency_check_is_bounded() {
        assert!(!JobType::ConsistencyCheck.has_incremental_phase());
        assert!(JobType::Migration.has_incremental_phase());
        assert!(JobType::Cdc.handles_all_items());
        assert!(!JobType::Migration.handles_all_items());
    }
}
