use crate::error::CliError;
use model::job::{JobIdError, JobItemProgress, id};
use serde::Serialize;
use std::fmt::Write;

/// Routing fields decoded from a job id.
#[derive(Debug, Serialize)]
pub struct JobIdView {
    pub job_id: String,
    pub job_type: String,
    pub instance_type: String,
    pub database_name: String,
}

impl JobIdView {
    pub fn decode(job_id: &str) -> Result<Self, JobIdError> {
        let job_type = id::parse_job_type(job_id)?;
        let context_key = id::parse_context_key(job_id)?;
        Ok(Self {
            job_id: job_id.to_string(),
            job_type: job_type.to_string(),
            instance_type: context_key.instance_type.to_string(),
            database_name: context_key.database_name,
        })
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn progress_table(progress: &JobItemProgress) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Progress for job '{}' / item {}:",
        progress.job_id, progress.sharding_item
    );
    let _ = writeln!(out, "-----------------------------");
    let _ = writeln!(out, "{:<16} {}", "Status", progress.status);
    let _ = writeln!(out, "{:<16} {}", "Records", progress.processed_records);
    let _ = writeln!(out, "{:<16} {}", "Updated", progress.updated_at.to_rfc3339());
    for (task_id, position) in &progress.inventory {
        let _ = writeln!(out, "{:<16} {task_id} {position}", "Inventory");
    }
    for (task_id, position) in &progress.incremental {
        let _ = writeln!(out, "{:<16} {task_id} {position}", "Incremental");
    }
    out
}

pub fn job_id_table(view: &JobIdView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<16} {}", "Job", view.job_id);
    let _ = writeln!(out, "{:<16} {}", "Type", view.job_type);
    let _ = writeln!(out, "{:<16} {}", "Instance", view.instance_type);
    let _ = writeln!(out, "{:<16} {}", "Database", view.database_name);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        job::{ContextKey, InstanceType, JobStatus, JobType},
        position::IngestPosition,
    };

    #[test]
    fn decodes_job_id_fields() {
        let job_id = id::marshal(
            JobType::Cdc,
            &ContextKey::new("sharding_db", InstanceType::Embedded),
            "orders",
        )
        .unwrap();

        let view = JobIdView::decode(&job_id).unwrap();
        assert_eq!(view.job_type, "STREAMING");
        assert_eq!(view.instance_type, "EMBEDDED");
        assert_eq!(view.database_name, "sharding_db");
        assert!(job_id_table(&view).contains("sharding_db"));

        assert!(JobIdView::decode("nonsense").is_err());
    }

    #[test]
    fn progress_table_lists_every_task() {
        let mut progress = JobItemProgress::new("j1", 2, JobStatus::ExecuteIncrementalTask);
        progress
            .inventory
            .insert("ds_0.t_order#2".into(), IngestPosition::Finished);
        progress
            .incremental
            .insert("ds_0.incremental#2".into(), IngestPosition::Placeholder);

        let table = progress_table(&progress);
        assert!(table.contains("EXECUTE_INCREMENTAL_TASK"));
        assert!(table.contains("ds_0.t_order#2 finished"));
        assert!(table.contains("ds_0.incremental#2 placeholder"));

        let json = to_json(&progress).unwrap();
        assert!(json.contains("\"sharding_item\": 2"));
    }
}
