//! Layout of pipeline metadata in the coordination store.
//!
//! ```text
//! /pipeline
//!   /metadata/{JOB_TYPE}/process_config
//!   /jobs/{job_id}
//!     /config
//!     /items/{sharding_item}/error
//!     /barrier/enable/{sharding_item}
//!     /barrier/disable/{sharding_item}
//! ```

use model::job::JobType;

pub const ROOT: &str = "/pipeline";
pub const JOBS_ROOT: &str = "/pipeline/jobs";

const BARRIER: &str = "barrier";
const ENABLE: &str = "enable";
const DISABLE: &str = "disable";

pub fn job_root(job_id: &str) -> String {
    format!("{JOBS_ROOT}/{job_id}")
}

pub fn job_config_path(job_id: &str) -> String {
    format!("{JOBS_ROOT}/{job_id}/config")
}

pub fn job_item_error_path(job_id: &str, sharding_item: u32) -> String {
    format!("{JOBS_ROOT}/{job_id}/items/{sharding_item}/error")
}

pub fn barrier_enable_path(job_id: &str) -> String {
    format!("{JOBS_ROOT}/{job_id}/{BARRIER}/{ENABLE}")
}

pub fn barrier_disable_path(job_id: &str) -> String {
    format!("{JOBS_ROOT}/{job_id}/{BARRIER}/{DISABLE}")
}

pub fn process_config_path(job_type: JobType) -> String {
    format!("{ROOT}/metadata/{}/process_config", job_type.as_str())
}

/// Job id of a `/pipeline/jobs/{job_id}/config` key.
pub fn job_id_of_config_path(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(JOBS_ROOT)?.strip_prefix('/')?;
    let job_id = rest.strip_suffix("/config")?;
    (!job_id.is_empty() && !job_id.contains('/')).then_some(job_id)
}

/// Matches `/pipeline/jobs/{job_id}/barrier/{enable|disable}/{sharding_item}`.
pub fn is_barrier_child_path(key: &str) -> bool {
    let Some(rest) = key.strip_prefix(JOBS_ROOT).and_then(|r| r.strip_prefix('/')) else {
        return false;
    };

    let segments: Vec<&str> = rest.split('/').collect();
    match segments.as_slice() {
        [job_id, BARRIER, kind, item] => {
            !job_id.is_empty()
                && (*kind == ENABLE || *kind == DISABLE)
                && !item.is_empty()
                && item.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// Everything before the last `/`, or `None` for keys without a parent.
pub fn parent_path(key: &str) -> Option<&str> {
    let idx = key.rfind('/')?;
    (idx > 0).then(|| &key[..idx])
}
