pub mod config;
pub mod id;
pub mod progress;
pub mod status;

pub use config::{
    DataNodeLine, DataSourceConfiguration, DatabaseType, JobConfiguration, QualifiedTable,
    TableMapping,
};
pub use id::{ContextKey, InstanceType, JobIdError, JobType};
pub use progress::JobItemProgress;
pub use status::JobStatus;
