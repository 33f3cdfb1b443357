pub mod manager;
pub mod registry;

pub use manager::{JobRunnerManager, TasksRunner};
pub use registry::JobRegistry;
