pub mod api;
pub mod barrier;
pub mod context;
pub mod error;
pub mod execute;
pub mod job;
pub mod prepare;
pub mod runner;
pub mod task;
