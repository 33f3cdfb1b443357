pub mod job;
pub mod position;
pub mod process;
pub mod record;
pub mod response;
pub mod sharding;
