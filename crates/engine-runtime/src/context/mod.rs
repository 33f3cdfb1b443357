pub mod item;
pub mod process;

pub use item::{JobItemContext, JobItemContextBuilder};
pub use process::TransmissionProcessContext;
