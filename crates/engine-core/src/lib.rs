pub mod coordination;
pub mod error;
pub mod governance;
pub mod ratelimit;
pub mod sink;
pub mod state;
