pub mod progress;
pub mod tailoring;
pub mod usage;
