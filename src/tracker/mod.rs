pub mod git;
pub mod status;
pub mod views;

pub use git::GitTracker;
pub use status::{Metrics, StageState, StageStatus, StatusRecord, StatusTracker};
pub use views::{StatusSummary, StatusView, render};
