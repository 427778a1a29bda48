//! Pipeline orchestration for one change.
//!
//! ```text
//! Orchestrator::run
//!   ├── resolve lane (LaneSelector, locked once stages ran)
//!   ├── ResumptionPlanner::plan (fresh / resume / prompt)
//!   └── for each stage >= start
//!         ├── not in lane  -> StatusTracker::skip_stage
//!         └── StageExecutor::execute
//!               start_stage -> hooks -> checkpoint -> logic -> complete_stage -> mark_success
//! ```

pub mod executor;
pub mod resume;
pub mod runner;

pub use executor::{StageExecutor, StageReport};
pub use resume::{ResumeOption, ResumptionDecision, ResumptionPlanner, last_good_checkpoint};
pub use runner::{Orchestrator, ResumeChooser, RunOptions, RunOutcome};
