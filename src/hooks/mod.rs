//! Pre-step hooks: checks run immediately before a stage.
//!
//! Hooks are keyed by stage number and run in registration order. A failing
//! hook stops the stage before its checkpoint is taken.
//!
//! # Built-in hooks
//!
//! - `sanity-check` before stage 0
//! - `review-gate` before stage 10, requiring the quality gates to have
//!   passed (or been skipped by the lane)
//!
//! # Configuration
//!
//! Command hooks are added from `.waypoint/waypoint.toml`:
//!
//! ```toml
//! [[hooks]]
//! stage = 5
//! name = "db-up"
//! command = ["./scripts/ensure-db-running.sh"]
//! timeout_secs = 60
//! ```

pub mod builtin;
pub mod command;
pub mod registry;
pub mod types;

pub use builtin::{ReviewGateHook, SanityCheckHook};
pub use command::CommandHook;
pub use registry::PreStepHookRegistry;
pub use types::{HookContext, HookOutcome, HookResult, PreStepHook};
