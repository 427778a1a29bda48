//! CLI command implementations.
//!
//! | Module       | Commands handled                                       |
//! |--------------|--------------------------------------------------------|
//! | `project`    | `Init`, `New`                                          |
//! | `run`        | `Run`                                                  |
//! | `checkpoint` | `ListCheckpoints`, `Rollback`, `CleanupCheckpoints`    |
//! | `status`     | `Status`                                               |
//! | `config`     | `Config`                                               |

pub mod checkpoint;
pub mod config;
pub mod project;
pub mod run;
pub mod status;

pub use checkpoint::{cmd_cleanup_checkpoints, cmd_list_checkpoints, cmd_rollback};
pub use config::cmd_config;
pub use project::{cmd_init, cmd_new};
pub use run::cmd_run;
pub use status::cmd_status;

use anyhow::Result;
use std::io::IsTerminal;
use std::path::Path;

use super::Cli;

/// Load the runtime configuration for a command that works on changes.
pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<waypoint::config::Config> {
    waypoint::config::Config::new(project_dir.to_path_buf(), cli.verbose, cli.yes)
}

/// True when a human can answer a prompt.
pub fn interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}
