pub mod capabilities;
pub mod change;
pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod gates;
pub mod generate;
pub mod hooks;
pub mod init;
pub mod lane;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod stage;
pub mod tracker;
pub mod ui;
pub mod util;
pub mod waypoint_config;
