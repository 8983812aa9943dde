//! CLI command implementations

mod action;
mod config;
mod list;
mod register;

pub use action::{action_command, exit_code};
pub use config::{config_path, config_show};
pub use list::list_command;
pub use register::{label_command, register_command, unregister_command};
