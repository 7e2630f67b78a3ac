//! Configuration parsing for i3ipc
//!
//! This crate reads the KDL configuration file that tells an i3ipc client
//! where the window manager's socket lives and how hard to try reaching it.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
