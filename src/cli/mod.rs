//! Command-line interface.

pub mod commands;
pub mod output;
pub mod table;
pub mod types;

use std::path::Path;

use anyhow::Result;
use console::style;

use crate::domain::models::Config;
use crate::infrastructure::ConfigLoader;

pub use types::{Cli, Commands};

/// Load configuration from `path` if given, otherwise from `.fleetkeeper/`
/// and the environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Print an error and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": causes,
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", style("Error:").red().bold());
    }
    std::process::exit(1);
}
