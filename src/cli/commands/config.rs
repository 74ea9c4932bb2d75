//! Effective configuration display.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct ConfigOutput<'a> {
    config: &'a Config,
}

impl CommandOutput for ConfigOutput<'_> {
    fn to_human(&self) -> String {
        serde_yaml::to_string(self.config).unwrap_or_else(|e| format!("<unprintable config: {e}>"))
    }
}

/// Print the resolved configuration.
pub fn execute(config: &Config, json_mode: bool) -> Result<()> {
    output(&ConfigOutput { config }, json_mode);
    Ok(())
}
