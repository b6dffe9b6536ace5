//! `sealed-review config`: print the effective configuration.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub config: Config,
    #[serde(skip)]
    rendered: String,
}

impl ConfigOutput {
    pub fn new(config: Config) -> Result<Self> {
        let rendered = serde_yaml::to_string(&config).context("Failed to render configuration")?;
        Ok(Self { config, rendered })
    }
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        self.rendered.trim_end().to_string()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

/// Print the effective configuration.
pub fn execute(_args: ConfigArgs, config: Config, json_mode: bool) -> Result<()> {
    output(&ConfigOutput::new(config)?, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_output_is_yaml() {
        let out = ConfigOutput::new(Config::default()).unwrap();
        let human = out.to_human();
        assert!(human.contains("request_timeout_secs: 300"));
        assert!(human.contains("backend: memory"));
        assert_eq!(out.to_json()["events"]["channel_capacity"], 1024);
    }
}
