use std::path::PathBuf;

use serde_derive::Deserialize;

fn default_timeout_cache() -> u32 {
    5
}

fn default_timeout_msg() -> u32 {
    10
}

/// Runtime configuration for the pairing engine, per spec §6.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Output Observation Domain ID. No default: a missing value is a
    /// load error.
    pub odid: u32,

    /// Max age (seconds) of a cached uniflow before it is flushed as a
    /// passthrough.
    #[serde(default = "default_timeout_cache")]
    pub timeout_cache: u32,

    /// Max age (seconds) of an output message before it is force-flushed.
    /// Zero means "flush on every sweep".
    #[serde(default = "default_timeout_msg")]
    pub timeout_msg: u32,

    /// Drop reverse-side fields that lack a reverse element definition
    /// instead of duplicating them under their original id.
    #[serde(default)]
    pub ignore_missing_reverse: bool,

    /// Treat missing transport ports as zero and still attempt pairing,
    /// rather than demoting the record to passthrough.
    #[serde(default)]
    pub pair_missing_ports: bool,
}

impl Config {
    /// Loads configuration the way this crate's CLI historically has:
    /// merge an optional file with `APP_`-prefixed environment overrides.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::default();

        if let Some(path) = config_file {
            builder.merge(config::File::from(path))?;
        } else {
            builder.merge(config::File::with_name("./config/default").required(false))?;
        }

        builder.merge(config::Environment::with_prefix("APP"))?;
        builder.try_into()
    }
}
