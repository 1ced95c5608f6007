//! `env_logger` initialization, in the pattern this codebase has always
//! used: a single `init` call made once at startup, timestamps to the
//! millisecond, level controlled by the CLI rather than `RUST_LOG`.

use log::LevelFilter;
use std::str::FromStr;

pub fn init(level: &str) {
    let filter = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    let mut logger = env_logger::Builder::new();
    logger.format_timestamp_millis();
    logger.filter(None, filter);
    logger.init();
}