/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion model
//
// logging module
//
// console logging through log4rs
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::{ContagionError, Result};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::{Config, Handle};

// ISO 8601 timestamp and a colour coded level tag
const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

fn build_config(level: LevelFilter) -> Result<Config> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|e| ContagionError::Logging(e.to_string()))
}

// installs the global logger - the handle lets the level change once the parameters are read
pub fn init(level: LevelFilter) -> Result<Handle> {
    let config = build_config(level)?;
    log4rs::init_config(config).map_err(|e| ContagionError::Logging(e.to_string()))
}

pub fn set_level(handle: &Handle, level: LevelFilter) -> Result<()> {
    handle.set_config(build_config(level)?);
    Ok(())
}
