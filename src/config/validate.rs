// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, WatchrunError};
use crate::logging::parse_level_str;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WatchrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_commands(cfg)?;
    validate_commands(cfg)?;
    validate_log_level(cfg)?;
    Ok(())
}

fn ensure_has_commands(cfg: &RawConfigFile) -> Result<()> {
    if cfg.commands.is_empty() {
        return Err(WatchrunError::ConfigError(
            "no commands specified; add at least one entry to `commands`".to_string(),
        ));
    }
    Ok(())
}

fn validate_commands(cfg: &RawConfigFile) -> Result<()> {
    for (index, command) in cfg.commands.iter().enumerate() {
        if command.trim().is_empty() {
            return Err(WatchrunError::ConfigError(format!(
                "commands[{index}] is empty"
            )));
        }
    }
    Ok(())
}

fn validate_log_level(cfg: &RawConfigFile) -> Result<()> {
    if let Some(level) = cfg.log_level.as_deref() {
        if parse_level_str(level).is_none() {
            return Err(WatchrunError::ConfigError(format!(
                "invalid log_level: {level} (expected error, warn, info, debug or trace)"
            )));
        }
    }
    Ok(())
}
