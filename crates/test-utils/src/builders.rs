#![allow(dead_code)]

use std::path::PathBuf;

use watchrun::config::{ConfigFile, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                clear_screen: false,
                ..RawConfigFile::default()
            },
        }
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.config.commands.push(command.to_string());
        self
    }

    pub fn ignore(mut self, pattern: &str) -> Self {
        self.config.ignore.push(pattern.to_string());
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_files.push(path.into());
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout = ms;
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.config.delay = ms;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
