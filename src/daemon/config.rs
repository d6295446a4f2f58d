use crate::common::constants::SOCKET_PATH;
use crate::common::types::LogLevel;
use crate::core::config::{self, ConfigChange, ConfigService, Settings};
use anyhow::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub settings: Settings,
    pub settings_path: PathBuf,
    pub socket_path: PathBuf,
    /// Overrides `daemon.log_level` from the file.
    pub log_level: Option<LogLevel>,
}

impl DaemonConfig {
    pub fn load(settings_path: Option<PathBuf>, socket_path: Option<PathBuf>) -> Result<Self> {
        let settings_path = settings_path.unwrap_or_else(config::settings_path);
        let settings = Settings::load(&settings_path)?;
        Ok(Self {
            settings,
            settings_path,
            socket_path: socket_path.unwrap_or_else(|| PathBuf::from(SOCKET_PATH)),
            log_level: None,
        })
    }

    pub fn effective_log_level(&self) -> LogLevel {
        self.log_level
            .or_else(|| LogLevel::from_str_ignore_case(&self.settings.daemon.log_level))
            .unwrap_or(LogLevel::Info)
    }
}

/// Re-read the settings file and swap it in. The live settings stay
/// untouched when the file fails to parse or validate.
pub fn reload_settings(path: &Path, service: &ConfigService) -> Result<Vec<ConfigChange>> {
    let new = Settings::load(path)?;
    Ok(service.replace(new)?)
}
