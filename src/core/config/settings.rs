use crate::common::constants::{DEFAULT_DEBOUNCE_MS, DEFAULT_EVENT_QUEUE, is_legal_adj};
use crate::common::types::GlobalScope;
use crate::core::policy::PolicyKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub policy: PolicyKind,
    pub webview_protection: bool,
    pub upgraded_subprocesses: BTreeSet<String>,
    pub important_system_apps: BTreeSet<String>,
    pub daemon: DaemonSettings,
    pub scoring: ScoringParams,
    pub global: GlobalOverride,
    pub apps: HashMap<String, AppOverride>,
    pub subprocesses: HashMap<String, i32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub log_level: String,
    pub orchestrator_threads: usize,
    pub scheduler_threads: usize,
    pub debounce_ms: u64,
    pub event_queue: usize,
}

/// Numeric knobs shared by every policy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringParams {
    pub conversion_factor: i32,
    pub min_background_adj: i32,
    pub max_background_adj: i32,
    pub subprocess_offset: i32,
    pub min_subprocess_adj: i32,
    pub negative_adj: i32,
    pub simple_lmk_low_threshold: i32,
    pub simple_lmk_high_threshold: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalOverride {
    pub enabled: bool,
    pub adj: i32,
    pub scope: GlobalScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct AppOverride {
    #[serde(default)]
    pub foreground: Option<i32>,
    #[serde(default)]
    pub background: Option<i32>,
}

impl AppOverride {
    #[inline]
    pub fn is_configured(&self) -> bool {
        self.foreground.is_some() || self.background.is_some()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("override for {target} is {value}, outside the legal adj range")]
    IllegalAdj { target: String, value: i32 },
    #[error("conversion_factor must be positive, got {0}")]
    ConversionFactor(i32),
    #[error("background range is inverted ({min} > {max})")]
    BackgroundRange { min: i32, max: i32 },
    #[error("simple_lmk thresholds are inverted ({low} > {high})")]
    Thresholds { low: i32, high: i32 },
    #[error("{0} must be at least 1")]
    ZeroSize(&'static str),
}

/// What changed between two accepted configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigChange {
    PolicyMode,
    Scoring,
    GlobalOverride,
    AppOverrides,
    SubprocessOverrides,
    UpgradedSubprocesses,
    WebviewProtection,
    ImportantApps,
    Daemon,
}

impl ConfigChange {
    /// Changes that invalidate the cached resolution on processes.
    pub fn invalidates_resolution(&self) -> bool {
        !matches!(self, Self::Daemon | Self::Scoring)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            webview_protection: true,
            upgraded_subprocesses: BTreeSet::new(),
            // only packages running under an application uid; platform
            // uids are never scored
            important_system_apps: ["com.android.systemui", "com.google.android.gms"]
                .into_iter()
                .map(String::from)
                .collect(),
            daemon: DaemonSettings::default(),
            scoring: ScoringParams::default(),
            global: GlobalOverride::default(),
            apps: HashMap::new(),
            subprocesses: HashMap::new(),
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            orchestrator_threads: 2,
            scheduler_threads: 2,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            event_queue: DEFAULT_EVENT_QUEUE,
        }
    }
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            conversion_factor: 100,
            min_background_adj: 1,
            max_background_adj: 10,
            subprocess_offset: 1,
            min_subprocess_adj: 201,
            negative_adj: -100,
            simple_lmk_low_threshold: 200,
            simple_lmk_high_threshold: 700,
        }
    }
}

impl Settings {
    /// Load settings from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(target: "adjwarden::config", "Settings file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let settings: Self = toml::from_str(&content).context("Failed to parse settings.toml")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects anything the resolver must never see.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let s = &self.scoring;
        if s.conversion_factor <= 0 {
            return Err(ConfigError::ConversionFactor(s.conversion_factor));
        }
        if s.min_background_adj > s.max_background_adj {
            return Err(ConfigError::BackgroundRange {
                min: s.min_background_adj,
                max: s.max_background_adj,
            });
        }
        if s.simple_lmk_low_threshold > s.simple_lmk_high_threshold {
            return Err(ConfigError::Thresholds {
                low: s.simple_lmk_low_threshold,
                high: s.simple_lmk_high_threshold,
            });
        }
        for (name, value) in [
            ("scoring.min_background_adj", s.min_background_adj),
            ("scoring.max_background_adj", s.max_background_adj),
            ("scoring.min_subprocess_adj", s.min_subprocess_adj),
            ("scoring.negative_adj", s.negative_adj),
        ] {
            check_adj(name, value)?;
        }

        if self.global.enabled {
            check_adj("global", self.global.adj)?;
        }
        for (pkg, ov) in &self.apps {
            if let Some(v) = ov.foreground {
                check_adj(&format!("{pkg} (foreground)"), v)?;
            }
            if let Some(v) = ov.background {
                check_adj(&format!("{pkg} (background)"), v)?;
            }
        }
        for (name, v) in &self.subprocesses {
            check_adj(name, *v)?;
        }

        let d = &self.daemon;
        if d.orchestrator_threads == 0 {
            return Err(ConfigError::ZeroSize("daemon.orchestrator_threads"));
        }
        if d.scheduler_threads == 0 {
            return Err(ConfigError::ZeroSize("daemon.scheduler_threads"));
        }
        if d.event_queue == 0 {
            return Err(ConfigError::ZeroSize("daemon.event_queue"));
        }
        Ok(())
    }

    pub fn diff(&self, new: &Settings) -> Vec<ConfigChange> {
        let mut out = Vec::new();
        if self.policy != new.policy {
            out.push(ConfigChange::PolicyMode);
        }
        if self.scoring != new.scoring {
            out.push(ConfigChange::Scoring);
        }
        if self.global != new.global {
            out.push(ConfigChange::GlobalOverride);
        }
        if self.apps != new.apps {
            out.push(ConfigChange::AppOverrides);
        }
        if self.subprocesses != new.subprocesses {
            out.push(ConfigChange::SubprocessOverrides);
        }
        if self.upgraded_subprocesses != new.upgraded_subprocesses {
            out.push(ConfigChange::UpgradedSubprocesses);
        }
        if self.webview_protection != new.webview_protection {
            out.push(ConfigChange::WebviewProtection);
        }
        if self.important_system_apps != new.important_system_apps {
            out.push(ConfigChange::ImportantApps);
        }
        if self.daemon != new.daemon {
            out.push(ConfigChange::Daemon);
        }
        out
    }

    #[inline]
    pub fn app_override(&self, package: &str) -> Option<&AppOverride> {
        self.apps.get(package).filter(|o| o.is_configured())
    }
}

fn check_adj(target: &str, value: i32) -> std::result::Result<(), ConfigError> {
    if is_legal_adj(value) {
        Ok(())
    } else {
        Err(ConfigError::IllegalAdj {
            target: target.to_string(),
            value,
        })
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
