use serde::{Deserialize, Serialize};

/// Lifecycle classification of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppGroup {
    None,
    Active,
    Idle,
    Tmp,
    Dead,
}

impl AppGroup {
    pub fn from_str_ignore_case(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "active" => Some(Self::Active),
            "idle" => Some(Self::Idle),
            "tmp" => Some(Self::Tmp),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }

    pub fn to_upper_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Active => "ACTIVE",
            Self::Idle => "IDLE",
            Self::Tmp => "TMP",
            Self::Dead => "DEAD",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Active => 1,
            Self::Idle => 2,
            Self::Tmp => 3,
            Self::Dead => 4,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Active,
            2 => Self::Idle,
            3 => Self::Tmp,
            4 => Self::Dead,
            _ => Self::None,
        }
    }

    /// Groups the default policy handles without a global override.
    #[inline]
    pub fn is_handled_by_default(&self) -> bool {
        matches!(self, Self::None | Self::Active | Self::Idle)
    }
}

impl std::fmt::Display for AppGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_upper_str())
    }
}

/// Which resolution branch a process takes when a raw adj arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjHandleActionType {
    DoNothing,
    CustomMainProcess,
    CustomSubprocess,
    GlobalOomAdj,
    Other,
}

impl AdjHandleActionType {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::DoNothing => 0,
            Self::CustomMainProcess => 1,
            Self::CustomSubprocess => 2,
            Self::GlobalOomAdj => 3,
            Self::Other => 4,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::DoNothing,
            1 => Self::CustomMainProcess,
            2 => Self::CustomSubprocess,
            3 => Self::GlobalOomAdj,
            _ => Self::Other,
        }
    }
}

/// Process coverage of the global override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalScope {
    /// Main processes of non-system apps.
    #[default]
    MainProcess,
    /// Every main process, system apps included.
    MainProcessAny,
    /// Main and high-priority subprocesses of non-system apps.
    MainAndSubProcess,
    All,
}

/// Ordering of pending scheduler work; also reported as the escalation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

impl TaskPriority {
    pub fn escalation_level(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn from_str_ignore_case(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter())
    }
}
