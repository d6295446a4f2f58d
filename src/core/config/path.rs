use std::path::PathBuf;

pub use crate::common::constants::{CONFIG_DIR, SETTINGS_FILE};

pub fn settings_path() -> PathBuf {
    PathBuf::from(SETTINGS_FILE)
}
