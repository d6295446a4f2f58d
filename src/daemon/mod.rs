pub mod config;
pub mod ipc;
pub mod manager;
pub mod run;
pub mod watcher;

pub use manager::{Decision, ManagerStatus, OomAdjustManager};
