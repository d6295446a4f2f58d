//! Picks the resolution branch for a process.
//!
//! Precedence: per-app / per-subprocess override, then the global override,
//! then default scoring. The answer is cached on the process and only thrown
//! away when configuration or priority inputs change.

use crate::common::constants::FIRST_APPLICATION_UID;
use crate::common::types::{AdjHandleActionType, GlobalScope};
use crate::core::config::Settings;
use crate::core::state::{AppRecord, HandleTag, ProcessRecord};

pub fn scope_covers(scope: GlobalScope, app: &AppRecord, process: &ProcessRecord, high_priority: bool) -> bool {
    match scope {
        GlobalScope::MainProcess => process.is_main_process && !app.is_system_app,
        GlobalScope::MainProcessAny => process.is_main_process,
        GlobalScope::MainAndSubProcess => {
            (process.is_main_process || high_priority) && !app.is_system_app
        }
        GlobalScope::All => true,
    }
}

#[inline]
fn is_core_system_uid(uid: u32) -> bool {
    uid % 100_000 < FIRST_APPLICATION_UID
}

pub fn resolve(settings: &Settings, app: &AppRecord, process: &ProcessRecord) -> HandleTag {
    let high_priority = process.is_high_priority();
    let global = &settings.global;

    let action = if process.is_main_process && app.custom_policy().is_some() {
        AdjHandleActionType::CustomMainProcess
    } else if !process.is_main_process && settings.subprocesses.contains_key(&process.process_name) {
        AdjHandleActionType::CustomSubprocess
    } else if global.enabled && scope_covers(global.scope, app, process, high_priority) {
        AdjHandleActionType::GlobalOomAdj
    } else if is_core_system_uid(process.uid) {
        AdjHandleActionType::DoNothing
    } else {
        AdjHandleActionType::Other
    };

    HandleTag {
        action,
        high_priority,
    }
}

/// Cached resolution, computed on first use.
pub fn resolve_cached(settings: &Settings, app: &AppRecord, process: &ProcessRecord) -> HandleTag {
    if let Some(tag) = process.cached_handle() {
        return tag;
    }
    process.store_handle(resolve(settings, app, process))
}
