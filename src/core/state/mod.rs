//! Authoritative registry of applications and their processes.
//!
//! Records refer to each other through [`AppId`] / [`ProcessId`] handles and are
//! looked up through the owning maps here, so removal never has to untangle
//! back-pointers.

pub mod app;
pub mod process;

pub use app::{AppId, AppRecord, AppSnapshot};
pub use process::{HandleTag, ProcessId, ProcessRecord, ProcessSnapshot};

use crate::common::types::AppGroup;
use crate::core::config::Settings;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Registry {
    apps: HashMap<AppId, Arc<AppRecord>>,
    by_uid: HashMap<u32, AppId>,
    processes: HashMap<ProcessId, Arc<ProcessRecord>>,
}

pub struct Registered {
    pub process: Arc<ProcessRecord>,
    pub app: Arc<AppRecord>,
    /// Set when the uid's previous record was dead and got replaced.
    pub retired_app: Option<Arc<AppRecord>>,
}

pub struct Removed {
    pub process: Arc<ProcessRecord>,
    pub app: Option<Arc<AppRecord>>,
    /// The app lost its last process and was dropped from the registry.
    pub app_removed: bool,
}

#[derive(Default)]
pub struct StateModel {
    inner: RwLock<Registry>,
    next_app: AtomicU64,
}

impl StateModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_process(&self, snap: &ProcessSnapshot, settings: &Settings) -> Registered {
        let pid = ProcessId(snap.pid);
        let mut reg = self.inner.write();

        if let Some(stale) = reg.processes.remove(&pid) {
            debug!(target: "adjwarden::state", "PID {} reused, dropping stale {}", pid, stale.process_name);
            detach_locked(&mut reg, &stale);
        }

        let mut retired_app = None;
        let existing = reg
            .by_uid
            .get(&snap.uid)
            .and_then(|id| reg.apps.get(id))
            .cloned();
        let app = match existing {
            Some(app) if !app.is_dead() => app,
            other => {
                if let Some(dead) = other {
                    reg.apps.remove(&dead.id);
                    retired_app = Some(dead);
                }
                let id = AppId(self.next_app.fetch_add(1, Ordering::Relaxed) + 1);
                let app_snap = AppSnapshot {
                    uid: snap.uid,
                    user_id: snap.user_id,
                    package_name: snap.package_name.clone(),
                    is_system_app: snap.is_system_app,
                };
                let custom = settings.app_override(&snap.package_name).copied();
                let app = Arc::new(AppRecord::new(id, &app_snap, custom));
                reg.apps.insert(id, app.clone());
                reg.by_uid.insert(snap.uid, id);
                info!(target: "adjwarden::state", "App {} registered as {} (uid={})", snap.package_name, id, snap.uid);
                app
            }
        };

        let mut is_main = snap.is_main_process();
        if is_main
            && let Some(current) = app.main_process()
            && current != pid
            && reg.processes.contains_key(&current)
        {
            warn!(target: "adjwarden::state", "{} already has main PID {}, treating PID {} as subprocess", app.package_name, current, pid);
            is_main = false;
        }

        let process = Arc::new(ProcessRecord::new(snap, app.id, is_main));
        if !is_main {
            process.set_upgraded(settings.upgraded_subprocesses.contains(&process.process_name));
        }
        process.refresh_webview(settings.webview_protection);

        app.attach(pid, is_main);
        reg.processes.insert(pid, process.clone());
        debug!(target: "adjwarden::state", "Process {} PID={} main={} registered", process.process_name, pid, is_main);

        Registered {
            process,
            app,
            retired_app,
        }
    }

    pub fn remove_process(&self, pid: i32) -> Option<Removed> {
        let mut reg = self.inner.write();
        let Some(process) = reg.processes.remove(&ProcessId(pid)) else {
            debug!(target: "adjwarden::state", "Remove for unknown PID {}", pid);
            return None;
        };
        let (app, app_removed) = detach_locked(&mut reg, &process);
        debug!(target: "adjwarden::state", "Process {} PID={} removed", process.process_name, pid);
        Some(Removed {
            process,
            app,
            app_removed,
        })
    }

    #[inline]
    pub fn process(&self, pid: i32) -> Option<Arc<ProcessRecord>> {
        self.inner.read().processes.get(&ProcessId(pid)).cloned()
    }

    #[inline]
    pub fn app(&self, id: AppId) -> Option<Arc<AppRecord>> {
        self.inner.read().apps.get(&id).cloned()
    }

    pub fn app_by_uid(&self, uid: u32) -> Option<Arc<AppRecord>> {
        let reg = self.inner.read();
        reg.by_uid.get(&uid).and_then(|id| reg.apps.get(id)).cloned()
    }

    pub fn processes_of(&self, app: &AppRecord) -> Vec<Arc<ProcessRecord>> {
        let reg = self.inner.read();
        app.processes()
            .iter()
            .filter_map(|pid| reg.processes.get(pid).cloned())
            .collect()
    }

    /// `(apps, processes)`
    pub fn counts(&self) -> (usize, usize) {
        let reg = self.inner.read();
        (reg.apps.len(), reg.processes.len())
    }

    /// Idempotent: moving to the current group changes nothing and returns `None`.
    pub fn transition_group(&self, app: &AppRecord, group: AppGroup) -> Option<AppGroup> {
        let prev = app.set_group(group)?;
        info!(target: "adjwarden::state", "{} group {} -> {}", app.package_name, prev, group);
        Some(prev)
    }

    pub fn increment_wake_lock(&self, pid: i32) -> Option<u32> {
        let Some(process) = self.process(pid) else {
            debug!(target: "adjwarden::state", "Wake lock acquire for unknown PID {}", pid);
            return None;
        };
        let n = process.acquire_wake_lock();
        debug!(target: "adjwarden::state", "{} wake locks={}", process.process_name, n);
        Some(n)
    }

    pub fn decrement_wake_lock(&self, pid: i32) -> Option<u32> {
        let Some(process) = self.process(pid) else {
            debug!(target: "adjwarden::state", "Wake lock release for unknown PID {}", pid);
            return None;
        };
        match process.release_wake_lock() {
            Some(n) => {
                debug!(target: "adjwarden::state", "{} wake locks={}", process.process_name, n);
                Some(n)
            }
            None => {
                debug!(target: "adjwarden::state", "{} released a wake lock it never held", process.process_name);
                None
            }
        }
    }

    /// Re-derive every configuration-dependent flag on the live records.
    pub fn refresh_from_settings(&self, settings: &Settings) {
        let reg = self.inner.read();
        for app in reg.apps.values() {
            app.set_custom_policy(settings.app_override(&app.package_name).copied());
        }
        for p in reg.processes.values() {
            if !p.is_main_process {
                p.set_upgraded(settings.upgraded_subprocesses.contains(&p.process_name));
            }
            p.refresh_webview(settings.webview_protection);
            p.invalidate_handle();
        }
    }
}

fn detach_locked(reg: &mut Registry, process: &ProcessRecord) -> (Option<Arc<AppRecord>>, bool) {
    let Some(app) = reg.apps.get(&process.app).cloned() else {
        return (None, false);
    };
    let empty = app.detach(process.id);
    if empty {
        reg.apps.remove(&app.id);
        if reg.by_uid.get(&app.uid) == Some(&app.id) {
            reg.by_uid.remove(&app.uid);
        }
    }
    (Some(app), empty)
}
