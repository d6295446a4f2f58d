use super::process::ProcessId;
use crate::common::types::AppGroup;
use crate::core::config::AppOverride;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(pub u64);

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "app#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSnapshot {
    pub uid: u32,
    pub user_id: u32,
    pub package_name: String,
    pub is_system_app: bool,
}

#[derive(Debug)]
pub struct AppRecord {
    pub id: AppId,
    pub uid: u32,
    pub user_id: u32,
    pub package_name: String,
    pub is_system_app: bool,
    /// Main processes that never showed UI are scored leniently only when this holds.
    pub ui_gated: bool,
    group: AtomicU8,
    main_process: Mutex<Option<ProcessId>>,
    processes: Mutex<BTreeSet<ProcessId>>,
    custom: RwLock<Option<AppOverride>>,
    lock: Mutex<()>,
}

impl AppRecord {
    pub(crate) fn new(id: AppId, snap: &AppSnapshot, custom: Option<AppOverride>) -> Self {
        Self {
            id,
            uid: snap.uid,
            user_id: snap.user_id,
            package_name: snap.package_name.clone(),
            is_system_app: snap.is_system_app,
            ui_gated: !snap.is_system_app,
            group: AtomicU8::new(AppGroup::None.as_u8()),
            main_process: Mutex::new(None),
            processes: Mutex::new(BTreeSet::new()),
            custom: RwLock::new(custom),
            lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn group(&self) -> AppGroup {
        AppGroup::from_u8(self.group.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.group() == AppGroup::Dead
    }

    /// Returns the previous group when something changed. `Dead` is terminal.
    pub(crate) fn set_group(&self, new: AppGroup) -> Option<AppGroup> {
        self.group
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                let cur_group = AppGroup::from_u8(cur);
                if cur_group == new || cur_group == AppGroup::Dead {
                    None
                } else {
                    Some(new.as_u8())
                }
            })
            .ok()
            .map(AppGroup::from_u8)
    }

    pub fn main_process(&self) -> Option<ProcessId> {
        *self.main_process.lock()
    }

    pub(crate) fn attach(&self, pid: ProcessId, is_main: bool) {
        self.processes.lock().insert(pid);
        if is_main {
            *self.main_process.lock() = Some(pid);
        }
    }

    /// Returns true when the app has no processes left.
    pub(crate) fn detach(&self, pid: ProcessId) -> bool {
        {
            let mut main = self.main_process.lock();
            if *main == Some(pid) {
                *main = None;
            }
        }
        let mut procs = self.processes.lock();
        procs.remove(&pid);
        procs.is_empty()
    }

    pub fn processes(&self) -> Vec<ProcessId> {
        self.processes.lock().iter().copied().collect()
    }

    pub fn custom_policy(&self) -> Option<AppOverride> {
        *self.custom.read()
    }

    pub(crate) fn set_custom_policy(&self, custom: Option<AppOverride>) {
        *self.custom.write() = custom;
    }

    /// Serializes every mutation that belongs to this app.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> AppRecord {
        AppRecord::new(
            AppId(7),
            &AppSnapshot {
                uid: 10123,
                user_id: 0,
                package_name: "com.example".into(),
                is_system_app: false,
            },
            None,
        )
    }

    #[test]
    fn test_group_transition_is_idempotent() {
        let a = app();
        assert_eq!(a.group(), AppGroup::None);
        assert_eq!(a.set_group(AppGroup::Active), Some(AppGroup::None));
        assert_eq!(a.set_group(AppGroup::Active), None);
        assert_eq!(a.set_group(AppGroup::Idle), Some(AppGroup::Active));
    }

    #[test]
    fn test_dead_is_terminal() {
        let a = app();
        a.set_group(AppGroup::Dead);
        assert_eq!(a.set_group(AppGroup::Active), None);
        assert!(a.is_dead());
    }

    #[test]
    fn test_attach_detach_tracks_main() {
        let a = app();
        a.attach(ProcessId(100), true);
        a.attach(ProcessId(101), false);
        assert_eq!(a.main_process(), Some(ProcessId(100)));
        assert!(!a.detach(ProcessId(100)));
        assert_eq!(a.main_process(), None);
        assert!(a.detach(ProcessId(101)));
    }
}
