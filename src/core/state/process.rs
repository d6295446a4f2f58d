use super::AppId;
use crate::common::constants::{MAX_ADJ, NATIVE_ADJ};
use crate::common::types::AdjHandleActionType;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub i32);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the event layer knows about a freshly started process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: i32,
    pub uid: u32,
    pub user_id: u32,
    pub package_name: String,
    pub process_name: String,
    pub is_system_app: bool,
    pub is_webview_sandbox: bool,
    pub has_shown_ui: bool,
    /// Ceiling the host currently enforces for this process.
    pub max_adj: i32,
}

impl ProcessSnapshot {
    pub fn new(pid: i32, uid: u32, user_id: u32, package_name: &str) -> Self {
        Self {
            pid,
            uid,
            user_id,
            package_name: package_name.to_string(),
            process_name: package_name.to_string(),
            is_system_app: false,
            is_webview_sandbox: false,
            has_shown_ui: false,
            max_adj: MAX_ADJ,
        }
    }

    pub fn subprocess(mut self, suffix: &str) -> Self {
        self.process_name = format!("{}:{}", self.package_name, suffix);
        self
    }

    #[inline]
    pub fn is_main_process(&self) -> bool {
        self.process_name == self.package_name
    }
}

/// Cached resolution: the branch plus the high-priority bit it was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleTag {
    pub action: AdjHandleActionType,
    pub high_priority: bool,
}

const TAG_RESOLVED: u8 = 0x80;
const TAG_HIGH_PRIORITY: u8 = 0x08;
const TAG_ACTION_MASK: u8 = 0x07;

impl HandleTag {
    fn pack(self) -> u8 {
        let mut v = TAG_RESOLVED | self.action.as_u8();
        if self.high_priority {
            v |= TAG_HIGH_PRIORITY;
        }
        v
    }

    fn unpack(v: u8) -> Option<Self> {
        if v & TAG_RESOLVED == 0 {
            return None;
        }
        Some(Self {
            action: AdjHandleActionType::from_u8(v & TAG_ACTION_MASK),
            high_priority: v & TAG_HIGH_PRIORITY != 0,
        })
    }
}

const F_MAIN: u8 = 1 << 0;
const F_UPGRADED: u8 = 1 << 1;
const F_WEBVIEW_ACTIVE: u8 = 1 << 2;
const F_WAKE_LOCK: u8 = 1 << 3;
const F_CLIENT_ACTIVITY: u8 = 1 << 4;
const F_SHOWN_UI: u8 = 1 << 5;
const HIGH_PRIORITY_MASK: u8 = F_MAIN | F_UPGRADED | F_WEBVIEW_ACTIVE | F_WAKE_LOCK;

const NO_SCORE: i32 = i32::MIN;

#[derive(Debug)]
pub struct ProcessRecord {
    pub id: ProcessId,
    pub uid: u32,
    pub app: AppId,
    pub process_name: String,
    pub is_main_process: bool,
    pub is_webview_sandbox: bool,
    host_max_adj: i32,
    flags: AtomicU8,
    handle: AtomicU8,
    wake_locks: AtomicU32,
    last_raw: AtomicI32,
    applied: AtomicI32,
    fixed: AtomicBool,
    max_allowed: AtomicI32,
    ceiling_raised: AtomicBool,
}

impl ProcessRecord {
    pub(crate) fn new(snapshot: &ProcessSnapshot, app: AppId, is_main: bool) -> Self {
        let mut flags = 0;
        if is_main {
            flags |= F_MAIN;
        }
        if snapshot.has_shown_ui {
            flags |= F_SHOWN_UI;
        }
        let host_max_adj = snapshot.max_adj.clamp(NATIVE_ADJ, MAX_ADJ);
        Self {
            id: ProcessId(snapshot.pid),
            uid: snapshot.uid,
            app,
            process_name: snapshot.process_name.clone(),
            is_main_process: is_main,
            is_webview_sandbox: snapshot.is_webview_sandbox,
            host_max_adj,
            flags: AtomicU8::new(flags),
            handle: AtomicU8::new(0),
            wake_locks: AtomicU32::new(0),
            last_raw: AtomicI32::new(NO_SCORE),
            applied: AtomicI32::new(NO_SCORE),
            fixed: AtomicBool::new(false),
            max_allowed: AtomicI32::new(host_max_adj),
            ceiling_raised: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn pid(&self) -> i32 {
        self.id.0
    }

    #[inline]
    fn has_flag(&self, f: u8) -> bool {
        self.flags.load(Ordering::Acquire) & f != 0
    }

    fn set_flag(&self, f: u8, on: bool) {
        if on {
            self.flags.fetch_or(f, Ordering::SeqCst);
        } else {
            self.flags.fetch_and(!f, Ordering::SeqCst);
        }
    }

    /// Live derivation from the underlying flags.
    #[inline]
    pub fn is_high_priority(&self) -> bool {
        self.flags.load(Ordering::SeqCst) & HIGH_PRIORITY_MASK != 0
    }

    #[inline]
    pub fn has_shown_ui(&self) -> bool {
        self.has_flag(F_SHOWN_UI)
    }

    pub(crate) fn mark_ui_shown(&self) -> bool {
        self.flags.fetch_or(F_SHOWN_UI, Ordering::AcqRel) & F_SHOWN_UI == 0
    }

    pub fn is_upgraded(&self) -> bool {
        self.has_flag(F_UPGRADED)
    }

    pub(crate) fn set_upgraded(&self, on: bool) {
        self.set_flag(F_UPGRADED, on);
    }

    pub fn has_client_activity(&self) -> bool {
        self.has_flag(F_CLIENT_ACTIVITY)
    }

    pub(crate) fn set_client_activity(&self, on: bool) {
        self.set_flag(F_CLIENT_ACTIVITY, on);
    }

    /// Recompute the webview bit; only sandboxes with a live client count.
    pub(crate) fn refresh_webview(&self, protection: bool) {
        let active = protection && self.is_webview_sandbox && self.has_client_activity();
        self.set_flag(F_WEBVIEW_ACTIVE, active);
    }

    #[inline]
    pub fn wake_lock_count(&self) -> u32 {
        self.wake_locks.load(Ordering::Acquire)
    }

    /// Returns the new count.
    pub(crate) fn acquire_wake_lock(&self) -> u32 {
        let n = self.wake_locks.fetch_add(1, Ordering::AcqRel) + 1;
        if n == 1 {
            self.set_flag(F_WAKE_LOCK, true);
            self.flip_cached_priority();
        }
        n
    }

    /// Returns the new count, or `None` if no wake lock was held.
    pub(crate) fn release_wake_lock(&self) -> Option<u32> {
        let prev = self
            .wake_locks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .ok()?;
        if prev == 1 {
            self.set_flag(F_WAKE_LOCK, false);
            self.flip_cached_priority();
        }
        Some(prev - 1)
    }

    /// Bring the cached high-priority bit in line with the live flags.
    /// Unresolved tags are left alone.
    fn flip_cached_priority(&self) {
        let _ = self
            .handle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                if v & TAG_RESOLVED == 0 {
                    return None;
                }
                let next = if self.is_high_priority() {
                    v | TAG_HIGH_PRIORITY
                } else {
                    v & !TAG_HIGH_PRIORITY
                };
                (next != v).then_some(next)
            });
    }

    #[inline]
    pub fn cached_handle(&self) -> Option<HandleTag> {
        HandleTag::unpack(self.handle.load(Ordering::SeqCst))
    }

    /// Cache `tag` and return what ended up cached. A wake lock or upgrade
    /// that changed after `tag` was computed still lands in the stored bit.
    pub(crate) fn store_handle(&self, tag: HandleTag) -> HandleTag {
        self.handle.store(tag.pack(), Ordering::SeqCst);
        self.flip_cached_priority();
        self.cached_handle().unwrap_or(tag)
    }

    pub(crate) fn invalidate_handle(&self) {
        self.handle.store(0, Ordering::SeqCst);
    }

    pub fn last_raw_adj(&self) -> Option<i32> {
        score(self.last_raw.load(Ordering::Acquire))
    }

    pub(crate) fn set_last_raw_adj(&self, raw: i32) {
        self.last_raw.store(raw, Ordering::Release);
    }

    pub fn applied_adj(&self) -> Option<i32> {
        score(self.applied.load(Ordering::Acquire))
    }

    pub(crate) fn set_applied_adj(&self, adj: i32) {
        self.applied.store(adj, Ordering::Release);
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.fixed.load(Ordering::Acquire)
    }

    /// True on the first call only.
    pub(crate) fn mark_fixed(&self) -> bool {
        !self.fixed.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn max_allowed_adj(&self) -> i32 {
        self.max_allowed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_ceiling_raised(&self) -> bool {
        self.ceiling_raised.load(Ordering::Acquire)
    }

    /// Lift the ceiling to `ceiling` unless already done. True if it changed.
    pub(crate) fn raise_ceiling(&self, ceiling: i32) -> bool {
        if self.ceiling_raised.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.max_allowed
            .store(ceiling.clamp(NATIVE_ADJ, MAX_ADJ), Ordering::Release);
        true
    }

    /// Drop back to the ceiling the host reported. True if it changed.
    pub(crate) fn reset_ceiling(&self) -> bool {
        if !self.ceiling_raised.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.max_allowed.store(self.host_max_adj, Ordering::Release);
        true
    }

    /// Every value that reaches the output channel goes through here.
    #[inline]
    pub fn clamp_adj(&self, adj: i32) -> i32 {
        adj.clamp(NATIVE_ADJ, self.max_allowed_adj().max(NATIVE_ADJ))
    }
}

#[inline]
fn score(v: i32) -> Option<i32> {
    (v != NO_SCORE).then_some(v)
}
