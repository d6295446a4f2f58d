pub const SOCKET_PATH: &str = "/dev/socket/adjwarden.sock";
pub const CONFIG_DIR: &str = "/data/adb/.config/adjwarden";
pub const SETTINGS_FILE: &str = "/data/adb/.config/adjwarden/settings.toml";
pub const PROC_ROOT: &str = "/proc";

/// Lowest value the kernel accepts in `oom_score_adj`.
pub const NATIVE_ADJ: i32 = -1000;
/// Highest value the kernel accepts in `oom_score_adj`; default ceiling.
pub const MAX_ADJ: i32 = 1000;
/// Highest raw value the host reports (an adj it has not computed yet).
pub const UNKNOWN_ADJ: i32 = 1001;

pub const FOREGROUND_APP_ADJ: i32 = 0;
pub const VISIBLE_APP_ADJ: i32 = 100;

pub const DEFAULT_DEBOUNCE_MS: u64 = 3000;
pub const DEFAULT_EVENT_QUEUE: usize = 64;

#[inline]
pub fn is_legal_adj(adj: i32) -> bool {
    (NATIVE_ADJ..=MAX_ADJ).contains(&adj)
}

/// Uids below this (per user) belong to the platform itself.
pub const FIRST_APPLICATION_UID: u32 = 10_000;
