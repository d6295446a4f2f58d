use crate::common::constants::PROC_ROOT;
use anyhow::{Context, Result};
use std::cell::RefCell;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;
use tracing::debug;

/// Kernel-facing output channel for final scores.
///
/// Called from scheduler worker threads; implementations must be `Send + Sync`.
pub trait ScoreSink: Send + Sync {
    fn apply_score(&self, pid: i32, uid: u32, adj: i32) -> Result<()>;
}

thread_local! {
    static PATH_BUF: RefCell<String> = RefCell::new(String::with_capacity(48));
    static VALUE_BUF: RefCell<Vec<u8>> = RefCell::new(Vec::with_capacity(8));
}

/// Writes `/proc/<pid>/oom_score_adj`.
pub struct ProcfsScoreSink {
    root: PathBuf,
}

impl ProcfsScoreSink {
    pub fn new() -> Self {
        Self::with_root(PROC_ROOT)
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcfsScoreSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreSink for ProcfsScoreSink {
    fn apply_score(&self, pid: i32, _uid: u32, adj: i32) -> Result<()> {
        PATH_BUF.with(|path| {
            VALUE_BUF.with(|value| {
                let mut path = path.borrow_mut();
                let mut value = value.borrow_mut();
                path.clear();
                value.clear();

                let _ = write!(path, "{}/{}/oom_score_adj", self.root.display(), pid);
                let _ = write!(value, "{}", adj);

                let mut file = std::fs::OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .open(path.as_str())
                    .with_context(|| format!("Failed to open {}", path))?;
                file.write_all(&value)
                    .with_context(|| format!("Failed to write {} to {}", adj, path))?;

                debug!(target: "adjwarden::sink", "PID {} oom_score_adj={}", pid, adj);
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_value_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("4242")).unwrap();
        let target = dir.path().join("4242/oom_score_adj");
        std::fs::write(&target, "0").unwrap();

        let sink = ProcfsScoreSink::with_root(dir.path());
        sink.apply_score(4242, 10100, 905).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "905");

        sink.apply_score(4242, 10100, -17).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "-17");
    }

    #[test]
    fn test_missing_process_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ProcfsScoreSink::with_root(dir.path());
        assert!(sink.apply_score(1, 0, 0).is_err());
    }
}
