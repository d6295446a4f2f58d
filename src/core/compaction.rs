use crate::core::state::ProcessId;
use tracing::debug;

/// What the compaction side gets told after a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionRequest {
    pub pid: ProcessId,
    pub uid: u32,
    pub process_name: String,
    pub previous_adj: Option<i32>,
    /// Value before the clamp.
    pub target_adj: i32,
    pub escalation_level: u8,
}

/// Memory trim / compaction collaborator.
pub trait CompactionListener: Send + Sync {
    fn notify_compaction(&self, request: &CompactionRequest);
}

/// Default listener: records the request and leaves trimming to the host.
#[derive(Debug, Default)]
pub struct LogCompaction;

impl CompactionListener for LogCompaction {
    fn notify_compaction(&self, r: &CompactionRequest) {
        debug!(
            target: "adjwarden::compaction",
            "{} PID={} adj {:?} -> {} (level {})",
            r.process_name, r.pid, r.previous_adj, r.target_adj, r.escalation_level
        );
    }
}
