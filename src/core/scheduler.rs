//! Per-process debounce queue.
//!
//! A process may see dozens of raw adj requests per second while its UI
//! transitions. Each request lands here as a delayed action; a newer request
//! of equal or higher priority replaces the one still waiting, a lower one is
//! dropped. At most one action per process is ever waiting.

use crate::common::types::TaskPriority;
use crate::core::state::ProcessId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub type TaskAction = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Scheduled,
    Replaced,
    Dropped,
}

struct PendingTask {
    priority: TaskPriority,
    seq: u64,
    state: Arc<AtomicU8>,
    handle: JoinHandle<()>,
}

impl PendingTask {
    #[inline]
    fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    fn cancel(&self) -> bool {
        let ok = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            self.handle.abort();
        }
        ok
    }
}

type TaskMap = Arc<Mutex<HashMap<ProcessId, PendingTask>>>;

pub struct DebounceScheduler {
    runtime: Handle,
    delay_ms: AtomicU64,
    seq: AtomicU64,
    tasks: TaskMap,
}

impl DebounceScheduler {
    pub fn new(runtime: Handle, delay: Duration) -> Self {
        Self {
            runtime,
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
            seq: AtomicU64::new(0),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn add_task(&self, id: ProcessId, priority: TaskPriority, action: TaskAction) -> Submission {
        let mut tasks = self.tasks.lock();

        let mut outcome = Submission::Scheduled;
        if let Some(existing) = tasks.get(&id)
            && existing.is_pending()
        {
            if priority < existing.priority {
                debug!(target: "adjwarden::scheduler", "PID {} keeps pending {:?} task, dropping {:?}", id, existing.priority, priority);
                return Submission::Dropped;
            }
            if existing.cancel() {
                outcome = Submission::Replaced;
            }
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(AtomicU8::new(PENDING));
        let handle = self.runtime.spawn(run_task(
            self.tasks.clone(),
            id,
            seq,
            state.clone(),
            self.delay(),
            action,
        ));

        tasks.insert(
            id,
            PendingTask {
                priority,
                seq,
                state,
                handle,
            },
        );
        outcome
    }

    /// Cancel whatever is waiting for `id`. Returns false if nothing was pending.
    pub fn cancel(&self, id: ProcessId) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.get(&id) {
            Some(t) if t.cancel() => {
                tasks.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn pending_priority(&self, id: ProcessId) -> Option<TaskPriority> {
        self.tasks
            .lock()
            .get(&id)
            .filter(|t| t.is_pending())
            .map(|t| t.priority)
    }

    pub fn pending_len(&self) -> usize {
        self.tasks.lock().values().filter(|t| t.is_pending()).count()
    }
}

async fn run_task(
    tasks: TaskMap,
    id: ProcessId,
    seq: u64,
    state: Arc<AtomicU8>,
    delay: Duration,
    action: TaskAction,
) {
    tokio::time::sleep(delay).await;

    if state
        .compare_exchange(PENDING, STARTED, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    match std::panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(target: "adjwarden::scheduler", "Task for PID {} failed: {:#}", id, e),
        Err(_) => error!(target: "adjwarden::scheduler", "Task for PID {} panicked", id),
    }

    let mut tasks = tasks.lock();
    if tasks.get(&id).is_some_and(|t| t.seq == seq) {
        tasks.remove(&id);
    }
}
