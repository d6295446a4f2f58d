//! Ties raw host events to applied scores.
//!
//! Adj requests are accepted synchronously (so the host learns at once whether
//! to suppress its own handling) and then handed to a per-app worker through a
//! bounded channel. Each app has its own worker and lock, so events for one app
//! are strictly ordered while different apps proceed in parallel.

use crate::common::constants::{NATIVE_ADJ, UNKNOWN_ADJ, VISIBLE_APP_ADJ};
use crate::common::types::{AdjHandleActionType, AppGroup, TaskPriority};
use crate::core::compaction::{CompactionListener, CompactionRequest};
use crate::core::config::{ConfigChange, ConfigService, Settings};
use crate::core::policy::{Classification, ScoringEngine};
use crate::core::resolver::{resolve_cached, scope_covers};
use crate::core::scheduler::{DebounceScheduler, Submission};
use crate::core::sink::ScoreSink;
use crate::core::state::{AppId, AppRecord, HandleTag, ProcessRecord, ProcessSnapshot, StateModel};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AdjRequest {
    pid: i32,
    raw: i32,
    /// Set for internally generated re-evaluations.
    priority: Option<TaskPriority>,
}

/// Outcome of one scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: AdjHandleActionType,
    pub high_priority: bool,
    /// Value before the clamp.
    pub target: i32,
    pub priority: TaskPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStatus {
    pub apps: usize,
    pub processes: usize,
    pub pending_tasks: usize,
}

pub struct OomAdjustManager {
    config: Arc<ConfigService>,
    state: StateModel,
    scoring: ScoringEngine,
    scheduler: DebounceScheduler,
    sink: Arc<dyn ScoreSink>,
    compaction: Arc<dyn CompactionListener>,
    workers: Handle,
    mailboxes: Mutex<HashMap<AppId, mpsc::Sender<AdjRequest>>>,
}

impl OomAdjustManager {
    pub fn new(
        config: Arc<ConfigService>,
        sink: Arc<dyn ScoreSink>,
        compaction: Arc<dyn CompactionListener>,
        workers: Handle,
        scheduler: Handle,
    ) -> Arc<Self> {
        let delay = Duration::from_millis(config.current().daemon.debounce_ms);
        Arc::new(Self {
            config,
            state: StateModel::new(),
            scoring: ScoringEngine::new(),
            scheduler: DebounceScheduler::new(scheduler, delay),
            sink,
            compaction,
            workers,
            mailboxes: Mutex::new(HashMap::new()),
        })
    }

    pub fn state(&self) -> &StateModel {
        &self.state
    }

    pub fn scheduler(&self) -> &DebounceScheduler {
        &self.scheduler
    }

    pub fn status(&self) -> ManagerStatus {
        let (apps, processes) = self.state.counts();
        ManagerStatus {
            apps,
            processes,
            pending_tasks: self.scheduler.pending_len(),
        }
    }

    pub fn on_process_started(&self, snap: &ProcessSnapshot) -> Arc<ProcessRecord> {
        let settings = self.config.current();
        let reg = self.state.register_process(snap, &settings);
        if let Some(old) = reg.retired_app {
            self.retire_app(&old);
        }
        reg.process
    }

    pub fn on_process_removed(&self, pid: i32) {
        let Some(removed) = self.state.remove_process(pid) else {
            return;
        };
        self.scheduler.cancel(removed.process.id);
        if removed.app_removed
            && let Some(app) = removed.app
        {
            self.mailboxes.lock().remove(&app.id);
            debug!(target: "adjwarden::manager", "{} has no processes left", app.package_name);
        }
    }

    /// Entry point for raw adj requests. Returns true when the host should
    /// skip its own handling of this request.
    pub fn on_adj_change_requested(self: &Arc<Self>, pid: i32, uid: u32, raw: i32) -> bool {
        if !(NATIVE_ADJ..=UNKNOWN_ADJ).contains(&raw) {
            debug!(target: "adjwarden::manager", "PID {} raw adj {} out of range, ignoring", pid, raw);
            return false;
        }
        let Some(process) = self.state.process(pid) else {
            return false;
        };
        if process.uid != uid {
            debug!(target: "adjwarden::manager", "PID {} uid mismatch ({} != {}), ignoring", pid, uid, process.uid);
            return false;
        }
        let Some(app) = self.state.app(process.app) else {
            return false;
        };
        let group = app.group();
        if group == AppGroup::Dead {
            return false;
        }

        let settings = self.config.current();
        if !settings.global.enabled && !group.is_handled_by_default() {
            return false;
        }
        if self.resolve(&settings, &app, &process).action == AdjHandleActionType::DoNothing {
            return false;
        }

        self.enqueue(
            &app,
            AdjRequest {
                pid,
                raw,
                priority: None,
            },
        )
    }

    pub fn on_group_changed(self: &Arc<Self>, app_id: AppId, group: AppGroup) {
        let Some(app) = self.state.app(app_id) else {
            debug!(target: "adjwarden::manager", "Group change for unknown {}", app_id);
            return;
        };
        let prev = {
            let _guard = app.lock();
            self.state.transition_group(&app, group)
        };
        if prev.is_none() {
            return;
        }

        match group {
            AppGroup::Dead => self.retire_app(&app),
            AppGroup::Active => self.mark_main_visible(&app),
            AppGroup::Idle => {
                let main = app
                    .main_process()
                    .and_then(|pid| self.state.process(pid.0));
                if let Some(main) = main
                    && let Some(raw) = main.last_raw_adj()
                {
                    self.enqueue(
                        &app,
                        AdjRequest {
                            pid: main.pid(),
                            raw,
                            priority: Some(TaskPriority::High),
                        },
                    );
                }
            }
            _ => {}
        }
    }

    pub fn on_wake_lock_acquired(&self, pid: i32) {
        if self.state.increment_wake_lock(pid) == Some(1) {
            self.refresh_scope_dependent(pid);
        }
    }

    pub fn on_wake_lock_released(&self, pid: i32) {
        if self.state.decrement_wake_lock(pid) == Some(0) {
            self.refresh_scope_dependent(pid);
        }
    }

    pub fn on_ui_shown(&self, pid: i32) {
        if let Some(p) = self.state.process(pid)
            && p.mark_ui_shown()
        {
            debug!(target: "adjwarden::manager", "{} showed UI", p.process_name);
        }
    }

    pub fn on_webview_client_changed(&self, pid: i32, active: bool) {
        let Some(p) = self.state.process(pid) else {
            return;
        };
        if !p.is_webview_sandbox {
            return;
        }
        let settings = self.config.current();
        p.set_client_activity(active);
        p.refresh_webview(settings.webview_protection);
        p.invalidate_handle();
    }

    pub fn apply_config_change(&self, change: ConfigChange) {
        let settings = self.config.current();
        match change {
            ConfigChange::Scoring | ConfigChange::PolicyMode => self.scoring.invalidate(),
            ConfigChange::Daemon => {
                self.scheduler
                    .set_delay(Duration::from_millis(settings.daemon.debounce_ms));
            }
            _ => {}
        }
        if change.invalidates_resolution() {
            self.state.refresh_from_settings(&settings);
        }
        debug!(target: "adjwarden::manager", "Applied config change {:?}", change);
    }

    pub fn spawn_config_listener(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<ConfigChange>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        self.workers.spawn(async move {
            while let Some(change) = rx.recv().await {
                this.apply_config_change(change);
            }
        })
    }

    /// Compute the target for one raw value. Mutates fixing and ceiling state
    /// the same way a live event would.
    pub fn decide(&self, settings: &Settings, app: &AppRecord, process: &ProcessRecord, raw: i32) -> Option<Decision> {
        let tag = self.resolve(settings, app, process);

        let custom = match tag.action {
            AdjHandleActionType::DoNothing => return None,
            AdjHandleActionType::CustomMainProcess => app.custom_policy().and_then(|c| {
                if app.group() == AppGroup::Active {
                    c.foreground
                } else {
                    c.background
                }
            }),
            AdjHandleActionType::CustomSubprocess => {
                settings.subprocesses.get(&process.process_name).copied()
            }
            AdjHandleActionType::GlobalOomAdj => {
                let g = &settings.global;
                (g.enabled && scope_covers(g.scope, app, process, tag.high_priority))
                    .then_some(g.adj)
            }
            AdjHandleActionType::Other => None,
        };

        let high_priority = tag.high_priority || process.is_main_process;
        let target = match custom {
            Some(_) if raw < 0 => raw,
            Some(v) => {
                self.scoring.check_and_set_default_max_adj_if_need(process);
                v
            }
            None => {
                let important = settings.important_system_apps.contains(&app.package_name);
                let class = Classification::of(app, process, tag.high_priority, important);
                self.scoring
                    .compute_default(settings.policy, &settings.scoring, process, class, raw)
            }
        };

        Some(Decision {
            action: tag.action,
            high_priority,
            target,
            priority: if high_priority {
                TaskPriority::Normal
            } else {
                TaskPriority::Low
            },
        })
    }

    /// Cached resolution against `settings`. If a reload swapped the
    /// settings meanwhile, the tag may have been stored after the reload
    /// cleared the cache, so it is dropped again.
    fn resolve(&self, settings: &Settings, app: &AppRecord, process: &ProcessRecord) -> HandleTag {
        let tag = resolve_cached(settings, app, process);
        if !std::ptr::eq(settings, Arc::as_ptr(&self.config.current())) {
            process.invalidate_handle();
        }
        tag
    }

    fn enqueue(self: &Arc<Self>, app: &Arc<AppRecord>, req: AdjRequest) -> bool {
        let tx = {
            let mut boxes = self.mailboxes.lock();
            boxes
                .entry(app.id)
                .or_insert_with(|| self.spawn_app_worker(app.id))
                .clone()
        };
        match tx.try_send(req) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(target: "adjwarden::manager", "{} queue full, leaving PID {} to the host", app.package_name, req.pid);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mailboxes.lock().remove(&app.id);
                false
            }
        }
    }

    fn spawn_app_worker(self: &Arc<Self>, app_id: AppId) -> mpsc::Sender<AdjRequest> {
        let depth = self.config.current().daemon.event_queue;
        let (tx, mut rx) = mpsc::channel::<AdjRequest>(depth);
        let weak = Arc::downgrade(self);
        self.workers.spawn(async move {
            while let Some(req) = rx.recv().await {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                this.handle_adj(app_id, req);
            }
            debug!(target: "adjwarden::manager", "Worker for {} stopped", app_id);
        });
        tx
    }

    fn handle_adj(&self, app_id: AppId, req: AdjRequest) {
        let Some(app) = self.state.app(app_id) else {
            return;
        };
        let _guard = app.lock();
        if app.is_dead() {
            return;
        }
        let Some(process) = self.state.process(req.pid) else {
            return;
        };
        if process.app != app_id {
            return;
        }

        let settings = self.config.current();
        let previous = process.applied_adj();
        let Some(decision) = self.decide(&settings, &app, &process, req.raw) else {
            return;
        };
        let priority = req.priority.unwrap_or(decision.priority);

        // a dropped submission still reports the target so compaction
        // tracks the host's view of the process
        self.schedule_apply(&app, &process, decision.target, priority);
        process.set_last_raw_adj(req.raw);

        if app.group() == AppGroup::None && process.is_main_process {
            let group = if req.raw <= VISIBLE_APP_ADJ {
                AppGroup::Active
            } else {
                AppGroup::Idle
            };
            if self.state.transition_group(&app, group).is_some() && group == AppGroup::Active {
                process.mark_ui_shown();
            }
        }

        self.compaction.notify_compaction(&CompactionRequest {
            pid: process.id,
            uid: process.uid,
            process_name: process.process_name.clone(),
            previous_adj: previous,
            target_adj: decision.target,
            escalation_level: priority.escalation_level(),
        });
    }

    fn schedule_apply(
        &self,
        app: &Arc<AppRecord>,
        process: &Arc<ProcessRecord>,
        target: i32,
        priority: TaskPriority,
    ) -> Submission {
        let app = Arc::clone(app);
        let process_for_task = Arc::clone(process);
        let sink = Arc::clone(&self.sink);

        self.scheduler.add_task(
            process.id,
            priority,
            Box::new(move || {
                let process = process_for_task;
                if app.is_dead() {
                    debug!(target: "adjwarden::manager", "{} is dead, skipping PID {}", app.package_name, process.id);
                    return Ok(());
                }
                let adj = process.clamp_adj(target);
                sink.apply_score(process.pid(), process.uid, adj)?;
                process.set_applied_adj(adj);
                Ok(())
            }),
        )
    }

    /// Visibility tracking only reports an app active once its UI is up.
    fn mark_main_visible(&self, app: &AppRecord) {
        if let Some(main) = app.main_process().and_then(|pid| self.state.process(pid.0))
            && main.mark_ui_shown()
        {
            debug!(target: "adjwarden::manager", "{} is visible", main.process_name);
        }
    }

    fn refresh_scope_dependent(&self, pid: i32) {
        let settings = self.config.current();
        if let Some(p) = self.state.process(pid)
            && settings.global.enabled
        {
            p.invalidate_handle();
        }
    }

    fn retire_app(&self, app: &AppRecord) {
        for p in self.state.processes_of(app) {
            self.scheduler.cancel(p.id);
        }
        self.mailboxes.lock().remove(&app.id);
        info!(target: "adjwarden::manager", "{} retired", app.package_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::MAX_ADJ;
    use crate::common::types::GlobalScope;
    use crate::core::config::AppOverride;
    use crate::core::policy::PolicyKind;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(i32, u32, i32)>>,
        fail: bool,
    }

    impl ScoreSink for RecordingSink {
        fn apply_score(&self, pid: i32, uid: u32, adj: i32) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("procfs write refused");
            }
            self.calls.lock().push((pid, uid, adj));
            Ok(())
        }
    }

    impl RecordingSink {
        fn last_for(&self, pid: i32) -> Option<i32> {
            self.calls
                .lock()
                .iter()
                .rev()
                .find(|c| c.0 == pid)
                .map(|c| c.2)
        }

        fn count_for(&self, pid: i32) -> usize {
            self.calls.lock().iter().filter(|c| c.0 == pid).count()
        }
    }

    #[derive(Default)]
    struct RecordingCompaction {
        requests: Mutex<Vec<CompactionRequest>>,
    }

    impl CompactionListener for RecordingCompaction {
        fn notify_compaction(&self, request: &CompactionRequest) {
            self.requests.lock().push(request.clone());
        }
    }

    struct Harness {
        manager: Arc<OomAdjustManager>,
        sink: Arc<RecordingSink>,
        compaction: Arc<RecordingCompaction>,
        config: Arc<ConfigService>,
    }

    fn harness_with(settings: Settings, sink: RecordingSink) -> Harness {
        let config = Arc::new(ConfigService::new(settings).unwrap());
        let sink = Arc::new(sink);
        let compaction = Arc::new(RecordingCompaction::default());
        let manager = OomAdjustManager::new(
            config.clone(),
            sink.clone(),
            compaction.clone(),
            Handle::current(),
            Handle::current(),
        );
        Harness {
            manager,
            sink,
            compaction,
            config,
        }
    }

    fn harness(settings: Settings) -> Harness {
        harness_with(settings, RecordingSink::default())
    }

    const UID: u32 = 10_150;

    fn start_main(h: &Harness, pid: i32) -> Arc<ProcessRecord> {
        let mut snap = ProcessSnapshot::new(pid, UID, 0, "com.example.app");
        snap.has_shown_ui = true;
        h.manager.on_process_started(&snap)
    }

    fn start_sub(h: &Harness, pid: i32, name: &str) -> Arc<ProcessRecord> {
        h.manager
            .on_process_started(&ProcessSnapshot::new(pid, UID, 0, "com.example.app").subprocess(name))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(4)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_plus_main_is_applied_after_debounce() {
        let h = harness(Settings::default());
        start_main(&h, 1000);

        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.sink.count_for(1000), 0);

        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(9));
        let p = h.manager.state().process(1000).unwrap();
        assert_eq!(p.applied_adj(), Some(9));
        assert_eq!(p.last_raw_adj(), Some(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subprocess_fixing_keeps_floor() {
        let h = harness(Settings::default());
        start_main(&h, 1000);
        start_sub(&h, 1001, "remote");

        assert!(h.manager.on_adj_change_requested(1001, UID, 200));
        settle().await;
        assert_eq!(h.sink.last_for(1001), Some(201));

        assert!(h.manager.on_adj_change_requested(1001, UID, 50));
        settle().await;
        assert_eq!(h.sink.last_for(1001), Some(201));
        assert!(h.manager.state().process(1001).unwrap().is_fixed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_main_scope_falls_through_for_subprocess() {
        let mut s = Settings::default();
        s.global.enabled = true;
        s.global.adj = 0;
        s.global.scope = GlobalScope::MainProcess;
        let h = harness(s);
        start_main(&h, 1000);
        start_sub(&h, 1001, "remote");

        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        assert!(h.manager.on_adj_change_requested(1001, UID, 500));
        settle().await;

        assert_eq!(h.sink.last_for(1000), Some(0));
        assert_eq!(h.sink.last_for(1001), Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_lock_promotes_subprocess() {
        let h = harness(Settings::default());
        start_main(&h, 1000);
        let sub = start_sub(&h, 1001, "sync");

        assert!(h.manager.on_adj_change_requested(1001, UID, 500));
        settle().await;
        assert_eq!(h.sink.last_for(1001), Some(500));
        let before = sub.cached_handle().unwrap();
        assert!(!before.high_priority);

        h.manager.on_wake_lock_acquired(1001);
        let after = sub.cached_handle().unwrap();
        assert!(after.high_priority);
        assert_eq!(after.action, before.action);

        assert!(h.manager.on_adj_change_requested(1001, UID, 500));
        settle().await;
        // balance_plus: 500 / 100 = 5, plus the subprocess offset
        assert_eq!(h.sink.last_for(1001), Some(6));

        h.manager.on_wake_lock_released(1001);
        assert!(!sub.cached_handle().unwrap().high_priority);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_app_gets_nothing() {
        let h = harness(Settings::default());
        let main = start_main(&h, 1000);

        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.manager.on_group_changed(main.app, AppGroup::Dead);

        assert!(!h.manager.on_adj_change_requested(1000, UID, 900));
        settle().await;
        assert_eq!(h.sink.count_for(1000), 0);
        assert_eq!(h.manager.scheduler().pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_apply() {
        let h = harness(Settings::default());
        start_main(&h, 1000);

        for raw in [100, 200, 700, 900, 950] {
            assert!(h.manager.on_adj_change_requested(1000, UID, raw));
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(h.manager.scheduler().pending_len() <= 1);
        }
        settle().await;
        assert_eq!(h.sink.count_for(1000), 1);
        assert_eq!(h.sink.last_for(1000), Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitional_group_needs_global_override() {
        let h = harness(Settings::default());
        let main = start_main(&h, 1000);
        h.manager.on_group_changed(main.app, AppGroup::Tmp);
        assert!(!h.manager.on_adj_change_requested(1000, UID, 900));

        h.config
            .update(|s| {
                s.global.enabled = true;
                s.global.adj = 3;
            })
            .unwrap();
        h.manager.apply_config_change(ConfigChange::GlobalOverride);
        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_and_stale_events_are_ignored() {
        let h = harness(Settings::default());
        start_main(&h, 1000);
        assert!(!h.manager.on_adj_change_requested(4242, UID, 900));
        assert!(!h.manager.on_adj_change_requested(1000, UID + 1, 900));

        h.manager.on_process_removed(1000);
        assert!(!h.manager.on_adj_change_requested(1000, UID, 900));
        h.manager.on_process_removed(1000);
        h.manager.on_wake_lock_acquired(1000);
        assert_eq!(h.manager.status().apps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_apply_is_logged_not_fatal() {
        let h = harness_with(
            Settings::default(),
            RecordingSink {
                fail: true,
                ..Default::default()
            },
        );
        let main = start_main(&h, 1000);
        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        settle().await;
        assert_eq!(main.applied_adj(), None);
        assert_eq!(h.manager.scheduler().pending_len(), 0);

        // the next event simply tries again
        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        settle().await;
        assert_eq!(main.applied_adj(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compaction_sees_previous_and_target() {
        let h = harness(Settings::default());
        start_main(&h, 1000);

        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        settle().await;
        assert!(h.manager.on_adj_change_requested(1000, UID, 500));
        settle().await;

        let reqs = h.compaction.requests.lock();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].previous_adj, None);
        assert_eq!(reqs[0].target_adj, 9);
        assert_eq!(reqs[1].previous_adj, Some(9));
        assert_eq!(reqs[1].target_adj, 5);
        assert_eq!(reqs[1].escalation_level, TaskPriority::Normal.escalation_level());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_event_classifies_app() {
        let h = harness(Settings::default());
        let main = start_main(&h, 1000);
        let app = h.manager.state().app(main.app).unwrap();
        assert_eq!(app.group(), AppGroup::None);

        assert!(h.manager.on_adj_change_requested(1000, UID, 0));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(app.group(), AppGroup::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_going_idle_reschedules_main_at_high_priority() {
        let h = harness(Settings::default());
        let main = start_main(&h, 1000);
        assert!(h.manager.on_adj_change_requested(1000, UID, 0));
        settle().await;

        h.manager.on_group_changed(main.app, AppGroup::Idle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            h.manager.scheduler().pending_priority(main.id),
            Some(TaskPriority::High)
        );

        // churn at normal priority cannot displace it
        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            h.manager.scheduler().pending_priority(main.id),
            Some(TaskPriority::High)
        );
        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_main_override_by_group() {
        let mut s = Settings::default();
        s.apps.insert(
            "com.example.app".into(),
            AppOverride {
                foreground: Some(0),
                background: Some(4),
            },
        );
        let h = harness(s);
        let main = start_main(&h, 1000);
        h.manager.on_group_changed(main.app, AppGroup::Active);

        assert!(h.manager.on_adj_change_requested(1000, UID, 0));
        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(0));

        h.manager.on_group_changed(main.app, AppGroup::Idle);
        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(4));
        assert!(main.is_ceiling_raised());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clamp_and_idempotence_across_policies() {
        let h = harness(Settings::default());
        let mut snap = ProcessSnapshot::new(1000, UID, 0, "com.example.app");
        snap.has_shown_ui = true;
        snap.max_adj = 100;
        let main = h.manager.on_process_started(&snap);
        let sub = start_sub(&h, 1001, "worker");
        let app = h.manager.state().app(main.app).unwrap();

        for kind in [
            PolicyKind::Strict,
            PolicyKind::StrictSecondary,
            PolicyKind::Balance,
            PolicyKind::BalancePlus,
            PolicyKind::Negative,
            PolicyKind::SimpleLmkBalance,
            PolicyKind::SimpleLmkBalancePlus,
        ] {
            h.config.update(|s| s.policy = kind).unwrap();
            h.manager.apply_config_change(ConfigChange::PolicyMode);
            let settings = h.config.current();
            for raw in [-1000, -17, 0, 1, 100, 200, 201, 500, 900, 999, 1001, 5000] {
                for p in [&main, &sub] {
                    let a = h.manager.decide(&settings, &app, p, raw).unwrap();
                    let b = h.manager.decide(&settings, &app, p, raw).unwrap();
                    assert_eq!(a, b, "{kind} raw={raw}");
                    let applied = p.clamp_adj(a.target);
                    assert!(applied >= NATIVE_ADJ && applied <= p.max_allowed_adj());
                    assert!(p.max_allowed_adj() <= MAX_ADJ);
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_main_without_ui_is_not_hidden() {
        let mut s = Settings::default();
        s.policy = PolicyKind::Strict;
        let h = harness(s);
        let main = h
            .manager
            .on_process_started(&ProcessSnapshot::new(1000, UID, 0, "com.example.app"));
        assert!(!main.has_shown_ui());

        h.manager.on_group_changed(main.app, AppGroup::Active);
        assert!(main.has_shown_ui());
        assert!(h.manager.on_adj_change_requested(1000, UID, 0));
        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_main_without_ui_keeps_hidden_floor() {
        let mut s = Settings::default();
        s.policy = PolicyKind::Strict;
        let h = harness(s);
        let main = h
            .manager
            .on_process_started(&ProcessSnapshot::new(1000, UID, 0, "com.example.app"));

        h.manager.on_group_changed(main.app, AppGroup::Idle);
        assert!(h.manager.on_adj_change_requested(1000, UID, 100));
        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(201));

        h.manager.on_ui_shown(1000);
        assert!(h.manager.on_adj_change_requested(1000, UID, 100));
        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_outside_host_range_is_passed_through() {
        let h = harness(Settings::default());
        let main = start_main(&h, 1000);
        let app = h.manager.state().app(main.app).unwrap();

        assert!(!h.manager.on_adj_change_requested(1000, UID, i32::MAX));
        assert!(!h.manager.on_adj_change_requested(1000, UID, i32::MIN));
        assert!(!h.manager.on_adj_change_requested(1000, UID, UNKNOWN_ADJ + 1));
        settle().await;
        assert_eq!(h.sink.count_for(1000), 0);

        let settings = h.config.current();
        let d = h.manager.decide(&settings, &app, &main, i32::MAX).unwrap();
        assert!(main.clamp_adj(d.target) <= MAX_ADJ);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_from_replaced_settings_is_not_kept() {
        let h = harness(Settings::default());
        let main = start_main(&h, 1000);
        let app = h.manager.state().app(main.app).unwrap();

        let old = h.config.current();
        h.manager.decide(&old, &app, &main, 900).unwrap();
        assert!(main.cached_handle().is_some());

        h.config
            .update(|s| {
                s.global.enabled = true;
                s.global.adj = 0;
            })
            .unwrap();
        // the reload's cache clear ran before this stale resolution finished
        h.manager.decide(&old, &app, &main, 900).unwrap();
        assert!(main.cached_handle().is_none());

        let d = h.manager.decide(&h.config.current(), &app, &main, 900).unwrap();
        assert_eq!(d.action, AdjHandleActionType::GlobalOomAdj);
        assert_eq!(d.target, 0);
        assert!(main.cached_handle().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_webview_client_promotes_sandbox() {
        let h = harness(Settings::default());
        start_main(&h, 1000);
        let mut snap = ProcessSnapshot::new(1001, UID, 0, "com.example.app").subprocess("sandboxed_process0");
        snap.is_webview_sandbox = true;
        let sandbox = h.manager.on_process_started(&snap);

        assert!(h.manager.on_adj_change_requested(1001, UID, 500));
        settle().await;
        assert_eq!(h.sink.last_for(1001), Some(500));

        h.manager.on_webview_client_changed(1001, true);
        assert!(sandbox.is_high_priority());
        assert!(h.manager.on_adj_change_requested(1001, UID, 500));
        settle().await;
        assert_eq!(h.sink.last_for(1001), Some(6));

        h.config.update(|s| s.webview_protection = false).unwrap();
        h.manager.apply_config_change(ConfigChange::WebviewProtection);
        assert!(!sandbox.is_high_priority());
        assert!(h.manager.on_adj_change_requested(1001, UID, 500));
        settle().await;
        assert_eq!(h.sink.last_for(1001), Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_still_reaches_compaction() {
        let h = harness(Settings::default());
        let main = start_main(&h, 1000);
        assert!(h.manager.on_adj_change_requested(1000, UID, 0));
        settle().await;

        h.manager.on_group_changed(main.app, AppGroup::Idle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            h.manager.scheduler().pending_priority(main.id),
            Some(TaskPriority::High)
        );

        let reqs = h.compaction.requests.lock().clone();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[2].target_adj, 9);
        assert_eq!(
            reqs[2].escalation_level,
            TaskPriority::Normal.escalation_level()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apps_are_handled_independently() {
        let h = harness(Settings::default());
        start_main(&h, 1000);
        let mut other = ProcessSnapshot::new(2000, UID + 1, 0, "com.other");
        other.has_shown_ui = true;
        h.manager.on_process_started(&other);

        assert!(h.manager.on_adj_change_requested(1000, UID, 900));
        assert!(h.manager.on_adj_change_requested(2000, UID + 1, 300));
        settle().await;
        assert_eq!(h.sink.last_for(1000), Some(9));
        assert_eq!(h.sink.last_for(2000), Some(3));
        assert_eq!(h.manager.status().apps, 2);
    }
}
