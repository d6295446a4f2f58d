use crate::common::types::LogLevel;
use crate::core::compaction::LogCompaction;
use crate::core::config::ConfigService;
use crate::core::sink::ProcfsScoreSink;
use crate::daemon::config::DaemonConfig;
use crate::daemon::ipc::{self, BridgeHandles};
use crate::daemon::manager::OomAdjustManager;
use crate::daemon::watcher::start_config_watcher;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

pub type ReloadHandle =
    tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>;

fn build_runtime(name: &str, threads: usize) -> Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name(name)
        .enable_all()
        .build()
        .with_context(|| format!("Failed to build {} runtime", name))
}

fn log_level_setter(handle: ReloadHandle) -> Arc<dyn Fn(LogLevel) + Send + Sync> {
    Arc::new(move |lvl: LogLevel| match handle.reload(EnvFilter::new(lvl.as_filter())) {
        Ok(_) => debug!(target: "adjwarden::daemon", "Log level changed to {}", lvl),
        Err(e) => error!(target: "adjwarden::daemon", "Failed to change log level: {}", e),
    })
}

/// Wire everything up and serve until Ctrl-C or the bridge dies.
pub fn run(cfg: DaemonConfig, filter_handle: ReloadHandle) -> Result<()> {
    let daemon = &cfg.settings.daemon;
    let workers = build_runtime("adjwarden-worker", daemon.orchestrator_threads)?;
    let scheduler = build_runtime("adjwarden-sched", daemon.scheduler_threads)?;
    debug!(target: "adjwarden::daemon", "Runtimes ready ({} worker, {} scheduler threads)", daemon.orchestrator_threads, daemon.scheduler_threads);

    let config = Arc::new(ConfigService::new(cfg.settings.clone())?);
    let manager = OomAdjustManager::new(
        config.clone(),
        Arc::new(ProcfsScoreSink::new()),
        Arc::new(LogCompaction),
        workers.handle().clone(),
        scheduler.handle().clone(),
    );
    manager.spawn_config_listener(config.subscribe());
    start_config_watcher(cfg.settings_path.clone(), config.clone());

    let level = cfg.effective_log_level();
    let set_log_level = log_level_setter(filter_handle);
    set_log_level(level);

    let handles = BridgeHandles {
        manager,
        config,
        settings_path: Arc::new(cfg.settings_path.clone()),
        set_log_level,
        current_log_level: Arc::new(RwLock::new(level)),
    };
    let socket = cfg.socket_path.clone();

    let outcome: Result<()> = workers.block_on(async move {
        let bridge = tokio::spawn(ipc::start(socket, handles));
        tokio::select! {
            res = bridge => match res {
                Ok(Ok(())) => {
                    info!(target: "adjwarden::daemon", "Bridge | Listener stopped");
                    Ok(())
                }
                Ok(Err(e)) => Err(e.context("event bridge failed")),
                Err(e) => Err(anyhow::anyhow!("event bridge task aborted: {}", e)),
            },
            _ = signal::ctrl_c() => {
                info!(target: "adjwarden::daemon", "Daemon | Received Ctrl-C, shutting down");
                Ok(())
            }
        }
    });

    let _ = std::fs::remove_file(&cfg.socket_path);
    scheduler.shutdown_timeout(Duration::from_secs(1));
    workers.shutdown_timeout(Duration::from_secs(1));
    info!(target: "adjwarden::daemon", "Daemon | Stopped");
    outcome
}
