use crate::core::config::ConfigService;
use crate::daemon::config::reload_settings;
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Watch the settings file and feed accepted changes into `service`.
///
/// Runs on its own thread; the directory is watched rather than the file so
/// editors that replace the file on save are still seen.
pub fn start_config_watcher(settings_path: PathBuf, service: Arc<ConfigService>) {
    let spawned = std::thread::Builder::new()
        .name("adjwarden-watch".into())
        .spawn(move || {
            let Some(dir) = settings_path.parent().map(|p| p.to_path_buf()) else {
                error!(target: "adjwarden::watcher", "Settings path {} has no parent", settings_path.display());
                return;
            };
            let target = settings_path.clone();

            let mut watcher = match notify::recommended_watcher(
                move |res: Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res
                        && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                        && event.paths.iter().any(|p| p == &target)
                    {
                        info!(target: "adjwarden::watcher", "Settings file changed, reloading...");
                        reload_with_retry(&target, &service);
                    }
                },
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!(target: "adjwarden::watcher", "Failed to create settings watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                error!(target: "adjwarden::watcher", "Failed to watch {}: {}", dir.display(), e);
                return;
            }

            info!(target: "adjwarden::watcher", "Watching {}", settings_path.display());
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        });
    if let Err(e) = spawned {
        error!(target: "adjwarden::watcher", "Failed to spawn watcher thread: {}", e);
    }
}

/// A save can land half-written; give the writer a moment before giving up.
fn reload_with_retry(path: &std::path::Path, service: &ConfigService) {
    for attempt in 1..=MAX_RETRIES {
        match reload_settings(path, service) {
            Ok(changes) => {
                info!(target: "adjwarden::watcher", "Settings reloaded ({} change(s))", changes.len());
                return;
            }
            Err(e) if attempt < MAX_RETRIES => {
                warn!(target: "adjwarden::watcher", "Failed reloading settings (attempt {}/{}): {:?}, retrying in 2s...", attempt, MAX_RETRIES, e);
                std::thread::sleep(RETRY_DELAY);
            }
            Err(e) => {
                error!(target: "adjwarden::watcher", "Keeping previous settings after {} attempts: {:?}", MAX_RETRIES, e);
            }
        }
    }
}
