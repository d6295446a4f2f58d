use super::settings::{ConfigChange, ConfigError, Settings};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Owns the live configuration and fans out change notifications.
///
/// Readers take a cheap `Arc` snapshot; writers go through [`ConfigService::replace`],
/// which validates before anything becomes visible.
pub struct ConfigService {
    current: RwLock<Arc<Settings>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConfigChange>>>,
}

impl ConfigService {
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(settings)),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub fn current(&self) -> Arc<Settings> {
        self.current.read().clone()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConfigChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Swap in a new configuration; on error the old one stays live.
    pub fn replace(&self, new: Settings) -> Result<Vec<ConfigChange>, ConfigError> {
        new.validate()?;

        let changes = {
            let mut cur = self.current.write();
            let changes = cur.diff(&new);
            if changes.is_empty() {
                debug!(target: "adjwarden::config", "Configuration unchanged");
                return Ok(changes);
            }
            *cur = Arc::new(new);
            changes
        };

        info!(target: "adjwarden::config", "Configuration updated: {:?}", changes);
        self.publish(&changes);
        Ok(changes)
    }

    pub fn update<F>(&self, f: F) -> Result<Vec<ConfigChange>, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut next = (*self.current()).clone();
        f(&mut next);
        self.replace(next)
    }

    fn publish(&self, changes: &[ConfigChange]) {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| changes.iter().all(|c| tx.send(*c).is_ok()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::PolicyKind;

    #[test]
    fn test_replace_publishes_changes() {
        let svc = ConfigService::new(Settings::default()).unwrap();
        let mut rx = svc.subscribe();

        let changes = svc.update(|s| s.policy = PolicyKind::Strict).unwrap();
        assert_eq!(changes, vec![ConfigChange::PolicyMode]);
        assert_eq!(rx.try_recv().unwrap(), ConfigChange::PolicyMode);
        assert!(rx.try_recv().is_err());
        assert_eq!(svc.current().policy, PolicyKind::Strict);
    }

    #[test]
    fn test_invalid_update_keeps_previous() {
        let svc = ConfigService::new(Settings::default()).unwrap();
        let mut rx = svc.subscribe();

        let err = svc
            .update(|s| {
                s.global.enabled = true;
                s.global.adj = -2000;
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::IllegalAdj { value: -2000, .. }));
        assert!(!svc.current().global.enabled);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unchanged_update_is_silent() {
        let svc = ConfigService::new(Settings::default()).unwrap();
        let mut rx = svc.subscribe();
        assert!(svc.update(|_| {}).unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let svc = ConfigService::new(Settings::default()).unwrap();
        drop(svc.subscribe());
        svc.update(|s| s.webview_protection = false).unwrap();
        assert!(svc.subscribers.lock().is_empty());
    }
}
