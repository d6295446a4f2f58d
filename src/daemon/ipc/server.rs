use super::handlers::handle_client;
use crate::common::types::LogLevel;
use crate::core::config::ConfigService;
use crate::daemon::manager::OomAdjustManager;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;

#[derive(Clone)]
pub struct BridgeHandles {
    pub manager: Arc<OomAdjustManager>,
    pub config: Arc<ConfigService>,
    pub settings_path: Arc<PathBuf>,
    pub set_log_level: Arc<dyn Fn(LogLevel) + Send + Sync>,
    pub current_log_level: Arc<RwLock<LogLevel>>,
}

pub async fn start<P: AsRef<Path>>(path: P, h: BridgeHandles) -> Result<()> {
    let path_ref = path.as_ref();
    let _ = std::fs::remove_file(path_ref);
    let listener = UnixListener::bind(path_ref)
        .with_context(|| format!("binding event socket {}", path_ref.display()))?;
    let _ = std::fs::set_permissions(path_ref, std::fs::Permissions::from_mode(0o660));
    tracing::debug!(target: "adjwarden::bridge", "Listening at {:?}", path_ref);

    loop {
        let (stream, _) = listener.accept().await?;
        let hc = h.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, hc).await {
                tracing::warn!(target: "adjwarden::bridge", "client error: {:?}", e);
            }
        });
    }
}
