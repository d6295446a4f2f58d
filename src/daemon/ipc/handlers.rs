use super::commands::Command;
use super::server::BridgeHandles;
use crate::daemon::config::reload_settings;
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, warn};

const HELP: &str = "CMDS:
        - HELP | ?
        - START <pid> <uid> <user> <package> <process> [system] [webview] [ui] [max=<adj>]
        - REMOVE <pid>
        - ADJ <pid> <uid> <raw>
        - GROUP <uid> <NONE|ACTIVE|IDLE|TMP|DEAD>
        - WAKELOCK <pid> <ACQUIRE|RELEASE>
        - UI <pid>
        - WEBVIEW <pid> <on|off>
        - SETLOG <DEBUG|INFO|WARN|ERROR>
        - RELOAD
        - STATUS
        - PING
        - QUIT
 ";

const MAX_LINE: usize = 512;

/// Serve one host connection until it quits or hangs up.
pub async fn handle_client(stream: UnixStream, h: BridgeHandles) -> Result<()> {
    let (r, mut w) = stream.into_split();
    let mut reader = BufReader::new(r);
    let mut line = String::new();
    w.write_all(b"OK ADJWARDEN\n").await?;

    while reader.read_line(&mut line).await? > 0 {
        let s = line.trim();
        if s.len() > MAX_LINE {
            w.write_all(b"ERR input too long\n").await?;
            line.clear();
            continue;
        }
        let resp = match s.parse::<Command>() {
            Ok(Command::Quit) => {
                w.write_all(b"BYE\n").await?;
                break;
            }
            Ok(cmd) => dispatch(cmd, &h),
            Err(e) => format!("ERR {}\n", e),
        };
        w.write_all(resp.as_bytes()).await?;
        line.clear();
    }
    Ok(())
}

/// Apply one parsed command and build the reply line.
pub fn dispatch(cmd: Command, h: &BridgeHandles) -> String {
    let m = &h.manager;
    match cmd {
        Command::Help => HELP.to_string(),
        Command::Ping => "PONG\n".into(),
        Command::Quit => "BYE\n".into(),
        Command::Start(snap) => {
            let p = m.on_process_started(&snap);
            format!("OK {} main={}\n", p.process_name, p.is_main_process)
        }
        Command::Remove(pid) => {
            m.on_process_removed(pid);
            "OK\n".into()
        }
        Command::Adj { pid, uid, raw } => {
            if m.on_adj_change_requested(pid, uid, raw) {
                "SUPPRESS\n".into()
            } else {
                "PASS\n".into()
            }
        }
        Command::Group { uid, group } => match m.state().app_by_uid(uid) {
            Some(app) => {
                m.on_group_changed(app.id, group);
                "OK\n".into()
            }
            None => {
                debug!(target: "adjwarden::bridge", "GROUP for unknown uid {}", uid);
                "ERR unknown uid\n".into()
            }
        },
        Command::WakeLock { pid, acquire } => {
            if acquire {
                m.on_wake_lock_acquired(pid);
            } else {
                m.on_wake_lock_released(pid);
            }
            "OK\n".into()
        }
        Command::Ui(pid) => {
            m.on_ui_shown(pid);
            "OK\n".into()
        }
        Command::Webview { pid, active } => {
            m.on_webview_client_changed(pid, active);
            "OK\n".into()
        }
        Command::SetLog(lvl) => {
            (h.set_log_level)(lvl);
            *h.current_log_level.write() = lvl;
            "OK SET_LOG\n".into()
        }
        Command::Reload => match reload_settings(h.settings_path.as_path(), &h.config) {
            Ok(changes) => format!("OK RELOADED {}\n", changes.len()),
            Err(e) => {
                warn!(target: "adjwarden::bridge", "Reload rejected: {:?}", e);
                format!("ERR {}\n", e)
            }
        },
        Command::Status => {
            let st = m.status();
            let settings = h.config.current();
            format!(
                "APPS={} PROCESSES={} PENDING={} POLICY={} GLOBAL={} LOG_LEVEL={}\n",
                st.apps,
                st.processes,
                st.pending_tasks,
                settings.policy,
                if settings.global.enabled { "on" } else { "off" },
                *h.current_log_level.read()
            )
        }
    }
}
