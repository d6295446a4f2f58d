use crate::common::types::{AppGroup, LogLevel};
use crate::core::state::ProcessSnapshot;
use std::str::FromStr;

/// One line from the host side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start(ProcessSnapshot),
    Remove(i32),
    Adj { pid: i32, uid: u32, raw: i32 },
    Group { uid: u32, group: AppGroup },
    WakeLock { pid: i32, acquire: bool },
    Ui(i32),
    Webview { pid: i32, active: bool },
    SetLog(LogLevel),
    Reload,
    Status,
    Ping,
    Quit,
}

fn num<T: FromStr>(s: &str, usage: &'static str) -> Result<T, &'static str> {
    s.parse::<T>().map_err(|_| usage)
}

const START_USAGE: &str = "usage: START <pid> <uid> <user> <package> <process> [system] [webview] [ui] [max=<adj>]";

fn parse_start(pid: &str, uid: &str, user: &str, pkg: &str, process: &str, flags: &[&str]) -> Result<Command, &'static str> {
    let mut snap = ProcessSnapshot::new(
        num(pid, START_USAGE)?,
        num(uid, START_USAGE)?,
        num(user, START_USAGE)?,
        pkg,
    );
    snap.process_name = process.to_string();

    for flag in flags {
        match *flag {
            "system" => snap.is_system_app = true,
            "webview" => snap.is_webview_sandbox = true,
            "ui" => snap.has_shown_ui = true,
            other => match other.strip_prefix("max=") {
                Some(v) => snap.max_adj = num(v, START_USAGE)?,
                None => return Err(START_USAGE),
            },
        }
    }
    Ok(Command::Start(snap))
}

impl FromStr for Command {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            ["HELP"] | ["?"] => Ok(Command::Help),
            ["STATUS"] => Ok(Command::Status),
            ["RELOAD"] => Ok(Command::Reload),
            ["PING"] => Ok(Command::Ping),
            ["QUIT"] => Ok(Command::Quit),

            ["START", pid, uid, user, pkg, process, flags @ ..] => {
                parse_start(pid, uid, user, pkg, process, flags)
            }
            ["START", ..] => Err(START_USAGE),

            ["REMOVE", pid] => Ok(Command::Remove(num(pid, "usage: REMOVE <pid>")?)),

            ["ADJ", pid, uid, raw] => {
                const USAGE: &str = "usage: ADJ <pid> <uid> <raw>";
                Ok(Command::Adj {
                    pid: num(pid, USAGE)?,
                    uid: num(uid, USAGE)?,
                    raw: num(raw, USAGE)?,
                })
            }

            ["GROUP", uid, group] => {
                const USAGE: &str = "usage: GROUP <uid> <NONE|ACTIVE|IDLE|TMP|DEAD>";
                Ok(Command::Group {
                    uid: num(uid, USAGE)?,
                    group: AppGroup::from_str_ignore_case(group).ok_or(USAGE)?,
                })
            }

            ["WAKELOCK", pid, action] => {
                const USAGE: &str = "usage: WAKELOCK <pid> <ACQUIRE|RELEASE>";
                let acquire = match action.to_uppercase().as_str() {
                    "ACQUIRE" => true,
                    "RELEASE" => false,
                    _ => return Err(USAGE),
                };
                Ok(Command::WakeLock {
                    pid: num(pid, USAGE)?,
                    acquire,
                })
            }

            ["UI", pid] => Ok(Command::Ui(num(pid, "usage: UI <pid>")?)),

            ["WEBVIEW", pid, state] => {
                const USAGE: &str = "usage: WEBVIEW <pid> <on|off>";
                let active = match state.to_lowercase().as_str() {
                    "on" => true,
                    "off" => false,
                    _ => return Err(USAGE),
                };
                Ok(Command::Webview {
                    pid: num(pid, USAGE)?,
                    active,
                })
            }

            ["SETLOG", level] | ["SET_LOG", level] => LogLevel::from_str_ignore_case(level)
                .map(Command::SetLog)
                .ok_or("usage: SETLOG <DEBUG|INFO|WARN|ERROR>"),

            _ => Err("unknown command (try HELP)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_with_flags() {
        let cmd: Command = "START 4321 10123 0 com.example com.example:push ui max=900"
            .parse()
            .unwrap();
        let Command::Start(snap) = cmd else {
            panic!("expected START, got {cmd:?}");
        };
        assert_eq!(snap.pid, 4321);
        assert_eq!(snap.uid, 10123);
        assert_eq!(snap.package_name, "com.example");
        assert_eq!(snap.process_name, "com.example:push");
        assert!(!snap.is_main_process());
        assert!(snap.has_shown_ui);
        assert!(!snap.is_system_app);
        assert_eq!(snap.max_adj, 900);
    }

    #[test]
    fn test_parse_start_rejects_unknown_flag() {
        assert!("START 1 10000 0 a a bogus".parse::<Command>().is_err());
        assert!("START 1 10000".parse::<Command>().is_err());
    }

    #[test]
    fn test_parse_adj_and_group() {
        assert_eq!(
            "ADJ 100 10001 -17".parse::<Command>(),
            Ok(Command::Adj {
                pid: 100,
                uid: 10001,
                raw: -17
            })
        );
        assert_eq!(
            "GROUP 10001 idle".parse::<Command>(),
            Ok(Command::Group {
                uid: 10001,
                group: AppGroup::Idle
            })
        );
        assert!("ADJ x 1 2".parse::<Command>().is_err());
        assert!("GROUP 10001 sleeping".parse::<Command>().is_err());
    }

    #[test]
    fn test_parse_toggles() {
        assert_eq!(
            "WAKELOCK 7 release".parse::<Command>(),
            Ok(Command::WakeLock {
                pid: 7,
                acquire: false
            })
        );
        assert_eq!(
            "WEBVIEW 8 ON".parse::<Command>(),
            Ok(Command::Webview {
                pid: 8,
                active: true
            })
        );
        assert_eq!("UI 9".parse::<Command>(), Ok(Command::Ui(9)));
        assert_eq!("SETLOG warn".parse::<Command>(), Ok(Command::SetLog(LogLevel::Warn)));
        assert_eq!("  PING ".parse::<Command>(), Ok(Command::Ping));
        assert!("WAKELOCK 7 hold".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }
}
