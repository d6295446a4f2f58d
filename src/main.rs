use adjwarden::common::types::LogLevel;
use adjwarden::daemon;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

#[derive(Parser)]
#[command(name = "adjwarden")]
#[command(version, about = "OOM adj priority daemon for Android app processes")]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Event bridge socket
    #[arg(short, long)]
    socket: Option<PathBuf>,
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<CliLogLevel> for LogLevel {
    fn from(l: CliLogLevel) -> Self {
        match l {
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Error => LogLevel::Error,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let base_filter = EnvFilter::new("info");
    let (filter_layer, filter_handle) = reload::Layer::new(base_filter);
    let timer = fmt::time::UtcTime::new(time::macros::format_description!(
        "[hour]:[minute]:[second]"
    ));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .with_timer(timer)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut cfg = daemon::config::DaemonConfig::load(args.config, args.socket)?;
    cfg.log_level = args.log_level.map(LogLevel::from);

    tracing::info!(
        "adjwarden v{} started (policy={}, global={}, overrides={})",
        env!("CARGO_PKG_VERSION"),
        cfg.settings.policy,
        if cfg.settings.global.enabled { "on" } else { "off" },
        cfg.settings.apps.len() + cfg.settings.subprocesses.len()
    );

    daemon::run::run(cfg, filter_handle)
}
