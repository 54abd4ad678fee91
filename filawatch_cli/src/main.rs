mod cli;
mod replay;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD};
use eyre::WrapErr;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str, json: bool, file: Option<&str>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    if let Some(file) = file {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().unwrap_or_else(|| "filawatch.log".as_ref());
        let appender =
            tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(writer);
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
    } else {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
    }
}

fn load_config(path: &Path) -> eyre::Result<filawatch_config::Config> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("read config file {}", path.display()))?;
    let cfg = filawatch_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()
        .wrap_err_with(|| format!("validate config {}", path.display()))?;
    Ok(cfg)
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    let config = load_config(&args.config)?;

    // CLI flag wins; otherwise the config file's [logging] section.
    let level = args
        .log_level
        .as_deref()
        .or(config.logging.level.as_deref())
        .unwrap_or("info");
    init_tracing(level, args.json, config.logging.file.as_deref());

    match args.cmd {
        Commands::Replay { trace, ticks } => {
            let rows = replay::load_trace(&trace)?;
            tracing::info!(rows = rows.len(), trace = %trace.display(), "replay start");

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let summary = replay::run(&config, &rows, ticks, &mut out)?;

            let report = serde_json::json!({
                "ticks": summary.ticks,
                "pulses": summary.pulses,
                "jam_detected": summary.jam_detected,
                "first_jam_ms": summary.first_jam_ms,
                "runout_detected": summary.runout_detected,
                "pauses_requested": summary.pauses_requested,
            });
            println!("{report}");
        }
        Commands::CheckConfig => {
            let jam = filawatch_core::JamConfig::from(&config.detection).clamped();
            println!(
                "{}",
                serde_json::json!({
                    "ok": true,
                    "ratio_threshold": jam.ratio_threshold,
                    "hard_pass_ratio": jam.hard_pass_ratio,
                    "hard_jam_time_ms": jam.hard_jam_time_ms,
                    "soft_jam_time_ms": jam.soft_jam_time_ms,
                    "grace_time_ms": jam.grace_time_ms,
                    "check_interval_ms": jam.check_interval_ms,
                    "mm_per_pulse": config.sensor.mm_per_pulse,
                })
            );
        }
    }
    Ok(())
}
