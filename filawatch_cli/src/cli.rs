//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "filawatch", version, about = "Filament flow monitor CLI")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/filawatch.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded telemetry/pulse trace through the monitor
    Replay {
        /// Trace CSV with headers time_ms,event,value
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        /// Emit one JSON line per evaluation tick to stdout
        #[arg(long, action = ArgAction::SetTrue)]
        ticks: bool,
    },
    /// Validate the config file and print the effective settings
    CheckConfig,
}
