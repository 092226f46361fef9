//! CLI argument definitions and shared statics.

use charger_config::Schedule;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "charger", version, about = "Twin NiMH charger CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/charger_config.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); overrides logging.level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a charge session on the simulated charger with an accelerated clock
    Simulate {
        /// Simulated time limit in hours
        #[arg(long, default_value_t = 16.0)]
        hours: f64,
        /// Write a per-channel trace to this CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
        /// Simulated seconds between trace rows
        #[arg(long, value_name = "SECS", default_value_t = 60)]
        sample_s: u64,
        /// Stop as soon as every channel reaches Keep
        #[arg(long, action = ArgAction::SetTrue)]
        until_kept: bool,
    },
    /// Show or change the persisted slot settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Validate the config file and the persisted record
    SelfCheck,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the stored settings of every slot
    Show,
    /// Change the stored settings of one slot
    Set {
        /// Slot index (0 or 1)
        #[arg(long)]
        slot: usize,
        /// Nominal capacity in mAh
        #[arg(long, value_name = "MAH")]
        capacity: Option<u16>,
        /// Charge schedule: slow, restore or fast
        #[arg(long)]
        schedule: Option<Schedule>,
        /// Extra discharge/charge cycles
        #[arg(long)]
        loops: Option<u8>,
        /// Skip the initial discharge (forces loops to 0)
        #[arg(long, value_name = "BOOL")]
        skip_discharge: Option<bool>,
    },
}
