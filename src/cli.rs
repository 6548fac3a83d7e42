//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use servo_updater_core::config::DEFAULT_BOARD;
use servo_updater_flash::DEFAULT_TOOL;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "servo_updater")]
#[command(author, version, about = "Update servo board firmware", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// servo_updater data directory (contains configs/ and firmware/)
    /// Defaults to /usr/share/servo_updater, then /usr/local/share/servo_updater
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Serial device to use as the EC console instead of the USB console
    #[arg(long, global = true)]
    pub console_tty: Option<String>,

    /// Update options when no subcommand is given
    #[command(flatten)]
    pub update: UpdateArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Device selection shared across commands
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Serial number of the servo to update
    #[arg(short, long = "serialno")]
    pub serialno: Option<String>,

    /// Board name or config file
    #[arg(short, long, default_value = DEFAULT_BOARD)]
    pub board: String,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Firmware image
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Update even if the running version matches the image
    #[arg(long)]
    pub force: bool,

    /// Reboot into RO even when no update is needed
    #[arg(short, long)]
    pub reboot: bool,

    /// External updater used for current updater firmware
    #[arg(long, default_value = DEFAULT_TOOL)]
    pub updater_tool: String,

    /// Time to wait after a partition switch, in milliseconds
    #[arg(long, default_value = "1000")]
    pub settle_ms: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bring the servo firmware up to date (default)
    Update(UpdateArgs),

    /// Print the running firmware version and its updater generation
    Probe {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Force the servo into a firmware bank
    Select {
        #[command(flatten)]
        device: DeviceArgs,

        /// Bank to run: ro or rw
        region: String,

        /// Time to wait after the switch, in milliseconds
        #[arg(long, default_value = "1000")]
        settle_ms: u64,
    },

    /// Print the version embedded in a firmware image
    ImageVersion {
        /// Board name or config file
        #[arg(short, long, default_value = DEFAULT_BOARD)]
        board: String,

        /// Firmware image
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
