//! Error types for servo-updater-core
//!
//! Collaborator errors (`ConfigError`, `ConsoleError`, `FlashError`) are
//! folded into the run-level [`UpdateError`], whose [`ErrorKind`] is the
//! stable identifier reported to automated callers.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::partition::PartitionRegion;
use crate::version::FirmwareVersion;

/// Result type for a whole update run
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Board configuration and file resolution errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No servo_updater data directory in the known locations
    #[error("servo_updater data directory not found in known locations")]
    DataDirNotFound,

    /// The data directory lacks `configs/` or `firmware/`
    #[error("could not find required path {0}")]
    MissingPath(PathBuf),

    /// Board configuration file not found
    #[error("can't find config file: {0}")]
    ConfigNotFound(String),

    /// Firmware image not found
    #[error("can't find firmware binary: {0}")]
    ImageNotFound(String),

    /// Board configuration could not be parsed
    #[error("invalid board config {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// A numeric field is neither hex nor decimal
    #[error("invalid number for `{field}`: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// No `<board>_v...` token embedded in the image
    #[error("can't find version from file: {0}")]
    ImageVersionNotFound(PathBuf),

    /// I/O error while reading a configuration or image file
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Console transport errors
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// No device with the requested identity is attached
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// The device did not (re-)enumerate before the timeout expired
    #[error("device {0} did not respond within {1} ms")]
    DeviceNotResponding(String, u64),

    /// Several devices match and no serial number narrows it down
    #[error("{count} devices match {vid_pid}, specify a serial number")]
    MultipleDevices { vid_pid: String, count: usize },

    /// Failed to open or claim the console channel
    #[error("failed to open console: {0}")]
    OpenFailed(String),

    /// Read or write on an open console failed
    #[error("console I/O error: {0}")]
    Io(String),
}

/// Errors raised by an update driver
#[derive(Debug, Error)]
pub enum FlashError {
    /// The external updater executable is missing or not runnable
    #[error("`{tool} --help` failed ({reason}); make sure the tool is available on the host")]
    ToolUnavailable { tool: String, reason: String },

    /// The external updater exited with an unacceptable code
    #[error("`{command}` exited with code {code}")]
    ExitCode { command: String, code: i32 },

    /// The external updater was killed before exiting
    #[error("`{0}` was terminated by a signal")]
    Terminated(String),

    /// USB transport failure during a direct transfer
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The device rejected a block
    #[error("device rejected block at 0x{base:08x} with status {status}")]
    Rejected { base: u32, status: u32 },

    /// The image could not be read or does not fit the target bank
    #[error("bad image {path}: {reason}")]
    Image { path: PathBuf, reason: String },
}

/// Stable error kinds for a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid board config or image path
    ConfigResolution,
    /// Console transport failure
    Console,
    /// Console did not yield a parseable version
    Probe,
    /// Version token matches no generation rule
    Classification,
    /// Invalid partition target, or no response after a switch
    Selector,
    /// External updater binary missing or not functional
    ToolUnavailable,
    /// Transfer or subprocess failure while flashing
    Flash,
}

impl ErrorKind {
    /// Identifier suitable for machine consumption
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigResolution => "config-resolution",
            Self::Console => "console",
            Self::Probe => "probe",
            Self::Classification => "classification",
            Self::Selector => "selector",
            Self::ToolUnavailable => "tool-unavailable",
            Self::Flash => "flash",
        }
    }

    /// Process exit code for this kind
    pub fn exit_code(self) -> i32 {
        match self {
            Self::ConfigResolution => 3,
            Self::Console => 4,
            Self::Probe => 5,
            Self::Classification => 6,
            Self::Selector => 7,
            Self::ToolUnavailable => 8,
            Self::Flash => 9,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that terminate an update run
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Board configuration or image could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Console transport failed
    #[error(transparent)]
    Console(#[from] ConsoleError),

    /// No `Build:` line in the console reply
    #[error("no build version in console reply: {output:?}")]
    Probe { output: String },

    /// Version token matches no updater generation rule
    #[error("can't determine updater target from version [{version}]: unrecognized version token")]
    Classification { version: String },

    /// Partition switch failed
    #[error("partition select failed ({region}): {reason}")]
    Selector { region: String, reason: String },

    /// External updater unavailable while flashing a bank
    #[error("{region} flash via {driver} driver: {source}")]
    ToolUnavailable {
        region: PartitionRegion,
        driver: &'static str,
        #[source]
        source: FlashError,
    },

    /// Flashing a bank failed
    #[error("{region} flash via {driver} driver (device running {version}): {source}")]
    Flash {
        region: PartitionRegion,
        driver: &'static str,
        version: FirmwareVersion,
        #[source]
        source: FlashError,
    },
}

impl UpdateError {
    /// Stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigResolution,
            Self::Console(_) => ErrorKind::Console,
            Self::Probe { .. } => ErrorKind::Probe,
            Self::Classification { .. } => ErrorKind::Classification,
            Self::Selector { .. } => ErrorKind::Selector,
            Self::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
            Self::Flash { .. } => ErrorKind::Flash,
        }
    }

    /// Wrap a driver error with the bank and driver that produced it
    pub fn from_flash(
        source: FlashError,
        region: PartitionRegion,
        driver: &'static str,
        version: &FirmwareVersion,
    ) -> Self {
        match source {
            FlashError::ToolUnavailable { .. } => Self::ToolUnavailable {
                region,
                driver,
                source,
            },
            source => Self::Flash {
                region,
                driver,
                version: version.clone(),
                source,
            },
        }
    }
}
