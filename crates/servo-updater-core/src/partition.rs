//! Firmware banks and the console commands that switch between them

use std::fmt;
use std::str::FromStr;

use crate::error::UpdateError;

/// One of the two independent firmware banks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionRegion {
    /// Recovery/bootstrap bank
    ReadOnly,
    /// Main application bank
    ReadWrite,
}

impl PartitionRegion {
    /// Console command that boots the device into this bank
    pub fn switch_command(self) -> &'static str {
        match self {
            // A reset always comes back up in RO.
            Self::ReadOnly => "reboot",
            Self::ReadWrite => "sysjump rw",
        }
    }

    /// Short lowercase name, as accepted on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }
}

impl fmt::Display for PartitionRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("RO"),
            Self::ReadWrite => f.write_str("RW"),
        }
    }
}

impl FromStr for PartitionRegion {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ro" => Ok(Self::ReadOnly),
            "rw" => Ok(Self::ReadWrite),
            _ => Err(UpdateError::Selector {
                region: s.to_string(),
                reason: "region must be ro or rw".into(),
            }),
        }
    }
}
