//! Error types for USB access

use servo_updater_core::{ConsoleError, FlashError};
use thiserror::Error;

/// Result type for USB operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur while talking to a servo over USB
#[derive(Debug, Error)]
pub enum UsbError {
    /// Device enumeration failed
    #[error("failed to enumerate USB devices: {0}")]
    Enumerate(String),

    /// No attached device matches
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// Multiple devices match, serial number required
    #[error("{count} devices match {vid_pid}, specify serial number")]
    MultipleDevicesFound { vid_pid: String, count: usize },

    /// Device did not appear before the deadline
    #[error("device {vid_pid} did not respond within {waited_ms} ms")]
    NotResponding { vid_pid: String, waited_ms: u64 },

    /// The device has no interface of the requested kind
    #[error("no {0} interface on device")]
    InterfaceNotFound(&'static str),

    /// Failed to open device
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// Failed to claim interface
    #[error("failed to claim interface {interface}: {reason}")]
    ClaimFailed { interface: u8, reason: String },

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Response too short or otherwise malformed
    #[error("invalid response from device: {0}")]
    InvalidResponse(String),

    /// The device refused a block
    #[error("block at 0x{base:08x} rejected with status {status}")]
    Rejected { base: u32, status: u32 },
}

impl From<UsbError> for ConsoleError {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::DeviceNotFound(vid_pid) => ConsoleError::DeviceNotFound(vid_pid),
            UsbError::MultipleDevicesFound { vid_pid, count } => {
                ConsoleError::MultipleDevices { vid_pid, count }
            }
            UsbError::NotResponding { vid_pid, waited_ms } => {
                ConsoleError::DeviceNotResponding(vid_pid, waited_ms)
            }
            UsbError::TransferFailed(msg) | UsbError::InvalidResponse(msg) => {
                ConsoleError::Io(msg)
            }
            other => ConsoleError::OpenFailed(other.to_string()),
        }
    }
}

impl From<UsbError> for FlashError {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::Rejected { base, status } => FlashError::Rejected { base, status },
            other => FlashError::Transfer(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_error_mapping() {
        let e: ConsoleError = UsbError::NotResponding {
            vid_pid: "18d1:501b".into(),
            waited_ms: 10_000,
        }
        .into();
        assert!(matches!(e, ConsoleError::DeviceNotResponding(_, 10_000)));

        let e: ConsoleError = UsbError::InterfaceNotFound("console").into();
        assert!(matches!(e, ConsoleError::OpenFailed(_)));
    }

    #[test]
    fn test_flash_error_mapping() {
        let e: FlashError = UsbError::Rejected { base: 0x800, status: 5 }.into();
        assert!(matches!(e, FlashError::Rejected { base: 0x800, status: 5 }));

        let e: FlashError = UsbError::TransferFailed("stall".into()).into();
        assert!(matches!(e, FlashError::Transfer(_)));
    }
}
