//! Physical device identity

use std::fmt;

/// Identifies one physical servo among possibly several attached
///
/// Resolved once at the start of a run and carried unchanged through every
/// console session and flash operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID
    pub pid: u16,
    /// Console interface number
    pub interface: u8,
    /// USB serial number, to differentiate multiple devices
    pub serial: Option<String>,
}

impl DeviceIdentity {
    pub fn new(vid: u16, pid: u16, interface: u8, serial: Option<String>) -> Self {
        Self {
            vid,
            pid,
            interface,
            serial,
        }
    }

    /// Bus-id pair in `vvvv:pppp` form
    pub fn vid_pid(&self) -> String {
        format!("{:04x}:{:04x}", self.vid, self.pid)
    }

    /// Same device, pinned to a serial number
    pub fn with_serial(&self, serial: impl Into<String>) -> Self {
        Self {
            serial: Some(serial.into()),
            ..self.clone()
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.vid_pid())?;
        if let Some(serial) = &self.serial {
            write!(f, " (serial {})", serial)?;
        }
        Ok(())
    }
}
