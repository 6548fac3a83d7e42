//! Console providers
//!
//! [`UsbConsoleProvider`] opens the console interface on the servo itself,
//! waiting for the device to come back after a reboot.
//! [`TtyConsoleProvider`] opens a fixed serial device instead.

use std::time::Duration;

use servo_updater_core::{Console, ConsoleError, ConsoleProvider, DeviceIdentity};
use servo_updater_usb::discovery::wait_for_device;

use crate::session::{ConsoleSession, DEFAULT_REPLY_TIMEOUT};
use crate::transport::serial::SerialTransport;
use crate::transport::usb::UsbTransport;

/// How long to wait for a device to (re-)enumerate
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Consoles on the servo's own USB console interface
#[derive(Debug, Clone)]
pub struct UsbConsoleProvider {
    pub open_timeout: Duration,
    pub reply_timeout: Duration,
}

impl Default for UsbConsoleProvider {
    fn default() -> Self {
        Self {
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl ConsoleProvider for UsbConsoleProvider {
    fn resolve(&mut self, identity: &DeviceIdentity) -> Result<DeviceIdentity, ConsoleError> {
        if identity.serial.is_some() {
            return Ok(identity.clone());
        }

        let info = wait_for_device(identity, self.open_timeout)?;
        match info.serial_number() {
            Some(serial) => {
                log::info!("Using {} serial number {}", identity.vid_pid(), serial);
                Ok(identity.with_serial(serial))
            }
            None => {
                log::warn!(
                    "{} has no serial number, later sessions may reach another device",
                    identity.vid_pid()
                );
                Ok(identity.clone())
            }
        }
    }

    fn open(&mut self, identity: &DeviceIdentity) -> Result<Box<dyn Console>, ConsoleError> {
        let info = wait_for_device(identity, self.open_timeout)?;
        let transport = UsbTransport::open(&info, identity.interface)?;
        let session = ConsoleSession::new(Box::new(transport), identity.to_string())
            .with_reply_timeout(self.reply_timeout);
        Ok(Box::new(session))
    }
}

/// Consoles on a serial device node
#[derive(Debug, Clone)]
pub struct TtyConsoleProvider {
    pub path: String,
    pub baud: Option<u32>,
    pub reply_timeout: Duration,
}

impl TtyConsoleProvider {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud: None,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl ConsoleProvider for TtyConsoleProvider {
    fn open(&mut self, _identity: &DeviceIdentity) -> Result<Box<dyn Console>, ConsoleError> {
        let transport = SerialTransport::open(&self.path, self.baud)?;
        let session = ConsoleSession::new(Box::new(transport), self.path.clone())
            .with_reply_timeout(self.reply_timeout);
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_identity_is_kept() {
        let id = DeviceIdentity::new(0x18d1, 0x501b, 0, Some("C1803".into()));
        let resolved = UsbConsoleProvider::default().resolve(&id).unwrap();
        assert_eq!(resolved, id);
    }

    #[test]
    fn test_missing_tty() {
        let mut provider = TtyConsoleProvider::new("/nonexistent/servo-console");
        let id = DeviceIdentity::new(0x18d1, 0x501b, 0, None);
        assert!(matches!(
            provider.open(&id),
            Err(ConsoleError::OpenFailed(_))
        ));
    }
}
